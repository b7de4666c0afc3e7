pub mod action;
pub mod dispatcher;

pub use action::{Action, NavigationWait, ScrollDirection};
pub use dispatcher::{execute, ActionOutcome};
