pub mod cdp;
pub mod devtools;
pub mod driver;

#[cfg(test)]
pub mod fake;

pub use cdp::{CdpPage, CdpSession};
pub use devtools::{DevToolsEndpoint, TabInfo, VersionInfo};
pub use driver::{LoadState, NavigationMarker, PageDriver, UrlPredicate};
