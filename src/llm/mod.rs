pub mod labeling;
pub mod labels;
pub mod matcher;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod types;

pub use labeling::LabelingProtocol;
pub use labels::{Importance, LabeledElement, UiLabelsResult, UiOverviewResult};
pub use matcher::{find_best_match, ElementMatch};
pub use prompt::{DetailLevel, LabelingMode};
pub use provider::VisionProvider;
