pub mod mapper;
pub mod scanner;

pub use mapper::{CoordinateSpace, CoordinateSpaceMapper, CssRect, ViewportMetrics};
pub use scanner::{InteractiveElement, Zone, ZoneElementScanner};
