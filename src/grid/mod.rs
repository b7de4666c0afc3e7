pub mod compositor;
pub mod coordinate;
pub mod font;

pub use compositor::{CapturedFrame, GridCompositor, LabeledImage, LABEL_MARGIN};
pub use coordinate::{
    coordinate_to_label, label_to_coordinate, GridBounds, GridCoordinate, GridRange, PixelRect,
    CELL_SIZE,
};
