/// Image-pixel space → page CSS space.
///
/// Grid rectangles are drawn against the captured screenshot, whose pixels are CSS
/// pixels multiplied by the device pixel ratio. Element geometry comes from the DOM
/// in CSS pixels, relative to the viewport; in `Page` mode it is shifted by the
/// scroll offset so elements below the fold line up with a full-page capture.
use serde::{Deserialize, Serialize};

use crate::grid::coordinate::{GridBounds, PixelRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpace {
    /// Geometry relative to the visible viewport (viewport screenshot).
    #[default]
    Viewport,
    /// Geometry relative to the whole document (full-page screenshot).
    Page,
}

impl CoordinateSpace {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinateSpace::Viewport => "viewport",
            CoordinateSpace::Page => "page",
        }
    }

    pub fn is_full_page(&self) -> bool {
        matches!(self, CoordinateSpace::Page)
    }
}

impl std::fmt::Display for CoordinateSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CssRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CssRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Strict overlap; rectangles that only share an edge do not intersect.
    pub fn intersects(&self, other: &CssRect) -> bool {
        self.left() < other.right()
            && self.right() > other.left()
            && self.top() < other.bottom()
            && self.bottom() > other.top()
    }
}

/// Page geometry sampled in the same evaluation as the element list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportMetrics {
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub document_width: f64,
    pub document_height: f64,
    pub device_pixel_ratio: f64,
    #[serde(default)]
    pub scroll_x: f64,
    #[serde(default)]
    pub scroll_y: f64,
}

impl Default for ViewportMetrics {
    fn default() -> Self {
        Self {
            viewport_width: 1.0,
            viewport_height: 1.0,
            document_width: 1.0,
            document_height: 1.0,
            device_pixel_ratio: 1.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinateSpaceMapper {
    metrics: ViewportMetrics,
    space: CoordinateSpace,
}

impl CoordinateSpaceMapper {
    pub fn new(metrics: ViewportMetrics, space: CoordinateSpace) -> Self {
        Self { metrics, space }
    }

    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    /// CSS extent of the addressed surface, each axis clamped to at least 1.
    fn css_extent(&self) -> (f64, f64) {
        let (w, h) = match self.space {
            CoordinateSpace::Viewport => (self.metrics.viewport_width, self.metrics.viewport_height),
            CoordinateSpace::Page => (self.metrics.document_width, self.metrics.document_height),
        };
        (clamp_extent(w), clamp_extent(h))
    }

    /// Image pixels per CSS pixel on each axis: captured extent over CSS extent.
    pub fn scale(&self) -> (f64, f64) {
        let dpr = positive_or_one(self.metrics.device_pixel_ratio);
        let (css_w, css_h) = self.css_extent();
        (
            positive_or_one((css_w * dpr).round() / css_w),
            positive_or_one((css_h * dpr).round() / css_h),
        )
    }

    pub fn pixel_to_css(&self, rect: PixelRect) -> CssRect {
        let (sx, sy) = self.scale();
        CssRect {
            x: rect.x as f64 / sx,
            y: rect.y as f64 / sy,
            width: rect.width as f64 / sx,
            height: rect.height as f64 / sy,
        }
    }

    /// CSS rectangle covered by a grid range.
    pub fn zone_rect(&self, bounds: &GridBounds, cell_size: u32) -> CssRect {
        self.pixel_to_css(bounds.pixel_rect(cell_size))
    }

    /// Bring a viewport-relative element rectangle into this mapper's space.
    pub fn element_rect(&self, viewport_rect: CssRect) -> CssRect {
        match self.space {
            CoordinateSpace::Viewport => viewport_rect,
            CoordinateSpace::Page => CssRect {
                x: viewport_rect.x + self.metrics.scroll_x,
                y: viewport_rect.y + self.metrics.scroll_y,
                ..viewport_rect
            },
        }
    }
}

fn clamp_extent(v: f64) -> f64 {
    if v.is_finite() && v >= 1.0 {
        v
    } else {
        1.0
    }
}

fn positive_or_one(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        1.0
    }
}
