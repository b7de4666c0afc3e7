/// Grid overlay compositing.
///
/// Pads a captured frame with a label margin on the top and left, then draws:
///   1. grid lines every `cell_size` pixels,
///   2. column letters / row numbers in the margin,
///   3. an opaque badge inside every cell carrying its full label ("C4").
///
/// When a sub-range is requested the pixel rectangle is cut from the *original*
/// frame first and the overlay is re-rendered from the range's top-left cell, so the
/// badge in the crop's first cell reads the range start (e.g. "B2"), never "A1".
use std::io::Cursor;

use base64::Engine as _;
use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::errors::{GridLensError, GridLensResult};
use crate::grid::coordinate::{
    column_label, coordinate_to_label, GridBounds, GridCoordinate, GridRange, CELL_SIZE,
};
use crate::grid::font;

/// Space reserved above and left of the content for axis labels.
pub const LABEL_MARGIN: u32 = 28;

const MARGIN_BG: Rgba<u8> = Rgba([28, 28, 32, 255]);
const AXIS_TEXT: Rgba<u8> = Rgba([235, 235, 235, 255]);
const BADGE_BG: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BADGE_TEXT: Rgba<u8> = Rgba([255, 220, 0, 255]);
const LINE_RGBA: (u8, u8, u8, u8) = (0, 200, 255, 150);
const BADGE_INSET: u32 = 3;

/// A raw capture as produced by the browser, immutable once built.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Encoded image (PNG from the browser).
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f64,
}

impl CapturedFrame {
    /// Wrap encoded image bytes, reading the pixel size from the header.
    pub fn from_encoded(bytes: Vec<u8>, device_pixel_ratio: f64) -> GridLensResult<Self> {
        let (width, height) = image::ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()?
            .into_dimensions()?;
        Ok(Self {
            bytes,
            width,
            height,
            device_pixel_ratio,
        })
    }
}

/// Composited result. `offset` is the zero-based cell of the content's top-left,
/// needed to reinterpret what is visible as absolute page coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabeledImage {
    #[serde(skip)]
    pub png: Vec<u8>,
    /// Total size including the label margin.
    pub width: u32,
    pub height: u32,
    pub content_width: u32,
    pub content_height: u32,
    pub margin: u32,
    pub offset: GridCoordinate,
    pub visible: GridBounds,
    /// Badge labels in row-major order.
    pub cell_labels: Vec<String>,
    pub device_pixel_ratio: f64,
}

impl LabeledImage {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.png)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GridCompositor {
    cell_size: u32,
    margin: u32,
}

impl Default for GridCompositor {
    fn default() -> Self {
        Self {
            cell_size: CELL_SIZE,
            margin: LABEL_MARGIN,
        }
    }
}

impl GridCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    /// Overlay the grid on `frame`, optionally cropped to `range` first.
    pub fn compose(&self, frame: &CapturedFrame, range: Option<&GridRange>) -> GridLensResult<LabeledImage> {
        let img = image::load_from_memory(&frame.bytes)?;
        let (fw, fh) = img.dimensions();

        let (content, offset) = match range {
            Some(range) => {
                let bounds = range.normalize()?;
                let rect = bounds.pixel_rect(self.cell_size);
                if rect.x >= fw || rect.y >= fh {
                    return Err(GridLensError::InvalidCoordinate(format!(
                        "range {range} lies outside the {fw}x{fh} frame"
                    )));
                }
                let w = rect.width.min(fw - rect.x);
                let h = rect.height.min(fh - rect.y);
                (img.crop_imm(rect.x, rect.y, w, h).to_rgba8(), bounds.origin())
            }
            None => (img.to_rgba8(), GridCoordinate::new(0, 0)),
        };

        let (cw, ch) = content.dimensions();
        if cw == 0 || ch == 0 {
            return Err(GridLensError::Image("captured frame is empty".into()));
        }
        let columns = cw.div_ceil(self.cell_size);
        let rows = ch.div_ceil(self.cell_size);
        let visible = GridBounds {
            min_column: offset.column,
            max_column: offset.column + columns - 1,
            min_row: offset.row,
            max_row: offset.row + rows - 1,
        };

        let mut canvas = RgbaImage::from_pixel(cw + self.margin, ch + self.margin, MARGIN_BG);
        image::imageops::replace(&mut canvas, &content, self.margin as i64, self.margin as i64);

        self.draw_grid_lines(&mut canvas, columns, rows);
        self.draw_axis_labels(&mut canvas, offset, columns, rows, cw, ch);
        let cell_labels = self.draw_badges(&mut canvas, offset, columns, rows);

        let (width, height) = canvas.dimensions();
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(canvas).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        tracing::debug!(
            width,
            height,
            offset = %offset,
            cells = cell_labels.len(),
            "grid composited"
        );

        Ok(LabeledImage {
            png,
            width,
            height,
            content_width: cw,
            content_height: ch,
            margin: self.margin,
            offset,
            visible,
            cell_labels,
            device_pixel_ratio: frame.device_pixel_ratio,
        })
    }

    fn draw_grid_lines(&self, canvas: &mut RgbaImage, columns: u32, rows: u32) {
        let (w, h) = canvas.dimensions();
        let (r, g, b, a) = LINE_RGBA;
        for k in 0..=columns {
            let x = self.margin + k * self.cell_size;
            if x >= w {
                break;
            }
            for y in self.margin..h {
                blend_pixel(canvas.get_pixel_mut(x, y), r, g, b, a);
            }
        }
        for k in 0..=rows {
            let y = self.margin + k * self.cell_size;
            if y >= h {
                break;
            }
            for x in self.margin..w {
                blend_pixel(canvas.get_pixel_mut(x, y), r, g, b, a);
            }
        }
    }

    fn draw_axis_labels(
        &self,
        canvas: &mut RgbaImage,
        offset: GridCoordinate,
        columns: u32,
        rows: u32,
        content_w: u32,
        content_h: u32,
    ) {
        let glyph_px = |scale: u32| font::GLYPH_SIZE * scale;
        let fits = |text: &str, scale: u32| font::text_width(text, scale) + 4 <= self.margin;

        for k in 0..columns {
            let text = column_label(offset.column + k);
            let span = self.cell_size.min(content_w - k * self.cell_size);
            let scale = if font::text_width(&text, 2) + 4 <= span { 2 } else { 1 };
            let center = self.margin + k * self.cell_size + span / 2;
            let px = center.saturating_sub(font::text_width(&text, scale) / 2);
            let py = self.margin.saturating_sub(glyph_px(scale)) / 2;
            font::draw_text(canvas, &text, px, py, scale, AXIS_TEXT);
        }

        for k in 0..rows {
            let text = (offset.row as u64 + k as u64 + 1).to_string();
            let span = self.cell_size.min(content_h - k * self.cell_size);
            let scale = if fits(&text, 2) { 2 } else { 1 };
            let px = self.margin.saturating_sub(font::text_width(&text, scale) + 3);
            let py = (self.margin + k * self.cell_size + span / 2).saturating_sub(glyph_px(scale) / 2);
            font::draw_text(canvas, &text, px, py, scale, AXIS_TEXT);
        }
    }

    fn draw_badges(&self, canvas: &mut RgbaImage, offset: GridCoordinate, columns: u32, rows: u32) -> Vec<String> {
        let (w, h) = canvas.dimensions();
        let scale: u32 = if self.cell_size >= 80 { 2 } else { 1 };
        let pad = scale + 1;
        let mut labels = Vec::with_capacity((columns * rows) as usize);

        for r in 0..rows {
            for c in 0..columns {
                let label = coordinate_to_label(offset.column + c, offset.row + r);
                let bx = self.margin + c * self.cell_size + BADGE_INSET;
                let by = self.margin + r * self.cell_size + BADGE_INSET;
                let bw = font::text_width(&label, scale) + pad * 2;
                let bh = font::GLYPH_SIZE * scale + pad * 2;
                for y in by..(by + bh).min(h) {
                    for x in bx..(bx + bw).min(w) {
                        canvas.put_pixel(x, y, BADGE_BG);
                    }
                }
                font::draw_text(canvas, &label, bx + pad, by + pad, scale, BADGE_TEXT);
                labels.push(label);
            }
        }
        labels
    }
}

fn blend_pixel(pixel: &mut Rgba<u8>, r: u8, g: u8, b: u8, a: u8) {
    let alpha = a as f32 / 255.0;
    pixel[0] = (pixel[0] as f32 * (1.0 - alpha) + r as f32 * alpha).round() as u8;
    pixel[1] = (pixel[1] as f32 * (1.0 - alpha) + g as f32 * alpha).round() as u8;
    pixel[2] = (pixel[2] as f32 * (1.0 - alpha) + b as f32 * alpha).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILL: Rgba<u8> = Rgba([10, 200, 30, 255]);

    fn frame(w: u32, h: u32) -> CapturedFrame {
        let img = RgbaImage::from_pixel(w, h, FILL);
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        CapturedFrame::from_encoded(bytes, 1.0).unwrap()
    }

    #[test]
    fn frame_dimensions_come_from_header() {
        let f = frame(320, 240);
        assert_eq!((f.width, f.height), (320, 240));
    }

    #[test]
    fn full_frame_labels_every_cell_including_partial() {
        let out = GridCompositor::new().compose(&frame(250, 150), None).unwrap();
        assert_eq!(out.cell_labels, ["A1", "B1", "C1", "A2", "B2", "C2"]);
        assert_eq!((out.width, out.height), (250 + LABEL_MARGIN, 150 + LABEL_MARGIN));
        assert_eq!(out.offset, GridCoordinate::new(0, 0));

        let decoded = image::load_from_memory(&out.png).unwrap();
        assert_eq!(decoded.dimensions(), (out.width, out.height));
    }

    #[test]
    fn cropped_range_relabels_from_its_offset() {
        let range = GridRange::new("B2", "D4");
        let out = GridCompositor::new().compose(&frame(1000, 800), Some(&range)).unwrap();

        assert_eq!((out.content_width, out.content_height), (300, 300));
        assert_eq!(out.offset, GridCoordinate::new(1, 1));
        assert_eq!(out.cell_labels.first().map(String::as_str), Some("B2"));
        assert_eq!(
            out.cell_labels,
            ["B2", "C2", "D2", "B3", "C3", "D3", "B4", "C4", "D4"]
        );
        assert_eq!(out.visible, range.normalize().unwrap());
    }

    #[test]
    fn crop_is_clamped_to_frame_edges() {
        let range = GridRange::new("L10", "I7");
        let out = GridCompositor::new().compose(&frame(1000, 800), Some(&range)).unwrap();
        assert_eq!((out.content_width, out.content_height), (200, 200));
        assert_eq!(out.cell_labels, ["I7", "J7", "I8", "J8"]);
        assert_eq!(out.visible.max_column, 9);
    }

    #[test]
    fn range_outside_frame_is_rejected() {
        let range = GridRange::new("K1", "K2");
        let err = GridCompositor::new().compose(&frame(1000, 800), Some(&range)).unwrap_err();
        assert!(matches!(err, GridLensError::InvalidCoordinate(_)));
    }

    #[test]
    fn badges_are_opaque_and_content_survives() {
        let out = GridCompositor::new().compose(&frame(300, 200), None).unwrap();
        let img = image::load_from_memory(&out.png).unwrap().to_rgba8();
        let m = LABEL_MARGIN;

        assert_eq!(*img.get_pixel(m + BADGE_INSET, m + BADGE_INSET), BADGE_BG);
        assert_eq!(*img.get_pixel(m + 160, m + 60), FILL);
        assert_eq!(*img.get_pixel(1, 1), MARGIN_BG);
        // Grid line at the first cell boundary is blended, not the raw fill.
        assert_ne!(*img.get_pixel(m + 100, m + 60), FILL);
    }
}
