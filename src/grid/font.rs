// Minimal 5×5 bitmap font for grid labels.
// Each glyph: 5 rows, each row is a u8 where bit4=leftmost pixel, bit0=rightmost.
use image::{Rgba, RgbaImage};

/// Glyph width/height in font units; multiply by the draw scale for pixels.
pub const GLYPH_SIZE: u32 = 5;

const DIGITS: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
];

const LETTERS: [[u8; 5]; 26] = [
    [0b01110, 0b10001, 0b11111, 0b10001, 0b10001], // A
    [0b11110, 0b10001, 0b11110, 0b10001, 0b11110], // B
    [0b01110, 0b10000, 0b10000, 0b10000, 0b01110], // C
    [0b11100, 0b10010, 0b10001, 0b10010, 0b11100], // D
    [0b11111, 0b10000, 0b11110, 0b10000, 0b11111], // E
    [0b11111, 0b10000, 0b11110, 0b10000, 0b10000], // F
    [0b01110, 0b10000, 0b10011, 0b10001, 0b01110], // G
    [0b10001, 0b10001, 0b11111, 0b10001, 0b10001], // H
    [0b01110, 0b00100, 0b00100, 0b00100, 0b01110], // I
    [0b00111, 0b00010, 0b00010, 0b10010, 0b01100], // J
    [0b10001, 0b10010, 0b11100, 0b10010, 0b10001], // K
    [0b10000, 0b10000, 0b10000, 0b10000, 0b11111], // L
    [0b10001, 0b11011, 0b10101, 0b10001, 0b10001], // M
    [0b10001, 0b11001, 0b10101, 0b10011, 0b10001], // N
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // O
    [0b11110, 0b10001, 0b11110, 0b10000, 0b10000], // P
    [0b01110, 0b10001, 0b10101, 0b10010, 0b01101], // Q
    [0b11110, 0b10001, 0b11110, 0b10010, 0b10001], // R
    [0b01111, 0b10000, 0b01110, 0b00001, 0b11110], // S
    [0b11111, 0b00100, 0b00100, 0b00100, 0b00100], // T
    [0b10001, 0b10001, 0b10001, 0b10001, 0b01110], // U
    [0b10001, 0b10001, 0b10001, 0b01010, 0b00100], // V
    [0b10001, 0b10001, 0b10101, 0b11011, 0b10001], // W
    [0b10001, 0b01010, 0b00100, 0b01010, 0b10001], // X
    [0b10001, 0b01010, 0b00100, 0b00100, 0b00100], // Y
    [0b11111, 0b00010, 0b00100, 0b01000, 0b11111], // Z
];

fn glyph(c: char) -> Option<[u8; 5]> {
    match c.to_ascii_uppercase() {
        d @ '0'..='9' => Some(DIGITS[(d as u8 - b'0') as usize]),
        l @ 'A'..='Z' => Some(LETTERS[(l as u8 - b'A') as usize]),
        ':' => Some([0b00000, 0b00100, 0b00000, 0b00100, 0b00000]),
        '-' => Some([0b00000, 0b00000, 0b11111, 0b00000, 0b00000]),
        _ => None,
    }
}

/// Horizontal advance per character at `scale`, including the 1px gap.
pub fn char_step(scale: u32) -> u32 {
    GLYPH_SIZE * scale + 1
}

/// Pixel width of `text` rendered at `scale` (no trailing gap).
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        0
    } else {
        n * char_step(scale) - 1
    }
}

/// Draw `text` with its top-left at (px, py). Pixels outside the canvas are clipped.
pub fn draw_text(canvas: &mut RgbaImage, text: &str, px: u32, py: u32, scale: u32, color: Rgba<u8>) {
    let (w, h) = canvas.dimensions();
    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let gx = px + i as u32 * char_step(scale);
        for (row, &bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if (bits >> (4 - col)) & 1 == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let x = gx + col * scale + sx;
                        let y = py + row as u32 * scale + sy;
                        if x < w && y < h {
                            canvas.put_pixel(x, y, color);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_accounts_for_gaps() {
        assert_eq!(text_width("", 2), 0);
        assert_eq!(text_width("A", 1), 5);
        assert_eq!(text_width("AL8", 2), 3 * 11 - 1);
    }

    #[test]
    fn draws_only_inside_canvas() {
        let mut canvas = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        draw_text(&mut canvas, "A1", 4, 4, 1, Rgba([255, 255, 255, 255]));
        // Top-left pixel of 'A' is blank, second pixel of its first row is set.
        assert_eq!(canvas.get_pixel(4, 4)[0], 0);
        assert_eq!(canvas.get_pixel(5, 4)[0], 255);
    }
}
