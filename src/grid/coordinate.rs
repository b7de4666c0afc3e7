/// Spreadsheet-style grid addressing.
///
/// Labeling convention:
///   - Columns: A, B, C … Z, AA, AB … (left → right), bijective base-26
///   - Rows:    1, 2, 3 …             (top  → bottom), 1-indexed in label form
///
/// Every cell is `CELL_SIZE` × `CELL_SIZE` image pixels, so a label computed while
/// scanning and a label drawn while screenshotting always name the same pixel cell.
use serde::{Deserialize, Serialize};

use crate::errors::{GridLensError, GridLensResult};

/// Edge length of one grid cell, in captured-image pixels.
pub const CELL_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCoordinate {
    pub column: u32,
    pub row: u32,
}

impl GridCoordinate {
    pub fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    pub fn label(&self) -> String {
        coordinate_to_label(self.column, self.row)
    }
}

impl std::fmt::Display for GridCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

impl std::str::FromStr for GridCoordinate {
    type Err = GridLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        label_to_coordinate(s)
    }
}

// ── Label helpers ────────────────────────────────────────────────────────────

/// Convert a 0-indexed column number to its letter label.
/// 0→A, 25→Z, 26→AA, 27→AB, 701→ZZ, 702→AAA …
pub fn column_label(column: u32) -> String {
    let mut n = column as u64 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Full label for a grid cell: column=2, row=3 → "C4".
pub fn coordinate_to_label(column: u32, row: u32) -> String {
    format!("{}{}", column_label(column), row as u64 + 1)
}

/// Parse a label like "AL8" into 0-indexed (column, row).
///
/// Lowercase letters and surrounding whitespace are accepted; anything else that is
/// not letters followed by digits, or a row of 0, is an `InvalidCoordinate`.
pub fn label_to_coordinate(label: &str) -> GridLensResult<GridCoordinate> {
    let normalized = label.trim().to_ascii_uppercase();
    let invalid = || GridLensError::InvalidCoordinate(format!("'{label}'"));

    let split = normalized
        .find(|c: char| !c.is_ascii_uppercase())
        .ok_or_else(invalid)?;
    let (letters, digits) = normalized.split_at(split);
    if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let mut column: u32 = 0;
    for b in letters.bytes() {
        column = column
            .checked_mul(26)
            .and_then(|c| c.checked_add((b - b'A') as u32 + 1))
            .ok_or_else(invalid)?;
    }
    let row: u32 = digits.parse().map_err(|_| invalid())?;
    if row == 0 {
        return Err(GridLensError::InvalidCoordinate(format!(
            "'{label}': rows start at 1"
        )));
    }

    Ok(GridCoordinate::new(column - 1, row - 1))
}

// ── Ranges ───────────────────────────────────────────────────────────────────

/// An unordered pair of labels; the rectangle is their bounding box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRange {
    pub start: String,
    pub end: String,
}

impl GridRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Accepts "B2:D4" or a single cell "C3".
    pub fn parse(text: &str) -> GridLensResult<Self> {
        let range = match text.split_once(':') {
            Some((start, end)) => Self::new(start.trim(), end.trim()),
            None => Self::new(text.trim(), text.trim()),
        };
        range.normalize()?;
        Ok(range)
    }

    pub fn normalize(&self) -> GridLensResult<GridBounds> {
        let a = label_to_coordinate(&self.start)?;
        let b = label_to_coordinate(&self.end)?;
        Ok(GridBounds {
            min_column: a.column.min(b.column),
            max_column: a.column.max(b.column),
            min_row: a.row.min(b.row),
            max_row: a.row.max(b.row),
        })
    }
}

impl std::fmt::Display for GridRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Normalized, inclusive cell rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridBounds {
    pub min_column: u32,
    pub max_column: u32,
    pub min_row: u32,
    pub max_row: u32,
}

/// Axis-aligned rectangle in captured-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl GridBounds {
    pub fn columns(&self) -> u32 {
        self.max_column - self.min_column + 1
    }

    pub fn rows(&self) -> u32 {
        self.max_row - self.min_row + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.columns() as u64 * self.rows() as u64
    }

    pub fn contains(&self, coord: GridCoordinate) -> bool {
        (self.min_column..=self.max_column).contains(&coord.column)
            && (self.min_row..=self.max_row).contains(&coord.row)
    }

    /// Top-left cell, the offset a cropped image is relabeled from.
    pub fn origin(&self) -> GridCoordinate {
        GridCoordinate::new(self.min_column, self.min_row)
    }

    /// Pixel rectangle covered by the range, unclamped.
    pub fn pixel_rect(&self, cell_size: u32) -> PixelRect {
        PixelRect {
            x: self.min_column.saturating_mul(cell_size),
            y: self.min_row.saturating_mul(cell_size),
            width: self.columns().saturating_mul(cell_size),
            height: self.rows().saturating_mul(cell_size),
        }
    }

    /// Row-major iteration over every cell in the range.
    pub fn cells(&self) -> impl Iterator<Item = GridCoordinate> + '_ {
        (self.min_row..=self.max_row).flat_map(move |row| {
            (self.min_column..=self.max_column).map(move |column| GridCoordinate::new(column, row))
        })
    }

    pub fn to_range(&self) -> GridRange {
        GridRange::new(
            coordinate_to_label(self.min_column, self.min_row),
            coordinate_to_label(self.max_column, self.max_row),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_decode() {
        assert_eq!(label_to_coordinate("A1").unwrap(), GridCoordinate::new(0, 0));
        assert_eq!(label_to_coordinate("Z1").unwrap(), GridCoordinate::new(25, 0));
        assert_eq!(label_to_coordinate("AA1").unwrap(), GridCoordinate::new(26, 0));
        assert_eq!(label_to_coordinate("AL8").unwrap(), GridCoordinate::new(37, 7));
        assert_eq!(label_to_coordinate("ZZ3").unwrap(), GridCoordinate::new(701, 2));
        assert_eq!(label_to_coordinate("AAA1").unwrap(), GridCoordinate::new(702, 0));
    }

    #[test]
    fn labels_round_trip() {
        for label in ["A1", "Z1", "AA1", "AL8", "AZ10", "BA99", "ZZ1", "AAA1", "XFD1048576"] {
            let coord = label_to_coordinate(label).unwrap();
            assert_eq!(coordinate_to_label(coord.column, coord.row), label);
        }
        for column in 0..2000 {
            let label = coordinate_to_label(column, 4);
            assert_eq!(label_to_coordinate(&label).unwrap(), GridCoordinate::new(column, 4));
        }
    }

    #[test]
    fn lowercase_and_whitespace_are_tolerated() {
        assert_eq!(label_to_coordinate(" c4 ").unwrap(), GridCoordinate::new(2, 3));
    }

    #[test]
    fn malformed_labels_are_rejected() {
        for bad in ["", "A", "1", "A0", "1A", "A1B", "A-1", "Ä1", "A 1", "AAAAAAAAAAAAAAAA1"] {
            assert!(
                matches!(label_to_coordinate(bad), Err(GridLensError::InvalidCoordinate(_))),
                "{bad:?} should be invalid"
            );
        }
    }

    #[test]
    fn range_order_is_irrelevant() {
        let forward = GridRange::new("A1", "C4").normalize().unwrap();
        let backward = GridRange::new("C4", "A1").normalize().unwrap();
        assert_eq!(forward, backward);
        assert_eq!(
            forward,
            GridBounds { min_column: 0, max_column: 2, min_row: 0, max_row: 3 }
        );

        let crossed = GridRange::new("C1", "A4").normalize().unwrap();
        assert_eq!(crossed, forward);
    }

    #[test]
    fn range_shorthand_parses() {
        let r = GridRange::parse("B2:D4").unwrap();
        assert_eq!(r, GridRange::new("B2", "D4"));
        let single = GridRange::parse("C3").unwrap().normalize().unwrap();
        assert_eq!(single.cell_count(), 1);
        assert!(GridRange::parse("B2:D0").is_err());
    }

    #[test]
    fn bounds_pixel_rect_and_cells() {
        let b = GridRange::new("B2", "D4").normalize().unwrap();
        assert_eq!(
            b.pixel_rect(CELL_SIZE),
            PixelRect { x: 100, y: 100, width: 300, height: 300 }
        );
        let labels: Vec<String> = b.cells().map(|c| c.label()).collect();
        assert_eq!(labels, ["B2", "C2", "D2", "B3", "C3", "D3", "B4", "C4", "D4"]);
        assert!(b.contains(GridCoordinate::new(3, 3)));
        assert!(!b.contains(GridCoordinate::new(4, 3)));
        assert_eq!(b.to_range(), GridRange::new("B2", "D4"));
    }
}
