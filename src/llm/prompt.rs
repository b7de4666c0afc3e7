// Prompt builders for the labeling protocol.
use serde::{Deserialize, Serialize};

use crate::scan::mapper::CoordinateSpace;

pub const SYSTEM_PROMPT: &str = "You are a precise UI analyst. You look at browser screenshots overlaid \
with a spreadsheet-style grid (columns A, B, C... left to right, rows 1, 2, 3... top to bottom; \
every cell shows its label in a small badge). You answer with strict JSON only.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    #[default]
    High,
    Extreme,
}

impl DetailLevel {
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("extreme") {
            DetailLevel::Extreme
        } else {
            DetailLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelingMode {
    Full,
    Overview,
    /// Cropped to one range; grid references use the labels drawn in the crop.
    Zone { range: String },
}

const FULL_SCHEMA: &str = r#"{
  "pageSummary": "string",
  "regions": [{ "name": "string", "purpose": "string", "grid": "A1:D3" }],
  "interactiveElements": [{
    "id": "short-kebab-id",
    "text": "visible text",
    "type": "button|link|input|select|checkbox|tab|menu|other",
    "role": "string",
    "grid": "C4",
    "actionability": "clickable|typeable|selectable|scrollable|readonly",
    "likelyActions": ["string"],
    "importance": "critical|high|medium|low",
    "confidence": 0.0
  }],
  "pointsOfInterest": [{ "label": "string", "grid": "B2", "reason": "string" }],
  "keyFlows": [{ "name": "string", "steps": ["string"] }],
  "risks": ["string"]
}"#;

const OVERVIEW_SCHEMA: &str = r#"{
  "pageSummary": "string",
  "regions": [{ "name": "string", "purpose": "string", "grid": "A1:D3" }]
}"#;

fn detail_rules(detail: DetailLevel) -> &'static str {
    match detail {
        DetailLevel::High => {
            "Focus on high-value controls. Return at most 4 regions, at most 8 interactive \
             elements and at most 5 points of interest."
        }
        DetailLevel::Extreme => {
            "Be exhaustive. Cover every region and every interactive element you can see, \
             including subtle controls such as icon buttons, toggles, pagination and footer links."
        }
    }
}

fn space_note(space: CoordinateSpace) -> &'static str {
    match space {
        CoordinateSpace::Viewport => "The image shows the visible viewport only.",
        CoordinateSpace::Page => "The image shows the entire scrollable page, not just the viewport.",
    }
}

pub fn build_prompt(mode: &LabelingMode, detail: DetailLevel, space: CoordinateSpace) -> String {
    let mut prompt = String::new();
    prompt.push_str(space_note(space));
    prompt.push('\n');

    match mode {
        LabelingMode::Overview => {
            prompt.push_str(
                "Give a quick overview of the page: a one-sentence summary and up to 6 coarse \
                 layout regions, each with the grid range it covers.\n",
            );
            prompt.push_str("Respond with a single JSON object matching this schema:\n");
            prompt.push_str(OVERVIEW_SCHEMA);
        }
        LabelingMode::Full | LabelingMode::Zone { .. } => {
            if let LabelingMode::Zone { range } = mode {
                prompt.push_str(&format!(
                    "The image is the zone {range} cropped from a larger page. Use the grid labels \
                     drawn in the image for every grid reference.\n"
                ));
            }
            prompt.push_str(
                "Label the page semantically: summary, layout regions, interactive elements, \
                 points of interest, key user flows and risks (destructive or irreversible actions).\n",
            );
            prompt.push_str(detail_rules(detail));
            prompt.push('\n');
            prompt.push_str("Respond with a single JSON object matching this schema:\n");
            prompt.push_str(FULL_SCHEMA);
        }
    }

    prompt.push_str("\nReturn JSON only. No prose, no markdown.");
    prompt
}

/// Appended on the single retry after an empty or malformed response.
pub fn strict_suffix() -> &'static str {
    "\n\nYour previous answer could not be parsed. Reply with ONE valid JSON object and nothing \
     else. Keep every string field short (a few words)."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_prompt_uses_small_schema() {
        let p = build_prompt(&LabelingMode::Overview, DetailLevel::High, CoordinateSpace::Viewport);
        assert!(p.contains("up to 6"));
        assert!(!p.contains("interactiveElements"));
    }

    #[test]
    fn detail_levels_differ() {
        let high = build_prompt(&LabelingMode::Full, DetailLevel::High, CoordinateSpace::Page);
        let extreme = build_prompt(&LabelingMode::Full, DetailLevel::Extreme, CoordinateSpace::Page);
        assert!(high.contains("at most 8 interactive"));
        assert!(extreme.contains("exhaustive"));
        assert!(high.contains("entire scrollable page"));
    }

    #[test]
    fn zone_prompt_names_range() {
        let p = build_prompt(
            &LabelingMode::Zone { range: "B2:D4".into() },
            DetailLevel::High,
            CoordinateSpace::Viewport,
        );
        assert!(p.contains("zone B2:D4"));
        assert!(p.contains("interactiveElements"));
    }

    #[test]
    fn unknown_detail_is_high() {
        assert_eq!(DetailLevel::parse_lenient("EXTREME"), DetailLevel::Extreme);
        assert_eq!(DetailLevel::parse_lenient("medium"), DetailLevel::High);
    }
}
