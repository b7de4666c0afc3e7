//! Labeling results and the normalization pass applied to raw model JSON.
//!
//! Model output is never trusted: every field is read leniently, missing strings become
//! explicit placeholders, missing arrays become empty and confidence is clamped to [0, 1].
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scan::mapper::CoordinateSpace;

pub const UNKNOWN: &str = "unknown";
pub const NO_SUMMARY: &str = "No summary provided";
pub const MAX_OVERVIEW_REGIONS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Importance {
    fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("critical") => Importance::Critical,
            Some("high") => Importance::High,
            Some("low") => Importance::Low,
            _ => Importance::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabeledRegion {
    pub name: String,
    pub purpose: String,
    /// Grid reference such as "A1:D3".
    pub grid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabeledElement {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub element_type: String,
    pub role: String,
    pub grid: String,
    pub actionability: String,
    pub likely_actions: Vec<String>,
    pub importance: Importance,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointOfInterest {
    pub label: String,
    pub grid: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFlow {
    pub name: String,
    pub steps: Vec<String>,
}

/// Full or zone labeling of a captured frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiLabelsResult {
    pub model: String,
    pub coordinate_space: CoordinateSpace,
    /// Range label when only a zone was analyzed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub page_summary: String,
    pub regions: Vec<LabeledRegion>,
    pub interactive_elements: Vec<LabeledElement>,
    pub points_of_interest: Vec<PointOfInterest>,
    pub key_flows: Vec<KeyFlow>,
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiOverviewResult {
    pub model: String,
    pub coordinate_space: CoordinateSpace,
    pub page_summary: String,
    pub regions: Vec<LabeledRegion>,
}

fn text(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_or(v: &Value, keys: &[&str], fallback: &str) -> String {
    keys.iter()
        .find_map(|k| text(v, k))
        .unwrap_or_else(|| fallback.to_string())
}

fn items<'a>(v: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn strings(v: &Value, keys: &[&str]) -> Vec<String> {
    items(v, keys)
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Numbers and numeric strings are accepted; anything else (or NaN) is 0.
pub fn clamp_confidence(v: Option<&Value>) -> f64 {
    let raw = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

fn region(v: &Value, index: usize) -> LabeledRegion {
    LabeledRegion {
        name: text_or(v, &["name", "label"], &format!("region-{}", index + 1)),
        purpose: text_or(v, &["purpose", "description"], UNKNOWN),
        grid: text_or(v, &["grid", "gridRange", "range"], UNKNOWN),
    }
}

fn element(v: &Value, index: usize) -> LabeledElement {
    LabeledElement {
        id: text_or(v, &["id"], &format!("element-{}", index + 1)),
        text: text_or(v, &["text", "label"], UNKNOWN),
        element_type: text_or(v, &["type", "elementType"], UNKNOWN),
        role: text_or(v, &["role"], UNKNOWN),
        grid: text_or(v, &["grid", "gridRef", "cell"], UNKNOWN),
        actionability: text_or(v, &["actionability"], UNKNOWN),
        likely_actions: strings(v, &["likelyActions", "likely_actions"]),
        importance: Importance::parse_lenient(v.get("importance").and_then(Value::as_str)),
        confidence: clamp_confidence(v.get("confidence")),
    }
}

fn point(v: &Value, index: usize) -> PointOfInterest {
    PointOfInterest {
        label: text_or(v, &["label", "name"], &format!("point-{}", index + 1)),
        grid: text_or(v, &["grid", "cell"], UNKNOWN),
        reason: text_or(v, &["reason", "description"], UNKNOWN),
    }
}

fn flow(v: &Value, index: usize) -> KeyFlow {
    KeyFlow {
        name: text_or(v, &["name"], &format!("flow-{}", index + 1)),
        steps: strings(v, &["steps"]),
    }
}

fn summary(raw: &Value) -> String {
    text_or(raw, &["pageSummary", "page_summary", "summary"], NO_SUMMARY)
}

pub fn normalize_labels(
    raw: &Value,
    model: &str,
    coordinate_space: CoordinateSpace,
    zone: Option<String>,
) -> UiLabelsResult {
    let regions = items(raw, &["regions", "layoutRegions"]);
    let elements = items(raw, &["interactiveElements", "interactive_elements", "elements"]);
    let points = items(raw, &["pointsOfInterest", "points_of_interest"]);
    let flows = items(raw, &["keyFlows", "key_flows"]);
    UiLabelsResult {
        model: model.to_string(),
        coordinate_space,
        zone,
        page_summary: summary(raw),
        regions: regions.iter().enumerate().map(|(i, r)| region(r, i)).collect(),
        interactive_elements: elements.iter().enumerate().map(|(i, e)| element(e, i)).collect(),
        points_of_interest: points.iter().enumerate().map(|(i, p)| point(p, i)).collect(),
        key_flows: flows.iter().enumerate().map(|(i, f)| flow(f, i)).collect(),
        risks: strings(raw, &["risks"]),
    }
}

pub fn normalize_overview(raw: &Value, model: &str, coordinate_space: CoordinateSpace) -> UiOverviewResult {
    UiOverviewResult {
        model: model.to_string(),
        coordinate_space,
        page_summary: summary(raw),
        regions: items(raw, &["regions"])
            .iter()
            .take(MAX_OVERVIEW_REGIONS)
            .enumerate()
            .map(|(i, r)| region(r, i))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_fields_get_placeholders() {
        let raw = json!({ "interactiveElements": [ { "text": "Buy now", "confidence": "0.7" }, {} ] });
        let labels = normalize_labels(&raw, "m1", CoordinateSpace::Viewport, None);
        assert_eq!(labels.page_summary, NO_SUMMARY);
        assert!(labels.regions.is_empty());
        assert!(labels.risks.is_empty());
        assert_eq!(labels.interactive_elements.len(), 2);

        let first = &labels.interactive_elements[0];
        assert_eq!(first.id, "element-1");
        assert_eq!(first.text, "Buy now");
        assert_eq!(first.role, UNKNOWN);
        assert_eq!(first.importance, Importance::Medium);
        assert!((first.confidence - 0.7).abs() < 1e-9);

        let second = &labels.interactive_elements[1];
        assert_eq!(second.id, "element-2");
        assert_eq!(second.confidence, 0.0);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(clamp_confidence(Some(&json!(3.5))), 1.0);
        assert_eq!(clamp_confidence(Some(&json!(-2))), 0.0);
        assert_eq!(clamp_confidence(Some(&json!("high"))), 0.0);
        assert_eq!(clamp_confidence(None), 0.0);
    }

    #[test]
    fn overview_keeps_at_most_six_regions() {
        let regions: Vec<_> = (0..9).map(|i| json!({ "name": format!("r{i}"), "grid": "A1:B2" })).collect();
        let raw = json!({ "pageSummary": "Shop", "regions": regions });
        let overview = normalize_overview(&raw, "m", CoordinateSpace::Page);
        assert_eq!(overview.regions.len(), MAX_OVERVIEW_REGIONS);
        assert_eq!(overview.regions[5].name, "r5");
        assert_eq!(overview.page_summary, "Shop");
        assert_eq!(overview.coordinate_space, CoordinateSpace::Page);
    }

    #[test]
    fn importance_parses_leniently() {
        let raw = json!({ "interactiveElements": [ { "importance": " CRITICAL " }, { "importance": "meh" } ] });
        let labels = normalize_labels(&raw, "m", CoordinateSpace::Viewport, Some("B2:D4".into()));
        assert_eq!(labels.interactive_elements[0].importance, Importance::Critical);
        assert_eq!(labels.interactive_elements[1].importance, Importance::Medium);
        assert_eq!(labels.zone.as_deref(), Some("B2:D4"));
    }
}
