//! Wire contract between the parent and an isolated worker: one JSON task in,
//! one JSON object out.
use serde::{Deserialize, Serialize};

use crate::grid::compositor::LabeledImage;
use crate::grid::coordinate::GridRange;
use crate::scan::mapper::CoordinateSpace;
use crate::scan::scanner::Zone;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerTask {
    /// DevTools HTTP endpoint of the browser.
    pub endpoint: String,
    /// Tab to act on; the first open tab when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(flatten)]
    pub op: WorkerOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerOp {
    Navigate {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wait_until: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Carried untyped so unknown action kinds surface as `UnsupportedAction` in the worker.
    Execute { action: serde_json::Value },
    ScanZones {
        zones: Vec<GridRange>,
        #[serde(default)]
        coordinate_space: CoordinateSpace,
    },
    GridScreenshot {
        #[serde(default)]
        full_page: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<GridRange>,
    },
}

impl WorkerOp {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerOp::Navigate { .. } => "navigate",
            WorkerOp::Execute { .. } => "execute",
            WorkerOp::ScanZones { .. } => "scanZones",
            WorkerOp::GridScreenshot { .. } => "gridScreenshot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanZonesOutput {
    pub url: String,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridScreenshotOutput {
    pub url: String,
    pub png_base64: String,
    #[serde(flatten)]
    pub image: LabeledImage,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn task_is_flat_json_with_op_tag() {
        let task = WorkerTask {
            endpoint: "http://127.0.0.1:9222".into(),
            target_id: None,
            op: WorkerOp::GridScreenshot {
                full_page: true,
                range: Some(GridRange::new("B2", "D4")),
            },
        };
        let v = serde_json::to_value(&task).unwrap();
        assert_eq!(
            v,
            json!({
                "endpoint": "http://127.0.0.1:9222",
                "op": "gridScreenshot",
                "fullPage": true,
                "range": { "start": "B2", "end": "D4" }
            })
        );
        let back: WorkerTask = serde_json::from_value(v).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn scan_zones_defaults_to_viewport() {
        let task: WorkerTask = serde_json::from_value(json!({
            "endpoint": "9222",
            "targetId": "T1",
            "op": "scanZones",
            "zones": [ { "start": "A1", "end": "C3" } ]
        }))
        .unwrap();
        assert_eq!(task.target_id.as_deref(), Some("T1"));
        assert_eq!(task.op.name(), "scanZones");
        match task.op {
            WorkerOp::ScanZones { zones, coordinate_space } => {
                assert_eq!(zones.len(), 1);
                assert_eq!(coordinate_space, CoordinateSpace::Viewport);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn unknown_op_is_rejected() {
        let parsed = serde_json::from_value::<WorkerTask>(json!({ "endpoint": "x", "op": "reboot" }));
        assert!(parsed.is_err());
    }
}
