// Runs one worker task against the browser and returns its JSON result.
use serde_json::Value;

use crate::browser::cdp::CdpSession;
use crate::browser::devtools::DevToolsEndpoint;
use crate::browser::driver::PageDriver;
use crate::errors::{GridLensError, GridLensResult};
use crate::executor::action::Action;
use crate::executor::dispatcher;
use crate::grid::compositor::{CapturedFrame, GridCompositor};
use crate::grid::coordinate::GridRange;
use crate::scan::scanner::ZoneElementScanner;
use crate::worker::task::{GridScreenshotOutput, ScanZonesOutput, WorkerOp, WorkerTask};

/// Opens its own session, resolves the tab, runs the op. The session (not the
/// browser or the tab) is dropped when the task finishes.
pub async fn handle(task: &WorkerTask) -> GridLensResult<Value> {
    let endpoint = DevToolsEndpoint::new(&task.endpoint)?;
    let session = CdpSession::connect(&endpoint).await?;
    let page = session.page(task.target_id.as_deref()).await?;
    tracing::debug!(op = task.op.name(), target = %page.target_id(), "worker page resolved");
    run_op(&page, &task.op).await
}

pub async fn run_op(page: &dyn PageDriver, op: &WorkerOp) -> GridLensResult<Value> {
    match op {
        WorkerOp::Navigate { url, wait_until, timeout_ms } => {
            let action = Action::Navigate {
                url: url.clone(),
                wait_until: wait_until.clone(),
                timeout_ms: *timeout_ms,
            };
            Ok(serde_json::to_value(dispatcher::execute(page, &action).await?)?)
        }
        WorkerOp::Execute { action } => {
            let action = Action::from_value(action.clone())?;
            Ok(serde_json::to_value(dispatcher::execute(page, &action).await?)?)
        }
        WorkerOp::ScanZones { zones, coordinate_space } => {
            let zones = ZoneElementScanner::new()
                .scan(page, zones, *coordinate_space)
                .await?;
            let url = page.url().await?;
            Ok(serde_json::to_value(ScanZonesOutput { url, zones })?)
        }
        WorkerOp::GridScreenshot { full_page, range } => {
            let output = grid_screenshot(page, *full_page, range.clone()).await?;
            Ok(serde_json::to_value(output)?)
        }
    }
}

async fn device_pixel_ratio(page: &dyn PageDriver) -> f64 {
    match page.evaluate("window.devicePixelRatio || 1").await {
        Ok(v) => v.as_f64().filter(|r| *r > 0.0).unwrap_or(1.0),
        Err(e) => {
            tracing::debug!(error = %e, "devicePixelRatio unavailable, assuming 1");
            1.0
        }
    }
}

async fn grid_screenshot(
    page: &dyn PageDriver,
    full_page: bool,
    range: Option<GridRange>,
) -> GridLensResult<GridScreenshotOutput> {
    // Validate before capturing so a bad label fails fast.
    if let Some(r) = &range {
        r.normalize()?;
    }
    let ratio = device_pixel_ratio(page).await;
    let bytes = page.screenshot(full_page).await?;
    let url = page.url().await?;

    let started = std::time::Instant::now();
    let image = tokio::task::spawn_blocking(move || {
        let frame = CapturedFrame::from_encoded(bytes, ratio)?;
        GridCompositor::new().compose(&frame, range.as_ref())
    })
    .await
    .map_err(|e| GridLensError::Image(format!("join: {e}")))??;
    tracing::info!(
        width = image.width,
        height = image.height,
        cells = image.cell_labels.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "grid composed"
    );

    Ok(GridScreenshotOutput {
        url,
        png_base64: image.to_base64(),
        image,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use super::*;
    use crate::browser::fake::FakePage;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[tokio::test]
    async fn grid_screenshot_crops_to_range() {
        let page = FakePage::new("https://a.test/").with_screenshot(png(1000, 800));
        page.push_eval(Ok(json!(1)));
        let op = WorkerOp::GridScreenshot { full_page: false, range: Some(GridRange::new("B2", "D4")) };
        let out: GridScreenshotOutput = serde_json::from_value(run_op(&page, &op).await.unwrap()).unwrap();
        assert_eq!(out.url, "https://a.test/");
        assert_eq!(out.image.content_width, 300);
        assert_eq!(out.image.content_height, 300);
        assert_eq!(out.image.cell_labels.first().map(String::as_str), Some("B2"));
        assert_eq!(out.image.cell_labels.last().map(String::as_str), Some("D4"));
        assert!(!out.png_base64.is_empty());
        assert_eq!(page.count("screenshot:false"), 1);
    }

    #[tokio::test]
    async fn bad_range_fails_before_capture() {
        let page = FakePage::new("https://a.test/").with_screenshot(png(100, 100));
        let op = WorkerOp::GridScreenshot { full_page: false, range: Some(GridRange::new("B0", "C3")) };
        let err = run_op(&page, &op).await.unwrap_err();
        assert!(matches!(err, GridLensError::InvalidCoordinate(_)));
        assert_eq!(page.count("screenshot:"), 0);
    }

    #[tokio::test]
    async fn execute_rejects_unknown_action() {
        let page = FakePage::new("https://a.test/");
        let op = WorkerOp::Execute { action: json!({ "type": "hover", "selector": "#x" }) };
        let err = run_op(&page, &op).await.unwrap_err();
        assert!(matches!(err, GridLensError::UnsupportedAction(_)));
    }

    #[tokio::test]
    async fn navigate_reports_new_url() {
        let page = FakePage::new("about:blank");
        let op = WorkerOp::Navigate { url: "https://b.test/".into(), wait_until: Some("load".into()), timeout_ms: Some(5000) };
        let out = run_op(&page, &op).await.unwrap();
        assert_eq!(out, json!({ "action": "navigate", "url": "https://b.test/" }));
        assert_eq!(page.calls(), vec!["goto:https://b.test/:load:5000"]);
    }
}
