//! Public operations: session, tabs, grid screenshots, zone scans, actions, labeling.
//!
//! Browser work goes through a `TaskRunner`, so each call runs in its own isolated,
//! time-bounded worker. Labeling calls the vision model from this process.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde::Serialize;

use crate::browser::devtools::{DevToolsEndpoint, TabInfo, VersionInfo};
use crate::config::AppConfig;
use crate::errors::{GridLensError, GridLensResult};
use crate::executor::action::Action;
use crate::executor::dispatcher::ActionOutcome;
use crate::grid::compositor::LabeledImage;
use crate::grid::coordinate::GridRange;
use crate::llm::labeling::LabelingProtocol;
use crate::llm::labels::{UiLabelsResult, UiOverviewResult};
use crate::llm::matcher::{find_best_match, ElementMatch};
use crate::llm::prompt::{DetailLevel, LabelingMode};
use crate::llm::provider::VisionProvider;
use crate::llm::providers::OpenAiCompatibleProvider;
use crate::scan::mapper::CoordinateSpace;
use crate::scan::scanner::Zone;
use crate::worker::runner::{InProcessRunner, ProcessRunner, TaskRunner};
use crate::worker::task::{GridScreenshotOutput, ScanZonesOutput, WorkerOp, WorkerTask};

/// How a grid screenshot is handed back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScreenshotOutput {
    #[default]
    Bytes,
    Base64,
    /// Save as PNG; `None` picks a fresh name in the configured screenshot directory.
    File(Option<PathBuf>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenshotPayload {
    Bytes(Vec<u8>),
    Base64(String),
    Path(PathBuf),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridScreenshot {
    pub url: String,
    #[serde(skip)]
    pub payload: ScreenshotPayload,
    #[serde(flatten)]
    pub image: LabeledImage,
}

pub struct GridLens {
    config: AppConfig,
    endpoint: DevToolsEndpoint,
    runner: Arc<dyn TaskRunner>,
    vision: Option<Arc<dyn VisionProvider>>,
}

impl GridLens {
    /// Worker isolation and the vision provider follow `config`; labeling is
    /// unavailable until an API key is configured.
    ///
    /// Out-of-process tasks re-invoke the current executable as `worker '<json>'`.
    /// Binaries other than `gridlens` must either handle that subcommand (see
    /// [`ProcessRunner::with_leading_args`] and [`crate::worker::handler::handle`]) or
    /// set `worker.in_process`.
    pub fn new(config: AppConfig) -> GridLensResult<Self> {
        let timeout = Duration::from_secs(config.worker.timeout_secs);
        let runner: Arc<dyn TaskRunner> = if config.worker.in_process {
            Arc::new(InProcessRunner::new(timeout))
        } else {
            Arc::new(ProcessRunner::current_exe(timeout)?)
        };
        let vision: Option<Arc<dyn VisionProvider>> =
            match OpenAiCompatibleProvider::from_config(&config.vision) {
                Ok(p) => Some(Arc::new(p)),
                Err(e) => {
                    tracing::debug!(error = %e, "vision provider not configured");
                    None
                }
            };
        Self::with_parts(config, runner, vision)
    }

    pub fn with_parts(
        config: AppConfig,
        runner: Arc<dyn TaskRunner>,
        vision: Option<Arc<dyn VisionProvider>>,
    ) -> GridLensResult<Self> {
        let endpoint = DevToolsEndpoint::new(&config.browser.endpoint)?;
        Ok(Self { config, endpoint, runner, vision })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn task(&self, target_id: Option<&str>, op: WorkerOp) -> WorkerTask {
        WorkerTask {
            endpoint: self.endpoint.base().to_string(),
            target_id: target_id.map(str::to_string),
            op,
        }
    }

    async fn run(&self, target_id: Option<&str>, op: WorkerOp) -> GridLensResult<serde_json::Value> {
        let task = self.task(target_id, op);
        tracing::info!(op = task.op.name(), target = ?target_id, "dispatching worker task");
        self.runner.run(&task).await
    }

    /// Waits for the DevTools endpoint to answer.
    pub async fn ensure_session(&self) -> GridLensResult<VersionInfo> {
        let budget = Duration::from_secs(self.config.browser.connect_timeout_secs);
        self.endpoint.wait_until_reachable(budget).await
    }

    pub async fn open_url(&self, url: &str) -> GridLensResult<TabInfo> {
        self.ensure_session().await?;
        self.endpoint.new_tab(url).await
    }

    pub async fn list_tabs(&self) -> GridLensResult<Vec<TabInfo>> {
        self.ensure_session().await?;
        self.endpoint.list_tabs().await
    }

    pub async fn grid_screenshot(
        &self,
        target_id: Option<&str>,
        full_page: bool,
        range: Option<&GridRange>,
        output: ScreenshotOutput,
    ) -> GridLensResult<GridScreenshot> {
        if let Some(r) = range {
            r.normalize()?;
        }
        let op = WorkerOp::GridScreenshot { full_page, range: range.cloned() };
        let raw: GridScreenshotOutput = serde_json::from_value(self.run(target_id, op).await?)?;
        let png = base64::engine::general_purpose::STANDARD
            .decode(raw.png_base64.as_bytes())
            .map_err(|e| GridLensError::Image(format!("worker returned bad base64: {e}")))?;

        let payload = match output {
            ScreenshotOutput::Bytes => ScreenshotPayload::Bytes(png.clone()),
            ScreenshotOutput::Base64 => ScreenshotPayload::Base64(raw.png_base64.clone()),
            ScreenshotOutput::File(path) => {
                let path = match path {
                    Some(p) => p,
                    None => self.config.output.resolved_screenshot_dir().join(default_file_name()),
                };
                save_png(&path, &png).await?;
                ScreenshotPayload::Path(path)
            }
        };

        let mut image = raw.image;
        image.png = png;
        Ok(GridScreenshot { url: raw.url, payload, image })
    }

    pub async fn scan_zones(
        &self,
        target_id: Option<&str>,
        zones: &[GridRange],
        space: CoordinateSpace,
    ) -> GridLensResult<Vec<Zone>> {
        for z in zones {
            z.normalize()?;
        }
        let op = WorkerOp::ScanZones { zones: zones.to_vec(), coordinate_space: space };
        let out: ScanZonesOutput = serde_json::from_value(self.run(target_id, op).await?)?;
        Ok(out.zones)
    }

    /// Unknown action kinds are rejected here, before a worker is spawned.
    pub async fn execute(&self, target_id: Option<&str>, action: serde_json::Value) -> GridLensResult<ActionOutcome> {
        Action::from_value(action.clone())?;
        let value = self.run(target_id, WorkerOp::Execute { action }).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn navigate(
        &self,
        target_id: Option<&str>,
        url: &str,
        wait_until: Option<&str>,
        timeout_ms: Option<u64>,
    ) -> GridLensResult<ActionOutcome> {
        let op = WorkerOp::Navigate {
            url: url.to_string(),
            wait_until: wait_until.map(str::to_string),
            timeout_ms,
        };
        Ok(serde_json::from_value(self.run(target_id, op).await?)?)
    }

    fn labeling(&self) -> GridLensResult<LabelingProtocol> {
        let provider = self.vision.clone().ok_or_else(|| {
            GridLensError::Config("vision model not configured; set GRIDLENS_VISION_API_KEY".into())
        })?;
        Ok(LabelingProtocol::new(provider, &self.config.vision))
    }

    async fn gridded_base64(
        &self,
        target_id: Option<&str>,
        space: CoordinateSpace,
        range: Option<&GridRange>,
    ) -> GridLensResult<String> {
        let shot = self
            .grid_screenshot(target_id, space.is_full_page(), range, ScreenshotOutput::Base64)
            .await?;
        match shot.payload {
            ScreenshotPayload::Base64(b64) => Ok(b64),
            _ => Ok(shot.image.to_base64()),
        }
    }

    pub async fn label_full(
        &self,
        target_id: Option<&str>,
        detail: DetailLevel,
        space: CoordinateSpace,
    ) -> GridLensResult<UiLabelsResult> {
        let protocol = self.labeling()?;
        let image = self.gridded_base64(target_id, space, None).await?;
        protocol.label(&LabelingMode::Full, detail, space, &image).await
    }

    pub async fn label_overview(
        &self,
        target_id: Option<&str>,
        space: CoordinateSpace,
    ) -> GridLensResult<UiOverviewResult> {
        let protocol = self.labeling()?;
        let image = self.gridded_base64(target_id, space, None).await?;
        protocol.overview(space, &image).await
    }

    /// The frame is cropped to `range` first, so the model sees the zone's own labels.
    pub async fn label_zone(
        &self,
        target_id: Option<&str>,
        range: &GridRange,
        detail: DetailLevel,
        space: CoordinateSpace,
    ) -> GridLensResult<UiLabelsResult> {
        let protocol = self.labeling()?;
        let image = self.gridded_base64(target_id, space, Some(range)).await?;
        let mode = LabelingMode::Zone { range: range.to_string() };
        protocol.label(&mode, detail, space, &image).await
    }

    /// Labels the page, then resolves `query` to one interactive element.
    pub async fn find_element(
        &self,
        target_id: Option<&str>,
        query: &str,
        detail: DetailLevel,
        space: CoordinateSpace,
    ) -> GridLensResult<ElementMatch> {
        let labels = self.label_full(target_id, detail, space).await?;
        find_best_match(query, &labels.interactive_elements)
    }
}

fn default_file_name() -> String {
    format!(
        "grid-{}-{}.png",
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        uuid::Uuid::new_v4()
    )
}

async fn save_png(path: &std::path::Path, png: &[u8]) -> GridLensResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, png).await?;
    tracing::info!(path = %path.display(), bytes = png.len(), "grid screenshot saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::grid::compositor::{CapturedFrame, GridCompositor};
    use crate::llm::labeling::tests::ScriptedProvider;

    /// Returns canned worker results and records the tasks it was given.
    struct ScriptedRunner {
        results: Mutex<VecDeque<GridLensResult<Value>>>,
        tasks: Mutex<Vec<WorkerTask>>,
    }

    impl ScriptedRunner {
        fn new(results: Vec<GridLensResult<Value>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                tasks: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TaskRunner for ScriptedRunner {
        async fn run(&self, task: &WorkerTask) -> GridLensResult<Value> {
            self.tasks.lock().unwrap().push(task.clone());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GridLensError::WorkerFailed { op: task.op.name().into(), code: Some(1), stderr: "no result".into() }))
        }
    }

    fn screenshot_result(range: Option<&GridRange>) -> Value {
        let img = image::RgbaImage::from_pixel(1000, 800, image::Rgba([240, 240, 240, 255]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let frame = CapturedFrame::from_encoded(png, 1.0).unwrap();
        let image = GridCompositor::new().compose(&frame, range).unwrap();
        serde_json::to_value(GridScreenshotOutput {
            url: "https://shop.test/".into(),
            png_base64: image.to_base64(),
            image,
        })
        .unwrap()
    }

    fn lens(runner: Arc<ScriptedRunner>, vision: Option<Arc<dyn VisionProvider>>) -> GridLens {
        GridLens::with_parts(AppConfig::default(), runner, vision).unwrap()
    }

    #[tokio::test]
    async fn screenshot_to_file_uses_generated_name() {
        let dir = std::env::temp_dir().join(format!("gridlens-test-{}", uuid::Uuid::new_v4()));
        let mut config = AppConfig::default();
        config.output.screenshot_dir = Some(dir.clone());
        let runner = ScriptedRunner::new(vec![Ok(screenshot_result(None))]);
        let lens = GridLens::with_parts(config, runner, None).unwrap();

        let shot = lens
            .grid_screenshot(None, false, None, ScreenshotOutput::File(None))
            .await
            .unwrap();
        let ScreenshotPayload::Path(path) = &shot.payload else {
            panic!("expected a path payload");
        };
        assert!(path.starts_with(&dir));
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("grid-") && name.ends_with(".png"));
        assert_eq!(std::fs::read(path).unwrap(), shot.image.png);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn cropped_screenshot_reports_offset() {
        let range = GridRange::new("D4", "B2");
        let runner = ScriptedRunner::new(vec![Ok(screenshot_result(Some(&range)))]);
        let lens = lens(runner.clone(), None);
        let shot = lens
            .grid_screenshot(Some("T1"), false, Some(&range), ScreenshotOutput::Bytes)
            .await
            .unwrap();
        assert_eq!(shot.image.offset.column, 1);
        assert_eq!(shot.image.offset.row, 1);
        assert_eq!(shot.image.content_width, 300);
        assert!(matches!(shot.payload, ScreenshotPayload::Bytes(ref b) if !b.is_empty()));

        let tasks = runner.tasks.lock().unwrap();
        assert_eq!(tasks[0].target_id.as_deref(), Some("T1"));
        assert_eq!(tasks[0].op.name(), "gridScreenshot");
    }

    #[tokio::test]
    async fn invalid_range_never_reaches_worker() {
        let runner = ScriptedRunner::new(vec![]);
        let lens = lens(runner.clone(), None);
        let err = lens
            .scan_zones(None, &[GridRange::new("1A", "B2")], CoordinateSpace::Viewport)
            .await
            .unwrap_err();
        assert!(matches!(err, GridLensError::InvalidCoordinate(_)));
        assert!(runner.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_action_never_reaches_worker() {
        let runner = ScriptedRunner::new(vec![]);
        let lens = lens(runner.clone(), None);
        let err = lens.execute(None, json!({ "type": "drag" })).await.unwrap_err();
        assert!(matches!(err, GridLensError::UnsupportedAction(_)));
        assert!(runner.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn worker_errors_propagate() {
        let runner = ScriptedRunner::new(vec![Err(GridLensError::WorkerTimeout { op: "execute".into(), timeout_ms: 120_000 })]);
        let lens = lens(runner, None);
        let err = lens
            .execute(None, json!({ "type": "click", "selector": "#buy" }))
            .await
            .unwrap_err();
        assert!(matches!(err, GridLensError::WorkerTimeout { .. }));
    }

    #[tokio::test]
    async fn labeling_requires_vision_config() {
        let lens = lens(ScriptedRunner::new(vec![]), None);
        let err = lens
            .label_overview(None, CoordinateSpace::Viewport)
            .await
            .unwrap_err();
        assert!(matches!(err, GridLensError::Config(_)));
    }

    #[tokio::test]
    async fn find_element_labels_then_matches() {
        let runner = ScriptedRunner::new(vec![Ok(screenshot_result(None))]);
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::content(
            r#"{"pageSummary":"Cart","interactiveElements":[
                {"id":"continue-shopping","text":"Continue shopping","type":"link","grid":"B7"},
                {"id":"checkout","text":"Checkout","type":"button","grid":"H7","importance":"critical"}
            ]}"#,
        )]));
        let lens = lens(runner, Some(provider.clone() as Arc<dyn VisionProvider>));
        let found = lens
            .find_element(None, "checkout", DetailLevel::High, CoordinateSpace::Viewport)
            .await
            .unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.element.grid, "H7");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].image_base64.is_empty());
    }

    #[tokio::test]
    async fn zone_labeling_crops_and_tags_zone() {
        let range = GridRange::new("B2", "D4");
        let runner = ScriptedRunner::new(vec![Ok(screenshot_result(Some(&range)))]);
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::content(r#"{"pageSummary":"Login form"}"#)]));
        let lens = lens(runner.clone(), Some(provider.clone() as Arc<dyn VisionProvider>));
        let labels = lens
            .label_zone(None, &range, DetailLevel::Extreme, CoordinateSpace::Viewport)
            .await
            .unwrap();
        assert_eq!(labels.zone.as_deref(), Some("B2:D4"));
        assert_eq!(labels.page_summary, "Login form");
        assert!(provider.requests.lock().unwrap()[0].prompt.contains("zone B2:D4"));
        let tasks = runner.tasks.lock().unwrap();
        match &tasks[0].op {
            WorkerOp::GridScreenshot { range: Some(r), .. } => assert_eq!(r, &range),
            other => panic!("unexpected op {other:?}"),
        }
    }
}
