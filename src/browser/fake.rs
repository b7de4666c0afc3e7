//! In-memory `PageDriver` for unit tests.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::driver::{LoadState, NavigationMarker, PageDriver, UrlPredicate};
use crate::errors::{GridLensError, GridLensResult};

#[derive(Default)]
pub struct FakePage {
    calls: Mutex<Vec<String>>,
    eval_results: Mutex<VecDeque<GridLensResult<Value>>>,
    url: Mutex<String>,
    /// URL the page lands on after a click or script evaluation.
    navigates_to: Option<String>,
    present_selectors: Vec<String>,
    screenshot_png: Vec<u8>,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        Self {
            url: Mutex::new(url.to_string()),
            ..Self::default()
        }
    }

    pub fn navigating_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.to_string());
        self
    }

    pub fn with_selectors(mut self, selectors: &[&str]) -> Self {
        self.present_selectors = selectors.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot_png = png;
        self
    }

    pub fn push_eval(&self, result: GridLensResult<Value>) {
        self.eval_results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn land(&self) {
        if let Some(target) = &self.navigates_to {
            *self.url.lock().unwrap() = target.clone();
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn evaluate(&self, script: &str) -> GridLensResult<Value> {
        self.record(format!("evaluate:{script}"));
        let result = self.eval_results.lock().unwrap().pop_front();
        self.land();
        result.unwrap_or(Ok(Value::Null))
    }

    async fn screenshot(&self, full_page: bool) -> GridLensResult<Vec<u8>> {
        self.record(format!("screenshot:{full_page}"));
        Ok(self.screenshot_png.clone())
    }

    async fn url(&self) -> GridLensResult<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn click(&self, selector: &str) -> GridLensResult<()> {
        self.record(format!("click:{selector}"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.land();
        Ok(())
    }

    async fn clear(&self, selector: &str) -> GridLensResult<()> {
        self.record(format!("clear:{selector}"));
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> GridLensResult<()> {
        self.record(format!("type:{selector}:{text}"));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> GridLensResult<()> {
        self.record(format!("select:{selector}:{value}"));
        Ok(())
    }

    async fn goto(&self, url: &str, state: LoadState, timeout: Duration) -> GridLensResult<()> {
        self.record(format!("goto:{url}:{}:{}", state.as_str(), timeout.as_millis()));
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, _timeout: Duration) -> GridLensResult<()> {
        self.record(format!("load_state:{}", state.as_str()));
        Ok(())
    }

    async fn navigation_marker(&self) -> GridLensResult<NavigationMarker> {
        self.record("marker".to_string());
        Ok(NavigationMarker {
            time_origin: "0".to_string(),
            url: self.url.lock().unwrap().clone(),
        })
    }

    async fn wait_for_navigation(
        &self,
        since: &NavigationMarker,
        predicate: &UrlPredicate,
        timeout: Duration,
    ) -> GridLensResult<()> {
        self.record("wait_navigation".to_string());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let current = self.url.lock().unwrap().clone();
            if since.has_moved("0", &current) && predicate.matches(&current) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(GridLensError::NavigationTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> GridLensResult<()> {
        self.record(format!("wait_selector:{selector}"));
        if self.present_selectors.iter().any(|s| s == selector) {
            Ok(())
        } else {
            Err(GridLensError::WaitTimeout {
                what: format!("selector '{selector}'"),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn wait_for_url(&self, predicate: &UrlPredicate, timeout: Duration) -> GridLensResult<()> {
        self.record(format!("wait_url:{predicate}"));
        if predicate.matches(&self.url.lock().unwrap()) {
            Ok(())
        } else {
            Err(GridLensError::WaitTimeout {
                what: predicate.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}
