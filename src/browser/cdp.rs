//! `PageDriver` backed by a chromiumoxide connection to an already running browser.
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, NavigateParams};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::Handler;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::browser::devtools::DevToolsEndpoint;
use crate::browser::driver::{js_string, LoadState, NavigationMarker, PageDriver, UrlPredicate};
use crate::errors::{GridLensError, GridLensResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const ATTACH_ATTEMPTS: usize = 5;

/// Chrome's generic "server error" code; used for destroyed contexts and detached frames.
const CHROME_SERVER_ERROR: i64 = -32000;

/// Library failures that mean the page moved underneath us map to `PageContextLost`.
fn classify(err: CdpError) -> GridLensError {
    match &err {
        CdpError::Chrome(e) if e.code == CHROME_SERVER_ERROR => {
            GridLensError::PageContextLost(e.message.clone())
        }
        CdpError::FrameNotFound(_) | CdpError::NoResponse | CdpError::Timeout => {
            GridLensError::PageContextLost(err.to_string())
        }
        _ => GridLensError::Browser(err.to_string()),
    }
}

async fn handler_loop(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        if let Err(e) = event {
            tracing::debug!(error = %e, "cdp handler stopped");
            break;
        }
    }
}

/// One websocket connection to the browser. Owned by a single operation.
pub struct CdpSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl CdpSession {
    pub async fn connect(endpoint: &DevToolsEndpoint) -> GridLensResult<Self> {
        let version = endpoint.version().await?;
        let (mut browser, handler) = Browser::connect(version.web_socket_debugger_url.clone())
            .await
            .map_err(|e| GridLensError::Browser(format!("connect {}: {e}", endpoint.base())))?;
        let handler = tokio::spawn(handler_loop(handler));

        // Makes tabs opened before this connection visible to `pages()`.
        if let Err(e) = browser.fetch_targets().await {
            tracing::debug!(error = %e, "fetch_targets failed");
        }
        tracing::debug!(endpoint = endpoint.base(), browser = %version.browser, "cdp session open");
        Ok(Self { browser, handler })
    }

    /// The tab with `target_id`, else the first open tab, else a fresh blank tab.
    pub async fn page(&self, target_id: Option<&str>) -> GridLensResult<CdpPage> {
        for attempt in 0..ATTACH_ATTEMPTS {
            let pages = self.browser.pages().await.map_err(classify)?;
            let found = match target_id {
                Some(id) => pages.into_iter().find(|p| p.target_id().inner().as_str() == id),
                None => pages.into_iter().next(),
            };
            if let Some(page) = found {
                return Ok(CdpPage::new(page));
            }
            if attempt + 1 < ATTACH_ATTEMPTS {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }

        match target_id {
            Some(id) => Err(GridLensError::InvalidArgument(format!("no open tab with id {id}"))),
            None => {
                tracing::info!("no open tab, creating one");
                let page = self.browser.new_page("about:blank").await.map_err(classify)?;
                Ok(CdpPage::new(page))
            }
        }
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn target_id(&self) -> String {
        self.page.target_id().inner().clone()
    }

    async fn ready_state(&self) -> GridLensResult<String> {
        let value = self.evaluate("document.readyState").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn resource_count(&self) -> GridLensResult<u64> {
        let value = self
            .evaluate("performance.getEntriesByType('resource').length")
            .await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    async fn state_reached(&self, state: LoadState) -> GridLensResult<bool> {
        let ready = self.ready_state().await?;
        Ok(match state {
            LoadState::DomContentLoaded => ready == "interactive" || ready == "complete",
            LoadState::Load | LoadState::NetworkIdle => ready == "complete",
        })
    }

    /// Resource count unchanged for `NETWORK_QUIET`.
    async fn network_quiet(&self, deadline: Instant) -> GridLensResult<bool> {
        let mut last = self.resource_count().await?;
        let mut quiet_since = Instant::now();
        while Instant::now() < deadline {
            tokio::time::sleep(POLL_INTERVAL).await;
            let count = self.resource_count().await?;
            if count != last {
                last = count;
                quiet_since = Instant::now();
            } else if quiet_since.elapsed() >= NETWORK_QUIET {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn require_element(&self, selector: &str) -> GridLensResult<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             el.scrollIntoView({{block: 'center', inline: 'center'}}); return true; }})()",
            js_string(selector)
        );
        match self.evaluate(&script).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(GridLensError::ElementNotFound(selector.to_string())),
        }
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn evaluate(&self, script: &str) -> GridLensResult<Value> {
        let result = self.page.evaluate(script.to_string()).await.map_err(classify)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn screenshot(&self, full_page: bool) -> GridLensResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        self.page.screenshot(params).await.map_err(classify)
    }

    async fn url(&self) -> GridLensResult<String> {
        Ok(self.page.url().await.map_err(classify)?.unwrap_or_default())
    }

    async fn click(&self, selector: &str) -> GridLensResult<()> {
        self.require_element(selector).await?;
        let element = self.page.find_element(selector).await.map_err(classify)?;
        element.click().await.map_err(classify)?;
        Ok(())
    }

    async fn clear(&self, selector: &str) -> GridLensResult<()> {
        let script = format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return false;
  el.focus();
  if (el.isContentEditable) {{ el.textContent = ""; }} else {{ el.value = ""; }}
  el.dispatchEvent(new Event("input", {{ bubbles: true }}));
  return true;
}})()"#,
            sel = js_string(selector)
        );
        match self.evaluate(&script).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(GridLensError::ElementNotFound(selector.to_string())),
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> GridLensResult<()> {
        self.require_element(selector).await?;
        let element = self.page.find_element(selector).await.map_err(classify)?;
        element.focus().await.map_err(classify)?;
        element.type_str(text).await.map_err(classify)?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> GridLensResult<()> {
        let script = format!(
            r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return "missing";
  const want = {val};
  const opt = Array.from(el.options || []).find(o => o.value === want || o.label === want || o.text.trim() === want);
  if (!opt) return "no-option";
  el.value = opt.value;
  el.dispatchEvent(new Event("input", {{ bubbles: true }}));
  el.dispatchEvent(new Event("change", {{ bubbles: true }}));
  return "selected";
}})()"#,
            sel = js_string(selector),
            val = js_string(value)
        );
        match self.evaluate(&script).await?.as_str() {
            Some("selected") => Ok(()),
            Some("no-option") => Err(GridLensError::InvalidArgument(format!(
                "'{selector}' has no option '{value}'"
            ))),
            _ => Err(GridLensError::ElementNotFound(selector.to_string())),
        }
    }

    async fn goto(&self, url: &str, state: LoadState, timeout: Duration) -> GridLensResult<()> {
        let marker = self.navigation_marker().await?;
        self.page
            .execute(NavigateParams::new(url))
            .await
            .map_err(classify)?;
        let started = Instant::now();
        self.wait_for_navigation(&marker, &UrlPredicate::Any, timeout)
            .await?;
        let remaining = timeout.saturating_sub(started.elapsed());
        self.wait_for_load_state(state, remaining)
            .await
            .map_err(|e| match e {
                GridLensError::WaitTimeout { .. } => GridLensError::NavigationTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                },
                other => other,
            })
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> GridLensResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            // A navigation in flight tears down the context; keep polling.
            match self.state_reached(state).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(GridLensError::WaitTimeout {
                    what: format!("load state {}", state.as_str()),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        if state == LoadState::NetworkIdle && !self.network_quiet(deadline).await? {
            return Err(GridLensError::WaitTimeout {
                what: "network idle".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn navigation_marker(&self) -> GridLensResult<NavigationMarker> {
        let value = self
            .evaluate("JSON.stringify([String(performance.timeOrigin), location.href])")
            .await?;
        let (time_origin, url): (String, String) =
            serde_json::from_str(value.as_str().unwrap_or("[\"\",\"\"]"))?;
        Ok(NavigationMarker { time_origin, url })
    }

    async fn wait_for_navigation(
        &self,
        since: &NavigationMarker,
        predicate: &UrlPredicate,
        timeout: Duration,
    ) -> GridLensResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.navigation_marker().await {
                Ok(now) => {
                    if since.has_moved(&now.time_origin, &now.url)
                        && predicate.matches(&now.url)
                        && self.state_reached(LoadState::DomContentLoaded).await.unwrap_or(false)
                    {
                        tracing::debug!(from = %since.url, to = %now.url, "navigation observed");
                        return Ok(());
                    }
                }
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(GridLensError::NavigationTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> GridLensResult<()> {
        let script = format!("document.querySelector({}) !== null", js_string(selector));
        let deadline = Instant::now() + timeout;
        loop {
            match self.evaluate(&script).await {
                Ok(v) if v.as_bool() == Some(true) => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(GridLensError::WaitTimeout {
                    what: format!("selector '{selector}'"),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_url(&self, predicate: &UrlPredicate, timeout: Duration) -> GridLensResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.url().await {
                Ok(url) if predicate.matches(&url) => return Ok(()),
                Ok(_) => {}
                Err(e) if e.is_transient() => {}
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(GridLensError::WaitTimeout {
                    what: predicate.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroyed_context_is_transient() {
        let err = classify(CdpError::NoResponse);
        assert!(err.is_transient());
        let err = classify(CdpError::Timeout);
        assert!(err.is_transient());
    }

    #[test]
    fn other_failures_are_browser_errors() {
        let err = classify(CdpError::ChromeMessage("boom".into()));
        assert!(matches!(err, GridLensError::Browser(_)));
        assert!(!err.is_transient());
    }
}
