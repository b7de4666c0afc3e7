use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{GridLensError, GridLensResult};

/// How far a page load must progress before a wait returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    /// `DOMContentLoaded` fired (`document.readyState` is at least "interactive").
    #[default]
    DomContentLoaded,
    /// `load` fired (`document.readyState == "complete"`).
    Load,
    /// Loaded and no new network resources for a quiet period.
    NetworkIdle,
}

impl LoadState {
    /// Unknown values fall back to `DomContentLoaded`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "load" => LoadState::Load,
            "networkidle" | "network_idle" | "network-idle" => LoadState::NetworkIdle,
            "domcontentloaded" | "dom_content_loaded" => LoadState::DomContentLoaded,
            other => {
                tracing::debug!(value = other, "unknown load state, using domcontentloaded");
                LoadState::DomContentLoaded
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::Load => "load",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// Condition on a page URL.
#[derive(Debug, Clone)]
pub enum UrlPredicate {
    Any,
    Contains(String),
    Pattern(Regex),
}

impl UrlPredicate {
    /// A pattern takes precedence over a substring; neither means any URL.
    pub fn from_parts(contains: Option<&str>, pattern: Option<&str>) -> GridLensResult<Self> {
        if let Some(p) = pattern.filter(|p| !p.is_empty()) {
            let re = Regex::new(p)
                .map_err(|e| GridLensError::InvalidArgument(format!("url pattern '{p}': {e}")))?;
            return Ok(UrlPredicate::Pattern(re));
        }
        if let Some(s) = contains.filter(|s| !s.is_empty()) {
            return Ok(UrlPredicate::Contains(s.to_string()));
        }
        Ok(UrlPredicate::Any)
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPredicate::Any => true,
            UrlPredicate::Contains(s) => url.contains(s.as_str()),
            UrlPredicate::Pattern(re) => re.is_match(url),
        }
    }
}

impl std::fmt::Display for UrlPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlPredicate::Any => f.write_str("any url"),
            UrlPredicate::Contains(s) => write!(f, "url containing '{s}'"),
            UrlPredicate::Pattern(re) => write!(f, "url matching /{}/", re.as_str()),
        }
    }
}

/// Identifies the document a page shows before a navigation-triggering interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationMarker {
    /// `performance.timeOrigin` of the document; every new document gets a new one.
    pub time_origin: String,
    pub url: String,
}

impl NavigationMarker {
    /// True once the page shows a different document or a different URL.
    pub fn has_moved(&self, time_origin: &str, url: &str) -> bool {
        self.time_origin != time_origin || self.url != url
    }
}

/// DOM and script primitives consumed from the automation library.
///
/// Implementations must map "page navigated / context destroyed" failures to
/// `GridLensError::PageContextLost` so callers can retry on kind.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Evaluate a JavaScript expression and return its JSON value.
    async fn evaluate(&self, script: &str) -> GridLensResult<serde_json::Value>;

    /// PNG capture of the viewport or the full scrollable page.
    async fn screenshot(&self, full_page: bool) -> GridLensResult<Vec<u8>>;

    async fn url(&self) -> GridLensResult<String>;

    async fn click(&self, selector: &str) -> GridLensResult<()>;

    /// Empty an input, textarea or content-editable element.
    async fn clear(&self, selector: &str) -> GridLensResult<()>;

    async fn type_text(&self, selector: &str, text: &str) -> GridLensResult<()>;

    async fn select_option(&self, selector: &str, value: &str) -> GridLensResult<()>;

    async fn goto(&self, url: &str, state: LoadState, timeout: Duration) -> GridLensResult<()>;

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> GridLensResult<()>;

    /// Snapshot the current document; taken before the triggering interaction.
    async fn navigation_marker(&self) -> GridLensResult<NavigationMarker>;

    /// Resolves once the page has moved past `since` to a URL satisfying `predicate`
    /// and the new document is at least interactive.
    async fn wait_for_navigation(
        &self,
        since: &NavigationMarker,
        predicate: &UrlPredicate,
        timeout: Duration,
    ) -> GridLensResult<()>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> GridLensResult<()>;

    async fn wait_for_url(&self, predicate: &UrlPredicate, timeout: Duration) -> GridLensResult<()>;
}

/// Embed `value` in a script as a JSON string literal.
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
