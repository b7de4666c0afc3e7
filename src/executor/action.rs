use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::driver::{LoadState, UrlPredicate};
use crate::errors::{GridLensError, GridLensResult};

/// Default bound for navigation and wait actions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SCROLL_PX: i64 = 500;

const ACTION_KINDS: [&str; 9] = [
    "click",
    "type",
    "select",
    "submit",
    "scroll",
    "navigate",
    "waitForLoadState",
    "waitForSelector",
    "waitForUrl",
];

/// One UI command against a page. Stateless; nothing is kept between executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    Click {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wait_for_navigation: Option<NavigationWait>,
    },
    /// Clears the field, then types.
    Type { selector: String, text: String },
    Select { selector: String, value: String },
    /// Submits the form owning `selector` (or the form itself).
    Submit {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wait_for_navigation: Option<NavigationWait>,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<i64>,
    },
    Navigate {
        url: String,
        /// "domcontentloaded" | "load" | "networkidle"; anything else means domcontentloaded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        wait_until: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    WaitForLoadState {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    WaitForSelector {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    WaitForUrl {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url_contains: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url_pattern: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
}

impl Action {
    /// Decode a loosely-typed action, reporting unknown kinds as `UnsupportedAction`.
    pub fn from_value(value: serde_json::Value) -> GridLensResult<Self> {
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| GridLensError::UnsupportedAction("missing action type".into()))?
            .to_string();
        if !ACTION_KINDS.contains(&kind.as_str()) {
            return Err(GridLensError::UnsupportedAction(kind));
        }
        serde_json::from_value(value)
            .map_err(|e| GridLensError::InvalidArgument(format!("{kind} action: {e}")))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Select { .. } => "select",
            Action::Submit { .. } => "submit",
            Action::Scroll { .. } => "scroll",
            Action::Navigate { .. } => "navigate",
            Action::WaitForLoadState { .. } => "waitForLoadState",
            Action::WaitForSelector { .. } => "waitForSelector",
            Action::WaitForUrl { .. } => "waitForUrl",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

/// Vertical scroll delta in pixels; negative scrolls up.
pub fn scroll_delta(direction: ScrollDirection, amount: Option<i64>) -> i64 {
    let px = amount.map(i64::saturating_abs).unwrap_or(DEFAULT_SCROLL_PX);
    match direction {
        ScrollDirection::Up => -px,
        ScrollDirection::Down => px,
    }
}

/// Navigation to await alongside a click or submit. An empty object waits for any
/// navigation; `urlContains` / `urlPattern` gate it on the resulting URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationWait {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl NavigationWait {
    pub fn predicate(&self) -> GridLensResult<UrlPredicate> {
        UrlPredicate::from_parts(self.url_contains.as_deref(), self.url_pattern.as_deref())
    }

    pub fn timeout(&self) -> Duration {
        timeout_or_default(self.timeout_ms)
    }
}

pub fn timeout_or_default(timeout_ms: Option<u64>) -> Duration {
    timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_TIMEOUT)
}

pub fn load_state_or_default(value: Option<&str>) -> LoadState {
    value.map(LoadState::parse_lenient).unwrap_or_default()
}
