// Executes a single `Action` against a page.
use serde::{Deserialize, Serialize};

use crate::browser::driver::{js_string, PageDriver, UrlPredicate};
use crate::errors::{GridLensError, GridLensResult};
use crate::executor::action::{
    load_state_or_default, scroll_delta, timeout_or_default, Action, NavigationWait,
};

/// Result of a successful action: its kind and the page URL afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub action: String,
    pub url: String,
}

pub async fn execute(page: &dyn PageDriver, action: &Action) -> GridLensResult<ActionOutcome> {
    tracing::info!(action = action.kind(), "executing action");

    match action {
        Action::Click { selector, wait_for_navigation } => {
            with_navigation(page, wait_for_navigation.as_ref(), page.click(selector)).await?;
        }
        Action::Type { selector, text } => {
            page.clear(selector).await?;
            page.type_text(selector, text).await?;
        }
        Action::Select { selector, value } => {
            page.select_option(selector, value).await?;
        }
        Action::Submit { selector, wait_for_navigation } => {
            with_navigation(page, wait_for_navigation.as_ref(), submit(page, selector)).await?;
        }
        Action::Scroll { direction, amount } => {
            let delta = scroll_delta(*direction, *amount);
            page.evaluate(&format!("window.scrollBy(0, {delta})")).await?;
        }
        Action::Navigate { url, wait_until, timeout_ms } => {
            if url.trim().is_empty() {
                return Err(GridLensError::InvalidArgument("navigate requires a url".into()));
            }
            let state = load_state_or_default(wait_until.as_deref());
            page.goto(url, state, timeout_or_default(*timeout_ms)).await?;
        }
        Action::WaitForLoadState { state, timeout_ms } => {
            let state = load_state_or_default(state.as_deref());
            page.wait_for_load_state(state, timeout_or_default(*timeout_ms)).await?;
        }
        Action::WaitForSelector { selector, timeout_ms } => {
            page.wait_for_selector(selector, timeout_or_default(*timeout_ms)).await?;
        }
        Action::WaitForUrl { url_contains, url_pattern, timeout_ms } => {
            let predicate = UrlPredicate::from_parts(url_contains.as_deref(), url_pattern.as_deref())?;
            page.wait_for_url(&predicate, timeout_or_default(*timeout_ms)).await?;
        }
    }

    let url = page.url().await?;
    tracing::debug!(action = action.kind(), %url, "action done");
    Ok(ActionOutcome { action: action.kind().to_string(), url })
}

/// Runs `trigger`; when a wait is requested the navigation listener is armed first
/// and both run concurrently, so a fast navigation cannot be missed.
async fn with_navigation<F>(
    page: &dyn PageDriver,
    wait: Option<&NavigationWait>,
    trigger: F,
) -> GridLensResult<()>
where
    F: std::future::Future<Output = GridLensResult<()>>,
{
    let Some(wait) = wait else {
        return trigger.await;
    };
    let predicate = wait.predicate()?;
    let timeout = wait.timeout();
    let marker = page.navigation_marker().await?;

    tokio::try_join!(trigger, page.wait_for_navigation(&marker, &predicate, timeout))?;
    Ok(())
}

async fn submit(page: &dyn PageDriver, selector: &str) -> GridLensResult<()> {
    let script = format!(
        r#"(() => {{
  const el = document.querySelector({sel});
  if (!el) return "missing";
  const form = el.tagName === "FORM" ? el : el.form || el.closest("form");
  if (!form) return "no-form";
  if (typeof form.requestSubmit === "function") {{
    form.requestSubmit(el.tagName === "FORM" || el.type !== "submit" ? undefined : el);
  }} else {{
    form.submit();
  }}
  return "submitted";
}})()"#,
        sel = js_string(selector)
    );
    match page.evaluate(&script).await?.as_str() {
        Some("submitted") => Ok(()),
        Some("missing") => Err(GridLensError::ElementNotFound(selector.to_string())),
        _ => {
            tracing::debug!(selector, "no owning form, clicking instead");
            page.click(selector).await
        }
    }
}
