/// Zone element discovery.
///
/// One in-page evaluation returns every visible interactive element (with a
/// synthesized selector and its viewport rectangle) plus the page metrics; the zone
/// filter, de-duplication and ordering run here so they stay deterministic and
/// testable without a browser. Zones are scanned one after another, each with its
/// own bounded retry loop.
use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::driver::{LoadState, PageDriver};
use crate::errors::GridLensResult;
use crate::grid::coordinate::{GridBounds, GridRange, CELL_SIZE};
use crate::scan::mapper::{CoordinateSpace, CoordinateSpaceMapper, CssRect, ViewportMetrics};

pub const SCAN_ATTEMPTS: u32 = 3;
const READY_TIMEOUT: Duration = Duration::from_secs(3);
const BACKOFF_STEP: Duration = Duration::from_millis(200);
pub const MAX_TEXT_CHARS: usize = 60;

/// Collects interactive elements and page geometry in a single, side-effect-free pass.
///
/// Selector synthesis walks up to the nearest ancestor with a unique `id` (or the
/// root), emitting `tag:nth-of-type(n)` segments on the way.
pub const DISCOVERY_SCRIPT: &str = r#"(() => {
  const ROLES = new Set(['button', 'link', 'checkbox', 'radio', 'switch', 'tab', 'menuitem',
    'menuitemcheckbox', 'menuitemradio', 'option', 'combobox', 'textbox', 'searchbox',
    'slider', 'spinbutton', 'listbox', 'treeitem']);
  const NATIVE = new Set(['BUTTON', 'INPUT', 'SELECT', 'TEXTAREA', 'SUMMARY']);

  const isInteractive = (el) => {
    if (NATIVE.has(el.tagName)) return true;
    if (el.tagName === 'A' && el.hasAttribute('href') && el.href) return true;
    const role = (el.getAttribute('role') || '').trim().toLowerCase();
    if (role && ROLES.has(role)) return true;
    if (el.isContentEditable) return true;
    const tab = parseInt(el.getAttribute('tabindex'), 10);
    if (!Number.isNaN(tab) && tab >= 0) return true;
    return el.hasAttribute('onclick');
  };

  const isVisible = (el, r) => {
    if (r.width <= 0 || r.height <= 0) return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && parseFloat(s.opacity || '1') > 0;
  };

  const uniqueId = (el) => {
    const id = el.getAttribute('id');
    if (!id) return null;
    try {
      const sel = '#' + CSS.escape(id);
      return document.querySelectorAll(sel).length === 1 ? sel : null;
    } catch (_) {
      return null;
    }
  };

  const selectorFor = (el) => {
    const parts = [];
    let node = el;
    while (node && node.nodeType === 1) {
      const id = uniqueId(node);
      if (id) { parts.unshift(id); break; }
      if (node === document.documentElement) { parts.unshift('html'); break; }
      let index = 1;
      for (let sib = node.previousElementSibling; sib; sib = sib.previousElementSibling) {
        if (sib.tagName === node.tagName) index++;
      }
      parts.unshift(node.tagName.toLowerCase() + ':nth-of-type(' + index + ')');
      node = node.parentElement;
    }
    return parts.join(' > ');
  };

  const elements = [];
  for (const el of document.querySelectorAll('body *')) {
    if (!isInteractive(el)) continue;
    const r = el.getBoundingClientRect();
    if (!isVisible(el, r)) continue;
    const raw = el.innerText || (typeof el.value === 'string' ? el.value : '') || '';
    elements.push({
      selector: selectorFor(el),
      tagName: el.tagName.toLowerCase(),
      text: raw.replace(/\s+/g, ' ').trim().slice(0, 60),
      href: el.tagName === 'A' ? el.href : null,
      placeholder: el.getAttribute('placeholder'),
      inputType: el.tagName === 'INPUT' ? (el.getAttribute('type') || 'text') : null,
      role: el.getAttribute('role'),
      ariaLabel: el.getAttribute('aria-label'),
      rect: { x: r.left, y: r.top, width: r.width, height: r.height },
    });
  }

  const de = document.documentElement;
  const body = document.body;
  return {
    metrics: {
      viewportWidth: window.innerWidth,
      viewportHeight: window.innerHeight,
      documentWidth: Math.max(de.scrollWidth, body ? body.scrollWidth : 0),
      documentHeight: Math.max(de.scrollHeight, body ? body.scrollHeight : 0),
      devicePixelRatio: window.devicePixelRatio || 1,
      scrollX: window.scrollX,
      scrollY: window.scrollY,
    },
    elements,
  };
})()"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveElement {
    pub selector: String,
    pub tag_name: String,
    pub visible_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub range: GridRange,
    pub bounds: GridBounds,
    pub coordinate_space: CoordinateSpace,
    /// The zone in CSS pixels of `coordinate_space`.
    pub css_rect: CssRect,
    pub elements: Vec<InteractiveElement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawElement {
    pub selector: String,
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    pub rect: CssRect,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScanSnapshot {
    pub metrics: ViewportMetrics,
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

#[derive(Debug, Clone)]
pub struct ZoneElementScanner {
    cell_size: u32,
    attempts: u32,
    backoff_step: Duration,
    ready_timeout: Duration,
}

impl Default for ZoneElementScanner {
    fn default() -> Self {
        Self {
            cell_size: CELL_SIZE,
            attempts: SCAN_ATTEMPTS,
            backoff_step: BACKOFF_STEP,
            ready_timeout: READY_TIMEOUT,
        }
    }
}

impl ZoneElementScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan each zone in order. All ranges are validated before the page is touched.
    pub async fn scan(
        &self,
        page: &dyn PageDriver,
        zones: &[GridRange],
        space: CoordinateSpace,
    ) -> GridLensResult<Vec<Zone>> {
        let bounds = zones
            .iter()
            .map(GridRange::normalize)
            .collect::<GridLensResult<Vec<_>>>()?;

        let mut out = Vec::with_capacity(zones.len());
        for (range, bounds) in zones.iter().zip(bounds) {
            let zone = self.scan_zone(page, range, bounds, space).await?;
            tracing::info!(
                zone = %range,
                space = %space,
                elements = zone.elements.len(),
                "zone scanned"
            );
            out.push(zone);
        }
        Ok(out)
    }

    async fn scan_zone(
        &self,
        page: &dyn PageDriver,
        range: &GridRange,
        bounds: GridBounds,
        space: CoordinateSpace,
    ) -> GridLensResult<Zone> {
        let mut attempt = 1;
        loop {
            let err = match page.evaluate(DISCOVERY_SCRIPT).await {
                Ok(value) => {
                    let snapshot: ScanSnapshot = serde_json::from_value(value)?;
                    return Ok(select_in_zone(&snapshot, range, bounds, space, self.cell_size));
                }
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= self.attempts {
                return Err(err);
            }
            tracing::warn!(
                zone = %range,
                attempt,
                error = %err,
                "transient scan failure, waiting for page to settle"
            );
            if let Err(e) = page
                .wait_for_load_state(LoadState::DomContentLoaded, self.ready_timeout)
                .await
            {
                tracing::debug!(error = %e, "ready wait failed, proceeding anyway");
            }
            tokio::time::sleep(self.backoff_step * attempt).await;
            attempt += 1;
        }
    }
}

/// Keep elements overlapping the zone, drop duplicate selectors, and order the rest:
/// text-bearing before textless, then case-insensitive text, then selector.
pub(crate) fn select_in_zone(
    snapshot: &ScanSnapshot,
    range: &GridRange,
    bounds: GridBounds,
    space: CoordinateSpace,
    cell_size: u32,
) -> Zone {
    let mapper = CoordinateSpaceMapper::new(snapshot.metrics, space);
    let zone_rect = mapper.zone_rect(&bounds, cell_size);

    let mut seen = HashSet::new();
    let mut elements: Vec<InteractiveElement> = snapshot
        .elements
        .iter()
        .filter(|raw| !raw.selector.is_empty())
        .filter(|raw| mapper.element_rect(raw.rect).intersects(&zone_rect))
        .filter(|raw| seen.insert(raw.selector.clone()))
        .map(to_element)
        .collect();

    elements.sort_by(|a, b| {
        let at = a.visible_text.to_lowercase();
        let bt = b.visible_text.to_lowercase();
        at.is_empty()
            .cmp(&bt.is_empty())
            .then_with(|| at.cmp(&bt))
            .then_with(|| a.selector.cmp(&b.selector))
    });

    Zone {
        range: range.clone(),
        bounds,
        coordinate_space: space,
        css_rect: zone_rect,
        elements,
    }
}

fn to_element(raw: &RawElement) -> InteractiveElement {
    let non_empty = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    InteractiveElement {
        selector: raw.selector.clone(),
        tag_name: raw.tag_name.to_lowercase(),
        visible_text: truncate_chars(raw.text.trim(), MAX_TEXT_CHARS),
        href: non_empty(&raw.href),
        placeholder: non_empty(&raw.placeholder),
        input_type: non_empty(&raw.input_type),
        aria_role: non_empty(&raw.role),
        aria_label: non_empty(&raw.aria_label),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
