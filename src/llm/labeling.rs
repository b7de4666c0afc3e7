//! Labeling protocol: send a gridded frame to the model, parse its JSON defensively,
//! retry once with a stricter prompt on empty or malformed output.
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::VisionConfig;
use crate::errors::{GridLensError, GridLensResult};
use crate::llm::labels::{normalize_labels, normalize_overview, UiLabelsResult, UiOverviewResult};
use crate::llm::prompt::{build_prompt, strict_suffix, DetailLevel, LabelingMode, SYSTEM_PROMPT};
use crate::llm::provider::VisionProvider;
use crate::llm::types::VisionRequest;
use crate::scan::mapper::CoordinateSpace;

const SNIPPET_CHARS: usize = 120;

/// Text content of a chat-completions, Gemini or Responses-style body.
pub fn extract_response_text(body: &Value) -> GridLensResult<String> {
    let mut pieces: Vec<&str> = Vec::new();

    if let Some(content) = body.pointer("/choices/0/message/content") {
        match content {
            Value::String(s) => pieces.push(s),
            Value::Array(parts) => pieces.extend(parts.iter().filter_map(|p| p.get("text")?.as_str())),
            _ => {}
        }
    }
    if pieces.is_empty() {
        if let Some(parts) = body.pointer("/candidates/0/content/parts").and_then(Value::as_array) {
            pieces.extend(parts.iter().filter_map(|p| p.get("text")?.as_str()));
        }
    }
    if pieces.is_empty() {
        if let Some(s) = body.get("output_text").and_then(Value::as_str) {
            pieces.push(s);
        } else if let Some(items) = body.get("output").and_then(Value::as_array) {
            for item in items {
                if let Some(parts) = item.get("content").and_then(Value::as_array) {
                    pieces.extend(parts.iter().filter_map(|p| p.get("text")?.as_str()));
                }
            }
        }
    }

    let text = pieces.concat();
    if text.trim().is_empty() {
        return Err(GridLensError::EmptyModelResponse);
    }
    Ok(text)
}

/// Body of the first ``` fenced block, language tag dropped.
fn first_fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let rest = &text[start..];
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn as_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(v) if v.is_object() => Some(v),
        _ => None,
    }
}

/// Whole text as a JSON object, else the first fenced block.
pub fn parse_json_object(text: &str) -> GridLensResult<Value> {
    if let Some(v) = as_object(text) {
        return Ok(v);
    }
    if let Some(v) = first_fenced_block(text).and_then(as_object) {
        return Ok(v);
    }
    let snippet: String = text.trim().chars().take(SNIPPET_CHARS).collect();
    Err(GridLensError::MalformedModelResponse(snippet))
}

pub struct LabelingProtocol {
    provider: Arc<dyn VisionProvider>,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl LabelingProtocol {
    pub fn new(provider: Arc<dyn VisionProvider>, cfg: &VisionConfig) -> Self {
        Self {
            provider,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    async fn attempt(&self, prompt: &str, image_base64: &str, temperature: f64) -> GridLensResult<Value> {
        let request = VisionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: prompt.to_string(),
            image_base64: image_base64.to_string(),
            temperature,
            max_tokens: self.max_tokens,
        };
        let body = self.provider.complete(&request).await?;
        let text = extract_response_text(&body)?;
        parse_json_object(&text)
    }

    async fn request_with_retry(&self, prompt: &str, image_base64: &str) -> GridLensResult<Value> {
        match self.attempt(prompt, image_base64, self.temperature).await {
            Err(e) if e.is_recoverable_model_error() => {
                tracing::warn!(
                    provider = self.provider.name(),
                    error = %e,
                    "unusable model response, retrying once with strict prompt"
                );
                let strict = format!("{prompt}{}", strict_suffix());
                self.attempt(&strict, image_base64, 0.0).await
            }
            other => other,
        }
    }

    /// Raw JSON object for `mode`; the timeout covers both attempts.
    pub async fn request_json(
        &self,
        mode: &LabelingMode,
        detail: DetailLevel,
        space: CoordinateSpace,
        image_base64: &str,
    ) -> GridLensResult<Value> {
        let prompt = build_prompt(mode, detail, space);
        tracing::info!(
            provider = self.provider.name(),
            model = self.provider.model(),
            ?mode,
            ?detail,
            space = space.as_str(),
            "requesting labels"
        );
        tokio::time::timeout(self.timeout, self.request_with_retry(&prompt, image_base64))
            .await
            .map_err(|_| GridLensError::ModelTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })?
    }

    pub async fn label(
        &self,
        mode: &LabelingMode,
        detail: DetailLevel,
        space: CoordinateSpace,
        image_base64: &str,
    ) -> GridLensResult<UiLabelsResult> {
        let raw = self.request_json(mode, detail, space, image_base64).await?;
        let zone = match mode {
            LabelingMode::Zone { range } => Some(range.clone()),
            _ => None,
        };
        Ok(normalize_labels(&raw, self.provider.model(), space, zone))
    }

    pub async fn overview(&self, space: CoordinateSpace, image_base64: &str) -> GridLensResult<UiOverviewResult> {
        let raw = self
            .request_json(&LabelingMode::Overview, DetailLevel::High, space, image_base64)
            .await?;
        Ok(normalize_overview(&raw, self.provider.model(), space))
    }
}
