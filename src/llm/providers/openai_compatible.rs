use async_trait::async_trait;

use crate::config::VisionConfig;
use crate::errors::{GridLensError, GridLensResult};
use crate::llm::provider::VisionProvider;
use crate::llm::types::VisionRequest;

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String, model: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &VisionConfig) -> GridLensResult<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                GridLensError::Config(
                    "vision api key missing; set [vision].api_key or GRIDLENS_VISION_API_KEY".into(),
                )
            })?;
        Ok(Self::new(
            "openai_compatible".to_string(),
            cfg.api_base.clone(),
            api_key,
            cfg.model.clone(),
        ))
    }

    fn body(&self, request: &VisionRequest) -> GridLensResult<serde_json::Value> {
        Ok(serde_json::json!({
            "model": self.model,
            "messages": serde_json::to_value(request.messages())?,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        }))
    }
}

/// Copy of `body` with every image payload replaced, for logging.
fn sanitized_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for msg in msgs {
            let Some(parts) = msg.get_mut("content").and_then(|c| c.as_array_mut()) else {
                continue;
            };
            for part in parts {
                if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                    if let Some(url) = part.get_mut("image_url").and_then(|u| u.get_mut("url")) {
                        *url = serde_json::Value::String("<omitted_base64_image>".to_string());
                    }
                }
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

#[async_trait]
impl VisionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &VisionRequest) -> GridLensResult<serde_json::Value> {
        let body = self.body(request)?;

        tracing::debug!(
            provider = %self.id,
            model = %self.model,
            temperature = request.temperature,
            "sending vision request"
        );
        tracing::debug!(body = %sanitized_for_log(&body), "request body (sanitized, base64 omitted)");

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let err_body = response.text().await.unwrap_or_default();
            tracing::warn!(provider = %self.id, status, "vision request rejected");
            return Err(GridLensError::ModelHttp { status, body: err_body });
        }

        Ok(response.json().await?)
    }
}
