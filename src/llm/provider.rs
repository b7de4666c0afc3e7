use async_trait::async_trait;

use crate::errors::GridLensResult;
use crate::llm::types::VisionRequest;

/// A vision-language model endpoint. Implementations return the raw JSON body of a
/// successful (2xx) response; extracting text from it is the caller's job.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Provider identifier used in logs.
    fn name(&self) -> &str;

    /// Model reported in labeling results.
    fn model(&self) -> &str;

    async fn complete(&self, request: &VisionRequest) -> GridLensResult<serde_json::Value>;
}
