use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridLensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid grid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("DevTools endpoint {endpoint} unreachable after {waited_ms} ms")]
    ConnectionUnreachable { endpoint: String, waited_ms: u64 },

    /// The page navigated or its script context was torn down mid-operation.
    #[error("Page context lost: {0}")]
    PageContextLost(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Navigation did not complete within {timeout_ms} ms")]
    NavigationTimeout { timeout_ms: u64 },

    #[error("Timed out after {timeout_ms} ms waiting for {what}")]
    WaitTimeout { what: String, timeout_ms: u64 },

    #[error("Model returned no text content")]
    EmptyModelResponse,

    #[error("Model response is not a JSON object: {0}")]
    MalformedModelResponse(String),

    #[error("Model request failed with {status}: {body}")]
    ModelHttp { status: u16, body: String },

    #[error("Model request timed out after {timeout_ms} ms")]
    ModelTimeout { timeout_ms: u64 },

    #[error("No labeled element matches '{0}'")]
    NoMatchFound(String),

    #[error("Worker '{op}' timed out after {timeout_ms} ms")]
    WorkerTimeout { op: String, timeout_ms: u64 },

    #[error("Worker '{op}' failed (exit code {code:?}): {stderr}")]
    WorkerFailed {
        op: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl GridLensError {
    /// Errors a zone scan may recover from by waiting for the page to settle.
    pub fn is_transient(&self) -> bool {
        matches!(self, GridLensError::PageContextLost(_))
    }

    /// Model output problems that earn exactly one stricter retry.
    pub fn is_recoverable_model_error(&self) -> bool {
        matches!(
            self,
            GridLensError::EmptyModelResponse | GridLensError::MalformedModelResponse(_)
        )
    }
}

impl From<image::ImageError> for GridLensError {
    fn from(e: image::ImageError) -> Self {
        GridLensError::Image(e.to_string())
    }
}

impl serde::Serialize for GridLensError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type GridLensResult<T> = Result<T, GridLensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification_uses_kind() {
        assert!(GridLensError::PageContextLost("gone".into()).is_transient());
        assert!(!GridLensError::Browser("Execution context was destroyed".into()).is_transient());
        assert!(GridLensError::EmptyModelResponse.is_recoverable_model_error());
        assert!(GridLensError::MalformedModelResponse("x".into()).is_recoverable_model_error());
        assert!(!GridLensError::ModelTimeout { timeout_ms: 1 }.is_recoverable_model_error());
    }

    #[test]
    fn serializes_as_display_string() {
        let err = GridLensError::NoMatchFound("search".into());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"No labeled element matches 'search'\"");
    }
}
