use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{GridLensError, GridLensResult};

const CONFIG_FILE: &str = "gridlens.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// DevTools HTTP endpoint, e.g. `http://127.0.0.1:9222`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// How long `ensure_session` waits for the endpoint to answer.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:9222".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Hard wall-clock budget for one isolated worker invocation.
    #[serde(default = "default_worker_timeout")]
    pub timeout_secs: u64,
    /// Run tasks on the current runtime instead of a child process.
    #[serde(default)]
    pub in_process: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_worker_timeout(),
            in_process: false,
        }
    }
}

fn default_worker_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Full chat-completions URL of an OpenAI-compatible endpoint.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Falls back to env var `GRIDLENS_VISION_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            timeout_secs: default_vision_timeout(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.2
}

fn default_vision_timeout() -> u64 {
    90
}

fn default_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where grid screenshots are saved when no explicit path is given.
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,
}

impl OutputConfig {
    /// Configured directory, else `<local data dir>/gridlens/screenshots`, else `./screenshots`.
    pub fn resolved_screenshot_dir(&self) -> PathBuf {
        if let Some(dir) = &self.screenshot_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("gridlens").join("screenshots"))
            .unwrap_or_else(|| PathBuf::from("screenshots"))
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let candidate = std::env::current_dir().ok()?.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

/// Load `gridlens.toml` (defaults when absent), then apply `.env` and environment overrides.
pub fn load_config() -> GridLensResult<AppConfig> {
    let _ = dotenvy::dotenv();

    let mut config = match resolve_config_path() {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let cfg: AppConfig = toml::from_str(&content)?;
            tracing::info!(path = %path.display(), endpoint = %cfg.browser.endpoint, "config loaded");
            cfg
        }
        None => {
            tracing::debug!("no {CONFIG_FILE} found, using defaults");
            AppConfig::default()
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &std::path::Path) -> GridLensResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(endpoint) = lookup("GRIDLENS_CDP_ENDPOINT") {
        config.browser.endpoint = endpoint;
    }
    if let Some(key) = lookup("GRIDLENS_VISION_API_KEY") {
        config.vision.api_key = Some(key);
    }
    if let Some(model) = lookup("GRIDLENS_VISION_MODEL") {
        config.vision.model = model;
    }
}

fn validate(config: &AppConfig) -> GridLensResult<()> {
    if config.browser.endpoint.trim().is_empty() {
        return Err(GridLensError::Config("browser.endpoint must not be empty".into()));
    }
    if config.worker.timeout_secs == 0 {
        return Err(GridLensError::Config("worker.timeout_secs must be > 0".into()));
    }
    if config.vision.timeout_secs == 0 {
        return Err(GridLensError::Config("vision.timeout_secs must be > 0".into()));
    }
    Ok(())
}
