pub mod browser;
pub mod config;
pub mod errors;
pub mod executor;
pub mod grid;
pub mod llm;
pub mod scan;
pub mod service;
pub mod worker;

pub use errors::{GridLensError, GridLensResult};
pub use service::{GridLens, GridScreenshot, ScreenshotOutput, ScreenshotPayload};

/// Structured logs on stderr; stdout is reserved for command output (and, in a
/// worker, for its single result line). `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
