pub mod handler;
pub mod runner;
pub mod task;

pub use runner::{InProcessRunner, ProcessRunner, TaskRunner, DEFAULT_WORKER_TIMEOUT};
pub use task::{GridScreenshotOutput, ScanZonesOutput, WorkerOp, WorkerTask};
