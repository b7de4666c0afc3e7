//! Execution of worker tasks behind a bounded, cancellable boundary.
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::errors::{GridLensError, GridLensResult};
use crate::worker::handler;
use crate::worker::task::WorkerTask;

pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(120);

/// Maps one task to its JSON result or an error tagged with the op name.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &WorkerTask) -> GridLensResult<Value>;
}

/// Runs each task in a fresh child process (`<program> worker '<json>'`) and kills it
/// when the wall-clock budget runs out.
pub struct ProcessRunner {
    program: PathBuf,
    /// Inserted before `worker`; lets a wrapper program host the worker.
    leading_args: Vec<String>,
    timeout: Duration,
}

impl ProcessRunner {
    /// Re-invokes the current executable.
    pub fn current_exe(timeout: Duration) -> GridLensResult<Self> {
        Ok(Self::new(std::env::current_exe()?, timeout))
    }

    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout,
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl TaskRunner for ProcessRunner {
    async fn run(&self, task: &WorkerTask) -> GridLensResult<Value> {
        let op = task.op.name();
        let payload = serde_json::to_string(task)?;

        let child = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("worker")
            .arg(&payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        tracing::debug!(op, pid = child.id(), "worker spawned");

        // Dropping the pending future drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "worker timed out, killed");
                return Err(GridLensError::WorkerTimeout {
                    op: op.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GridLensError::WorkerFailed {
                op: op.to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or_default();
        Ok(serde_json::from_str(line)?)
    }
}

/// Runs tasks on the current runtime with the same deadline. Used when spawning a
/// process is not possible, and by embedders that already isolate calls.
pub struct InProcessRunner {
    timeout: Duration,
}

impl InProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl TaskRunner for InProcessRunner {
    async fn run(&self, task: &WorkerTask) -> GridLensResult<Value> {
        let op = task.op.name();
        tokio::time::timeout(self.timeout, handler::handle(task))
            .await
            .map_err(|_| GridLensError::WorkerTimeout {
                op: op.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            })?
    }
}
