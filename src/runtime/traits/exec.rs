// ABOUTME: Exec operations trait for container runtimes.
// ABOUTME: Create, start and inspect command executions inside containers.

use super::sealed::Sealed;
use super::shared_types::ExecInfo;
use crate::types::ContainerId;
use async_trait::async_trait;

/// Exec operations: run commands in containers.
#[async_trait]
pub trait ExecOps: Sealed + Send + Sync {
    /// Create an exec instance for `cmd` without starting it. Returns the exec id.
    async fn exec_create(
        &self,
        container: &ContainerId,
        cmd: &[String],
    ) -> Result<String, ExecError>;

    /// Start an exec instance attached, returning its captured output once the stream closes.
    async fn exec_start(&self, exec_id: &str) -> Result<String, ExecError>;

    /// Inspect an exec instance.
    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecInfo, ExecError>;
}

/// Errors from exec operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("container not running: {0}")]
    ContainerNotRunning(String),

    #[error("exec instance not found: {0}")]
    ExecNotFound(String),

    #[error("exec failed: {0}")]
    Failed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
