// ABOUTME: Application-wide error types for watchtower.
// ABOUTME: Uses thiserror; any of these reaching main ends the process with exit code 1.

use crate::resolver::RegistryError;
use crate::runtime::RuntimeError;
use crate::scheduler::ScheduleError;
use crate::update::UpdateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read secret from {path}: {source}")]
    ReadSecret {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("failed to build registry client: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
