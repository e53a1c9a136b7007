//! Error kinds shared by every CORE subsystem.
//!
//! Structural mutations are either total or a no-op: a fallible graph
//! operation never leaves the graph half-updated. See `spec.md` §7.

use crate::atom::AtomId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("atom {0} not found")]
    AtomNotFound(AtomId),

    #[error("plugin '{0}' not found")]
    PluginNotFound(String),

    #[error("job {0} not found")]
    JobNotFound(u64),

    #[error("queue full (capacity {0})")]
    QueueFull(usize),

    #[error("job {0} timed out after {1:?}")]
    Timeout(u64, std::time::Duration),

    #[error("plugin '{0}' is disabled")]
    Disabled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
