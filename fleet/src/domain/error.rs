//! Typed domain error enums.
//!
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator; callers recover them with `downcast_ref`.

use thiserror::Error;

use crate::domain::pool::PoolOperation;

// ── Pool errors ───────────────────────────────────────────────────────────────

/// Errors surfaced by one pool round.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The deadline elapsed before every agent task reported.
    #[error("timed out during {operation} after {reported}/{expected} agents reported")]
    Timeout {
        operation: PoolOperation,
        reported: usize,
        expected: usize,
    },

    /// One agent's task failed; the round was aborted.
    #[error("{operation} failed for agent '{agent}': {source:#}")]
    Agent {
        operation: PoolOperation,
        agent: String,
        #[source]
        source: anyhow::Error,
    },

    /// Every task ended but some never reported, e.g. after a panic.
    #[error("{operation} lost {missing} agent task(s) before they reported")]
    TaskLost {
        operation: PoolOperation,
        missing: usize,
    },
}

impl PoolError {
    /// The operation whose round failed.
    #[must_use]
    pub fn operation(&self) -> PoolOperation {
        match self {
            Self::Timeout { operation, .. }
            | Self::Agent { operation, .. }
            | Self::TaskLost { operation, .. } => *operation,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

// ── Queue errors ──────────────────────────────────────────────────────────────

/// Errors returned by the remote job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

// ── Agent errors ──────────────────────────────────────────────────────────────

/// Errors about a single agent's persisted state.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent '{0}' has no registered configuration; run registration first")]
    NotRegistered(String),

    #[error("agent '{0}' lost its lock to another invocation")]
    LockLost(String),
}
