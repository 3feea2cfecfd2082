//! Pool round vocabulary: which operation ran and how each agent finished.

use std::fmt;

/// The three operations a pool drives across every agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOperation {
    Register,
    Poll,
    Cleanup,
}

impl PoolOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Poll => "poll",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for PoolOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal branch reached by one agent in one poll round.
///
/// Exactly one of these is reached per agent per successful round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The ping carried no job.
    Idle,
    /// The ping carried a job the queue is cancelling; it was finished.
    CanceledJobFinished { job_id: String },
    /// The agent already has running executions; no job was accepted.
    Busy { running: usize },
    /// The job was accepted and an execution started for it.
    Accepted { job_id: String, execution: String },
    /// The agent's task from an earlier round is still running; nothing was
    /// dispatched for it this round.
    InFlight,
}

impl PollOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CanceledJobFinished { .. } => "canceled",
            Self::Busy { .. } => "busy",
            Self::Accepted { .. } => "accepted",
            Self::InFlight => "in_flight",
        }
    }
}

/// Message a dispatched agent task sends back to the coordinator.
///
/// Each task sends exactly one; the coordinator consumes it once.
#[derive(Debug)]
pub struct AgentResult<T> {
    pub agent_name: String,
    pub result: anyhow::Result<T>,
}
