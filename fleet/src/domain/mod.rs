//! Domain layer: pure values, naming rules and typed errors.
//!
//! This module has zero imports from `crate::infra` or `crate::application`,
//! and no async runtime. All functions are synchronous and take data in,
//! returning data out.

pub mod agent;
pub mod error;
pub mod execution;
pub mod pool;

pub use agent::{AgentInstance, FleetEnvironment, agent_tags, slot_agent_name};
pub use error::{AgentError, PoolError, QueueError};
pub use execution::{agent_segment, execution_name, matches_agent};
pub use pool::{AgentResult, PollOutcome, PoolOperation};
