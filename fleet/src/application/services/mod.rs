//! Application services: use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports`, never from `crate::infra`.

pub mod agent_pool;
pub mod execution_tracker;
pub mod parameter_cache;
pub mod poll_loop;

pub use agent_pool::{AgentPool, PoolDeps, PoolSettings};
pub use execution_tracker::WorkflowExecutionTracker;
pub use parameter_cache::ParameterCache;
pub use poll_loop::run_poll_loop;
