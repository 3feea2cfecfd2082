//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared wire types.
//!
//! Services hold ports as `Arc<dyn Port>` and move them into spawned tasks,
//! so every port is object-safe and `Send + Sync`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_common::{AgentRecord, Chunk, Heartbeat, Job, Ping, RegisteredAgent};

// ── Value Types ───────────────────────────────────────────────────────────────

/// A parameter value together with its last-modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub value: String,
    /// `None` when the store does not report one.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Status filter for execution listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
}

/// One workflow execution as listed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub name: String,
    pub arn: String,
}

// ── Job Queue Port ────────────────────────────────────────────────────────────

/// Remote job queue the agents register with and take jobs from.
///
/// Every call except `register` authenticates with the agent's access token.
#[async_trait]
pub trait JobQueueClient: Send + Sync {
    /// Register `name` using the pool's registration secret.
    async fn register(&self, name: &str, secret: &str, tags: &[String])
    -> Result<RegisteredAgent>;
    async fn beat(&self, token: &str) -> Result<Heartbeat>;
    async fn ping(&self, token: &str) -> Result<Ping>;
    async fn accept_job(&self, token: &str, job: &Job) -> Result<Job>;
    async fn start_job(&self, token: &str, job: &Job) -> Result<()>;
    async fn finish_job(&self, token: &str, job: &Job) -> Result<()>;
    /// Upload one chunk of a job's log output.
    async fn upload_chunk(&self, token: &str, job_id: &str, chunk: &Chunk) -> Result<()>;
}

// ── Secret Store Port ─────────────────────────────────────────────────────────

/// Remote key/value store holding secrets and per-agent configuration.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Full fetch, decrypting when `decrypt` is set.
    async fn get_parameter(&self, key: &str, decrypt: bool) -> Result<Parameter>;
    /// Overwrite `key`, stored encrypted when `encrypted` is set.
    async fn put_parameter(&self, key: &str, value: &str, encrypted: bool) -> Result<()>;
    /// Metadata-only lookup of the last-modification time.
    async fn describe_parameter(&self, key: &str) -> Result<Option<DateTime<Utc>>>;
}

// ── Workflow Ports ────────────────────────────────────────────────────────────

/// External workflow engine: list-by-status and start-by-name only.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn list_executions(
        &self,
        definition_arn: &str,
        status: ExecutionStatus,
    ) -> Result<Vec<ExecutionSummary>>;
    /// Start an execution and return its ARN.
    async fn start_execution(&self, definition_arn: &str, name: &str, input: &str)
    -> Result<String>;
}

/// Per-agent view over the workflow engine used by the pool.
#[async_trait]
pub trait ExecutionTracker: Send + Sync {
    /// Number of running executions started for `agent_name`.
    async fn running_for_agent(&self, agent_name: &str) -> Result<usize>;
    /// Start an execution for `job` with the serialized `input` payload.
    ///
    /// Returns the execution name.
    async fn start_execution(&self, agent_name: &str, job: &Job, input: &str) -> Result<String>;
}

// ── Agent Directory Ports ─────────────────────────────────────────────────────

/// Persistent store of agent identities.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn list(&self) -> Result<Vec<AgentRecord>>;
    async fn get(&self, name: &str) -> Result<Option<AgentRecord>>;
    /// Upsert `record`, returning it as stored.
    async fn create_or_update(&self, record: AgentRecord) -> Result<AgentRecord>;
    /// A lock on `name` that expires after `ttl` unless renewed.
    ///
    /// Creating the handle does not acquire it.
    fn new_lock(&self, name: &str, ttl: Duration) -> Box<dyn AgentLock>;
}

/// Renewable, expiring lock on one agent identity.
#[async_trait]
pub trait AgentLock: Send + Sync {
    /// Take the lock. `Ok(false)` when another owner holds it.
    async fn acquire(&self) -> Result<bool>;
    /// Extend the lock. `Ok(false)` when it is no longer ours.
    async fn renew(&self) -> Result<bool>;
    /// Give the lock up if still ours.
    async fn release(&self) -> Result<()>;
}
