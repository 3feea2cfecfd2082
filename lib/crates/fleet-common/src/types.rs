use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job state reported by the queue when a build was cancelled before the
/// agent picked it up.
pub const JOB_STATE_CANCELING: &str = "canceling";

/// Exit status reported when finishing a job that was cancelled before it ran.
pub const CANCELED_EXIT_STATUS: &str = "-99";

/// Environment variable carrying the pipeline slug of a job.
pub const PIPELINE_SLUG_ENV: &str = "BUILDKITE_PIPELINE_SLUG";

/// A job handed out by the remote queue.
///
/// Only the fields the fleet reads or writes are typed; everything else the
/// queue sends is kept in `extra` so the job can be forwarded to the
/// workflow engine unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Job {
    /// Whether the queue asked for this job to be cancelled.
    #[must_use]
    pub fn is_canceling(&self) -> bool {
        self.state.as_deref() == Some(JOB_STATE_CANCELING)
    }

    /// Pipeline slug from the job environment, if the queue supplied one.
    #[must_use]
    pub fn pipeline_slug(&self) -> Option<&str> {
        self.env.get(PIPELINE_SLUG_ENV).map(String::as_str)
    }
}

/// Response to a ping: optionally carries a job for the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<Job>,
}

/// Heartbeat acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<String>,
}

/// Configuration returned by the queue when an agent registers.
///
/// Persisted (encrypted) in the parameter store under the agent's config key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredAgent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Register request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub name: String,
    pub tags: Vec<String>,
    pub version: String,
    pub build: String,
    pub arch: String,
    pub os: String,
}

/// One chunk of job log output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub data: String,
    pub sequence: u64,
    pub offset: u64,
    pub size: u64,
}

/// Persisted agent identity stored in the agent directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Downstream build project jobs accepted by this agent are run in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_project: Option<String>,
    /// Queue-assigned agent id; set once registration succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl AgentRecord {
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.agent_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// Build-service hints carried in the workflow payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildWorkflowData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

/// Input payload of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowData {
    pub job: Job,
    pub agent_name: String,
    #[serde(rename = "codebuild", default)]
    pub build: BuildWorkflowData,
}

/// Immutable build information reported to the queue on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub build: String,
    pub arch: String,
    pub os: String,
}

impl BuildInfo {
    /// Build info for the running host with the given version and build label.
    #[must_use]
    pub fn for_host(version: impl Into<String>, build: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            build: build.into(),
            arch: std::env::consts::ARCH.to_string(),
            os: std::env::consts::OS.to_string(),
        }
    }
}
