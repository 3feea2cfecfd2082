use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable prefix for every [`FleetConfig`] field.
pub const ENV_PREFIX: &str = "FLEET_";

/// Default number of agent identities seeded into an empty directory.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default agent name prefix used for slot-derived identities.
pub const DEFAULT_AGENT_NAME_PREFIX: &str = "serverless-agent";

/// Errors raised while validating [`FleetConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment name (FLEET_ENVIRONMENT_NAME)")]
    MissingEnvironmentName,

    #[error("missing environment number (FLEET_ENVIRONMENT_NUMBER)")]
    MissingEnvironmentNumber,

    #[error("missing workflow definition ARN (FLEET_WORKFLOW_DEFINITION_ARN)")]
    MissingWorkflowDefinition,

    #[error("pool size must be between 1 and {max}, got {got}")]
    InvalidPoolSize { got: usize, max: usize },

    #[error(
        "agent lock TTL ({lock_ttl_secs}s) must exceed the invocation timeout ({invocation_timeout_secs}s)"
    )]
    LockTtlTooShort {
        lock_ttl_secs: u64,
        invocation_timeout_secs: u64,
    },
}

/// Worker configuration, loaded from `FLEET_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    /// Environment name, e.g. `dev`.
    #[serde(default)]
    pub environment_name: String,

    /// Environment number, e.g. `1`.
    #[serde(default)]
    pub environment_number: String,

    /// ARN of the workflow definition that runs accepted jobs.
    #[serde(default)]
    pub workflow_definition_arn: String,

    /// Region, added to every agent's tags when set.
    #[serde(default)]
    pub aws_region: Option<String>,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_agent_name_prefix")]
    pub agent_name_prefix: String,

    /// Base URL of the remote job queue's agent API.
    #[serde(default = "default_queue_endpoint")]
    pub queue_endpoint: String,

    #[serde(default = "default_param_cache_ttl_secs")]
    pub param_cache_ttl_secs: u64,

    /// Wall-clock budget of one invocation.
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,

    /// Safety margin subtracted from the invocation deadline by the poll loop.
    #[serde(default = "default_deadline_margin_secs")]
    pub deadline_margin_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_agent_lock_ttl_secs")]
    pub agent_lock_ttl_secs: u64,

    /// Valkey (Redis-compatible) URL backing the agent directory.
    #[serde(default = "default_valkey_url")]
    pub valkey_url: String,

    pub valkey_user: Option<String>,

    /// Path to a file holding the Valkey ACL password.
    pub valkey_pass_file: Option<String>,

    /// CA certificate; together with the client cert/key enables mTLS.
    pub valkey_ca: Option<String>,
    pub valkey_client_cert: Option<String>,
    pub valkey_client_key: Option<String>,

    /// `json` for JSON log lines, anything else for human-readable output.
    #[serde(default)]
    pub log_format: Option<String>,
}

/// Upper bound on the pool size; every agent gets its own task per round.
pub const MAX_POOL_SIZE: usize = 64;

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_agent_name_prefix() -> String {
    DEFAULT_AGENT_NAME_PREFIX.to_string()
}

fn default_queue_endpoint() -> String {
    "https://agent.buildkite.com/v3".to_string()
}

fn default_param_cache_ttl_secs() -> u64 {
    300
}

fn default_invocation_timeout_secs() -> u64 {
    60
}

fn default_deadline_margin_secs() -> u64 {
    3
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_agent_lock_ttl_secs() -> u64 {
    120
}

fn default_valkey_url() -> String {
    "redis://valkey:6379".to_string()
}

impl FleetConfig {
    /// Check the required settings are present and in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment_name.trim().is_empty() {
            return Err(ConfigError::MissingEnvironmentName);
        }
        if self.environment_number.trim().is_empty() {
            return Err(ConfigError::MissingEnvironmentNumber);
        }
        if self.workflow_definition_arn.trim().is_empty() {
            return Err(ConfigError::MissingWorkflowDefinition);
        }
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::InvalidPoolSize {
                got: self.pool_size,
                max: MAX_POOL_SIZE,
            });
        }
        if self.agent_lock_ttl_secs <= self.invocation_timeout_secs {
            return Err(ConfigError::LockTtlTooShort {
                lock_ttl_secs: self.agent_lock_ttl_secs,
                invocation_timeout_secs: self.invocation_timeout_secs,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn param_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.param_cache_ttl_secs)
    }

    #[must_use]
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    #[must_use]
    pub fn deadline_margin(&self) -> Duration {
        Duration::from_secs(self.deadline_margin_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn agent_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_lock_ttl_secs)
    }

    /// Whether JSON log output was requested.
    #[must_use]
    pub fn json_logs(&self) -> bool {
        self.log_format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}
