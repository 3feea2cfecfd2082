/// Agent directory key prefixes (Valkey)
pub mod directory {
    /// Persisted agent identities
    /// Format: fleet:agent:{agent_name}
    /// Value: JSON-serialized AgentRecord
    /// TTL: None (records live until removed by an operator)
    pub const AGENT: &str = "fleet:agent:";

    /// Per-agent exclusivity locks
    /// Format: fleet:lock:{agent_name}
    /// Value: random owner token of the invocation holding the lock
    /// TTL: agent lock TTL, renewed on every poll round
    pub const LOCK: &str = "fleet:lock:";
}

/// Suffix of the shared registration secret under `/{env}/{number}/`.
pub const REGISTRATION_SECRET: &str = "buildkite-agent-key";

/// Build the parameter path holding the pool's shared registration token.
///
/// Format: `/{environment_name}/{environment_number}/buildkite-agent-key`
#[must_use]
pub fn registration_secret_key(environment_name: &str, environment_number: &str) -> String {
    format!("/{environment_name}/{environment_number}/{REGISTRATION_SECRET}")
}

/// Build the parameter path holding one agent's registered configuration
/// (access token included).
///
/// Format: `/{environment_name}/{environment_number}/{agent_name}`
#[must_use]
pub fn agent_config_key(environment_name: &str, environment_number: &str, agent_name: &str) -> String {
    format!("/{environment_name}/{environment_number}/{agent_name}")
}

/// Build the directory key for an agent record.
#[must_use]
pub fn agent_record_key(agent_name: &str) -> String {
    format!("{}{agent_name}", directory::AGENT)
}

/// Build the directory key for an agent lock.
#[must_use]
pub fn agent_lock_key(agent_name: &str) -> String {
    format!("{}{agent_name}", directory::LOCK)
}

/// Strip the record prefix from a directory key, returning the agent name.
#[must_use]
pub fn agent_name_from_record_key(key: &str) -> Option<&str> {
    key.strip_prefix(directory::AGENT).filter(|n| !n.is_empty())
}
