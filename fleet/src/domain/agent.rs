//! Agent identity: one pool slot bound to a name, tags and a config key.
//!
//! Pure values only. Instances are built once per invocation and shared
//! read-only across the pool's concurrent tasks.

use fleet_common::{AgentRecord, agent_config_key};

/// Tags every agent carries before its own tags.
pub const BASE_TAGS: &[&str] = &["aws", "serverless", "codebuild"];

/// Tag prefix routing an agent to a queue.
pub const QUEUE_TAG_PREFIX: &str = "queue=";

/// Where the pool runs; shared by every agent it drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetEnvironment {
    pub name: String,
    pub number: String,
    pub region: Option<String>,
}

/// One agent identity bound to a pool slot.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInstance {
    record: AgentRecord,
    tags: Vec<String>,
    config_key: String,
}

impl AgentInstance {
    /// Bind a persisted record to this environment.
    ///
    /// The record's tags are normalised with [`agent_tags`]; the stored
    /// record itself is left untouched.
    #[must_use]
    pub fn from_record(env: &FleetEnvironment, record: AgentRecord) -> Self {
        let tags = agent_tags(&record.tags, env.region.as_deref(), &env.name);
        let config_key = agent_config_key(&env.name, &env.number, &record.name);
        Self {
            record,
            tags,
            config_key,
        }
    }

    /// Derive a fresh identity for `slot` when no records exist yet.
    #[must_use]
    pub fn from_slot(env: &FleetEnvironment, prefix: &str, slot: usize) -> Self {
        let record = AgentRecord {
            name: slot_agent_name(prefix, env, slot),
            ..AgentRecord::default()
        };
        Self::from_record(env, record)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.record.name
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Parameter path of this agent's registered configuration.
    #[must_use]
    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    /// Downstream build project this agent's jobs run in, if any.
    #[must_use]
    pub fn project_hint(&self) -> Option<&str> {
        self.record.build_project.as_deref()
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.record.is_registered()
    }

    /// The persisted record this instance was built from.
    #[must_use]
    pub fn record(&self) -> &AgentRecord {
        &self.record
    }
}

/// Deterministic name of the agent occupying `slot`.
///
/// Format: `{prefix}-{env name}-{env number}-{slot}`
#[must_use]
pub fn slot_agent_name(prefix: &str, env: &FleetEnvironment, slot: usize) -> String {
    format!("{prefix}-{}-{}-{slot}", env.name, env.number)
}

/// Normalise an agent's tags for registration.
///
/// Order: [`BASE_TAGS`], the region (when known), the agent's own tags minus
/// any `queue=` tag, then `queue={environment}`. Duplicates keep their first
/// position.
#[must_use]
pub fn agent_tags(own: &[String], region: Option<&str>, environment: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::with_capacity(BASE_TAGS.len() + own.len() + 2);
    let candidates = BASE_TAGS
        .iter()
        .map(|t| (*t).to_string())
        .chain(region.filter(|r| !r.is_empty()).map(str::to_string))
        .chain(
            own.iter()
                .filter(|t| !t.starts_with(QUEUE_TAG_PREFIX) && !t.is_empty())
                .cloned(),
        )
        .chain(std::iter::once(format!("{QUEUE_TAG_PREFIX}{environment}")));

    for tag in candidates {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
