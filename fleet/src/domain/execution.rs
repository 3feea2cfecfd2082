//! Workflow execution naming.
//!
//! An execution is identified only by its name:
//! `{pipeline slug}_{agent name}_{timestamp}`. Both variable segments are
//! truncated so the name always fits the engine's limit, and `_` is reserved
//! as the segment delimiter so an agent's segment can be matched exactly.

use chrono::{DateTime, Utc};

/// Longest execution name the workflow engine accepts.
pub const MAX_EXECUTION_NAME_LEN: usize = 80;

/// Maximum characters kept from the pipeline slug.
pub const MAX_SLUG_SEGMENT_LEN: usize = 30;

/// Maximum characters kept from the agent name.
pub const MAX_AGENT_SEGMENT_LEN: usize = 30;

/// Sortable UTC timestamp with second granularity and no `:`.
pub const EXECUTION_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H%M%SZ";

/// Rendered length of [`EXECUTION_TIMESTAMP_FORMAT`].
pub const EXECUTION_TIMESTAMP_LEN: usize = 18;

/// Slug used when a job carries no pipeline slug.
pub const UNKNOWN_PIPELINE_SLUG: &str = "unknown";

const SEGMENT_DELIMITER: char = '_';
const DELIMITER_REPLACEMENT: char = '-';

// Worst case must fit: two full segments, two delimiters and the timestamp.
const _: () = assert!(
    MAX_SLUG_SEGMENT_LEN + MAX_AGENT_SEGMENT_LEN + 2 + EXECUTION_TIMESTAMP_LEN
        <= MAX_EXECUTION_NAME_LEN
);

fn segment(raw: &str, max: usize) -> String {
    raw.chars()
        .map(|c| {
            if c == SEGMENT_DELIMITER {
                DELIMITER_REPLACEMENT
            } else {
                c
            }
        })
        .take(max)
        .collect()
}

/// The agent's segment as it appears inside execution names.
#[must_use]
pub fn agent_segment(agent_name: &str) -> String {
    segment(agent_name, MAX_AGENT_SEGMENT_LEN)
}

/// Build the execution name for a job accepted by `agent_name` at `at`.
#[must_use]
pub fn execution_name(pipeline_slug: Option<&str>, agent_name: &str, at: DateTime<Utc>) -> String {
    let slug = pipeline_slug
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_PIPELINE_SLUG);
    format!(
        "{}{SEGMENT_DELIMITER}{}{SEGMENT_DELIMITER}{}",
        segment(slug, MAX_SLUG_SEGMENT_LEN),
        agent_segment(agent_name),
        at.format(EXECUTION_TIMESTAMP_FORMAT)
    )
}

/// Whether `execution` was started for `agent_name`.
///
/// Matches the delimiter-bounded segment, so `agent-1` never matches an
/// execution of `agent-12`.
#[must_use]
pub fn matches_agent(execution: &str, agent_name: &str) -> bool {
    let needle = format!(
        "{SEGMENT_DELIMITER}{}{SEGMENT_DELIMITER}",
        agent_segment(agent_name)
    );
    execution.contains(&needle)
}
