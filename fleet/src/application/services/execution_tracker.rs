//! Application service: per-agent execution tracking over the workflow engine.
//!
//! The engine has no notion of agents; an agent's executions are found by
//! the agent segment encoded in each execution name.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use fleet_common::Job;

use crate::application::ports::{ExecutionStatus, ExecutionTracker, WorkflowEngine};
use crate::domain::execution::{execution_name, matches_agent};

pub struct WorkflowExecutionTracker {
    engine: Arc<dyn WorkflowEngine>,
    definition_arn: String,
}

impl WorkflowExecutionTracker {
    #[must_use]
    pub fn new(engine: Arc<dyn WorkflowEngine>, definition_arn: impl Into<String>) -> Self {
        Self {
            engine,
            definition_arn: definition_arn.into(),
        }
    }
}

#[async_trait]
impl ExecutionTracker for WorkflowExecutionTracker {
    async fn running_for_agent(&self, agent_name: &str) -> Result<usize> {
        let executions = self
            .engine
            .list_executions(&self.definition_arn, ExecutionStatus::Running)
            .await
            .context("failed to list running executions")?;

        let count = executions
            .iter()
            .filter(|e| matches_agent(&e.name, agent_name))
            .count();

        tracing::info!(
            agent = agent_name,
            total = executions.len(),
            running = count,
            "running executions"
        );
        Ok(count)
    }

    async fn start_execution(&self, agent_name: &str, job: &Job, input: &str) -> Result<String> {
        let name = execution_name(job.pipeline_slug(), agent_name, Utc::now());

        let arn = self
            .engine
            .start_execution(&self.definition_arn, &name, input)
            .await
            .with_context(|| format!("failed to start execution {name}"))?;

        tracing::info!(
            agent = agent_name,
            job_id = %job.id,
            execution = %name,
            execution_arn = %arn,
            "started execution"
        );
        Ok(name)
    }
}
