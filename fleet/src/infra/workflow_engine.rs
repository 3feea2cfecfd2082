//! Step Functions implementation of [`WorkflowEngine`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sfn::Client;
use aws_sdk_sfn::types::ExecutionStatus as SfnStatus;

use crate::application::ports::{ExecutionStatus, ExecutionSummary, WorkflowEngine};

pub struct StepFunctionsEngine {
    client: Client,
}

impl StepFunctionsEngine {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

fn sfn_status(status: ExecutionStatus) -> SfnStatus {
    match status {
        ExecutionStatus::Running => SfnStatus::Running,
        ExecutionStatus::Succeeded => SfnStatus::Succeeded,
        ExecutionStatus::Failed => SfnStatus::Failed,
        ExecutionStatus::TimedOut => SfnStatus::TimedOut,
        ExecutionStatus::Aborted => SfnStatus::Aborted,
    }
}

#[async_trait]
impl WorkflowEngine for StepFunctionsEngine {
    async fn list_executions(
        &self,
        definition_arn: &str,
        status: ExecutionStatus,
    ) -> Result<Vec<ExecutionSummary>> {
        let mut executions = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_executions()
                .state_machine_arn(definition_arn)
                .status_filter(sfn_status(status))
                .set_next_token(next_token.take())
                .send()
                .await
                .context("ListExecutions")?;

            executions.extend(output.executions().iter().map(|e| ExecutionSummary {
                name: e.name().to_string(),
                arn: e.execution_arn().to_string(),
            }));

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }
        Ok(executions)
    }

    async fn start_execution(
        &self,
        definition_arn: &str,
        name: &str,
        input: &str,
    ) -> Result<String> {
        let output = self
            .client
            .start_execution()
            .state_machine_arn(definition_arn)
            .name(name)
            .input(input)
            .send()
            .await
            .context("StartExecution")?;
        Ok(output.execution_arn().to_string())
    }
}
