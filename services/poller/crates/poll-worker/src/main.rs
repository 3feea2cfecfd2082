//! Poll worker entry point.
//!
//! Initialises tracing, loads configuration from `FLEET_*` environment
//! variables, wires the production adapters and runs one invocation:
//! register every agent, poll until the invocation deadline, then release
//! the agents.

use std::sync::Arc;

use agent_fleet::application::ports::{
    AgentDirectory, ExecutionTracker, JobQueueClient, SecretStore, WorkflowEngine,
};
use agent_fleet::application::services::{
    AgentPool, ParameterCache, PoolDeps, PoolSettings, WorkflowExecutionTracker, run_poll_loop,
};
use agent_fleet::domain::agent::FleetEnvironment;
use agent_fleet::infra::aws::load_sdk_config;
use agent_fleet::infra::job_queue::DEFAULT_REQUEST_TIMEOUT;
use agent_fleet::infra::{
    HttpJobQueueClient, SsmSecretStore, StepFunctionsEngine, TlsFiles, ValkeyAgentDirectory,
    ValkeySettings,
};
use anyhow::{Context, Result};
use fleet_common::config::ENV_PREFIX;
use fleet_common::{BuildInfo, FleetConfig};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// Build label baked in at compile time, `dev` otherwise.
const BUILD: &str = match option_env!("FLEET_BUILD") {
    Some(build) => build,
    None => "dev",
};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Valkey settings; mTLS only when all three certificate paths are set.
fn valkey_settings(config: &FleetConfig, password: Option<String>) -> ValkeySettings {
    let tls = match (
        &config.valkey_ca,
        &config.valkey_client_cert,
        &config.valkey_client_key,
    ) {
        (Some(ca), Some(cert), Some(key)) => Some(TlsFiles {
            ca: ca.clone(),
            client_cert: cert.clone(),
            client_key: key.clone(),
        }),
        _ => None,
    };
    ValkeySettings {
        url: config.valkey_url.clone(),
        user: config.valkey_user.clone(),
        password,
        tls,
    }
}

fn read_password(config: &FleetConfig) -> Result<Option<String>> {
    config
        .valkey_pass_file
        .as_deref()
        .map(|path| {
            std::fs::read_to_string(path)
                .map(|p| p.trim().to_string())
                .with_context(|| format!("failed to read password from {path}"))
        })
        .transpose()
}

async fn build_deps(config: &FleetConfig) -> Result<PoolDeps> {
    let sdk = load_sdk_config(config.aws_region.as_deref()).await;

    let store: Arc<dyn SecretStore> = Arc::new(SsmSecretStore::from_conf(&sdk));
    let engine: Arc<dyn WorkflowEngine> = Arc::new(StepFunctionsEngine::from_conf(&sdk));
    let tracker: Arc<dyn ExecutionTracker> = Arc::new(WorkflowExecutionTracker::new(
        engine,
        config.workflow_definition_arn.clone(),
    ));

    let build = BuildInfo::for_host(env!("CARGO_PKG_VERSION"), BUILD);
    let queue: Arc<dyn JobQueueClient> = Arc::new(
        HttpJobQueueClient::new(config.queue_endpoint.clone(), build, DEFAULT_REQUEST_TIMEOUT)
            .context("failed to create job queue client")?,
    );

    let password = read_password(config)?;
    let directory: Arc<dyn AgentDirectory> = Arc::new(
        ValkeyAgentDirectory::connect(&valkey_settings(config, password))
            .await
            .context("failed to connect agent directory")?,
    );

    Ok(PoolDeps {
        queue,
        cache: Arc::new(ParameterCache::new(store, config.param_cache_ttl())),
        tracker,
        directory,
    })
}

async fn run_invocation(config: &FleetConfig, deps: PoolDeps) -> Result<()> {
    let invocation_deadline = Instant::now() + config.invocation_timeout();
    let round_deadline = invocation_deadline
        .checked_sub(config.deadline_margin())
        .unwrap_or_else(Instant::now);

    let settings = PoolSettings {
        environment: FleetEnvironment {
            name: config.environment_name.clone(),
            number: config.environment_number.clone(),
            region: config.aws_region.clone(),
        },
        pool_size: config.pool_size,
        agent_name_prefix: config.agent_name_prefix.clone(),
        lock_ttl: config.agent_lock_ttl(),
    };
    let pool = AgentPool::load(deps, settings)
        .await
        .context("failed to load agent pool")?;

    let registered = pool.register_agents(round_deadline).await;
    if registered.is_ok() {
        let rounds = run_poll_loop(
            &pool,
            invocation_deadline,
            config.deadline_margin(),
            config.poll_interval(),
        )
        .await;
        tracing::info!(rounds, "poll loop finished");
    }

    if let Err(err) = pool.cleanup_agents(invocation_deadline).await {
        tracing::warn!(operation = %err.operation(), error = %err, "cleanup did not complete");
    }

    registered.context("agent registration failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    let config: FleetConfig = envy::prefixed(ENV_PREFIX)
        .from_env()
        .context("failed to load config from FLEET_* env vars")?;

    init_tracing(config.json_logs());
    config.validate().context("invalid configuration")?;

    tracing::info!(
        environment = %config.environment_name,
        number = %config.environment_number,
        pool_size = config.pool_size,
        queue_endpoint = %config.queue_endpoint,
        valkey_url = %config.valkey_url,
        "poll-worker starting"
    );

    let deps = build_deps(&config).await?;
    run_invocation(&config, deps).await?;

    tracing::info!("poll-worker finished");
    Ok(())
}
