//! Application service: concurrent register / poll / cleanup rounds.
//!
//! Each round spawns one task per agent. Every task sends exactly one
//! [`AgentResult`] into a channel sized to the pool, so a task that outlives
//! its round never blocks on the send. The coordinator races the results
//! against the round deadline:
//!
//! - the first failed agent aborts the round with [`PoolError::Agent`]
//! - an elapsed deadline aborts it with [`PoolError::Timeout`]
//!
//! Abandoned tasks are not cancelled; they run until they finish or their
//! own network calls time out. Each agent's task holds that agent's
//! in-flight guard until it ends, and a round skips any agent whose guard is
//! still held. So at most one task per agent runs at any time, and cleanup
//! leaves the lock of a still-running agent to expire instead of releasing it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use fleet_common::{
    BuildWorkflowData, CANCELED_EXIT_STATUS, RegisteredAgent, WorkflowData,
    registration_secret_key,
};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;

use crate::application::ports::{AgentDirectory, AgentLock, ExecutionTracker, JobQueueClient};
use crate::application::services::parameter_cache::ParameterCache;
use crate::domain::agent::{AgentInstance, FleetEnvironment};
use crate::domain::error::{AgentError, PoolError};
use crate::domain::pool::{AgentResult, PollOutcome, PoolOperation};

/// Collaborators shared by every agent task.
#[derive(Clone)]
pub struct PoolDeps {
    pub queue: Arc<dyn JobQueueClient>,
    pub cache: Arc<ParameterCache>,
    pub tracker: Arc<dyn ExecutionTracker>,
    pub directory: Arc<dyn AgentDirectory>,
}

/// How the pool is sized and named.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub environment: FleetEnvironment,
    /// Identities seeded when the directory is empty.
    pub pool_size: usize,
    pub agent_name_prefix: String,
    pub lock_ttl: Duration,
}

struct PoolContext {
    deps: PoolDeps,
    registration_key: String,
}

struct PoolMember {
    instance: AgentInstance,
    lock: Box<dyn AgentLock>,
    /// Held by the agent's running task.
    in_flight: Arc<Mutex<()>>,
}

pub struct AgentPool {
    ctx: Arc<PoolContext>,
    members: Vec<Arc<PoolMember>>,
}

impl AgentPool {
    /// Load every agent identity from the directory and lock it for this
    /// invocation.
    ///
    /// An empty directory is seeded with `pool_size` slot-derived
    /// identities. Identities locked by another invocation are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or written, or a
    /// lock cannot be attempted.
    pub async fn load(deps: PoolDeps, settings: PoolSettings) -> Result<Self> {
        let env = &settings.environment;
        let mut records = deps
            .directory
            .list()
            .await
            .context("failed to list agents")?;

        if records.is_empty() {
            tracing::info!(pool_size = settings.pool_size, "agent directory empty, seeding");
            for slot in 1..=settings.pool_size {
                let seeded = AgentInstance::from_slot(env, &settings.agent_name_prefix, slot);
                let stored = deps
                    .directory
                    .create_or_update(seeded.record().clone())
                    .await
                    .with_context(|| format!("failed to seed agent {}", seeded.name()))?;
                records.push(stored);
            }
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));

        let mut members = Vec::with_capacity(records.len());
        for record in records {
            let instance = AgentInstance::from_record(env, record);
            let lock = deps.directory.new_lock(instance.name(), settings.lock_ttl);
            let acquired = lock
                .acquire()
                .await
                .with_context(|| format!("failed to lock agent {}", instance.name()))?;
            if acquired {
                members.push(Arc::new(PoolMember {
                    instance,
                    lock,
                    in_flight: Arc::new(Mutex::new(())),
                }));
            } else {
                tracing::info!(agent = instance.name(), "agent locked by another invocation, skipping");
            }
        }

        tracing::info!(agents = members.len(), "agent pool loaded");
        Ok(Self {
            ctx: Arc::new(PoolContext {
                deps,
                registration_key: registration_secret_key(&env.name, &env.number),
            }),
            members,
        })
    }

    /// The agents this pool drives, in name order.
    pub fn agents(&self) -> impl Iterator<Item = &AgentInstance> {
        self.members.iter().map(|m| &m.instance)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Register every agent not yet known to the job queue.
    ///
    /// # Errors
    ///
    /// Returns the first agent failure, or a timeout if `deadline` passes
    /// before every agent reports.
    pub async fn register_agents(&self, deadline: Instant) -> Result<(), PoolError> {
        self.run_round(PoolOperation::Register, deadline, (), register_agent)
            .await
            .map(drop)
    }

    /// Heartbeat, ping and, when free, take one job per agent.
    ///
    /// Returns the branch each agent reached. An agent whose task from an
    /// earlier round is still running reports [`PollOutcome::InFlight`].
    ///
    /// # Errors
    ///
    /// Returns the first agent failure, or a timeout if `deadline` passes
    /// before every agent reports.
    pub async fn poll_agents(
        &self,
        deadline: Instant,
    ) -> Result<Vec<(String, PollOutcome)>, PoolError> {
        self.run_round(PoolOperation::Poll, deadline, PollOutcome::InFlight, poll_agent)
            .await
    }

    /// Release every agent lock. Release failures are logged, not returned.
    ///
    /// The lock of an agent whose task is still running is kept; it expires
    /// with its TTL.
    ///
    /// # Errors
    ///
    /// Returns a timeout if `deadline` passes before every agent reports.
    pub async fn cleanup_agents(&self, deadline: Instant) -> Result<(), PoolError> {
        self.run_round(PoolOperation::Cleanup, deadline, (), cleanup_agent)
            .await
            .map(drop)
    }

    async fn run_round<T, F, Fut>(
        &self,
        operation: PoolOperation,
        deadline: Instant,
        in_flight: T,
        task: F,
    ) -> Result<Vec<(String, T)>, PoolError>
    where
        T: Clone + Send + 'static,
        F: Fn(Arc<PoolContext>, Arc<PoolMember>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let expected = self.members.len();
        if Instant::now() >= deadline {
            tracing::warn!(%operation, "deadline passed before dispatch");
            return Err(PoolError::Timeout {
                operation,
                reported: 0,
                expected,
            });
        }

        let mut results = Vec::with_capacity(expected);
        let (tx, mut rx) = mpsc::channel(expected.max(1));
        for member in &self.members {
            let agent_name = member.instance.name().to_string();
            let Ok(guard) = Arc::clone(&member.in_flight).try_lock_owned() else {
                tracing::warn!(
                    agent = %agent_name,
                    %operation,
                    "previous task still running, agent skipped"
                );
                results.push((agent_name, in_flight.clone()));
                continue;
            };
            let tx = tx.clone();
            let fut = task(Arc::clone(&self.ctx), Arc::clone(member));
            tokio::spawn(async move {
                let result = fut.await;
                drop(guard);
                // The receiver is gone once the round gave up on this task.
                let _ = tx.send(AgentResult { agent_name, result }).await;
            });
        }
        drop(tx);

        let timeout = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout);

        while results.len() < expected {
            tokio::select! {
                () = &mut timeout => {
                    tracing::warn!(
                        %operation,
                        reported = results.len(),
                        expected,
                        "deadline elapsed before every agent reported"
                    );
                    return Err(PoolError::Timeout {
                        operation,
                        reported: results.len(),
                        expected,
                    });
                }
                message = rx.recv() => match message {
                    Some(AgentResult { agent_name, result: Ok(value) }) => {
                        results.push((agent_name, value));
                    }
                    Some(AgentResult { agent_name, result: Err(source) }) => {
                        tracing::error!(
                            agent = %agent_name,
                            %operation,
                            error = %format!("{source:#}"),
                            "agent task failed"
                        );
                        return Err(PoolError::Agent {
                            operation,
                            agent: agent_name,
                            source,
                        });
                    }
                    None => {
                        let missing = expected - results.len();
                        tracing::error!(%operation, missing, "agent tasks ended without reporting");
                        return Err(PoolError::TaskLost { operation, missing });
                    }
                },
            }
        }
        Ok(results)
    }
}

async fn register_agent(ctx: Arc<PoolContext>, member: Arc<PoolMember>) -> Result<()> {
    let deps = &ctx.deps;
    let instance = &member.instance;

    let secret = deps
        .cache
        .get_key(&ctx.registration_key, true)
        .await
        .context("failed to load registration secret")?;

    if instance.is_registered() {
        tracing::debug!(agent = instance.name(), "agent already registered");
        return Ok(());
    }

    let config = deps
        .queue
        .register(instance.name(), &secret, instance.tags())
        .await
        .context("failed to register agent")?;

    let encoded =
        serde_json::to_string(&config).context("failed to encode agent configuration")?;
    deps.cache
        .put_key(instance.config_key(), &encoded, true)
        .await
        .context("failed to persist agent configuration")?;

    let mut record = instance.record().clone();
    record.agent_id = Some(config.id.clone());
    record.modified = Some(Utc::now());
    deps.directory
        .create_or_update(record)
        .await
        .context("failed to save agent record")?;

    tracing::info!(agent = instance.name(), agent_id = %config.id, "agent registered");
    Ok(())
}

async fn poll_agent(ctx: Arc<PoolContext>, member: Arc<PoolMember>) -> Result<PollOutcome> {
    let deps = &ctx.deps;
    let instance = &member.instance;
    let name = instance.name();

    let raw = deps
        .cache
        .get_key(instance.config_key(), true)
        .await
        .with_context(|| AgentError::NotRegistered(name.to_string()))?;
    let config: RegisteredAgent =
        serde_json::from_str(&raw).context("failed to decode agent configuration")?;
    let token = config.access_token.as_str();

    if !member
        .lock
        .renew()
        .await
        .context("failed to renew agent lock")?
    {
        return Err(AgentError::LockLost(name.to_string()).into());
    }

    let beat = deps
        .queue
        .beat(token)
        .await
        .context("failed to send heartbeat")?;
    tracing::debug!(
        agent = name,
        sent_at = beat.sent_at.as_deref().unwrap_or_default(),
        received_at = beat.received_at.as_deref().unwrap_or_default(),
        "heartbeat"
    );

    let ping = deps.queue.ping(token).await.context("failed to ping")?;
    tracing::info!(
        agent = name,
        action = ping.action.as_deref().unwrap_or_default(),
        message = ping.message.as_deref().unwrap_or_default(),
        "ping"
    );

    let Some(mut job) = ping.job else {
        return Ok(PollOutcome::Idle);
    };
    tracing::info!(agent = name, job_id = %job.id, state = job.state.as_deref().unwrap_or_default(), "job received");

    if job.is_canceling() {
        job.finished_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true));
        job.exit_status = Some(CANCELED_EXIT_STATUS.to_string());
        deps.queue
            .finish_job(token, &job)
            .await
            .context("failed to finish canceling job")?;
        return Ok(PollOutcome::CanceledJobFinished { job_id: job.id });
    }

    let running = deps
        .tracker
        .running_for_agent(name)
        .await
        .context("failed to count running executions")?;
    if running >= 1 {
        tracing::info!(agent = name, running, "execution in progress, not accepting job");
        return Ok(PollOutcome::Busy { running });
    }

    let accepted = deps
        .queue
        .accept_job(token, &job)
        .await
        .context("failed to accept job")?;

    let payload = WorkflowData {
        job: accepted.clone(),
        agent_name: name.to_string(),
        build: BuildWorkflowData {
            project_name: instance.project_hint().map(str::to_string),
        },
    };
    let input = serde_json::to_string(&payload).context("failed to encode workflow input")?;

    let execution = deps
        .tracker
        .start_execution(name, &accepted, &input)
        .await
        .context("failed to start execution")?;

    Ok(PollOutcome::Accepted {
        job_id: accepted.id,
        execution,
    })
}

async fn cleanup_agent(_ctx: Arc<PoolContext>, member: Arc<PoolMember>) -> Result<()> {
    let name = member.instance.name();
    match member.lock.release().await {
        Ok(()) => tracing::debug!(agent = name, "agent lock released"),
        Err(err) => tracing::warn!(
            agent = name,
            error = %format!("{err:#}"),
            "failed to release agent lock"
        ),
    }
    Ok(())
}
