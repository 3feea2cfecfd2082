//! Application service: repeated poll rounds within one invocation.

use std::time::Duration;

use tokio::time::Instant;

use crate::application::services::agent_pool::AgentPool;

/// Poll until `invocation_deadline - margin`, sleeping `interval` between
/// rounds. A failed round is logged and the loop carries on.
///
/// Returns the number of rounds run.
pub async fn run_poll_loop(
    pool: &AgentPool,
    invocation_deadline: Instant,
    margin: Duration,
    interval: Duration,
) -> usize {
    let deadline = invocation_deadline
        .checked_sub(margin)
        .unwrap_or_else(Instant::now);

    let mut rounds = 0;
    while Instant::now() < deadline {
        rounds += 1;
        let started = Instant::now();
        match pool.poll_agents(deadline).await {
            Ok(outcomes) => {
                for (agent, outcome) in &outcomes {
                    tracing::debug!(agent = %agent, outcome = outcome.label(), "poll outcome");
                }
                tracing::info!(
                    round = rounds,
                    agents = outcomes.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "poll round complete"
                );
            }
            Err(err) => {
                tracing::error!(
                    round = rounds,
                    operation = %err.operation(),
                    timed_out = err.is_timeout(),
                    error = %err,
                    "poll round failed"
                );
            }
        }

        let next = Instant::now() + interval;
        if next >= deadline {
            break;
        }
        tokio::time::sleep_until(next).await;
    }
    rounds
}
