//! Background agents.
//!
//! Each agent is a tokio task ticking on its own interval and posting one
//! command per tick through a [`FabricHandle`]:
//!
//! | Agent           | Command                    |
//! |-----------------|----------------------------|
//! | dead-node sweep | `sweep_dead_nodes` (retried) |
//! | reaper          | `reap_containers`          |
//! | reassignment    | `reassign_users`           |
//! | user sweep      | `sweep_inactive_users`     |
//! | execution       | lease, execute, complete   |
//! | auto-migration  | `auto_migrate`             |
//!
//! A failed tick is logged and followed by a fixed backoff. Agents stop when
//! the shared running flag is cleared or the actor goes away.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{AgentConfig, secs};
use crate::error::Result;
use crate::executor::FunctionExecutor;
use crate::handle::FabricHandle;

/// What the execution agent invokes.
#[derive(Debug, Clone)]
pub struct ExecutionDriver {
    /// Runs the leased invocations.
    pub executor: Arc<dyn FunctionExecutor>,
    /// Function name.
    pub function: String,
    /// Image for new containers.
    pub image: String,
}

/// Shared stop signal of a group of agents.
#[derive(Debug, Clone, Default)]
struct StopSignal {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl StopSignal {
    fn started() -> Self {
        let signal = Self::default();
        signal.running.store(true, Ordering::SeqCst);
        signal
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
    }
}

/// Handle to a running set of agents.
#[derive(Debug)]
pub struct AgentSet {
    signal: StopSignal,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl AgentSet {
    /// Starts the always-on agents, plus the execution agent when a driver
    /// is given.
    #[must_use]
    pub fn spawn(
        handle: &FabricHandle,
        config: &AgentConfig,
        execution: Option<ExecutionDriver>,
    ) -> Self {
        let signal = StopSignal::started();
        let backoff = secs(config.error_backoff_secs);
        let mut tasks = Vec::new();

        let attempts = config.dead_node_sweep_attempts.max(1);
        let h = handle.clone();
        tasks.push(spawn_agent(
            "dead-node-sweep",
            secs(config.dead_node_sweep_secs),
            backoff,
            signal.clone(),
            move || {
                let h = h.clone();
                async move { sweep_with_retry(&h, attempts, backoff).await }
            },
        ));

        let h = handle.clone();
        tasks.push(spawn_agent(
            "reaper",
            secs(config.reaper_secs),
            backoff,
            signal.clone(),
            move || {
                let h = h.clone();
                async move {
                    let reaped = h.reap_containers().await?;
                    if reaped > 0 {
                        debug!(reaped, "warm containers reaped");
                    }
                    Ok(())
                }
            },
        ));

        let h = handle.clone();
        tasks.push(spawn_agent(
            "reassignment",
            secs(config.reassign_secs),
            backoff,
            signal.clone(),
            move || {
                let h = h.clone();
                async move {
                    for handoff in h.reassign_users().await? {
                        debug!(
                            user = %handoff.user_id,
                            from = %handoff.from,
                            to = %handoff.to,
                            improvement = handoff.improvement,
                            "user handed off"
                        );
                    }
                    Ok(())
                }
            },
        ));

        let h = handle.clone();
        tasks.push(spawn_agent(
            "user-sweep",
            secs(config.user_sweep_secs),
            backoff,
            signal.clone(),
            move || {
                let h = h.clone();
                async move {
                    h.sweep_inactive_users().await?;
                    Ok(())
                }
            },
        ));

        if config.auto_migration {
            let h = handle.clone();
            tasks.push(spawn_agent(
                "auto-migration",
                secs(config.auto_migration_secs),
                backoff,
                signal.clone(),
                move || {
                    let h = h.clone();
                    async move {
                        let report = h.auto_migrate().await?;
                        if report.stranded > 0 {
                            warn!(stranded = report.stranded, "containers left on overloaded nodes");
                        }
                        Ok(())
                    }
                },
            ));
        }

        if let Some(driver) = execution {
            let h = handle.clone();
            let driver = Arc::new(driver);
            tasks.push(spawn_agent(
                "execution",
                secs(config.execution_secs),
                backoff,
                signal.clone(),
                move || {
                    let h = h.clone();
                    let driver = Arc::clone(&driver);
                    async move { drive_executions(&h, &driver).await }
                },
            ));
        }

        info!(agents = tasks.len(), "background agents started");
        Self { signal, tasks }
    }

    /// Names of the running agents.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Whether the agents have been told to keep running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.signal.is_running()
    }

    /// Stops every agent and waits for the tasks to finish.
    pub async fn shutdown(self) {
        self.signal.stop();
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                warn!(agent = name, error = %e, "agent task ended abnormally");
            }
        }
        info!("background agents stopped");
    }
}

/// Runs `tick` every `period` until the signal is cleared.
fn spawn_agent<F, Fut>(
    name: &'static str,
    period: Duration,
    backoff: Duration,
    signal: StopSignal,
    mut tick: F,
) -> (&'static str, JoinHandle<()>)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let woken = signal.wake.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();
            if !signal.is_running() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {}
                () = &mut woken => break,
            }
            if !signal.is_running() {
                break;
            }

            if let Err(e) = tick().await {
                if e.is_fatal() {
                    warn!(agent = name, error = %e, "agent stopping");
                    break;
                }
                warn!(agent = name, error = %e, "agent iteration failed");
                tokio::time::sleep(backoff).await;
            }
        }
        debug!(agent = name, "agent stopped");
    });
    (name, task)
}

async fn sweep_with_retry(handle: &FabricHandle, attempts: u32, backoff: Duration) -> Result<()> {
    let mut attempt = 1;
    loop {
        match handle.sweep_dead_nodes().await {
            Ok(evicted) => {
                for node in &evicted {
                    info!(node = %node, "edge node evicted after missed heartbeats");
                }
                return Ok(());
            }
            Err(e) if e.is_fatal() || attempt >= attempts => return Err(e),
            Err(e) => {
                debug!(attempt, error = %e, "dead-node sweep retrying");
                attempt += 1;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// One round of simulated invocations: lease for every user, execute
/// concurrently, settle each outcome.
async fn drive_executions(handle: &FabricHandle, driver: &ExecutionDriver) -> Result<()> {
    let leases = handle
        .lease_invocations(&driver.function, &driver.image)
        .await?;
    if leases.is_empty() {
        return Ok(());
    }
    let count = leases.len();
    let outcomes = join_all(leases.into_iter().map(|lease| driver.executor.execute(lease))).await;
    for outcome in outcomes {
        handle.complete_invocation(outcome).await?;
    }
    debug!(invocations = count, function = %driver.function, "execution round finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::FabricError;

    #[tokio::test(start_paused = true)]
    async fn test_agent_ticks_until_stopped() {
        let signal = StopSignal::started();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let (_, task) = spawn_agent(
            "counter",
            Duration::from_millis(100),
            Duration::ZERO,
            signal.clone(),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        signal.stop();
        task.await.expect("join");
        let seen = ticks.load(Ordering::SeqCst);
        assert!((3..=4).contains(&seen), "ticks: {seen}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ticks_back_off_and_continue() {
        let signal = StopSignal::started();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let (_, task) = spawn_agent(
            "flaky",
            Duration::from_millis(10),
            Duration::from_millis(100),
            signal.clone(),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(FabricError::Config("boom".to_string()))
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(250)).await;
        signal.stop();
        task.await.expect("join");
        let seen = ticks.load(Ordering::SeqCst);
        assert!((2..=3).contains(&seen), "ticks: {seen}");
    }

    #[tokio::test]
    async fn test_agent_exits_when_actor_is_gone() {
        let signal = StopSignal::started();
        let (_, task) = spawn_agent(
            "orphan",
            Duration::from_millis(1),
            Duration::from_secs(60),
            signal.clone(),
            || async { Err(FabricError::ActorUnavailable) },
        );
        task.await.expect("join");
        assert!(signal.is_running());
    }

    #[tokio::test]
    async fn test_stop_wakes_idle_agents() {
        let signal = StopSignal::started();
        let (_, task) = spawn_agent(
            "idle",
            Duration::from_secs(3600),
            Duration::ZERO,
            signal.clone(),
            || async { Ok(()) },
        );
        tokio::task::yield_now().await;
        signal.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("agent woke up")
            .expect("join");
    }
}
