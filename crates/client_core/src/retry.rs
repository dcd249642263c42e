//! Bounded periodic retry with a caller-supplied terminal action.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Result;
use shared::protocol::{any_error_flagged, ErrorFlagged};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRY_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherPhase {
    Idle,
    Running,
    Succeeded,
    Cancelled,
    /// Terminal action fired; the fetcher refuses further runs.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Started,
    AlreadyRunning,
    Exhausted,
}

struct FetcherState {
    phase: FetcherPhase,
    retry: Option<RetryState>,
    task: Option<JoinHandle<()>>,
}

/// Owns at most one retry loop. Dropping the fetcher cancels it.
pub struct ResilientFetcher {
    name: &'static str,
    policy: RetryPolicy,
    state: Arc<Mutex<FetcherState>>,
}

impl ResilientFetcher {
    pub fn new(name: &'static str, policy: RetryPolicy) -> Self {
        Self {
            name,
            policy,
            state: Arc::new(Mutex::new(FetcherState {
                phase: FetcherPhase::Idle,
                retry: None,
                task: None,
            })),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn phase(&self) -> FetcherPhase {
        lock(&self.state).phase
    }

    pub fn retry_state(&self) -> Option<RetryState> {
        lock(&self.state).retry
    }

    /// Starts the retry loop on the current tokio runtime.
    ///
    /// A failed call, or a result carrying an `ERRO` row, counts as one failed
    /// attempt and schedules another call after `policy.interval`. The
    /// `policy.max_attempts`-th failed attempt runs `on_terminal_failure` once
    /// instead, and the fetcher stays exhausted.
    pub fn run<T, Op, Fut, S, X>(
        &self,
        operation: Op,
        on_success: S,
        on_terminal_failure: X,
    ) -> RunOutcome
    where
        T: ErrorFlagged + Send + 'static,
        Op: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
        S: FnOnce(Vec<T>) + Send + 'static,
        X: FnOnce() + Send + 'static,
    {
        let mut guard = lock(&self.state);
        match guard.phase {
            FetcherPhase::Running => {
                info!(fetcher = self.name, "retry loop already active; ignoring run");
                return RunOutcome::AlreadyRunning;
            }
            FetcherPhase::Exhausted => {
                warn!(fetcher = self.name, "fetcher exhausted; ignoring run");
                return RunOutcome::Exhausted;
            }
            FetcherPhase::Idle | FetcherPhase::Succeeded | FetcherPhase::Cancelled => {}
        }

        guard.phase = FetcherPhase::Running;
        guard.retry = None;
        guard.task = Some(tokio::spawn(retry_loop(
            self.name,
            self.policy,
            Arc::clone(&self.state),
            operation,
            on_success,
            on_terminal_failure,
        )));
        RunOutcome::Started
    }

    /// Stops any pending retry. Callbacks of a cancelled run never fire.
    pub fn cancel(&self) {
        let mut guard = lock(&self.state);
        if let Some(task) = guard.task.take() {
            task.abort();
        }
        guard.retry = None;
        if guard.phase == FetcherPhase::Running {
            info!(fetcher = self.name, "retry loop cancelled");
            guard.phase = FetcherPhase::Cancelled;
        }
    }
}

impl Drop for ResilientFetcher {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn retry_loop<T, Op, Fut, S, X>(
    name: &'static str,
    policy: RetryPolicy,
    state: Arc<Mutex<FetcherState>>,
    mut operation: Op,
    on_success: S,
    on_terminal_failure: X,
) where
    T: ErrorFlagged + Send + 'static,
    Op: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    S: FnOnce(Vec<T>) + Send + 'static,
    X: FnOnce() + Send + 'static,
{
    let mut failures = 0;
    loop {
        let failure = match operation().await {
            Ok(rows) if !any_error_flagged(&rows) => {
                settle(&state, FetcherPhase::Succeeded);
                info!(fetcher = name, failures, "resilient fetch succeeded");
                on_success(rows);
                return;
            }
            Ok(_) => "response carried an error flag".to_string(),
            Err(err) => format!("{err:#}"),
        };

        failures += 1;
        if failures >= policy.max_attempts {
            settle(&state, FetcherPhase::Exhausted);
            error!(
                fetcher = name,
                max_attempts = policy.max_attempts,
                error = %failure,
                "resilient fetch exhausted retries"
            );
            on_terminal_failure();
            return;
        }

        lock(&state).retry = Some(RetryState {
            attempt: failures,
            max_attempts: policy.max_attempts,
            interval: policy.interval,
        });
        warn!(
            fetcher = name,
            attempt = failures,
            max_attempts = policy.max_attempts,
            error = %failure,
            "resilient fetch failed; retry scheduled"
        );
        tokio::time::sleep(policy.interval).await;
    }
}

fn settle(state: &Mutex<FetcherState>, phase: FetcherPhase) {
    let mut guard = lock(state);
    guard.phase = phase;
    guard.retry = None;
    guard.task = None;
}

fn lock(state: &Mutex<FetcherState>) -> MutexGuard<'_, FetcherState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[path = "tests/retry_tests.rs"]
mod tests;
