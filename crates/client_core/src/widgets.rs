//! Capacity and allowed-services widgets backed by a [`ResilientFetcher`].
//!
//! Both keep retrying quietly and, once retries run out, hand control to their
//! terminal action, which ends the session unless the host replaces it.

use std::{future::Future, sync::Arc};

use anyhow::Result;
use shared::protocol::{AllowedServiceRow, CapacitySnapshotRow, ErrorFlagged};
use tokio::sync::watch;

use crate::{
    logout_on_exhaustion,
    retry::{FetcherPhase, ResilientFetcher, RetryPolicy, RunOutcome},
    ClubBackend, SessionContext,
};

type TerminalAction = Arc<dyn Fn() + Send + Sync>;

struct Monitor<T> {
    fetcher: ResilientFetcher,
    latest: Arc<watch::Sender<Option<Vec<T>>>>,
    terminal: TerminalAction,
}

impl<T> Monitor<T>
where
    T: ErrorFlagged + Clone + Send + Sync + 'static,
{
    fn new(name: &'static str, policy: RetryPolicy, terminal: TerminalAction) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            fetcher: ResilientFetcher::new(name, policy),
            latest: Arc::new(latest),
            terminal,
        }
    }

    fn refresh<Op, Fut>(&self, operation: Op, shape: fn(Vec<T>) -> Vec<T>) -> RunOutcome
    where
        Op: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        let latest = Arc::clone(&self.latest);
        let terminal = Arc::clone(&self.terminal);
        self.fetcher.run(
            operation,
            move |rows| {
                latest.send_replace(Some(shape(rows)));
            },
            move || terminal(),
        )
    }
}

pub struct CapacityMonitor {
    backend: Arc<dyn ClubBackend>,
    monitor: Monitor<CapacitySnapshotRow>,
}

impl CapacityMonitor {
    pub fn new(
        backend: Arc<dyn ClubBackend>,
        session: Arc<dyn SessionContext>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            monitor: Monitor::new(
                "capacity_snapshot",
                policy,
                Arc::new(logout_on_exhaustion(session)),
            ),
        }
    }

    pub fn with_terminal_action(mut self, action: impl Fn() + Send + Sync + 'static) -> Self {
        self.monitor.terminal = Arc::new(action);
        self
    }

    pub fn refresh(&self) -> RunOutcome {
        let backend = Arc::clone(&self.backend);
        self.monitor.refresh(
            move || {
                let backend = Arc::clone(&backend);
                async move { backend.list_capacity_snapshot().await }
            },
            |rows| rows,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Vec<CapacitySnapshotRow>>> {
        self.monitor.latest.subscribe()
    }

    pub fn latest(&self) -> Option<Vec<CapacitySnapshotRow>> {
        self.monitor.latest.borrow().clone()
    }

    pub fn phase(&self) -> FetcherPhase {
        self.monitor.fetcher.phase()
    }

    pub fn cancel(&self) {
        self.monitor.fetcher.cancel();
    }
}

pub struct AllowedServicesMonitor {
    backend: Arc<dyn ClubBackend>,
    monitor: Monitor<AllowedServiceRow>,
}

impl AllowedServicesMonitor {
    pub fn new(
        backend: Arc<dyn ClubBackend>,
        session: Arc<dyn SessionContext>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            monitor: Monitor::new(
                "allowed_services",
                policy,
                Arc::new(logout_on_exhaustion(session)),
            ),
        }
    }

    pub fn with_terminal_action(mut self, action: impl Fn() + Send + Sync + 'static) -> Self {
        self.monitor.terminal = Arc::new(action);
        self
    }

    pub fn refresh(&self) -> RunOutcome {
        let backend = Arc::clone(&self.backend);
        self.monitor.refresh(
            move || {
                let backend = Arc::clone(&backend);
                async move { backend.list_allowed_services().await }
            },
            order_services,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Vec<AllowedServiceRow>>> {
        self.monitor.latest.subscribe()
    }

    pub fn latest(&self) -> Option<Vec<AllowedServiceRow>> {
        self.monitor.latest.borrow().clone()
    }

    pub fn phase(&self) -> FetcherPhase {
        self.monitor.fetcher.phase()
    }

    pub fn cancel(&self) {
        self.monitor.fetcher.cancel();
    }
}

fn order_services(mut rows: Vec<AllowedServiceRow>) -> Vec<AllowedServiceRow> {
    rows.sort_by_key(|row| row.order);
    rows
}

#[cfg(test)]
#[path = "tests/widgets_tests.rs"]
mod tests;
