use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Profile, ProfileId},
    protocol::{AllowedServiceRow, AreaFilter, CapacitySnapshotRow, RawActivityRecord},
};
use tracing::warn;

pub mod cache;
pub mod config;
pub mod filter;
pub mod guard;
pub mod http;
pub mod merge;
pub mod orchestrator;
pub mod retry;
pub mod widgets;

pub use cache::{CacheEntry, ProfileScopedCache};
pub use config::{load_settings, ClientSettings, ConfigError};
pub use filter::{apply_filter, CategorySelection, FilterState};
pub use guard::{FetchToken, RequestCancellationGuard};
pub use http::HttpClubBackend;
pub use merge::{merge_scoped, MergeError};
pub use orchestrator::{
    ActivityOrchestrator, OrchestratorError, OrchestratorOptions, ProfileDirectory, ScreenState,
};
pub use retry::{FetcherPhase, ResilientFetcher, RetryPolicy, RunOutcome};
pub use widgets::{AllowedServicesMonitor, CapacityMonitor};

/// Remote operations the club backend exposes to the member app.
#[async_trait]
pub trait ClubBackend: Send + Sync {
    async fn list_profiles(&self, owner_id: &ProfileId) -> Result<Vec<Profile>>;
    async fn list_enrollments(
        &self,
        profile_id: &ProfileId,
        area_filter: AreaFilter,
    ) -> Result<Vec<RawActivityRecord>>;
    async fn list_cancelled_visits(&self, profile_id: &ProfileId)
        -> Result<Vec<RawActivityRecord>>;
    async fn list_capacity_snapshot(&self) -> Result<Vec<CapacitySnapshotRow>>;
    async fn list_allowed_services(&self) -> Result<Vec<AllowedServiceRow>>;
}

pub struct MissingClubBackend;

#[async_trait]
impl ClubBackend for MissingClubBackend {
    async fn list_profiles(&self, owner_id: &ProfileId) -> Result<Vec<Profile>> {
        Err(anyhow!("club backend unavailable for owner {owner_id}"))
    }

    async fn list_enrollments(
        &self,
        profile_id: &ProfileId,
        _area_filter: AreaFilter,
    ) -> Result<Vec<RawActivityRecord>> {
        Err(anyhow!("club backend unavailable for profile {profile_id}"))
    }

    async fn list_cancelled_visits(
        &self,
        profile_id: &ProfileId,
    ) -> Result<Vec<RawActivityRecord>> {
        Err(anyhow!("club backend unavailable for profile {profile_id}"))
    }

    async fn list_capacity_snapshot(&self) -> Result<Vec<CapacitySnapshotRow>> {
        Err(anyhow!("club backend unavailable"))
    }

    async fn list_allowed_services(&self) -> Result<Vec<AllowedServiceRow>> {
        Err(anyhow!("club backend unavailable"))
    }
}

/// Authenticated session handed to the data layer by the host app.
pub trait SessionContext: Send + Sync {
    fn member(&self) -> Profile;
    fn force_logout(&self);
}

/// Terminal action for resilient fetchers that ends the user's session.
pub fn logout_on_exhaustion(
    session: Arc<dyn SessionContext>,
) -> impl Fn() + Send + Sync + 'static {
    move || {
        warn!("retries exhausted; forcing session logout");
        session.force_logout();
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
