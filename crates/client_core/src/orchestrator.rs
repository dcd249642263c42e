//! Profile-scoped activity loading for one screen.
//!
//! The orchestrator loads the profile list once, fetches enrollments and
//! cancelled visits for the selected profile, caches the merged result and
//! derives the visible list from the current [`FilterState`]. Screens observe
//! it through a `watch` channel of [`ScreenState`].

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::{
    domain::{ActivityRecord, ActivityStatus, Profile, ProfileId},
    error::ApiException,
    protocol::AreaFilter,
};
use thiserror::Error;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    cache::ProfileScopedCache,
    filter::{apply_filter, CategorySelection, FilterState},
    guard::{FetchToken, RequestCancellationGuard},
    merge::merge_scoped,
    ClubBackend, SessionContext,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("profile list has not been loaded yet")]
    ProfilesNotLoaded,
    #[error("profile {0} is not part of this session")]
    UnknownProfile(ProfileId),
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    pub area_filter: AreaFilter,
    pub initial_filter: FilterState,
}

/// Everything a screen renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenState {
    pub profiles: Vec<Profile>,
    pub selected_profile: Option<ProfileId>,
    pub loading: bool,
    pub error: Option<String>,
    /// Set when the backend rejected the session; the host should sign out.
    pub session_expired: bool,
    pub filter: FilterState,
    pub view: Vec<ActivityRecord>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// The member's profile followed by their dependents, unique by id.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDirectory {
    member_id: ProfileId,
    profiles: Vec<Profile>,
}

impl ProfileDirectory {
    pub fn from_remote(member: Profile, remote: Vec<Profile>) -> Self {
        let member_id = member.id.clone();
        let mut profiles: Vec<Profile> = Vec::with_capacity(remote.len() + 1);
        if !remote.iter().any(|profile| profile.id == member_id) {
            profiles.push(member);
        }
        for profile in remote {
            if profiles.iter().any(|known| known.id == profile.id) {
                debug!(profile_id = %profile.id, "skipping duplicate profile");
                continue;
            }
            profiles.push(profile);
        }
        Self {
            member_id,
            profiles,
        }
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn default_selection(&self) -> &ProfileId {
        &self.member_id
    }

    pub fn contains(&self, profile_id: &ProfileId) -> bool {
        self.profiles.iter().any(|profile| &profile.id == profile_id)
    }
}

struct OrchestratorState {
    directory: Option<ProfileDirectory>,
    profiles_loading: bool,
    selected: Option<ProfileId>,
    cache: ProfileScopedCache,
    guard: RequestCancellationGuard<ProfileId>,
    filter: FilterState,
    loading: bool,
    error: Option<String>,
    session_expired: bool,
}

impl OrchestratorState {
    fn screen_state(&self) -> ScreenState {
        let entry = self
            .selected
            .as_ref()
            .and_then(|selected| self.cache.entry().filter(|e| &e.profile_id == selected));
        ScreenState {
            profiles: self
                .directory
                .as_ref()
                .map(|directory| directory.profiles().to_vec())
                .unwrap_or_default(),
            selected_profile: self.selected.clone(),
            loading: self.loading,
            error: self.error.clone(),
            session_expired: self.session_expired,
            filter: self.filter.clone(),
            view: entry
                .map(|entry| apply_filter(&entry.records, &self.filter))
                .unwrap_or_default(),
            fetched_at: entry.map(|entry| entry.fetched_at),
        }
    }

    /// Applies a finished fetch unless a newer request superseded it.
    fn complete(
        &mut self,
        token: &FetchToken<ProfileId>,
        result: Result<Vec<ActivityRecord>>,
    ) -> bool {
        if self.guard.is_stale(token) {
            debug!(
                profile_id = %token.key(),
                generation = token.generation(),
                "discarding stale scoped fetch result"
            );
            return false;
        }
        self.guard.finish(token);
        self.loading = false;
        match result {
            Ok(records) => {
                info!(
                    profile_id = %token.key(),
                    records = records.len(),
                    "scoped fetch completed"
                );
                self.cache.put(token.key().clone(), records);
                self.error = None;
            }
            Err(err) => {
                warn!(profile_id = %token.key(), error = %format!("{err:#}"), "scoped fetch failed");
                self.fail("could not load activities", &err);
            }
        }
        true
    }

    fn fail(&mut self, what: &str, err: &anyhow::Error) {
        if rejected_session(err) {
            self.session_expired = true;
            self.error = Some("session expired; sign in again".to_string());
        } else {
            self.error = Some(format!("{what}: {err:#}"));
        }
    }
}

fn rejected_session(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ApiException>()
            .is_some_and(ApiException::is_session_error)
    })
}

pub struct ActivityOrchestrator {
    backend: Arc<dyn ClubBackend>,
    session: Arc<dyn SessionContext>,
    options: OrchestratorOptions,
    inner: Arc<Mutex<OrchestratorState>>,
    screen: Arc<watch::Sender<ScreenState>>,
    fetch_tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl ActivityOrchestrator {
    pub fn new(
        backend: Arc<dyn ClubBackend>,
        session: Arc<dyn SessionContext>,
        options: OrchestratorOptions,
    ) -> Self {
        let state = OrchestratorState {
            directory: None,
            profiles_loading: false,
            selected: None,
            cache: ProfileScopedCache::new(),
            guard: RequestCancellationGuard::new(),
            filter: options.initial_filter.clone(),
            loading: false,
            error: None,
            session_expired: false,
        };
        let (screen, _) = watch::channel(state.screen_state());
        Self {
            backend,
            session,
            options,
            inner: Arc::new(Mutex::new(state)),
            screen: Arc::new(screen),
            fetch_tasks: StdMutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScreenState> {
        self.screen.subscribe()
    }

    pub fn snapshot(&self) -> ScreenState {
        self.screen.borrow().clone()
    }

    /// Waits until no fetch is pending and returns that state.
    pub async fn settled(&self) -> ScreenState {
        let mut rx = self.screen.subscribe();
        let settled = match rx.wait_for(|state| !state.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        };
        settled
    }

    /// Loads the profile list once and selects the member's own profile.
    pub async fn start(&self) {
        let member = self.session.member();
        {
            let mut state = self.inner.lock().await;
            if state.directory.is_some() || state.profiles_loading {
                debug!("profile list already loaded or loading");
                return;
            }
            state.profiles_loading = true;
            state.loading = true;
            state.error = None;
            self.publish(&state);
        }

        let listed = self.backend.list_profiles(&member.id).await;

        let default_profile = {
            let mut state = self.inner.lock().await;
            state.profiles_loading = false;
            state.loading = false;
            match listed {
                Ok(remote) => {
                    let directory = ProfileDirectory::from_remote(member, remote);
                    info!(
                        profiles = directory.profiles().len(),
                        "profile list loaded"
                    );
                    let default_profile = directory.default_selection().clone();
                    state.directory = Some(directory);
                    self.publish(&state);
                    default_profile
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "profile list failed");
                    state.fail("could not load profiles", &err);
                    self.publish(&state);
                    return;
                }
            }
        };

        if let Err(err) = self.select_profile(default_profile).await {
            warn!(error = %err, "default profile selection rejected");
        }
    }

    /// Switches the scoped data to `profile_id`.
    ///
    /// Re-selecting the current profile is a no-op while its fetch is pending
    /// and only re-derives the view when its records are cached.
    pub async fn select_profile(&self, profile_id: ProfileId) -> Result<(), OrchestratorError> {
        let mut state = self.inner.lock().await;
        let Some(directory) = state.directory.as_ref() else {
            return Err(OrchestratorError::ProfilesNotLoaded);
        };
        if !directory.contains(&profile_id) {
            warn!(profile_id = %profile_id, "ignoring selection of unknown profile");
            return Err(OrchestratorError::UnknownProfile(profile_id));
        }

        if state.selected.as_ref() == Some(&profile_id) {
            if state.guard.is_busy_with(&profile_id) {
                debug!(profile_id = %profile_id, "profile already loading");
                return Ok(());
            }
            if state.cache.get(&profile_id).is_some() {
                debug!(profile_id = %profile_id, "serving cached records");
                self.publish(&state);
                return Ok(());
            }
        } else {
            state.cache.invalidate();
            state.guard.supersede();
            state.selected = Some(profile_id.clone());
        }

        self.begin_fetch(&mut state, profile_id);
        Ok(())
    }

    /// Drops the cached records and fetches the selected profile again.
    pub async fn refresh(&self) {
        let mut state = self.inner.lock().await;
        let Some(selected) = state.selected.clone() else {
            return;
        };
        if state.guard.in_flight().is_some() {
            debug!(profile_id = %selected, "refresh ignored while a fetch is pending");
            return;
        }
        state.cache.invalidate();
        self.begin_fetch(&mut state, selected);
    }

    pub async fn set_filter(&self, filter: FilterState) {
        let mut state = self.inner.lock().await;
        state.filter = filter;
        self.publish(&state);
    }

    pub async fn set_category(&self, category: CategorySelection) {
        let mut state = self.inner.lock().await;
        state.filter.category = category;
        self.publish(&state);
    }

    pub async fn set_status(&self, status: Option<ActivityStatus>) {
        let mut state = self.inner.lock().await;
        state.filter.status = status;
        self.publish(&state);
    }

    pub async fn set_search_text(&self, search_text: impl Into<String>) {
        let mut state = self.inner.lock().await;
        state.filter.search_text = search_text.into();
        self.publish(&state);
    }

    fn begin_fetch(&self, state: &mut OrchestratorState, profile_id: ProfileId) {
        let Some(token) = state.guard.start_if_idle(profile_id) else {
            return;
        };
        info!(
            profile_id = %token.key(),
            generation = token.generation(),
            "scoped fetch started"
        );
        state.loading = true;
        state.error = None;
        self.publish(state);

        let backend = Arc::clone(&self.backend);
        let inner = Arc::clone(&self.inner);
        let screen = Arc::clone(&self.screen);
        let area_filter = self.options.area_filter;
        let task = tokio::spawn(async move {
            let result = fetch_scoped(backend.as_ref(), token.key(), area_filter).await;
            let mut state = inner.lock().await;
            if state.complete(&token, result) {
                screen.send_replace(state.screen_state());
            }
        });
        let mut tasks = self
            .fetch_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn publish(&self, state: &OrchestratorState) {
        self.screen.send_replace(state.screen_state());
    }
}

impl Drop for ActivityOrchestrator {
    fn drop(&mut self) {
        let tasks = self
            .fetch_tasks
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

/// Both collections must arrive before merging; either failure fails the fetch.
async fn fetch_scoped(
    backend: &dyn ClubBackend,
    profile_id: &ProfileId,
    area_filter: AreaFilter,
) -> Result<Vec<ActivityRecord>> {
    let (enrollments, cancellations) = futures::future::try_join(
        backend.list_enrollments(profile_id, area_filter),
        backend.list_cancelled_visits(profile_id),
    )
    .await?;
    Ok(merge_scoped(profile_id, enrollments, cancellations)?)
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
