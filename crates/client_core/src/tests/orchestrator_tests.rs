use std::time::Duration;

use shared::domain::{AreaCategory, RecordId};

use super::*;
use crate::test_support::{raw, ScriptedBackend, TestSession};

fn club_profiles() -> Vec<Profile> {
    vec![Profile::new("0", "Todos"), Profile::new("123", "Ana")]
}

fn orchestrator(backend: Arc<ScriptedBackend>) -> ActivityOrchestrator {
    ActivityOrchestrator::new(
        backend,
        Arc::new(TestSession::new("0", "Todos")),
        OrchestratorOptions::default(),
    )
}

fn view_ids(state: &ScreenState) -> Vec<&str> {
    state.view.iter().map(|r| r.identifier.as_str()).collect()
}

fn scenario_backend() -> ScriptedBackend {
    ScriptedBackend::default()
        .with_profiles(Ok(club_profiles()))
        .with_enrollments(
            "0",
            Ok(vec![raw("m1", AreaCategory::Health, ActivityStatus::Active)]),
        )
        .with_enrollments(
            "123",
            Ok(vec![raw("e1", AreaCategory::Sport, ActivityStatus::Active)]),
        )
        .with_cancellations("123", Ok(Vec::new()))
}

#[tokio::test]
async fn start_loads_profiles_and_selects_the_member() {
    let backend = Arc::new(scenario_backend());
    let orchestrator = orchestrator(Arc::clone(&backend));

    orchestrator.start().await;
    let state = orchestrator.settled().await;

    assert_eq!(state.profiles, club_profiles());
    assert_eq!(state.selected_profile, Some(ProfileId::from("0")));
    assert_eq!(view_ids(&state), vec!["m1"]);
    assert_eq!(state.error, None);
    assert!(state.fetched_at.is_some());

    orchestrator.start().await;
    assert_eq!(
        backend.profile_calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test]
async fn selecting_a_dependent_fetches_merges_and_caches() {
    let backend = Arc::new(scenario_backend());
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;

    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");
    let state = orchestrator.settled().await;

    assert_eq!(state.selected_profile, Some(ProfileId::from("123")));
    assert_eq!(state.view.len(), 1);
    assert_eq!(state.view[0].identifier, RecordId::from("e1"));
    assert_eq!(state.view[0].owner_profile_id, ProfileId::from("123"));
    assert_eq!(state.view[0].area_category, AreaCategory::Sport);
    assert!(!state.loading);
}

#[tokio::test]
async fn failed_enrollments_surface_an_error_and_leave_the_cache_empty() {
    let backend = Arc::new(
        scenario_backend().with_enrollments("123", Err("connection reset".to_string())),
    );
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;

    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");
    let state = orchestrator.settled().await;

    assert!(!state.loading);
    assert!(!state.session_expired);
    let error = state.error.expect("error surfaced");
    assert!(error.contains("connection reset"), "{error}");
    assert!(state.view.is_empty());
    assert_eq!(state.fetched_at, None);

    let calls = backend.enrollment_calls();
    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");
    orchestrator.settled().await;
    assert_eq!(backend.enrollment_calls(), calls + 1);
}

#[tokio::test]
async fn failed_cancellations_fail_the_whole_fetch() {
    let backend = Arc::new(
        scenario_backend().with_cancellations("123", Err("gateway timeout".to_string())),
    );
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;

    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");
    let state = orchestrator.settled().await;

    assert!(state.error.is_some());
    assert!(state.view.is_empty());
}

#[tokio::test]
async fn error_flagged_rows_surface_as_an_error() {
    let mut flagged = raw("x", AreaCategory::Sport, ActivityStatus::Active);
    flagged.erro = true;
    let backend = Arc::new(scenario_backend().with_enrollments("123", Ok(vec![flagged])));
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;

    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");
    let state = orchestrator.settled().await;

    assert!(state.error.is_some());
    assert!(state.view.is_empty());
}

#[tokio::test]
async fn superseded_fetch_results_are_discarded() {
    let backend = Arc::new(scenario_backend());
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;

    let release_ana = backend.gate("123");
    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");
    assert!(orchestrator.snapshot().loading);
    assert!(orchestrator.snapshot().view.is_empty());

    orchestrator
        .select_profile(ProfileId::from("0"))
        .await
        .expect("known profile");
    let settled = orchestrator.settled().await;
    assert_eq!(settled.selected_profile, Some(ProfileId::from("0")));
    assert_eq!(view_ids(&settled), vec!["m1"]);

    release_ana.send(()).expect("stale fetch still waiting");
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(orchestrator.snapshot(), settled);

    let state = orchestrator.inner.lock().await;
    assert_eq!(state.cache.get(&ProfileId::from("123")), None);
    assert!(state.cache.get(&ProfileId::from("0")).is_some());
    assert_eq!(state.guard.in_flight(), None);
}

#[tokio::test]
async fn reselecting_the_current_profile_does_not_refetch() {
    let backend = Arc::new(scenario_backend());
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;
    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");
    let before = orchestrator.settled().await;
    let calls = backend.enrollment_calls();
    let mut updates = orchestrator.subscribe();

    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");

    assert_eq!(backend.enrollment_calls(), calls);
    let after = updates.borrow_and_update().clone();
    assert!(!after.loading);
    assert_eq!(after, before);
}

#[tokio::test]
async fn reselecting_while_loading_is_a_no_op() {
    let backend = Arc::new(scenario_backend());
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;
    let calls = backend.enrollment_calls();

    let release_ana = backend.gate("123");
    for _ in 0..3 {
        orchestrator
            .select_profile(ProfileId::from("123"))
            .await
            .expect("known profile");
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    release_ana.send(()).expect("fetch waiting");
    let state = orchestrator.settled().await;

    assert_eq!(backend.enrollment_calls(), calls + 1);
    assert_eq!(view_ids(&state), vec!["e1"]);
}

#[tokio::test]
async fn filter_changes_rederive_the_view_without_network() {
    let backend = Arc::new(
        scenario_backend()
            .with_enrollments(
                "123",
                Ok(vec![
                    raw("e1", AreaCategory::Sport, ActivityStatus::Active),
                    raw("e2", AreaCategory::Cultural, ActivityStatus::Waitlisted),
                ]),
            )
            .with_cancellations(
                "123",
                Ok(vec![raw("v1", AreaCategory::Sport, ActivityStatus::Scheduled)]),
            ),
    );
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;
    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");
    assert_eq!(view_ids(&orchestrator.settled().await), vec!["e1", "e2", "v1"]);
    let calls = backend.enrollment_calls();

    orchestrator
        .set_category(CategorySelection::Only(AreaCategory::ScheduledVisit))
        .await;
    assert_eq!(view_ids(&orchestrator.snapshot()), vec!["v1"]);

    orchestrator.set_category(CategorySelection::All).await;
    orchestrator.set_status(Some(ActivityStatus::Waitlisted)).await;
    assert_eq!(view_ids(&orchestrator.snapshot()), vec!["e2"]);

    orchestrator.set_filter(FilterState::default()).await;
    orchestrator.set_search_text("nothing matches").await;
    assert!(orchestrator.snapshot().view.is_empty());

    assert_eq!(backend.enrollment_calls(), calls);
}

#[tokio::test]
async fn dropping_the_orchestrator_aborts_pending_fetches_while_state_is_locked() {
    let backend = Arc::new(scenario_backend());
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;

    let release_ana = backend.gate("123");
    orchestrator
        .select_profile(ProfileId::from("123"))
        .await
        .expect("known profile");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let held = Arc::clone(&orchestrator.inner).lock_owned().await;
    drop(orchestrator);
    drop(held);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(release_ana.send(()).is_err(), "fetch task outlived the orchestrator");
}

#[tokio::test]
async fn refresh_refetches_the_selected_profile() {
    let backend = Arc::new(scenario_backend());
    let orchestrator = orchestrator(Arc::clone(&backend));
    orchestrator.start().await;
    orchestrator.settled().await;
    let calls = backend.enrollment_calls();

    orchestrator.refresh().await;
    let state = orchestrator.settled().await;

    assert_eq!(backend.enrollment_calls(), calls + 1);
    assert_eq!(view_ids(&state), vec!["m1"]);
}

#[tokio::test]
async fn unknown_profiles_are_rejected() {
    let backend = Arc::new(scenario_backend());
    let orchestrator = orchestrator(Arc::clone(&backend));

    assert_eq!(
        orchestrator.select_profile(ProfileId::from("123")).await,
        Err(OrchestratorError::ProfilesNotLoaded)
    );

    orchestrator.start().await;
    let before = orchestrator.settled().await;
    assert_eq!(
        orchestrator.select_profile(ProfileId::from("999")).await,
        Err(OrchestratorError::UnknownProfile(ProfileId::from("999")))
    );
    assert_eq!(orchestrator.snapshot(), before);
}

#[tokio::test]
async fn profile_list_failure_sets_the_error_flag() {
    let backend = Arc::new(
        ScriptedBackend::default().with_profiles(Err("service unavailable".to_string())),
    );
    let orchestrator = orchestrator(Arc::clone(&backend));

    orchestrator.start().await;
    let state = orchestrator.snapshot();

    assert!(!state.loading);
    assert!(state.error.expect("error").contains("service unavailable"));
    assert_eq!(state.selected_profile, None);
    assert_eq!(backend.enrollment_calls(), 0);
}

#[test]
fn directory_inserts_the_member_and_drops_duplicates() {
    let directory = ProfileDirectory::from_remote(
        Profile::new("7", "Carla"),
        vec![
            Profile::new("123", "Ana"),
            Profile::new("123", "Ana (dup)"),
            Profile::new("456", "Bruno"),
        ],
    );

    let ids: Vec<_> = directory.profiles().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["7", "123", "456"]);
    assert_eq!(directory.profiles()[1].display_name, "Ana");
    assert_eq!(directory.default_selection(), &ProfileId::from("7"));
}

#[test]
fn directory_keeps_the_backend_copy_of_the_member() {
    let directory = ProfileDirectory::from_remote(
        Profile::new("0", "Todos"),
        vec![Profile::new("123", "Ana"), Profile::new("0", "Todos")],
    );

    let ids: Vec<_> = directory.profiles().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["123", "0"]);
    assert!(directory.contains(&ProfileId::from("0")));
}
