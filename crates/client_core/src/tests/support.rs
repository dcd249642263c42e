use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Map;
use shared::{
    domain::{ActivityRecord, ActivityStatus, AreaCategory, Profile, ProfileId, RecordId},
    protocol::{AllowedServiceRow, AreaFilter, CapacitySnapshotRow, RawActivityRecord},
};
use tokio::sync::oneshot;

use crate::{ClubBackend, SessionContext};

type Scripted<T> = Result<Vec<T>, String>;

pub(crate) fn raw(id: &str, area: AreaCategory, status: ActivityStatus) -> RawActivityRecord {
    RawActivityRecord {
        identifier: RecordId::from(id),
        area_category: Some(area),
        status: Some(status),
        ..RawActivityRecord::default()
    }
}

pub(crate) fn record(
    id: &str,
    area: AreaCategory,
    status: ActivityStatus,
    owner: &str,
) -> ActivityRecord {
    ActivityRecord {
        identifier: RecordId::from(id),
        area_category: area,
        status,
        owner_profile_id: ProfileId::from(owner),
        display_fields: BTreeMap::new(),
    }
}

pub(crate) fn capacity_row(erro: bool) -> CapacitySnapshotRow {
    CapacitySnapshotRow {
        erro,
        fields: Map::new(),
    }
}

pub(crate) fn service_row(group_id: i64, service_id: i64, order: i64) -> AllowedServiceRow {
    AllowedServiceRow {
        erro: false,
        group_id,
        service_id,
        order,
        extra: BTreeMap::new(),
    }
}

fn next_scripted<T: Clone>(script: &Mutex<VecDeque<Scripted<T>>>) -> Result<Vec<T>> {
    let mut script = script.lock().expect("script lock");
    let next = if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    };
    next.unwrap_or_else(|| Ok(Vec::new())).map_err(|err| anyhow!(err))
}

/// In-memory backend with per-profile responses and optional completion gates.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    profiles: Mutex<Option<Scripted<Profile>>>,
    enrollments: Mutex<HashMap<ProfileId, Scripted<RawActivityRecord>>>,
    cancellations: Mutex<HashMap<ProfileId, Scripted<RawActivityRecord>>>,
    gates: Mutex<HashMap<ProfileId, oneshot::Receiver<()>>>,
    capacity: Mutex<VecDeque<Scripted<CapacitySnapshotRow>>>,
    services: Mutex<VecDeque<Scripted<AllowedServiceRow>>>,
    pub profile_calls: AtomicUsize,
    pub enrollment_calls: AtomicUsize,
    pub cancellation_calls: AtomicUsize,
    pub capacity_calls: AtomicUsize,
    pub service_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn with_profiles(self, profiles: Scripted<Profile>) -> Self {
        *self.profiles.lock().expect("profiles lock") = Some(profiles);
        self
    }

    pub(crate) fn with_enrollments(self, profile: &str, rows: Scripted<RawActivityRecord>) -> Self {
        self.enrollments
            .lock()
            .expect("enrollments lock")
            .insert(ProfileId::from(profile), rows);
        self
    }

    pub(crate) fn with_cancellations(
        self,
        profile: &str,
        rows: Scripted<RawActivityRecord>,
    ) -> Self {
        self.cancellations
            .lock()
            .expect("cancellations lock")
            .insert(ProfileId::from(profile), rows);
        self
    }

    pub(crate) fn with_capacity_script(self, script: Vec<Scripted<CapacitySnapshotRow>>) -> Self {
        *self.capacity.lock().expect("capacity lock") = script.into();
        self
    }

    pub(crate) fn with_services_script(self, script: Vec<Scripted<AllowedServiceRow>>) -> Self {
        *self.services.lock().expect("services lock") = script.into();
        self
    }

    /// Holds the next enrollment call for `profile` until the sender fires.
    pub(crate) fn gate(&self, profile: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .expect("gates lock")
            .insert(ProfileId::from(profile), rx);
        tx
    }

    pub(crate) fn enrollment_calls(&self) -> usize {
        self.enrollment_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClubBackend for ScriptedBackend {
    async fn list_profiles(&self, _owner_id: &ProfileId) -> Result<Vec<Profile>> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .expect("profiles lock")
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map_err(|err| anyhow!(err))
    }

    async fn list_enrollments(
        &self,
        profile_id: &ProfileId,
        _area_filter: AreaFilter,
    ) -> Result<Vec<RawActivityRecord>> {
        self.enrollment_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().expect("gates lock").remove(profile_id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.enrollments
            .lock()
            .expect("enrollments lock")
            .get(profile_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map_err(|err| anyhow!(err))
    }

    async fn list_cancelled_visits(
        &self,
        profile_id: &ProfileId,
    ) -> Result<Vec<RawActivityRecord>> {
        self.cancellation_calls.fetch_add(1, Ordering::SeqCst);
        self.cancellations
            .lock()
            .expect("cancellations lock")
            .get(profile_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
            .map_err(|err| anyhow!(err))
    }

    async fn list_capacity_snapshot(&self) -> Result<Vec<CapacitySnapshotRow>> {
        self.capacity_calls.fetch_add(1, Ordering::SeqCst);
        next_scripted(&self.capacity)
    }

    async fn list_allowed_services(&self) -> Result<Vec<AllowedServiceRow>> {
        self.service_calls.fetch_add(1, Ordering::SeqCst);
        next_scripted(&self.services)
    }
}

pub(crate) struct TestSession {
    member: Profile,
    pub logouts: AtomicUsize,
}

impl TestSession {
    pub(crate) fn new(id: &str, display_name: &str) -> Self {
        Self {
            member: Profile::new(id, display_name),
            logouts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

impl SessionContext for TestSession {
    fn member(&self) -> Profile {
        self.member.clone()
    }

    fn force_logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
    }
}
