use shared::{
    domain::{ActivityRecord, ActivityStatus, AreaCategory, ProfileId},
    protocol::{any_error_flagged, RawActivityRecord},
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("backend flagged an application error in the {collection} collection")]
    ApplicationError { collection: &'static str },
}

/// Merges enrollments and cancelled visits for one profile.
///
/// Cancelled visits are re-tagged as cancelled scheduled visits. Rows without
/// an owner are stamped with `profile_id`; rows owned by someone else are
/// dropped.
pub fn merge_scoped(
    profile_id: &ProfileId,
    enrollments: Vec<RawActivityRecord>,
    cancellations: Vec<RawActivityRecord>,
) -> Result<Vec<ActivityRecord>, MergeError> {
    if any_error_flagged(&enrollments) {
        return Err(MergeError::ApplicationError {
            collection: "enrollments",
        });
    }
    if any_error_flagged(&cancellations) {
        return Err(MergeError::ApplicationError {
            collection: "cancelled_visits",
        });
    }

    let enrolled = enrollments.into_iter().map(|raw| {
        let area_category = raw.area_category.unwrap_or(AreaCategory::Unknown);
        let status = raw.status.unwrap_or(ActivityStatus::Unknown);
        into_record(raw, area_category, status)
    });
    let cancelled = cancellations.into_iter().map(|raw| {
        into_record(raw, AreaCategory::ScheduledVisit, ActivityStatus::Cancelled)
    });

    Ok(enrolled
        .chain(cancelled)
        .filter_map(|(owner, record)| claim_for(profile_id, owner, record))
        .collect())
}

fn into_record(
    raw: RawActivityRecord,
    area_category: AreaCategory,
    status: ActivityStatus,
) -> (Option<ProfileId>, ActivityRecord) {
    let owner = raw.owner_profile_id;
    let record = ActivityRecord {
        identifier: raw.identifier,
        area_category,
        status,
        owner_profile_id: ProfileId::default(),
        display_fields: raw.display_fields,
    };
    (owner, record)
}

fn claim_for(
    profile_id: &ProfileId,
    owner: Option<ProfileId>,
    mut record: ActivityRecord,
) -> Option<ActivityRecord> {
    match owner {
        Some(owner) if &owner != profile_id => {
            debug!(
                profile_id = %profile_id,
                owner = %owner,
                record = %record.identifier,
                "dropping record owned by another profile"
            );
            None
        }
        _ => {
            record.owner_profile_id = profile_id.clone();
            Some(record)
        }
    }
}

#[cfg(test)]
#[path = "tests/merge_tests.rs"]
mod tests;
