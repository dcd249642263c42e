use std::{collections::BTreeMap, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ActivityStatus, AreaCategory, ProfileId, RecordId, UnknownVariant};

/// Backend collections mark an application-level failure by carrying a truthy
/// `ERRO` field on any element.
pub trait ErrorFlagged {
    fn has_error_flag(&self) -> bool;
}

pub fn any_error_flagged<T: ErrorFlagged>(rows: &[T]) -> bool {
    rows.iter().any(ErrorFlagged::has_error_flag)
}

/// Backend-side area filter accepted by the enrollment listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AreaFilter {
    #[default]
    All,
    Only(AreaCategory),
}

impl AreaFilter {
    pub fn as_query_value(&self) -> &'static str {
        match self {
            AreaFilter::All => "ALL",
            AreaFilter::Only(category) => category.as_str(),
        }
    }
}

impl FromStr for AreaFilter {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("ALL") {
            return Ok(AreaFilter::All);
        }
        s.parse().map(AreaFilter::Only)
    }
}

/// Activity row as returned by the backend, before merge and tagging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawActivityRecord {
    pub identifier: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_category: Option<AreaCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_profile_id: Option<ProfileId>,
    #[serde(default)]
    pub display_fields: BTreeMap<String, String>,
    #[serde(rename = "ERRO", default)]
    pub erro: bool,
}

impl ErrorFlagged for RawActivityRecord {
    fn has_error_flag(&self) -> bool {
        self.erro
    }
}

/// One row of the venue capacity snapshot; everything but `ERRO` is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshotRow {
    #[serde(rename = "ERRO", default)]
    pub erro: bool,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ErrorFlagged for CapacitySnapshotRow {
    fn has_error_flag(&self) -> bool {
        self.erro
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedServiceRow {
    #[serde(rename = "ERRO", default)]
    pub erro: bool,
    #[serde(rename = "IDGRUPO")]
    pub group_id: i64,
    #[serde(rename = "IDSERVICO")]
    pub service_id: i64,
    #[serde(rename = "ORDEM")]
    pub order: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ErrorFlagged for AllowedServiceRow {
    fn has_error_flag(&self) -> bool {
        self.erro
    }
}
