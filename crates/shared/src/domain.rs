use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(ProfileId);
id_newtype!(RecordId);

/// The authenticated member or one of their registered dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl Profile {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: ProfileId::new(id),
            display_name: display_name.into(),
            avatar_ref: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AreaCategory {
    Sport,
    Cultural,
    Health,
    ScheduledVisit,
    /// Scheduled visit booked under the sport area; listed with `Sport`.
    SportScheduledVisit,
    #[serde(other)]
    Unknown,
}

impl AreaCategory {
    pub const KNOWN: [AreaCategory; 5] = [
        AreaCategory::Sport,
        AreaCategory::Cultural,
        AreaCategory::Health,
        AreaCategory::ScheduledVisit,
        AreaCategory::SportScheduledVisit,
    ];

    pub fn is_known(self) -> bool {
        self != AreaCategory::Unknown
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AreaCategory::Sport => "SPORT",
            AreaCategory::Cultural => "CULTURAL",
            AreaCategory::Health => "HEALTH",
            AreaCategory::ScheduledVisit => "SCHEDULED_VISIT",
            AreaCategory::SportScheduledVisit => "SPORT_SCHEDULED_VISIT",
            AreaCategory::Unknown => "UNKNOWN",
        }
    }
}

impl FromStr for AreaCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AreaCategory::KNOWN
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Active,
    Waitlisted,
    Cancelled,
    Scheduled,
    #[serde(other)]
    Unknown,
}

impl ActivityStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityStatus::Active => "ACTIVE",
            ActivityStatus::Waitlisted => "WAITLISTED",
            ActivityStatus::Cancelled => "CANCELLED",
            ActivityStatus::Scheduled => "SCHEDULED",
            ActivityStatus::Unknown => "UNKNOWN",
        }
    }
}

impl FromStr for ActivityStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ActivityStatus::Active,
            ActivityStatus::Waitlisted,
            ActivityStatus::Cancelled,
            ActivityStatus::Scheduled,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

/// A merged, tagged activity owned by exactly one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub identifier: RecordId,
    pub area_category: AreaCategory,
    pub status: ActivityStatus,
    pub owner_profile_id: ProfileId,
    #[serde(default)]
    pub display_fields: BTreeMap<String, String>,
}

impl ActivityRecord {
    pub fn display_field(&self, name: &str) -> Option<&str> {
        self.display_fields.get(name).map(String::as_str)
    }
}
