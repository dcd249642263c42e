//! Pure derivation of the visible activity list from cached records.

use std::{fmt, str::FromStr};

use shared::domain::{ActivityRecord, ActivityStatus, AreaCategory, UnknownVariant};

pub const TITLE_FIELD: &str = "title";
pub const SPECIALTY_FIELD: &str = "specialty";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategorySelection {
    #[default]
    All,
    Only(AreaCategory),
}

impl CategorySelection {
    fn admits(self, category: AreaCategory) -> bool {
        match self {
            CategorySelection::All => category.is_known(),
            CategorySelection::Only(AreaCategory::Sport) => matches!(
                category,
                AreaCategory::Sport | AreaCategory::SportScheduledVisit
            ),
            CategorySelection::Only(selected) => selected == category,
        }
    }
}

impl FromStr for CategorySelection {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("ALL") {
            Ok(CategorySelection::All)
        } else {
            s.parse().map(CategorySelection::Only)
        }
    }
}

impl fmt::Display for CategorySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategorySelection::All => f.write_str("ALL"),
            CategorySelection::Only(category) => f.write_str(category.as_str()),
        }
    }
}

/// Screen-owned filter inputs. Changing them never touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterState {
    pub category: CategorySelection,
    pub status: Option<ActivityStatus>,
    pub search_text: String,
}

impl FilterState {
    pub fn with_category(mut self, category: CategorySelection) -> Self {
        self.category = category;
        self
    }

    pub fn with_status(mut self, status: Option<ActivityStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn with_search_text(mut self, search_text: impl Into<String>) -> Self {
        self.search_text = search_text.into();
        self
    }
}

/// Category, then status, then free-text search. Input order is preserved.
pub fn apply_filter(records: &[ActivityRecord], filter: &FilterState) -> Vec<ActivityRecord> {
    let needle = filter.search_text.to_lowercase();
    records
        .iter()
        .filter(|record| filter.category.admits(record.area_category))
        .filter(|record| filter.status.map_or(true, |status| record.status == status))
        .filter(|record| needle.is_empty() || matches_search(record, &needle))
        .cloned()
        .collect()
}

fn matches_search(record: &ActivityRecord, needle: &str) -> bool {
    [TITLE_FIELD, SPECIALTY_FIELD]
        .into_iter()
        .filter_map(|field| record.display_field(field))
        .any(|value| value.to_lowercase().contains(needle))
}

#[cfg(test)]
#[path = "tests/filter_tests.rs"]
mod tests;
