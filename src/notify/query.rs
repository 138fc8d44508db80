//! Read-only projections over the persisted schedule.

use crate::experience::ExperienceId;
use crate::notify::store::ScheduleEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The reminder that will fire next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingNotification {
    pub experience_id: ExperienceId,
    pub title: String,
    pub fire_at: DateTime<Utc>,
}

/// Earliest entry still in the future, optionally restricted to `filter`.
///
/// Ties on `fire_at` resolve to the smallest experience id, so a polling
/// countdown never flips between two equal entries.
pub fn next_scheduled_at(
    entries: &BTreeMap<ExperienceId, ScheduleEntry>,
    filter: Option<&BTreeSet<ExperienceId>>,
    now: DateTime<Utc>,
) -> Option<UpcomingNotification> {
    entries
        .values()
        .filter(|entry| entry.fire_at > now)
        .filter(|entry| filter.is_none_or(|ids| ids.contains(&entry.experience_id)))
        .min_by(|a, b| {
            a.fire_at
                .cmp(&b.fire_at)
                .then_with(|| a.experience_id.cmp(&b.experience_id))
        })
        .map(|entry| UpcomingNotification {
            experience_id: entry.experience_id.clone(),
            title: entry.title.clone(),
            fire_at: entry.fire_at,
        })
}
