//! Resync: repair drift between the persisted store and live platform alerts.

use crate::error::Result;
use crate::experience::ExperienceId;
use crate::notify::capability::{AlertContent, NotificationCapability, NotificationId};
use crate::notify::engine::{ItemOperation, ScheduleItemError};
use crate::notify::store::{ScheduleEntry, ScheduleStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Counts from one resync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncReport {
    /// Entries whose alert had vanished and were re-armed.
    pub rescheduled: usize,
    /// Past-due entries dropped plus orphan alerts cancelled.
    pub removed: usize,
    pub errors: Vec<ScheduleItemError>,
}

impl ResyncReport {
    /// Whether the pass changed anything.
    pub fn is_noop(&self) -> bool {
        self.rescheduled == 0 && self.removed == 0 && self.errors.is_empty()
    }
}

/// Repair the store and the platform so that every entry has exactly one live
/// alert and every live alert has an entry.
///
/// # Errors
///
/// Fails only when the platform's alert list cannot be read.
pub async fn resync_at(
    store: &mut ScheduleStore,
    capability: &dyn NotificationCapability,
    now: DateTime<Utc>,
) -> Result<ResyncReport> {
    let live = capability.list_scheduled().await?;
    let live_ids: HashSet<&NotificationId> = live.iter().map(|a| &a.notification_id).collect();
    let linked_ids: HashSet<NotificationId> = store
        .get()
        .values()
        .map(|entry| entry.notification_id.clone())
        .collect();

    let mut report = ResyncReport::default();

    for alert in live.iter().filter(|a| !linked_ids.contains(&a.notification_id)) {
        debug!(id = %alert.notification_id, "cancelling orphan alert");
        match capability.cancel(&alert.notification_id).await {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!(id = %alert.notification_id, "orphan cancel failed: {e}");
                report.errors.push(ScheduleItemError {
                    experience_id: alert
                        .experience_id
                        .clone()
                        .unwrap_or_else(|| ExperienceId::new("")),
                    operation: ItemOperation::Cancel,
                    message: e.to_string(),
                });
            }
        }
    }

    let lost: Vec<ScheduleEntry> = store
        .get()
        .values()
        .filter(|entry| !live_ids.contains(&entry.notification_id))
        .cloned()
        .collect();

    for entry in lost {
        if entry.fire_at <= now {
            debug!(id = %entry.experience_id, "dropping past-due entry with no live alert");
            if let Err(e) = store.remove(&entry.experience_id) {
                report.errors.push(persist_error(&entry.experience_id, &e));
            }
            report.removed += 1;
            continue;
        }

        let content = AlertContent {
            title: entry.title.clone(),
            body: entry.body.clone(),
            fire_at: entry.fire_at,
            experience_id: entry.experience_id.clone(),
        };
        match capability.schedule(content).await {
            Ok(notification_id) => {
                debug!(id = %entry.experience_id, "re-armed lost alert");
                report.rescheduled += 1;
                let experience_id = entry.experience_id.clone();
                let repaired = ScheduleEntry {
                    notification_id,
                    ..entry
                };
                if let Err(e) = store.put(repaired) {
                    report.errors.push(persist_error(&experience_id, &e));
                }
            }
            Err(e) => {
                // Left in place; the next pass tries again.
                warn!(id = %entry.experience_id, "re-arm failed: {e}");
                report.errors.push(ScheduleItemError {
                    experience_id: entry.experience_id.clone(),
                    operation: ItemOperation::Schedule,
                    message: e.to_string(),
                });
            }
        }
    }

    if report.is_noop() {
        debug!("resync found nothing to repair");
    } else {
        info!(
            rescheduled = report.rescheduled,
            removed = report.removed,
            errors = report.errors.len(),
            "resync repaired notification drift"
        );
    }
    Ok(report)
}

fn persist_error(id: &ExperienceId, error: &crate::error::TracksideError) -> ScheduleItemError {
    ScheduleItemError {
        experience_id: id.clone(),
        operation: ItemOperation::Persist,
        message: error.to_string(),
    }
}
