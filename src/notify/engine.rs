//! Scheduling engine.
//!
//! Converges the platform's alerts and the persisted store onto the desired
//! set derived from a payload: one alert per eligible experience, armed at
//! `start_at - lead_time`, and nothing for anything else.

use crate::error::{Result, TracksideError};
use crate::experience::{Experience, ExperienceId};
use crate::notify::capability::{AlertContent, NotificationCapability};
use crate::notify::store::{ScheduleEntry, ScheduleStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// How long before an experience starts its reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LeadTime(Duration);

impl LeadTime {
    pub fn from_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        Self(Duration::seconds(secs))
    }

    pub fn from_minutes(minutes: u64) -> Self {
        Self::from_secs(minutes.saturating_mul(60))
    }

    /// Wrap an arbitrary duration.
    ///
    /// # Errors
    ///
    /// Returns [`TracksideError::Config`] for a negative duration.
    pub fn try_from_duration(duration: Duration) -> Result<Self> {
        if duration < Duration::zero() {
            return Err(TracksideError::Config(format!(
                "lead time must not be negative ({}s)",
                duration.num_seconds()
            )));
        }
        Ok(Self(duration))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    pub fn as_secs(self) -> i64 {
        self.0.num_seconds()
    }
}

/// Which capability or store call failed for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOperation {
    Schedule,
    Cancel,
    Persist,
}

/// A per-experience failure inside a batch. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItemError {
    pub experience_id: ExperienceId,
    pub operation: ItemOperation,
    pub message: String,
}

/// Counts from one convergence pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleReport {
    /// Alerts newly armed (first time or re-armed after a time change).
    pub scheduled: usize,
    /// Eligible experiences whose existing alert already matched.
    pub unchanged: usize,
    /// Experiences not eligible (auto-notify off or reminder moment passed).
    pub skipped: usize,
    /// Store entries torn down.
    pub removed: usize,
    pub errors: Vec<ScheduleItemError>,
}

/// Desired fire time, or `None` when the experience must not have an alert.
pub fn desired_fire_at(
    experience: &Experience,
    lead_time: LeadTime,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !experience.auto_notify {
        return None;
    }
    let fire_at = experience
        .start_at
        .checked_sub_signed(lead_time.as_duration())?;
    (fire_at > now).then_some(fire_at)
}

/// What one pass does for a single experience.
enum Step<'a> {
    Arm {
        experience: &'a Experience,
        fire_at: DateTime<Utc>,
        previous: Option<ScheduleEntry>,
    },
    TearDown(ExperienceId),
}

/// Fail unless the platform currently allows alerts.
async fn ensure_permission(capability: &dyn NotificationCapability) -> Result<()> {
    let status = capability.permission_status().await?;
    if !status.granted {
        return Err(TracksideError::Permission(format!(
            "notification permission not granted (can ask again: {})",
            status.can_ask_again
        )));
    }
    Ok(())
}

/// Converge store and capability onto the payload.
///
/// The whole pass is planned against the store first. Permission is checked
/// once, and only when something has to be armed, before any cancel or
/// schedule call; a denial leaves store and capability untouched. Per-item
/// failures are collected in the report.
pub async fn schedule_all_at(
    store: &mut ScheduleStore,
    capability: &dyn NotificationCapability,
    experiences: &[Experience],
    lead_time: LeadTime,
    now: DateTime<Utc>,
) -> Result<ScheduleReport> {
    schedule_retaining_at(store, capability, experiences, &HashSet::new(), lead_time, now).await
}

/// Like [`schedule_all_at`], but entries for ids in `retained` are left alone
/// even though the payload does not list them. Used for records the content
/// source sent in a form that failed validation.
pub async fn schedule_retaining_at(
    store: &mut ScheduleStore,
    capability: &dyn NotificationCapability,
    experiences: &[Experience],
    retained: &HashSet<ExperienceId>,
    lead_time: LeadTime,
    now: DateTime<Utc>,
) -> Result<ScheduleReport> {
    let mut report = ScheduleReport::default();
    let mut seen: HashSet<&ExperienceId> = HashSet::with_capacity(experiences.len());
    let mut steps = Vec::new();

    for experience in experiences {
        if !seen.insert(&experience.id) {
            debug!(id = %experience.id, "ignoring repeated experience in batch");
            continue;
        }

        let existing = store.entry(&experience.id);
        match desired_fire_at(experience, lead_time, now) {
            None => {
                report.skipped += 1;
                if existing.is_some() {
                    debug!(id = %experience.id, "experience no longer eligible");
                    steps.push(Step::TearDown(experience.id.clone()));
                }
            }
            Some(fire_at) if existing.is_some_and(|entry| entry.fire_at == fire_at) => {
                report.unchanged += 1;
            }
            Some(fire_at) => steps.push(Step::Arm {
                experience,
                fire_at,
                previous: existing.cloned(),
            }),
        }
    }

    for id in store.get().keys().filter(|id| !seen.contains(id)) {
        if retained.contains(id) {
            debug!(%id, "record failed validation; keeping its alert");
            continue;
        }
        debug!(%id, "experience left the payload");
        steps.push(Step::TearDown(id.clone()));
    }

    if steps.iter().any(|step| matches!(step, Step::Arm { .. })) {
        ensure_permission(capability).await?;
    }

    for step in steps {
        match step {
            Step::TearDown(id) => tear_down(store, capability, &id, &mut report).await,
            Step::Arm {
                experience,
                fire_at,
                previous,
            } => arm(store, capability, experience, fire_at, previous, lead_time, &mut report).await?,
        }
    }

    info!(
        scheduled = report.scheduled,
        unchanged = report.unchanged,
        skipped = report.skipped,
        removed = report.removed,
        errors = report.errors.len(),
        "notification schedule converged"
    );
    Ok(report)
}

/// Arm the alert for `experience`, replacing `previous` if there is one.
///
/// A superseded alert that cannot be cancelled keeps its entry and nothing
/// new is armed; the next pass retries the replacement.
async fn arm(
    store: &mut ScheduleStore,
    capability: &dyn NotificationCapability,
    experience: &Experience,
    fire_at: DateTime<Utc>,
    previous: Option<ScheduleEntry>,
    lead_time: LeadTime,
    report: &mut ScheduleReport,
) -> Result<()> {
    let id = &experience.id;
    if let Some(previous) = &previous {
        debug!(%id, from = %previous.fire_at, to = %fire_at, "start time changed; re-arming");
        if let Err(e) = capability.cancel(&previous.notification_id).await {
            warn!(%id, "cancel of superseded alert failed; keeping it: {e}");
            report.errors.push(item_error(id, ItemOperation::Cancel, &e));
            return Ok(());
        }
    }

    let content = AlertContent {
        title: experience.title.clone(),
        body: experience.notification_body(lead_time),
        fire_at,
        experience_id: id.clone(),
    };

    match capability.schedule(content.clone()).await {
        Ok(notification_id) => {
            report.scheduled += 1;
            let entry = ScheduleEntry {
                experience_id: id.clone(),
                notification_id,
                fire_at,
                title: content.title,
                body: content.body,
            };
            if let Err(e) = store.put(entry) {
                warn!(%id, "armed alert but could not persist it: {e}");
                report.errors.push(item_error(id, ItemOperation::Persist, &e));
            }
            Ok(())
        }
        Err(e) => {
            // The superseded alert is cancelled; its entry must go with it.
            if previous.is_some() {
                if let Err(persist) = store.remove(id) {
                    report.errors.push(item_error(id, ItemOperation::Persist, &persist));
                }
            }
            if matches!(e, TracksideError::Permission(_)) {
                return Err(e);
            }
            warn!(%id, "schedule failed: {e}");
            report.errors.push(item_error(id, ItemOperation::Schedule, &e));
            Ok(())
        }
    }
}

/// Cancel and forget the alert for `id`.
///
/// The entry is dropped even if the cancel fails: a surviving alert then has
/// no entry and the next resync cancels it as an orphan.
async fn tear_down(
    store: &mut ScheduleStore,
    capability: &dyn NotificationCapability,
    id: &ExperienceId,
    report: &mut ScheduleReport,
) {
    let Some(entry) = store.entry(id).cloned() else {
        return;
    };

    if let Err(e) = capability.cancel(&entry.notification_id).await {
        warn!(%id, "cancel failed during teardown: {e}");
        report.errors.push(item_error(id, ItemOperation::Cancel, &e));
    }
    if let Err(e) = store.remove(id) {
        report.errors.push(item_error(id, ItemOperation::Persist, &e));
    }
    report.removed += 1;
}

fn item_error(id: &ExperienceId, operation: ItemOperation, error: &TracksideError) -> ScheduleItemError {
    ScheduleItemError {
        experience_id: id.clone(),
        operation,
        message: error.to_string(),
    }
}
