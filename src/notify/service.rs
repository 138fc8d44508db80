//! Notification service: the one owner of the schedule store.
//!
//! `schedule_all` and `resync` both run under a single async mutex held for
//! the whole pass, so interleaved cancel/arm sequences against the same
//! experience cannot happen even with concurrent callers. Read-only
//! operations take the same lock briefly and never mutate.

use crate::error::Result;
use crate::experience::{Experience, ExperienceId, ParsedPayload, RejectedRecord, parse_payload};
use crate::notify::capability::{NotificationCapability, PermissionStatus, ScheduledAlert};
use crate::notify::engine::{LeadTime, ScheduleReport, schedule_retaining_at};
use crate::notify::query::{UpcomingNotification, next_scheduled_at};
use crate::notify::reconcile::{ResyncReport, resync_at};
use crate::notify::store::{ScheduleEntry, ScheduleStore, StoreLoadStatus};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Summary of the most recent `schedule_all` pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastScheduleRun {
    pub at: DateTime<Utc>,
    pub lead_time_secs: i64,
    pub experience_ids: Vec<ExperienceId>,
    pub report: ScheduleReport,
}

/// Schedule pass driven from a raw content payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadScheduleReport {
    #[serde(flatten)]
    pub report: ScheduleReport,
    pub rejected: Vec<RejectedRecord>,
}

/// Everything the diagnostics screen shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub persisted: BTreeMap<ExperienceId, ScheduleEntry>,
    pub os_scheduled: Vec<ScheduledAlert>,
    pub load_status: StoreLoadStatus,
    pub permission: Option<PermissionStatus>,
    pub last_schedule: Option<LastScheduleRun>,
}

struct ServiceState {
    store: ScheduleStore,
    last_schedule: Option<LastScheduleRun>,
}

/// Owns the persisted schedule and the capability handle.
///
/// Construct once per process (see [`crate::notify::NotificationBootstrap`])
/// and share by `Arc`.
pub struct NotificationService {
    state: Mutex<ServiceState>,
    capability: Arc<dyn NotificationCapability>,
}

impl NotificationService {
    pub fn new(store: ScheduleStore, capability: Arc<dyn NotificationCapability>) -> Self {
        Self {
            state: Mutex::new(ServiceState {
                store,
                last_schedule: None,
            }),
            capability,
        }
    }

    /// The capability this service drives.
    pub fn capability(&self) -> &Arc<dyn NotificationCapability> {
        &self.capability
    }

    /// Converge alerts onto `experiences`.
    pub async fn schedule_all(
        &self,
        experiences: &[Experience],
        lead_time: LeadTime,
    ) -> Result<ScheduleReport> {
        self.schedule_all_at(experiences, lead_time, Utc::now()).await
    }

    pub async fn schedule_all_at(
        &self,
        experiences: &[Experience],
        lead_time: LeadTime,
        now: DateTime<Utc>,
    ) -> Result<ScheduleReport> {
        self.converge(experiences, &HashSet::new(), lead_time, now).await
    }

    /// Validate a raw content payload, then converge onto what survived.
    ///
    /// A rejected record that still carries a usable id keeps whatever alert
    /// it already had; one without an id cannot be matched and counts as
    /// absent.
    pub async fn schedule_payload(
        &self,
        payload: &serde_json::Value,
        venue: FixedOffset,
        lead_time: LeadTime,
    ) -> Result<PayloadScheduleReport> {
        self.schedule_payload_at(payload, venue, lead_time, Utc::now()).await
    }

    pub async fn schedule_payload_at(
        &self,
        payload: &serde_json::Value,
        venue: FixedOffset,
        lead_time: LeadTime,
        now: DateTime<Utc>,
    ) -> Result<PayloadScheduleReport> {
        let ParsedPayload {
            experiences,
            rejected,
        } = parse_payload(payload, venue)?;
        let retained: HashSet<ExperienceId> = rejected
            .iter()
            .filter_map(|record| record.experience_id.clone())
            .collect();
        let report = self.converge(&experiences, &retained, lead_time, now).await?;
        Ok(PayloadScheduleReport { report, rejected })
    }

    async fn converge(
        &self,
        experiences: &[Experience],
        retained: &HashSet<ExperienceId>,
        lead_time: LeadTime,
        now: DateTime<Utc>,
    ) -> Result<ScheduleReport> {
        let mut state = self.state.lock().await;
        let report = schedule_retaining_at(
            &mut state.store,
            self.capability.as_ref(),
            experiences,
            retained,
            lead_time,
            now,
        )
        .await?;
        state.last_schedule = Some(LastScheduleRun {
            at: now,
            lead_time_secs: lead_time.as_secs(),
            experience_ids: experiences.iter().map(|e| e.id.clone()).collect(),
            report: report.clone(),
        });
        Ok(report)
    }

    /// Repair drift between the store and live alerts.
    pub async fn resync(&self) -> Result<ResyncReport> {
        self.resync_at(Utc::now()).await
    }

    pub async fn resync_at(&self, now: DateTime<Utc>) -> Result<ResyncReport> {
        let mut state = self.state.lock().await;
        resync_at(&mut state.store, self.capability.as_ref(), now).await
    }

    /// Raw persisted mapping.
    pub async fn persisted_schedule(&self) -> BTreeMap<ExperienceId, ScheduleEntry> {
        self.state.lock().await.store.get().clone()
    }

    /// The platform's live alert list, unmodified.
    pub async fn list_os_scheduled(&self) -> Result<Vec<ScheduledAlert>> {
        self.capability.list_scheduled().await
    }

    /// Next reminder to fire, optionally restricted to some experiences.
    pub async fn next_scheduled_notification(
        &self,
        filter: Option<&BTreeSet<ExperienceId>>,
    ) -> Option<UpcomingNotification> {
        self.next_scheduled_notification_at(filter, Utc::now()).await
    }

    pub async fn next_scheduled_notification_at(
        &self,
        filter: Option<&BTreeSet<ExperienceId>>,
        now: DateTime<Utc>,
    ) -> Option<UpcomingNotification> {
        let state = self.state.lock().await;
        next_scheduled_at(state.store.get(), filter, now)
    }

    /// How the store came up at start.
    pub async fn load_status(&self) -> StoreLoadStatus {
        self.state.lock().await.store.load_status().clone()
    }

    /// Snapshot for the diagnostics screen. Capability failures leave the
    /// live list empty and the permission unknown rather than failing.
    pub async fn diagnostics(&self) -> DiagnosticsSnapshot {
        let (persisted, load_status, last_schedule) = {
            let state = self.state.lock().await;
            (
                state.store.get().clone(),
                state.store.load_status().clone(),
                state.last_schedule.clone(),
            )
        };

        let os_scheduled = match self.capability.list_scheduled().await {
            Ok(alerts) => alerts,
            Err(e) => {
                tracing::warn!("diagnostics could not list live alerts: {e}");
                Vec::new()
            }
        };
        let permission = self.capability.permission_status().await.ok();

        DiagnosticsSnapshot {
            persisted,
            os_scheduled,
            load_status,
            permission,
            last_schedule,
        }
    }
}
