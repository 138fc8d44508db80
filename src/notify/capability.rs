//! OS notification capability seam.
//!
//! [`NotificationCapability`] is the only way the engine arms, cancels, or
//! enumerates time-based local alerts. Platform shells implement it over the
//! native notification center; [`MemoryNotificationCenter`] is the in-process
//! implementation used by the headless host and by tests.

use crate::config::PresentationOptions;
use crate::error::{Result, TracksideError};
use crate::experience::ExperienceId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Identifier the capability hands back when an alert is armed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStatus {
    pub granted: bool,
    pub can_ask_again: bool,
}

/// What to show and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertContent {
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    /// Attached as alert user data so support can trace an alert back.
    pub experience_id: ExperienceId,
}

/// An alert currently held by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledAlert {
    pub notification_id: NotificationId,
    pub fire_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub experience_id: Option<ExperienceId>,
}

/// Platform capability to arm, cancel, and list time-based local alerts.
#[async_trait]
pub trait NotificationCapability: Send + Sync {
    /// Current permission state without prompting.
    async fn permission_status(&self) -> Result<PermissionStatus>;

    /// Prompt for permission (when the platform still allows asking).
    async fn request_permission(&self) -> Result<PermissionStatus>;

    /// Arm an alert to fire at `content.fire_at`.
    async fn schedule(&self, content: AlertContent) -> Result<NotificationId>;

    /// Cancel an armed alert. Cancelling an unknown id is not an error.
    async fn cancel(&self, id: &NotificationId) -> Result<()>;

    /// Every alert the platform currently holds.
    async fn list_scheduled(&self) -> Result<Vec<ScheduledAlert>>;

    /// Foreground presentation currently in effect.
    fn presentation(&self) -> PresentationOptions;

    /// Runtime override of foreground presentation.
    fn set_presentation(&self, options: PresentationOptions);
}

#[derive(Debug)]
struct CenterState {
    alerts: BTreeMap<NotificationId, ScheduledAlert>,
    permission: PermissionStatus,
    grant_on_request: bool,
    presentation: PresentationOptions,
    fail_schedules: usize,
    fail_cancels: usize,
    unavailable: bool,
    schedule_calls: usize,
    cancel_calls: usize,
}

/// In-process notification center.
///
/// Holds alerts in memory for the lifetime of the process. Also exposes the
/// out-of-band hooks support tooling and tests need: dropping alerts the way
/// the OS reclaims them, injecting foreign alerts, and forcing failures.
#[derive(Debug)]
pub struct MemoryNotificationCenter {
    state: Mutex<CenterState>,
}

impl MemoryNotificationCenter {
    /// A center whose permission is already granted.
    pub fn granted(presentation: PresentationOptions) -> Self {
        Self::with_permission(
            PermissionStatus {
                granted: true,
                can_ask_again: true,
            },
            true,
            presentation,
        )
    }

    /// A center with explicit permission state. `grant_on_request` decides how
    /// a later permission prompt is answered.
    pub fn with_permission(
        permission: PermissionStatus,
        grant_on_request: bool,
        presentation: PresentationOptions,
    ) -> Self {
        Self {
            state: Mutex::new(CenterState {
                alerts: BTreeMap::new(),
                permission,
                grant_on_request,
                presentation,
                fail_schedules: 0,
                fail_cancels: 0,
                unavailable: false,
                schedule_calls: 0,
                cancel_calls: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop an alert without going through the engine (OS reclaim, user clear).
    pub fn drop_alert(&self, id: &NotificationId) -> bool {
        self.lock().alerts.remove(id).is_some()
    }

    /// Insert an alert the engine does not know about.
    pub fn inject_alert(&self, alert: ScheduledAlert) {
        self.lock()
            .alerts
            .insert(alert.notification_id.clone(), alert);
    }

    /// Remove and return every alert due at or before `now`, as the OS does
    /// once an alert has been delivered.
    pub fn deliver_due(&self, now: DateTime<Utc>) -> Vec<ScheduledAlert> {
        let mut state = self.lock();
        let due: Vec<NotificationId> = state
            .alerts
            .values()
            .filter(|alert| alert.fire_at <= now)
            .map(|alert| alert.notification_id.clone())
            .collect();
        due.iter()
            .filter_map(|id| state.alerts.remove(id))
            .collect()
    }

    /// Make the next `count` schedule calls fail.
    pub fn fail_next_schedules(&self, count: usize) {
        self.lock().fail_schedules = count;
    }

    /// Make the next `count` cancel calls fail.
    pub fn fail_next_cancels(&self, count: usize) {
        self.lock().fail_cancels = count;
    }

    /// Mark the whole capability unavailable (or available again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Overwrite the permission state.
    pub fn set_permission(&self, permission: PermissionStatus) {
        self.lock().permission = permission;
    }

    /// Number of schedule plus cancel calls received so far.
    pub fn mutation_calls(&self) -> usize {
        let state = self.lock();
        state.schedule_calls + state.cancel_calls
    }

    /// Number of alerts currently held.
    pub fn len(&self) -> usize {
        self.lock().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryNotificationCenter {
    fn default() -> Self {
        Self::granted(PresentationOptions::default())
    }
}

fn ensure_available(state: &CenterState) -> Result<()> {
    if state.unavailable {
        return Err(TracksideError::Capability(
            "notification center unavailable".to_owned(),
        ));
    }
    Ok(())
}

#[async_trait]
impl NotificationCapability for MemoryNotificationCenter {
    async fn permission_status(&self) -> Result<PermissionStatus> {
        let state = self.lock();
        ensure_available(&state)?;
        Ok(state.permission)
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        let mut state = self.lock();
        ensure_available(&state)?;
        if !state.permission.granted && state.permission.can_ask_again {
            state.permission = PermissionStatus {
                granted: state.grant_on_request,
                can_ask_again: false,
            };
        }
        Ok(state.permission)
    }

    async fn schedule(&self, content: AlertContent) -> Result<NotificationId> {
        let mut state = self.lock();
        ensure_available(&state)?;
        state.schedule_calls += 1;
        if !state.permission.granted {
            return Err(TracksideError::Permission(
                "notification permission not granted".to_owned(),
            ));
        }
        if state.fail_schedules > 0 {
            state.fail_schedules -= 1;
            return Err(TracksideError::Capability(format!(
                "schedule rejected for experience {}",
                content.experience_id
            )));
        }

        let id = NotificationId::new(uuid::Uuid::new_v4().to_string());
        state.alerts.insert(
            id.clone(),
            ScheduledAlert {
                notification_id: id.clone(),
                fire_at: content.fire_at,
                title: content.title,
                body: content.body,
                experience_id: Some(content.experience_id),
            },
        );
        Ok(id)
    }

    async fn cancel(&self, id: &NotificationId) -> Result<()> {
        let mut state = self.lock();
        ensure_available(&state)?;
        state.cancel_calls += 1;
        if state.fail_cancels > 0 {
            state.fail_cancels -= 1;
            return Err(TracksideError::Capability(format!("cancel rejected for {id}")));
        }
        state.alerts.remove(id);
        Ok(())
    }

    async fn list_scheduled(&self) -> Result<Vec<ScheduledAlert>> {
        let state = self.lock();
        ensure_available(&state)?;
        Ok(state.alerts.values().cloned().collect())
    }

    fn presentation(&self) -> PresentationOptions {
        self.lock().presentation
    }

    fn set_presentation(&self, options: PresentationOptions) {
        self.lock().presentation = options;
    }
}
