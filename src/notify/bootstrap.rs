//! Notification startup.
//!
//! [`NotificationBootstrap`] is consumed by [`NotificationBootstrap::start`],
//! so one bootstrap yields exactly one [`NotificationService`]. Start applies
//! presentation options, settles permission, loads the store, runs an initial
//! resync, and optionally spawns the periodic health check.

use crate::config::NotificationsConfig;
use crate::error::Result;
use crate::notify::capability::{NotificationCapability, PermissionStatus};
use crate::notify::service::NotificationService;
use crate::notify::store::{ScheduleStore, StoreLoadStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A started notification subsystem.
pub struct NotificationRuntime {
    pub service: Arc<NotificationService>,
    /// Permission after any prompt issued during start.
    pub permission: PermissionStatus,
    health_check: Option<tokio::task::JoinHandle<()>>,
}

impl NotificationRuntime {
    /// Whether a periodic health check task is running.
    pub fn has_health_check(&self) -> bool {
        self.health_check
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the periodic health check.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.health_check.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

/// One-shot startup for the notification subsystem.
pub struct NotificationBootstrap {
    config: NotificationsConfig,
    capability: Arc<dyn NotificationCapability>,
    store: Option<ScheduleStore>,
}

impl NotificationBootstrap {
    pub fn new(config: NotificationsConfig, capability: Arc<dyn NotificationCapability>) -> Self {
        Self {
            config,
            capability,
            store: None,
        }
    }

    /// Use an already-opened store instead of the configured path.
    pub fn with_store(mut self, store: ScheduleStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Bring the subsystem up.
    ///
    /// Must be called from within a tokio runtime when the health check is
    /// enabled.
    ///
    /// # Errors
    ///
    /// Returns an error when the capability cannot report permission state.
    /// A failing initial resync is logged, not returned.
    pub async fn start(self) -> Result<NotificationRuntime> {
        self.capability.set_presentation(self.config.presentation);

        let mut permission = self.capability.permission_status().await?;
        if !permission.granted && permission.can_ask_again {
            debug!("requesting notification permission");
            permission = self.capability.request_permission().await?;
        }
        if permission.granted {
            info!("notification permission granted");
        } else {
            warn!(
                can_ask_again = permission.can_ask_again,
                "notification permission not granted; reminders will not be armed"
            );
        }

        let store = match self.store {
            Some(store) => store,
            None => ScheduleStore::open(self.config.effective_store_path()),
        };
        if let StoreLoadStatus::Degraded { reason } = store.load_status() {
            warn!("schedule store degraded at startup; resync will clean up: {reason}");
        }

        let service = Arc::new(NotificationService::new(store, Arc::clone(&self.capability)));

        match service.resync().await {
            Ok(report) if !report.is_noop() => info!(
                rescheduled = report.rescheduled,
                removed = report.removed,
                "startup resync repaired drift"
            ),
            Ok(_) => {}
            Err(e) => warn!("startup resync failed: {e}"),
        }

        let health_check = match self.config.health_check_interval_secs {
            0 => None,
            secs => Some(spawn_health_check(
                Arc::clone(&service),
                Duration::from_secs(secs),
            )),
        };

        Ok(NotificationRuntime {
            service,
            permission,
            health_check,
        })
    }
}

/// Spawn a task that resyncs every `period`.
///
/// The first pass happens one period after spawn.
pub fn spawn_health_check(
    service: Arc<NotificationService>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            match service.resync().await {
                Ok(report) if !report.is_noop() => info!(
                    rescheduled = report.rescheduled,
                    removed = report.removed,
                    errors = report.errors.len(),
                    "health check repaired notification drift"
                ),
                Ok(_) => debug!("health check: schedule consistent"),
                Err(e) => warn!("health check resync failed: {e}"),
            }
        }
    })
}
