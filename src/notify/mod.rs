//! Local reminder scheduling and reconciliation.
//!
//! Takes experiences from the content source, decides which deserve a
//! reminder, keeps a durable record of what was armed, and keeps the
//! platform's alert list consistent with that record.

pub mod bootstrap;
pub mod capability;
pub mod engine;
pub mod query;
pub mod reconcile;
pub mod service;
pub mod store;

pub use bootstrap::{NotificationBootstrap, NotificationRuntime, spawn_health_check};
pub use capability::{
    AlertContent, MemoryNotificationCenter, NotificationCapability, NotificationId,
    PermissionStatus, ScheduledAlert,
};
pub use engine::{ItemOperation, LeadTime, ScheduleItemError, ScheduleReport};
pub use query::UpcomingNotification;
pub use reconcile::ResyncReport;
pub use service::{DiagnosticsSnapshot, NotificationService, PayloadScheduleReport};
pub use store::{ScheduleEntry, ScheduleStore, StoreLoadStatus};
