//! Trackside: local reminder scheduling for the event app.
//!
//! The app fetches "experiences" (sessions, VIP tours, pit walks) from a
//! headless content API. This crate decides which of them get a local
//! reminder, keeps a durable record of every alert it arms, and keeps the
//! platform notification center consistent with that record across restarts.
//!
//! # Architecture
//!
//! - **Payload parse** ([`experience`]): validates raw content JSON into [`Experience`]s
//! - **Store** ([`notify::store`]): durable experience → alert map
//! - **Engine** ([`notify::engine`]): converges alerts onto a payload
//! - **Resync** ([`notify::reconcile`]): repairs drift against live alerts
//! - **Query** ([`notify::query`]): read-only "next reminder" projection
//! - **Host** ([`host`]): JSON contract for the native shell

pub mod config;
pub mod error;
pub mod experience;
pub mod host;
pub mod notify;
pub mod trackside_dirs;

pub use config::{NotificationsConfig, PresentationOptions, TracksideConfig};
pub use error::{Result, TracksideError};
pub use experience::{Experience, ExperienceId, ParsedPayload, RichTextBlock, parse_payload};
pub use notify::{
    LeadTime, NotificationBootstrap, NotificationCapability, NotificationService, ScheduleEntry,
    ScheduleReport, ScheduleStore,
};
