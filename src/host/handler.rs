//! Dispatch of host commands onto the notification service.

use crate::config::{NotificationsConfig, PresentationOptions};
use crate::experience::{ExperienceId, venue_offset};
use crate::host::contract::{CONTRACT_VERSION, CommandEnvelope, CommandName, ResponseEnvelope};
use crate::notify::{LeadTime, NotificationService};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ScheduleAllRequest {
    payload: Value,
    #[serde(default)]
    lead_time_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NextRequest {
    #[serde(default)]
    experience_ids: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct PresentationRequest {
    #[serde(default)]
    show_banner: Option<bool>,
    #[serde(default)]
    play_sound: Option<bool>,
}

/// Routes [`CommandEnvelope`]s to a shared [`NotificationService`].
pub struct NotificationHostHandler {
    service: Arc<NotificationService>,
    config: NotificationsConfig,
}

impl NotificationHostHandler {
    pub fn new(service: Arc<NotificationService>, config: NotificationsConfig) -> Self {
        Self { service, config }
    }

    /// Handle one command. Failures become error responses, never panics.
    pub async fn handle(&self, envelope: CommandEnvelope) -> ResponseEnvelope {
        if let Err(e) = envelope.validate() {
            return ResponseEnvelope::error(envelope.request_id, e.to_string());
        }

        if envelope.command.is_mutating() {
            info!(command = envelope.command.as_str(), request_id = %envelope.request_id, "host command");
        } else {
            debug!(command = envelope.command.as_str(), request_id = %envelope.request_id, "host command");
        }

        let request_id = envelope.request_id.clone();
        match self.dispatch(envelope).await {
            Ok(payload) => ResponseEnvelope::ok(request_id, payload),
            Err(message) => ResponseEnvelope::error(request_id, message),
        }
    }

    async fn dispatch(&self, envelope: CommandEnvelope) -> Result<Value, String> {
        match envelope.command {
            CommandName::HostPing => Ok(json!({"pong": true})),
            CommandName::HostVersion => Ok(json!({
                "version": env!("CARGO_PKG_VERSION"),
                "contract": CONTRACT_VERSION,
            })),
            CommandName::ScheduleAll => {
                let request: ScheduleAllRequest = parse_request(envelope.payload)?;
                let lead_time = request
                    .lead_time_secs
                    .map(LeadTime::from_secs)
                    .or_else(|| self.config.lead_time())
                    .ok_or_else(|| {
                        "lead_time_secs is required when no lead time is configured".to_owned()
                    })?;
                let venue =
                    venue_offset(self.config.venue_utc_offset_minutes).map_err(|e| e.to_string())?;
                let report = self
                    .service
                    .schedule_payload(&request.payload, venue, lead_time)
                    .await
                    .map_err(|e| e.to_string())?;
                to_payload(&report)
            }
            CommandName::Resync => {
                let report = self.service.resync().await.map_err(|e| e.to_string())?;
                to_payload(&report)
            }
            CommandName::Persisted => to_payload(&self.service.persisted_schedule().await),
            CommandName::OsScheduled => {
                let alerts = self
                    .service
                    .list_os_scheduled()
                    .await
                    .map_err(|e| e.to_string())?;
                to_payload(&alerts)
            }
            CommandName::Next => {
                let request: NextRequest = if envelope.payload.is_null() {
                    NextRequest::default()
                } else {
                    parse_request(envelope.payload)?
                };
                let filter: Option<BTreeSet<ExperienceId>> = request
                    .experience_ids
                    .map(|ids| {
                        ids.iter()
                            .map(experience_id_from_value)
                            .collect::<Result<BTreeSet<_>, _>>()
                    })
                    .transpose()?;
                let next = self
                    .service
                    .next_scheduled_notification(filter.as_ref())
                    .await;
                Ok(json!({ "next": to_payload(&next)? }))
            }
            CommandName::Diagnostics => to_payload(&self.service.diagnostics().await),
            CommandName::PresentationSet => {
                let request: PresentationRequest = parse_request(envelope.payload)?;
                let capability = self.service.capability();
                let current = capability.presentation();
                let updated = PresentationOptions {
                    show_banner: request.show_banner.unwrap_or(current.show_banner),
                    play_sound: request.play_sound.unwrap_or(current.play_sound),
                };
                capability.set_presentation(updated);
                to_payload(&updated)
            }
            CommandName::RuntimeStop => Ok(json!({"stopping": true})),
        }
    }
}

fn parse_request<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T, String> {
    serde_json::from_value(payload).map_err(|e| format!("invalid command payload: {e}"))
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("failed to encode response: {e}"))
}

fn experience_id_from_value(value: &Value) -> Result<ExperienceId, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(ExperienceId::from)
            .ok_or_else(|| format!("invalid experience id {n}")),
        Value::String(s) if !s.trim().is_empty() => Ok(ExperienceId::new(s.trim())),
        other => Err(format!("invalid experience id {other}")),
    }
}
