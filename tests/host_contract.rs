//! Drives the host bridge end to end over in-memory pipes.

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::BufReader;
use trackside::NotificationsConfig;
use trackside::host::contract::{CommandEnvelope, CommandName, ResponseEnvelope};
use trackside::host::handler::NotificationHostHandler;
use trackside::host::stdio::run_bridge;
use trackside::notify::{MemoryNotificationCenter, NotificationService, ScheduleStore};

fn handler(config: NotificationsConfig) -> (NotificationHostHandler, Arc<MemoryNotificationCenter>) {
    let center = Arc::new(MemoryNotificationCenter::default());
    let service = Arc::new(NotificationService::new(
        ScheduleStore::in_memory(),
        center.clone(),
    ));
    (NotificationHostHandler::new(service, config), center)
}

fn line(request_id: &str, command: CommandName, payload: Value) -> String {
    let envelope = CommandEnvelope::new(request_id, command, payload);
    format!("{}\n", serde_json::to_string(&envelope).expect("encode envelope"))
}

async fn exchange(handler: &NotificationHostHandler, input: String) -> Vec<ResponseEnvelope> {
    let mut output = Vec::new();
    run_bridge(handler, BufReader::new(input.as_bytes()), &mut output)
        .await
        .expect("bridge run");
    String::from_utf8(output)
        .expect("utf8 output")
        .lines()
        .map(|l| serde_json::from_str(l).expect("response envelope"))
        .collect()
}

fn content_payload() -> Value {
    let now = Utc::now();
    json!({"data": {"scheduleExperiences": [
        {"experience": {
            "id": 7,
            "title": "Garage Tour",
            "autoNotify": true,
            "startAt": (now + Duration::hours(2)).to_rfc3339(),
            "description": [{"type": "paragraph", "children": [{"text": "Meet the crew behind the car."}]}]
        }},
        {"experience": {
            "id": 8,
            "title": "Pit Lane Walk",
            "autoNotify": true,
            "startAt": (now + Duration::minutes(45)).to_rfc3339()
        }},
        {"experience": {
            "id": 9,
            "title": "Team Photo",
            "autoNotify": false,
            "startAt": (now + Duration::minutes(20)).to_rfc3339()
        }},
        {"experience": {"title": "No id"}}
    ]}})
}

#[tokio::test]
async fn schedule_then_query_over_the_bridge() {
    let (handler, center) = handler(NotificationsConfig {
        lead_time_secs: Some(600),
        ..NotificationsConfig::default()
    });
    let payload = content_payload();
    let input = [
        line("1", CommandName::ScheduleAll, json!({"payload": payload})),
        line("2", CommandName::ScheduleAll, json!({"payload": payload})),
        line("3", CommandName::Next, Value::Null),
        line("4", CommandName::Next, json!({"experience_ids": ["7"]})),
        line("5", CommandName::Persisted, Value::Null),
        line("6", CommandName::RuntimeStop, Value::Null),
        line("7", CommandName::HostPing, Value::Null),
    ]
    .concat();

    let responses = exchange(&handler, input).await;

    // Nothing after runtime.stop is answered.
    assert_eq!(responses.len(), 6);
    assert!(responses.iter().all(|r| r.ok), "{responses:?}");

    let first = &responses[0].payload;
    assert_eq!(first["scheduled"], 2);
    assert_eq!(first["skipped"], 1);
    assert_eq!(first["rejected"].as_array().map(Vec::len), Some(1));

    let second = &responses[1].payload;
    assert_eq!(second["scheduled"], 0);
    assert_eq!(second["unchanged"], 2);

    assert_eq!(responses[2].payload["next"]["title"], "Pit Lane Walk");
    assert_eq!(responses[3].payload["next"]["title"], "Garage Tour");

    let persisted = responses[4].payload.as_object().expect("persisted map");
    assert_eq!(persisted.len(), 2);
    assert_eq!(center.len(), 2);
}

#[tokio::test]
async fn malformed_lines_do_not_stop_the_bridge() {
    let (handler, _center) = handler(NotificationsConfig::default());
    let input = format!(
        "not json at all\n\n{}",
        line("p", CommandName::HostPing, Value::Null)
    );

    let responses = exchange(&handler, input).await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].request_id, "parse-error");
    assert!(!responses[0].ok);
    assert_eq!(responses[1].request_id, "p");
    assert_eq!(responses[1].payload, json!({"pong": true}));
}

#[tokio::test]
async fn resync_and_diagnostics_report_drift_repair() {
    let (handler, center) = handler(NotificationsConfig::default());
    let scheduled = exchange(
        &handler,
        line(
            "s",
            CommandName::ScheduleAll,
            json!({"payload": content_payload(), "lead_time_secs": 300}),
        ),
    )
    .await;
    assert!(scheduled[0].ok);

    let live = center.deliver_due(Utc::now() + Duration::days(1));
    assert_eq!(live.len(), 2);
    assert!(center.is_empty());

    let responses = exchange(
        &handler,
        [
            line("r", CommandName::Resync, Value::Null),
            line("d", CommandName::Diagnostics, Value::Null),
        ]
        .concat(),
    )
    .await;

    assert_eq!(responses[0].payload["rescheduled"], 2);
    assert_eq!(responses[0].payload["removed"], 0);
    let diagnostics = &responses[1].payload;
    assert_eq!(diagnostics["os_scheduled"].as_array().map(Vec::len), Some(2));
    assert_eq!(diagnostics["permission"]["granted"], true);
    assert_eq!(diagnostics["last_schedule"]["report"]["scheduled"], 2);
}
