//! Stdin/stdout JSON bridge for the host contract.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages, dispatches each
//! through [`NotificationHostHandler`], and writes one `ResponseEnvelope` line
//! per command. Stdout is exclusively reserved for the JSON protocol; all
//! diagnostic output (tracing, logs) must be routed to stderr.

use crate::error::{Result, TracksideError};
use crate::host::contract::{CommandEnvelope, CommandName, ResponseEnvelope};
use crate::host::handler::NotificationHostHandler;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

/// Run the bridge over the process's stdin/stdout until stdin closes or a
/// `runtime.stop` command is received.
pub async fn run_stdio_bridge(handler: &NotificationHostHandler) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = BufWriter::new(tokio::io::stdout());
    run_bridge(handler, reader, writer).await
}

/// Run the bridge over arbitrary line reader / writer halves.
///
/// A line that is not a valid envelope yields an error response with request
/// id `parse-error`; the bridge keeps reading.
pub async fn run_bridge<R, W>(handler: &NotificationHostHandler, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| TracksideError::Channel(format!("failed to read command line: {e}")))?;

        // EOF
        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down host bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse command envelope"
                );
                let response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                write_response(&mut writer, &response).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        let response = handler.handle(envelope).await;
        write_response(&mut writer, &response).await?;

        if is_stop {
            tracing::info!("runtime.stop received; shutting down host bridge");
            break;
        }
    }

    Ok(())
}

/// Write a single JSON line and flush.
async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &ResponseEnvelope,
) -> Result<()> {
    let json = serde_json::to_string(response).map_err(|e| {
        TracksideError::Channel(format!("failed to serialize response envelope: {e}"))
    })?;
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| TracksideError::Channel(format!("failed to write response: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| TracksideError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| TracksideError::Channel(format!("failed to flush response: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::NotificationsConfig;
    use crate::notify::{MemoryNotificationCenter, NotificationService, ScheduleStore};
    use std::sync::Arc;

    fn handler() -> NotificationHostHandler {
        let service = Arc::new(NotificationService::new(
            ScheduleStore::in_memory(),
            Arc::new(MemoryNotificationCenter::default()),
        ));
        NotificationHostHandler::new(service, NotificationsConfig::default())
    }

    async fn run(input: &str) -> Vec<ResponseEnvelope> {
        let handler = handler();
        let mut output = Vec::new();
        run_bridge(&handler, BufReader::new(input.as_bytes()), &mut output)
            .await
            .expect("bridge");
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).expect("response line"))
            .collect()
    }

    #[tokio::test]
    async fn one_response_per_command_and_blank_lines_ignored() {
        let responses = run(concat!(
            r#"{"v":1,"request_id":"a","command":"host.ping","payload":{}}"#,
            "\n\n",
            r#"{"v":1,"request_id":"b","command":"notifications.persisted"}"#,
            "\n"
        ))
        .await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].payload["pong"], true);
        assert_eq!(responses[1].request_id, "b");
        assert!(responses[1].ok);
    }

    #[tokio::test]
    async fn malformed_line_yields_parse_error_and_continues() {
        let responses = run(concat!(
            "not json\n",
            r#"{"v":1,"request_id":"c","command":"host.ping"}"#,
            "\n"
        ))
        .await;
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].request_id, "parse-error");
        assert!(!responses[0].ok);
        assert!(responses[1].ok);
    }

    #[tokio::test]
    async fn stop_ends_the_bridge() {
        let responses = run(concat!(
            r#"{"v":1,"request_id":"s","command":"runtime.stop"}"#,
            "\n",
            r#"{"v":1,"request_id":"late","command":"host.ping"}"#,
            "\n"
        ))
        .await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].payload["stopping"], true);
    }
}
