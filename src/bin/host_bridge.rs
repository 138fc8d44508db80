//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Boots the notification subsystem against the in-process notification
//! center, then serves the host contract until stdin closes or a
//! `runtime.stop` command arrives. All tracing output goes to stderr so that
//! stdout remains a clean JSON protocol channel.

use std::sync::Arc;
use trackside::host::handler::NotificationHostHandler;
use trackside::host::stdio::run_stdio_bridge;
use trackside::notify::{MemoryNotificationCenter, NotificationBootstrap, PermissionStatus};
use trackside::TracksideConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trackside=info")),
        )
        .init();

    let config_path = std::env::var_os("TRACKSIDE_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(TracksideConfig::default_config_path);
    let config = if config_path.is_file() {
        TracksideConfig::from_file(&config_path)?
    } else {
        tracing::info!("no config at {}; using defaults", config_path.display());
        TracksideConfig::default()
    };

    tracing::info!("trackside-host starting");

    // Permission starts undetermined; the bootstrap prompt grants it.
    let center = Arc::new(MemoryNotificationCenter::with_permission(
        PermissionStatus {
            granted: false,
            can_ask_again: true,
        },
        true,
        config.notifications.presentation,
    ));
    let runtime = NotificationBootstrap::new(config.notifications.clone(), center)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("notification bootstrap failed: {e}"))?;

    let handler = NotificationHostHandler::new(Arc::clone(&runtime.service), config.notifications);
    let result = run_stdio_bridge(&handler).await;
    runtime.shutdown().await;

    result.map_err(|e| {
        tracing::error!(error = %e, "trackside-host exited with error");
        anyhow::anyhow!("trackside-host failed: {e}")
    })?;

    tracing::info!("trackside-host shut down cleanly");
    Ok(())
}
