use scope_lens::controller::{runtime, StartOutcome};
use scope_lens::logging;
use scope_lens::session::SessionExit;
use scope_lens::settings::{AppConfig, DEFAULT_CONFIG_FILE};
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = AppConfig::load(&path)?;
    logging::init(config.debug_logging, Some(config.log_file_path()));
    tracing::info!(config = %path, "configuration loaded");

    let controller = runtime();
    if controller.start(config.lens.clone())? == StartOutcome::AlreadyActive {
        tracing::warn!("magnifier was already running");
    }
    if config.lens.bindings.exit_key.is_none() {
        tracing::info!("no exit key bound; stop the process to close the lens");
    }

    while !controller.wait_for_idle(Duration::from_millis(500)) {}

    match controller.last_exit() {
        Some(SessionExit::StartupFailed) => anyhow::bail!("magnifier failed to start"),
        exit => {
            tracing::info!(?exit, "exiting");
            Ok(())
        }
    }
}
