//! Process bootstrap for the game server supervisor. Deliberately thin:
//! read a boot config path from argv, build an `Orchestrator`, run it
//! until interrupted. The real configuration loader, CLI surface, and
//! plugin catalogue are external collaborators (spec §1/§6) this binary
//! does not implement.

mod config;

use std::path::PathBuf;

use config::BootConfig;
use orchestrator::Orchestrator;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| format!("{}=info,orchestrator=info,rcon=info,log_ingest=info,plugin_host=info", env!("CARGO_CRATE_NAME")).into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("supervisor.json"));

    let raw = match std::fs::read_to_string(&config_path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::error!(path = %config_path.display(), %error, "failed to read boot config");
            std::process::exit(1);
        }
    };
    let boot: BootConfig = match serde_json::from_str(&raw) {
        Ok(boot) => boot,
        Err(error) => {
            tracing::error!(path = %config_path.display(), %error, "failed to parse boot config");
            std::process::exit(1);
        }
    };

    let orchestrator = Orchestrator::new(boot.into_orchestrator_config());

    if let Err(error) = orchestrator.start().await {
        tracing::error!(%error, "orchestrator failed to start");
        std::process::exit(1);
    }
    tracing::info!("supervisor running, press ctrl-c to stop");

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for ctrl-c");
    }

    tracing::info!("shutting down");
    if let Err(error) = orchestrator.stop().await {
        tracing::error!(%error, "orchestrator failed to stop cleanly");
    }
}
