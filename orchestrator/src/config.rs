//! Boot-time configuration for the composition root (C12). Shapes mirror
//! the collaborator contract §6 assigns to the external config loader —
//! this struct is what that loader is expected to hand the orchestrator,
//! not a loader itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use host_api::Plugin;
use log_ingest::BoundedQueueConfig;
use rcon::RconConfig;
use state::AdminSource;

/// Which backend the log reader (C5) tails from.
pub enum LogReaderSource {
    Local {
        path: PathBuf,
    },
    Ftp {
        host: String,
        port: u16,
        username: String,
        password: String,
        remote_path: String,
    },
    Sftp {
        host: String,
        port: u16,
        username: String,
        password: String,
        remote_path: String,
    },
}

#[derive(Debug, Clone)]
pub struct UpdateIntervals {
    pub player_list: Duration,
    pub squad_list: Duration,
    pub layer_info: Duration,
    pub admin_list: Duration,
}

impl Default for UpdateIntervals {
    /// Defaults from §4.10: `playerList`/`squadList` 30s, `layerInfo` 60s,
    /// `adminList` 5min.
    fn default() -> Self {
        Self {
            player_list: Duration::from_secs(30),
            squad_list: Duration::from_secs(30),
            layer_info: Duration::from_secs(60),
            admin_list: Duration::from_secs(300),
        }
    }
}

pub struct OrchestratorConfig {
    pub rcon: RconConfig,
    pub log_reader: LogReaderSource,
    pub log_queue: BoundedQueueConfig,
    pub admin_sources: Vec<AdminSource>,
    pub update_intervals: UpdateIntervals,
    /// Delay before the first player/squad/map fetch after RCON connects
    /// (§4.12 step 4: "initial parallel fetch ... after a small settling
    /// delay"), giving the server a moment to finish its own startup.
    pub settling_delay: Duration,
    /// Already-constructed plugin instances (§4.16: Rust has no dynamic
    /// `import()`, so "loading" a plugin means validating one of these).
    pub plugins: Vec<Arc<dyn Plugin>>,
}
