//! Trivial JSON boot-config read. This is *not* the configuration loader
//! described in spec.md §6 — that remains an external collaborator. This
//! module only exists so the binary has something to read on startup,
//! the way `relay-server`'s own `reload_config` reads a small JSON file
//! rather than a full layered config system.

use std::path::PathBuf;
use std::time::Duration;

use log_ingest::BoundedQueueConfig;
use orchestrator::{LogReaderSource as OrchLogReaderSource, OrchestratorConfig, UpdateIntervals};
use rcon::RconConfig;
use serde::Deserialize;
use state::AdminSource;

#[derive(Debug, Deserialize)]
pub struct RconSection {
    pub host: String,
    pub port: u16,
    pub password: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_reconnect_delay_secs() -> u64 {
    5
}
fn default_command_timeout_secs() -> u64 {
    10
}
fn default_heartbeat_interval_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LogReaderSection {
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

#[derive(Debug, Deserialize, Default)]
pub struct UpdateIntervalsSection {
    pub player_list_secs: Option<u64>,
    pub squad_list_secs: Option<u64>,
    pub layer_info_secs: Option<u64>,
    pub admin_list_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BootConfig {
    pub rcon: RconSection,
    pub log_reader: LogReaderSection,
    #[serde(default)]
    pub admin_list_paths: Vec<PathBuf>,
    #[serde(default = "default_log_queue_size")]
    pub log_queue_max_size: usize,
    #[serde(default)]
    pub update_intervals: UpdateIntervalsSection,
    #[serde(default = "default_settling_delay_secs")]
    pub settling_delay_secs: u64,
}

fn default_log_queue_size() -> usize {
    10_000
}
fn default_settling_delay_secs() -> u64 {
    2
}

impl BootConfig {
    /// The plugin catalogue itself is out of scope (§1); a boot config
    /// carries no plugins to mount, so the list is always empty here —
    /// a real deployment's process bootstrap would register concrete
    /// `Arc<dyn host_api::Plugin>` instances before calling `start`.
    pub fn into_orchestrator_config(self) -> OrchestratorConfig {
        let rcon = RconConfig {
            host: self.rcon.host,
            port: self.rcon.port,
            password: self.rcon.password,
            connect_timeout: Duration::from_secs(self.rcon.connect_timeout_secs),
            auto_reconnect: self.rcon.auto_reconnect,
            reconnect_delay: Duration::from_secs(self.rcon.reconnect_delay_secs),
            max_reconnect_attempts: self.rcon.max_reconnect_attempts,
            command_timeout: Duration::from_secs(self.rcon.command_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.rcon.heartbeat_interval_secs),
        };

        let log_reader = match self.log_reader {
            LogReaderSection::Local { path } => OrchLogReaderSource::Local { path },
            LogReaderSection::Ftp { host, port, username, password, remote_path } => {
                OrchLogReaderSource::Ftp { host, port, username, password, remote_path }
            }
            LogReaderSection::Sftp { host, port, username, password, remote_path } => {
                OrchLogReaderSource::Sftp { host, port, username, password, remote_path }
            }
        };

        let defaults = UpdateIntervals::default();
        let update_intervals = UpdateIntervals {
            player_list: self.update_intervals.player_list_secs.map(Duration::from_secs).unwrap_or(defaults.player_list),
            squad_list: self.update_intervals.squad_list_secs.map(Duration::from_secs).unwrap_or(defaults.squad_list),
            layer_info: self.update_intervals.layer_info_secs.map(Duration::from_secs).unwrap_or(defaults.layer_info),
            admin_list: self.update_intervals.admin_list_secs.map(Duration::from_secs).unwrap_or(defaults.admin_list),
        };

        OrchestratorConfig {
            rcon,
            log_reader,
            log_queue: BoundedQueueConfig::new(self.log_queue_max_size),
            admin_sources: self.admin_list_paths.into_iter().map(AdminSource::local).collect(),
            update_intervals,
            settling_delay: Duration::from_secs(self.settling_delay_secs),
            plugins: Vec::new(),
        }
    }
}
