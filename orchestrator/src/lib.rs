//! The composition root (C12): wires RCON, the log pipeline, the state
//! services, the update scheduler, and the plugin host into the single
//! `Orchestrator` handle a binary drives through `start`/`stop`.
//!
//! Every collaborator crate (`rcon`, `log-ingest`, `scheduler`,
//! `event-bus`, `state`, `host-api`, `plugin-host`) is generic over its
//! own concern and knows nothing of the others. This crate is the only
//! place that assembly happens, and the only place `host_api::CommandApi`
//! / `host_api::ReadModel` get a concrete implementation (§9: breaking
//! the orchestrator/plugin-host cycle).

mod command_api;
pub mod config;
mod enrich;
mod read_model;
mod refresh;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use domain::admin::AdminRoster;
use domain::error::{ErrorContext, PluginErrorKind, SupervisorError};
use domain::event::{Event, ServerErrorEvent};
use event_bus::EventBus;
use host_api::{CommandApi, Plugin, ReadModel};
use log_ingest::LogEvent;
use plugin_host::{ConnectorRegistry, ManagerDeps, PluginManager};
use rcon::{ConnectionEvent, ConnectionState, RconHandle};
use scheduler::{task_fn, Scheduler, TaskConfig};
use state::{AdminService, LayerService, PlayerService, SquadService};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub use config::{LogReaderSource, OrchestratorConfig, UpdateIntervals};

/// The mutable player/squad/layer state (§4.11). Guarded by a plain
/// `std::sync::Mutex`: every access is a short, synchronous map lookup
/// or diff, never held across an `.await`.
struct Shared {
    players: PlayerService,
    squads: SquadService,
    layers: LayerService,
}

struct Inner {
    rcon_config: rcon::RconConfig,
    log_reader: Mutex<Option<LogReaderSource>>,
    log_queue: Mutex<Option<log_ingest::BoundedQueueConfig>>,
    update_intervals: UpdateIntervals,
    settling_delay: Duration,
    plugins: Mutex<Option<Vec<Arc<dyn Plugin>>>>,

    shared: Mutex<Shared>,
    events: Arc<EventBus>,
    scheduler: Scheduler,
    connectors: Arc<ConnectorRegistry>,

    /// Refresh side of admin state: owns the sources, runs `refresh()`
    /// behind its own async mutex (safe to hold across an `.await`).
    admin_service: tokio::sync::Mutex<AdminService>,
    /// Read side: a plain-locked snapshot of the merged roster, swapped
    /// in once a refresh completes, so [`ReadModel::has_permission`] (a
    /// synchronous trait method) never waits on RCON or disk I/O.
    admin_roster: Mutex<AdminRoster>,

    rcon: tokio::sync::RwLock<Option<RconHandle>>,
    plugin_manager: tokio::sync::Mutex<Option<PluginManager>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

/// Cheap-to-clone handle onto the whole running supervisor, mirroring
/// [`RconHandle`]'s own "clone is just another reference" shape.
#[derive(Clone)]
pub struct Orchestrator(Arc<Inner>);

fn not_running() -> SupervisorError {
    SupervisorError::InvalidState {
        message: "orchestrator is not running".to_string(),
        context: ErrorContext::new(),
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let shared = Shared {
            players: PlayerService::new(),
            squads: SquadService::new(),
            layers: LayerService::default(),
        };
        let inner = Inner {
            rcon_config: config.rcon,
            log_reader: Mutex::new(Some(config.log_reader)),
            log_queue: Mutex::new(Some(config.log_queue)),
            update_intervals: config.update_intervals,
            settling_delay: config.settling_delay,
            plugins: Mutex::new(Some(config.plugins)),

            shared: Mutex::new(shared),
            events: EventBus::new(),
            scheduler: Scheduler::new(),
            connectors: ConnectorRegistry::new(),

            admin_service: tokio::sync::Mutex::new(AdminService::new(config.admin_sources)),
            admin_roster: Mutex::new(AdminRoster::new()),

            rcon: tokio::sync::RwLock::new(None),
            plugin_manager: tokio::sync::Mutex::new(None),
            background: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        };
        Self(Arc::new(inner))
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.0.events.clone()
    }

    pub fn connector_registry(&self) -> Arc<ConnectorRegistry> {
        self.0.connectors.clone()
    }

    pub fn is_running(&self) -> bool {
        self.0.running.load(Ordering::Acquire)
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.0.shared.lock().unwrap()
    }

    async fn rcon_handle(&self) -> Result<RconHandle, SupervisorError> {
        self.0.rcon.read().await.clone().ok_or_else(|| SupervisorError::NotConnected { context: ErrorContext::new() })
    }

    fn push_background(&self, handle: JoinHandle<()>) {
        self.0.background.lock().unwrap().push(handle);
    }

    /// Logs an error with its structured fields and re-emits it as a
    /// `SERVER_ERROR` event (§7) so subscribers see it without the
    /// process terminating. `component` names the collaborator the
    /// error originated in (e.g. `"rcon"`, `"log-ingest"`, `"plugin:foo"`).
    fn report_error(&self, component: &str, error: SupervisorError) {
        tracing::warn!(component, code = error.code(), recoverable = error.recoverable(), %error, "server error");
        self.events().emit(Event::ServerError(ServerErrorEvent {
            component: component.to_string(),
            code: error.code(),
            message: error.to_string(),
            recoverable: error.recoverable(),
            context: error.context().clone(),
        }));
    }

    fn handle_log_event(&self, log_event: LogEvent) {
        let event = {
            let mut shared = self.shared();
            if let LogEvent::NewGame { ref disconnected, .. } = log_event {
                shared.players.apply_map_change(disconnected);
            }
            enrich::enrich_log_event(log_event, &shared.players)
        };
        if let Some(event) = event {
            self.events().emit(event);
        }
    }

    /// Brings the whole supervisor up, in the order §4.12 specifies:
    /// RCON connect, non-fatal admin load, log pipeline start, an
    /// initial settled fetch, then the periodic scheduler and plugins.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        if self.is_running() {
            return Err(SupervisorError::InvalidState {
                message: "orchestrator is already running".to_string(),
                context: ErrorContext::new(),
            });
        }

        // 1. RCON connect with auth.
        let handle = RconHandle::spawn(self.0.rcon_config.clone());
        let mut connection_events = handle.subscribe_events();
        wait_for_connected(&mut connection_events, self.0.rcon_config.connect_timeout).await?;
        *self.0.rcon.write().await = Some(handle.clone());

        let chat_rx = handle.subscribe_chat();
        self.push_background(self.spawn_chat_forwarder(chat_rx));

        // 2. Admin lists (non-fatal: §4.12 step 2).
        self.refresh_admin().await;

        // 3. Log parser start (fatal if it can't even begin watching).
        self.start_log_pipeline().await?;

        // 4. Initial parallel fetch once things have settled.
        tokio::time::sleep(self.0.settling_delay).await;
        let (players, squads, layers) = tokio::join!(self.refresh_players(), self.refresh_squads(), self.refresh_layers());
        for (label, result) in [("state::player", players), ("state::squad", squads), ("state::layer", layers)] {
            if let Err(error) = result {
                self.report_error(label, error);
            }
        }

        // 5. Periodic refresh tasks.
        self.register_scheduled_tasks()?;

        // Plugins mount last, once there's state worth reading.
        self.mount_plugins().await;

        self.0.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Tears everything down in reverse order (§5): plugins unmount,
    /// scheduled tasks stop, background forwarders are aborted, the RCON
    /// socket closes, connectors disconnect.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        if !self.is_running() {
            return Err(not_running());
        }
        self.0.running.store(false, Ordering::Release);

        if let Some(mut manager) = self.0.plugin_manager.lock().await.take() {
            let report = manager.unmount_all().await;
            for (name, message) in report.hook_errors {
                self.report_error(
                    &format!("plugin:{name}"),
                    SupervisorError::PluginError { kind: PluginErrorKind::Lifecycle, plugin: name, message, context: ErrorContext::new() },
                );
            }
        }

        self.0.scheduler.stop_all();

        for handle in self.0.background.lock().unwrap().drain(..) {
            handle.abort();
        }

        if let Some(handle) = self.0.rcon.write().await.take() {
            handle.shutdown();
        }

        for error in self.0.connectors.disconnect_all().await {
            self.report_error("plugin-host::connectors", error);
        }

        Ok(())
    }

    fn spawn_chat_forwarder(&self, mut chat_rx: broadcast::Receiver<protocol::chat::ChatClassification>) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            loop {
                match chat_rx.recv().await {
                    Ok(classification) => {
                        if let Some(event) = enrich::enrich_chat_event(classification) {
                            orchestrator.events().emit(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        let mut context = ErrorContext::new();
                        context.insert("skipped".to_string(), skipped.to_string());
                        orchestrator.report_error(
                            "rcon::chat_forwarder",
                            SupervisorError::QueueFull { queue: "chat_broadcast".to_string(), context },
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Starts the log reader + correlation pipeline. Watching the
    /// underlying source is the only step that can fail fast; everything
    /// past that runs forever by design, so a short grace period stands
    /// in for a "did it start" signal rather than awaiting the pipeline
    /// task itself.
    async fn start_log_pipeline(&self) -> Result<(), SupervisorError> {
        let reader_config = self
            .0
            .log_reader
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SupervisorError::InvalidState {
                message: "log reader already started".to_string(),
                context: ErrorContext::new(),
            })?;
        let queue_config = self.0.log_queue.lock().unwrap().take().ok_or_else(|| SupervisorError::InvalidState {
            message: "log pipeline already started".to_string(),
            context: ErrorContext::new(),
        })?;
        let source = build_log_source(reader_config);
        let rules = log_ingest::default_rules();

        let (log_tx, mut log_rx) = mpsc::channel(256);
        let pipeline_handle = tokio::spawn(log_ingest::run_pipeline(source, rules, queue_config, log_tx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        if pipeline_handle.is_finished() {
            return match pipeline_handle.await {
                Ok(Ok(())) => Err(SupervisorError::WatchFailed {
                    message: "log pipeline exited immediately after starting".to_string(),
                    context: ErrorContext::new(),
                }),
                Ok(Err(error)) => Err(error),
                Err(join_error) => Err(SupervisorError::WatchFailed {
                    message: format!("log pipeline task panicked: {join_error}"),
                    context: ErrorContext::new(),
                }),
            };
        }
        let watchdog = self.clone();
        self.push_background(tokio::spawn(async move {
            match pipeline_handle.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => watchdog.report_error("log-ingest", error),
                Err(join_error) => watchdog.report_error(
                    "log-ingest",
                    SupervisorError::WatchFailed { message: format!("log pipeline task panicked: {join_error}"), context: ErrorContext::new() },
                ),
            }
        }));

        let orchestrator = self.clone();
        self.push_background(tokio::spawn(async move {
            while let Some(log_event) = log_rx.recv().await {
                orchestrator.handle_log_event(log_event);
            }
        }));
        Ok(())
    }

    fn register_scheduled_tasks(&self) -> Result<(), SupervisorError> {
        let intervals = self.0.update_intervals.clone();
        let register = |name: &'static str, interval: Duration, run: scheduler::TaskFn| -> Result<(), SupervisorError> {
            self.0.scheduler.register(TaskConfig::new(name, interval), run).map_err(|error| SupervisorError::InvalidState {
                message: error.to_string(),
                context: ErrorContext::new(),
            })
        };

        let players = self.clone();
        register(
            "playerList",
            intervals.player_list,
            task_fn(move || {
                let players = players.clone();
                async move { players.refresh_players().await.map_err(|e| e.to_string()) }
            }),
        )?;

        let squads = self.clone();
        register(
            "squadList",
            intervals.squad_list,
            task_fn(move || {
                let squads = squads.clone();
                async move { squads.refresh_squads().await.map_err(|e| e.to_string()) }
            }),
        )?;

        let layers = self.clone();
        register(
            "layerInfo",
            intervals.layer_info,
            task_fn(move || {
                let layers = layers.clone();
                async move { layers.refresh_layers().await.map_err(|e| e.to_string()) }
            }),
        )?;

        let admin = self.clone();
        register(
            "adminList",
            intervals.admin_list,
            task_fn(move || {
                let admin = admin.clone();
                async move {
                    admin.refresh_admin().await;
                    Ok(())
                }
            }),
        )?;

        Ok(())
    }

    async fn mount_plugins(&self) {
        let plugins = self.0.plugins.lock().unwrap().take().unwrap_or_default();
        let candidates = plugins.into_iter().map(|plugin| (plugin, "config".to_string())).collect();
        let (loaded, load_errors) = plugin_host::load_all(candidates);
        for error in load_errors {
            self.report_error(
                &format!("plugin:{}", error.source),
                SupervisorError::PluginError { kind: PluginErrorKind::Validation, plugin: error.source.clone(), message: error.message.clone(), context: ErrorContext::new() },
            );
        }

        let rcon_api: Arc<dyn CommandApi> = Arc::new(self.clone());
        let read_model: Arc<dyn ReadModel> = Arc::new(self.clone());
        let mut manager = PluginManager::new(ManagerDeps {
            events: self.events(),
            rcon: rcon_api,
            state: read_model,
            connectors: self.connector_registry(),
            breaker_config: Default::default(),
            runner_config: Default::default(),
        });

        let report = manager.mount_all(loaded).await;
        for name in report.skipped_missing_dependency {
            self.report_error(
                &format!("plugin:{name}"),
                SupervisorError::PluginError {
                    kind: PluginErrorKind::Validation,
                    plugin: name,
                    message: "mounted with a missing dependency".to_string(),
                    context: ErrorContext::new(),
                },
            );
        }
        for name in report.cyclic {
            self.report_error(
                &format!("plugin:{name}"),
                SupervisorError::PluginError {
                    kind: PluginErrorKind::Validation,
                    plugin: name,
                    message: "excluded from mounting: dependency cycle".to_string(),
                    context: ErrorContext::new(),
                },
            );
        }
        for (name, message) in report.failed {
            self.report_error(
                &format!("plugin:{name}"),
                SupervisorError::PluginError { kind: PluginErrorKind::Lifecycle, plugin: name, message, context: ErrorContext::new() },
            );
        }

        *self.0.plugin_manager.lock().await = Some(manager);
    }
}

fn build_log_source(source: LogReaderSource) -> Box<dyn log_ingest::LogSource> {
    match source {
        LogReaderSource::Local { path } => Box::new(log_ingest::LocalTail::new(path)),
        LogReaderSource::Ftp { host, port, username, password, remote_path } => {
            Box::new(log_ingest::FtpTail::new(host, port, username, password, remote_path))
        }
        LogReaderSource::Sftp { host, port, username, password, remote_path } => {
            Box::new(log_ingest::SftpTail::new(host, port, username, password, remote_path))
        }
    }
}

async fn wait_for_connected(events: &mut broadcast::Receiver<ConnectionEvent>, timeout: Duration) -> Result<(), SupervisorError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(SupervisorError::ConnectionTimeout {
                message: "timed out waiting for rcon to connect".to_string(),
                context: ErrorContext::new(),
            });
        }
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(ConnectionEvent::StateChanged(ConnectionState::Connected))) => return Ok(()),
            Ok(Ok(ConnectionEvent::Error(summary))) if !summary.recoverable => {
                return Err(SupervisorError::AuthFailed { message: summary.message, context: ErrorContext::new() });
            }
            Ok(Ok(_)) => continue,
            Ok(Err(_)) => continue,
            Err(_) => {
                return Err(SupervisorError::ConnectionTimeout {
                    message: "timed out waiting for rcon to connect".to_string(),
                    context: ErrorContext::new(),
                });
            }
        }
    }
}
