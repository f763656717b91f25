//! Plugin runner (C17): drives a single plugin instance through its
//! lifecycle state machine with timeouts, recording how long each phase
//! took and forcing unmount to always reach `Unloaded`.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use domain::error::{ErrorContext, PluginErrorKind, SupervisorError};
use host_api::{Plugin, PluginContext, PluginMeta};

pub const DEFAULT_MOUNT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_UNMOUNT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unloaded,
    Preparing,
    Mounting,
    Mounted,
    Unmounting,
    Error,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub mount_timeout: Duration,
    pub unmount_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { mount_timeout: DEFAULT_MOUNT_TIMEOUT, unmount_timeout: DEFAULT_UNMOUNT_TIMEOUT }
    }
}

pub struct LifecycleReport {
    pub state: PluginState,
    pub duration: Duration,
    pub error: Option<SupervisorError>,
}

/// Owns one plugin's current [`PluginState`] and runs its lifecycle
/// methods against that state machine (§4.17). The manager (C19) holds
/// one of these per mounted plugin.
pub struct PluginRunner {
    plugin: std::sync::Arc<dyn Plugin>,
    config: RunnerConfig,
    state: Mutex<PluginState>,
}

impl PluginRunner {
    pub fn new(plugin: std::sync::Arc<dyn Plugin>, config: RunnerConfig) -> Self {
        Self { plugin, config, state: Mutex::new(PluginState::Unloaded) }
    }

    pub fn meta(&self) -> &PluginMeta {
        self.plugin.meta()
    }

    pub fn state(&self) -> PluginState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: PluginState) {
        *self.state.lock().unwrap() = state;
    }

    /// Runs the optional `prepareToMount` hook. Valid only from
    /// `Unloaded`.
    pub async fn prepare(&self, ctx: &PluginContext) -> LifecycleReport {
        if self.state() != PluginState::Unloaded {
            return self.invalid_transition("prepare");
        }
        self.set_state(PluginState::Preparing);
        let started = Instant::now();
        let result = self.plugin.prepare_to_mount(ctx).await;
        let duration = started.elapsed();
        match result {
            Ok(()) => {
                self.set_state(PluginState::Unloaded);
                LifecycleReport { state: PluginState::Unloaded, duration, error: None }
            }
            Err(err) => {
                self.set_state(PluginState::Error);
                LifecycleReport { state: PluginState::Error, duration, error: Some(err) }
            }
        }
    }

    /// Runs `mount`, bounded by `config.mount_timeout`. Valid only from
    /// `Unloaded` (§4.17: "mount fails if state is not unloaded/preparing").
    pub async fn mount(&self, ctx: PluginContext) -> LifecycleReport {
        if !matches!(self.state(), PluginState::Unloaded) {
            return self.invalid_transition("mount");
        }
        self.set_state(PluginState::Mounting);
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.mount_timeout, self.plugin.mount(ctx)).await;
        let duration = started.elapsed();

        match outcome {
            Ok(Ok(())) => {
                self.set_state(PluginState::Mounted);
                LifecycleReport { state: PluginState::Mounted, duration, error: None }
            }
            Ok(Err(err)) => {
                self.set_state(PluginState::Error);
                LifecycleReport { state: PluginState::Error, duration, error: Some(err) }
            }
            Err(_) => {
                self.set_state(PluginState::Error);
                let mut context = ErrorContext::new();
                context.insert("timeout_ms".to_string(), self.config.mount_timeout.as_millis().to_string());
                let err = SupervisorError::PluginError {
                    kind: PluginErrorKind::Lifecycle,
                    plugin: self.meta().name.clone(),
                    message: "mount timed out".to_string(),
                    context,
                };
                LifecycleReport { state: PluginState::Error, duration, error: Some(err) }
            }
        }
    }

    /// Runs `unmount`, bounded by `config.unmount_timeout`. Permitted from
    /// `Mounted` or `Error`; always lands in `Unloaded` regardless of the
    /// hook's outcome (§4.17: "unmount must always complete").
    pub async fn unmount(&self) -> LifecycleReport {
        if !matches!(self.state(), PluginState::Mounted | PluginState::Error) {
            return self.invalid_transition("unmount");
        }
        self.set_state(PluginState::Unmounting);
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.unmount_timeout, self.plugin.unmount()).await;
        let duration = started.elapsed();
        self.set_state(PluginState::Unloaded);

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => {
                tracing::warn!(plugin = %self.meta().name, error = %err, "plugin unmount hook failed");
                Some(err)
            }
            Err(_) => {
                let mut context = ErrorContext::new();
                context.insert("timeout_ms".to_string(), self.config.unmount_timeout.as_millis().to_string());
                let err = SupervisorError::PluginError {
                    kind: PluginErrorKind::Lifecycle,
                    plugin: self.meta().name.clone(),
                    message: "unmount timed out".to_string(),
                    context,
                };
                tracing::warn!(plugin = %self.meta().name, "plugin unmount timed out");
                Some(err)
            }
        };
        LifecycleReport { state: PluginState::Unloaded, duration, error }
    }

    fn invalid_transition(&self, operation: &str) -> LifecycleReport {
        let mut context = ErrorContext::new();
        context.insert("from_state".to_string(), self.state().to_string());
        LifecycleReport {
            state: self.state(),
            duration: Duration::ZERO,
            error: Some(SupervisorError::PluginError {
                kind: PluginErrorKind::Lifecycle,
                plugin: self.meta().name.clone(),
                message: format!("cannot {operation} from this state"),
                context,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use host_api::{CommandApi, EventHandler, EventsHandle, OptionsSpecification, ReadModel, TimerCallback, TimersHandle, Unsubscribe};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration as StdDuration;

    struct NoopEvents;
    impl EventsHandle for NoopEvents {
        fn on(&self, _kind: domain::event::EventKind, _handler: EventHandler) -> Unsubscribe {
            Box::new(|| {})
        }
        fn once(&self, _kind: domain::event::EventKind, _handler: EventHandler) -> Unsubscribe {
            Box::new(|| {})
        }
    }
    impl TimersHandle for NoopEvents {
        fn set_interval(&self, _period: StdDuration, _callback: TimerCallback) -> Unsubscribe {
            Box::new(|| {})
        }
        fn set_timeout(&self, _delay: StdDuration, _callback: TimerCallback) -> Unsubscribe {
            Box::new(|| {})
        }
    }

    struct NoopCommands;
    #[async_trait]
    impl CommandApi for NoopCommands {
        async fn broadcast(&self, _message: &str) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn warn(&self, _player_id: domain::ids::PlayerId, _message: &str) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn kick(&self, _player_id: domain::ids::PlayerId, _reason: &str) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn ban(&self, _player_id: domain::ids::PlayerId, _duration: &str, _reason: &str) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn execute(&self, _command: &str) -> Result<String, SupervisorError> {
            Ok(String::new())
        }
    }

    struct NoopState;
    impl ReadModel for NoopState {
        fn player(&self, _eos_id: &domain::ids::EosId) -> Option<domain::player::Player> {
            None
        }
        fn player_by_steam_id(&self, _steam_id: &domain::ids::SteamId) -> Option<domain::player::Player> {
            None
        }
        fn players(&self) -> Vec<domain::player::Player> {
            Vec::new()
        }
        fn squad(&self, _team_id: domain::ids::TeamId, _squad_id: domain::ids::SquadId) -> Option<domain::squad::Squad> {
            None
        }
        fn squads(&self) -> Vec<domain::squad::Squad> {
            Vec::new()
        }
        fn current_layer(&self) -> Option<domain::layer::Layer> {
            None
        }
        fn next_layer(&self) -> Option<domain::layer::Layer> {
            None
        }
        fn has_permission(&self, _identity: &str, _permission: &str) -> bool {
            false
        }
    }

    fn context() -> PluginContext {
        PluginContext {
            events: Arc::new(NoopEvents),
            timers: Arc::new(NoopEvents),
            rcon: Arc::new(NoopCommands),
            state: Arc::new(NoopState),
            log: tracing::Span::none(),
            get_connector: Arc::new(|_| None),
        }
    }

    struct Well {
        meta: PluginMeta,
        options_spec: OptionsSpecification,
        mounted: AtomicBool,
    }

    #[async_trait]
    impl Plugin for Well {
        fn meta(&self) -> &PluginMeta {
            &self.meta
        }
        fn options_spec(&self) -> &OptionsSpecification {
            &self.options_spec
        }
        async fn mount(&self, _ctx: PluginContext) -> Result<(), SupervisorError> {
            self.mounted.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn unmount(&self) -> Result<(), SupervisorError> {
            self.mounted.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn well() -> Arc<Well> {
        Arc::new(Well {
            meta: PluginMeta {
                name: "well".to_string(),
                description: String::new(),
                version: "1.0.0".to_string(),
                default_enabled: true,
                author: None,
                url: None,
                dependencies: vec![],
            },
            options_spec: OptionsSpecification::new(),
            mounted: AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn mount_then_unmount_walks_through_the_expected_states() {
        let runner = PluginRunner::new(well(), RunnerConfig::default());
        assert_eq!(runner.state(), PluginState::Unloaded);

        let mount = runner.mount(context()).await;
        assert!(mount.error.is_none());
        assert_eq!(runner.state(), PluginState::Mounted);

        let unmount = runner.unmount().await;
        assert!(unmount.error.is_none());
        assert_eq!(runner.state(), PluginState::Unloaded);
    }

    #[tokio::test]
    async fn mount_is_rejected_from_an_already_mounted_state() {
        let runner = PluginRunner::new(well(), RunnerConfig::default());
        runner.mount(context()).await;
        let second = runner.mount(context()).await;
        assert!(second.error.is_some());
    }

    struct SlowMount;
    #[async_trait]
    impl Plugin for SlowMount {
        fn meta(&self) -> &PluginMeta {
            static META: std::sync::OnceLock<PluginMeta> = std::sync::OnceLock::new();
            META.get_or_init(|| PluginMeta {
                name: "slow".to_string(),
                description: String::new(),
                version: "1.0.0".to_string(),
                default_enabled: true,
                author: None,
                url: None,
                dependencies: vec![],
            })
        }
        fn options_spec(&self) -> &OptionsSpecification {
            static SPEC: std::sync::OnceLock<OptionsSpecification> = std::sync::OnceLock::new();
            SPEC.get_or_init(OptionsSpecification::new)
        }
        async fn mount(&self, _ctx: PluginContext) -> Result<(), SupervisorError> {
            tokio::time::sleep(StdDuration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_mount_that_never_returns_times_out() {
        let runner = PluginRunner::new(Arc::new(SlowMount), RunnerConfig { mount_timeout: StdDuration::from_millis(50), unmount_timeout: DEFAULT_UNMOUNT_TIMEOUT });
        let report = runner.mount(context()).await;
        assert!(report.error.is_some());
        assert_eq!(runner.state(), PluginState::Error);
    }

    #[tokio::test]
    async fn unmount_always_reaches_unloaded_even_after_an_error_mount() {
        struct Failing;
        #[async_trait]
        impl Plugin for Failing {
            fn meta(&self) -> &PluginMeta {
                static META: std::sync::OnceLock<PluginMeta> = std::sync::OnceLock::new();
                META.get_or_init(|| PluginMeta {
                    name: "failing".to_string(),
                    description: String::new(),
                    version: "1.0.0".to_string(),
                    default_enabled: true,
                    author: None,
                    url: None,
                    dependencies: vec![],
                })
            }
            fn options_spec(&self) -> &OptionsSpecification {
                static SPEC: std::sync::OnceLock<OptionsSpecification> = std::sync::OnceLock::new();
                SPEC.get_or_init(OptionsSpecification::new)
            }
            async fn mount(&self, _ctx: PluginContext) -> Result<(), SupervisorError> {
                Err(SupervisorError::InvalidState { message: "nope".to_string(), context: ErrorContext::new() })
            }
            async fn unmount(&self) -> Result<(), SupervisorError> {
                Err(SupervisorError::InvalidState { message: "also nope".to_string(), context: ErrorContext::new() })
            }
        }

        let runner = PluginRunner::new(Arc::new(Failing), RunnerConfig::default());
        let mount = runner.mount(context()).await;
        assert!(mount.error.is_some());
        assert_eq!(runner.state(), PluginState::Error);

        let unmount = runner.unmount().await;
        assert!(unmount.error.is_some(), "the failing unmount hook's error is still reported");
        assert_eq!(runner.state(), PluginState::Unloaded, "unmount always completes");
    }
}
