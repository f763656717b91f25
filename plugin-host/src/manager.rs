//! Plugin manager (C19): owns the configured set of plugins, topologically
//! orders them by `meta.dependencies`, mounts/unmounts in that order, and
//! hands each one a [`PluginContext`] scoped to itself.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use domain::error::SupervisorError;
use event_bus::EventBus;
use host_api::{CommandApi, EventsHandle, PluginContext, ReadModel, TimersHandle};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::connectors::ConnectorRegistry;
use crate::loader::LoadedPlugin;
use crate::runner::{PluginRunner, RunnerConfig};
use crate::subscription::SubscriptionManager;

/// One mounted (or mount-attempted) plugin's full bookkeeping.
struct Entry {
    loaded: LoadedPlugin,
    runner: PluginRunner,
    subscriptions: Arc<SubscriptionManager>,
    breaker: Arc<CircuitBreaker>,
}

#[derive(Debug, Clone, Default)]
pub struct MountReport {
    pub mounted: Vec<String>,
    pub skipped_missing_dependency: Vec<String>,
    pub cyclic: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct UnmountReport {
    pub unmounted: Vec<String>,
    pub hook_errors: Vec<(String, String)>,
}

/// Dependencies every plugin context is built from — the orchestrator's
/// concrete `CommandApi`/`ReadModel`, plus the shared event bus and
/// connector registry. `plugin-host` never names `orchestrator` to get
/// these (§9's cyclic-reference redesign flag).
pub struct ManagerDeps {
    pub events: Arc<EventBus>,
    pub rcon: Arc<dyn CommandApi>,
    pub state: Arc<dyn ReadModel>,
    pub connectors: Arc<ConnectorRegistry>,
    pub breaker_config: CircuitBreakerConfig,
    pub runner_config: RunnerConfig,
}

/// Kahn's algorithm over `meta.dependencies`. Returns the order plugins
/// should mount in, the set of names with at least one dependency that
/// never loaded at all (mounted anyway, with a warning, per §4.19), and
/// the set left over in the residual queue — these form a dependency
/// cycle and are excluded from the returned order entirely.
fn topological_order(plugins: &[LoadedPlugin]) -> (Vec<usize>, Vec<String>, Vec<String>) {
    let index_by_name: HashMap<&str, usize> = plugins.iter().enumerate().map(|(i, p)| (p.meta.name.as_str(), i)).collect();

    let mut in_degree = vec![0usize; plugins.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); plugins.len()];
    let mut missing_dependency = Vec::new();

    for (i, plugin) in plugins.iter().enumerate() {
        for dep in &plugin.meta.dependencies {
            match index_by_name.get(dep.as_str()) {
                Some(&dep_idx) => {
                    in_degree[i] += 1;
                    dependents[dep_idx].push(i);
                }
                None => missing_dependency.push(plugin.meta.name.clone()),
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..plugins.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(plugins.len());
    let mut visited = vec![false; plugins.len()];

    while let Some(i) = queue.pop_front() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        order.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    let cyclic: Vec<String> = (0..plugins.len())
        .filter(|&i| !visited[i])
        .map(|i| plugins[i].meta.name.clone())
        .collect();

    (order, missing_dependency, cyclic)
}

/// Owns the mounted-plugin set end to end: `load_all` → `mount_all` →
/// `unmount_all`. A single instance is meant to live for the lifetime of
/// one orchestrator run.
pub struct PluginManager {
    deps: ManagerDeps,
    entries: HashMap<String, Entry>,
    mount_order: Vec<String>,
}

impl PluginManager {
    pub fn new(deps: ManagerDeps) -> Self {
        Self { deps, entries: HashMap::new(), mount_order: Vec::new() }
    }

    pub fn mounted_names(&self) -> Vec<String> {
        self.mount_order.clone()
    }

    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.entries.get(name).map(|e| e.breaker.clone())
    }

    /// Mounts `plugins` in dependency order (§4.19). Plugins whose
    /// dependencies never loaded still mount, but are reported as
    /// `skipped_missing_dependency` for the caller to log as a warning.
    /// Plugins caught in a dependency cycle are excluded entirely — the
    /// residual Kahn queue being non-empty is the cycle detector.
    pub async fn mount_all(&mut self, plugins: Vec<LoadedPlugin>) -> MountReport {
        let (order, missing_dependency, cyclic) = topological_order(&plugins);
        let mut report = MountReport {
            skipped_missing_dependency: missing_dependency,
            cyclic: cyclic.clone(),
            ..Default::default()
        };
        let cyclic_set: HashSet<&str> = cyclic.iter().map(|s| s.as_str()).collect();

        let mut by_index: HashMap<usize, LoadedPlugin> = plugins.into_iter().enumerate().collect();

        for idx in order {
            let Some(loaded) = by_index.remove(&idx) else { continue };
            let name = loaded.meta.name.clone();
            if cyclic_set.contains(name.as_str()) {
                continue;
            }

            let breaker = Arc::new(CircuitBreaker::new(self.deps.breaker_config));
            let subscriptions = SubscriptionManager::new(name.clone(), self.deps.events.clone(), breaker.clone());
            let runner = PluginRunner::new(loaded.plugin.clone(), self.deps.runner_config);

            let log = tracing::info_span!("plugin", name = %name);
            let connectors = self.deps.connectors.clone();
            let ctx = PluginContext {
                events: subscriptions.clone() as Arc<dyn EventsHandle>,
                timers: subscriptions.clone() as Arc<dyn TimersHandle>,
                rcon: self.deps.rcon.clone(),
                state: self.deps.state.clone(),
                log,
                get_connector: Arc::new(move |connector_name: &str| {
                    resolve_connector_sync(&connectors, connector_name)
                }),
            };

            let prepared = runner.prepare(&ctx).await;
            if let Some(err) = prepared.error {
                report.failed.push((name.clone(), err.to_string()));
                continue;
            }

            let mounted = runner.mount(ctx).await;
            match mounted.error {
                None => {
                    report.mounted.push(name.clone());
                    self.mount_order.push(name.clone());
                    self.entries.insert(name, Entry { loaded, runner, subscriptions, breaker });
                }
                Some(err) => {
                    tracing::warn!(plugin = %name, error = %err, "plugin failed to mount");
                    report.failed.push((name, err.to_string()));
                }
            }
        }

        report
    }

    /// Unmounts every mounted plugin in reverse mount order (§4.19). Each
    /// plugin's subscription manager is torn down regardless of what the
    /// plugin's own `unmount()` hook returns.
    pub async fn unmount_all(&mut self) -> UnmountReport {
        let mut report = UnmountReport::default();
        let order: Vec<String> = self.mount_order.drain(..).rev().collect();

        for name in order {
            let Some(entry) = self.entries.remove(&name) else { continue };
            let outcome = entry.runner.unmount().await;
            if let Some(err) = outcome.error {
                report.hook_errors.push((name.clone(), err.to_string()));
            }
            entry.subscriptions.cleanup();
            report.unmounted.push(name);
        }

        report
    }

    pub fn loaded(&self, name: &str) -> Option<&LoadedPlugin> {
        self.entries.get(name).map(|e| &e.loaded)
    }
}

/// `PluginContext::get_connector` is a synchronous closure, but the
/// registry's `get` is async because connecting is. A plugin that wants
/// a connector will have named it in its `optionsSpec` (§4.14), so the
/// resolver has already warmed the cache via `ConnectorRegistry::get`
/// before mount runs; this just blocks on that cache hit from inside the
/// plugin's synchronous callback.
fn resolve_connector_sync(connectors: &Arc<ConnectorRegistry>, name: &str) -> Option<Arc<dyn host_api::Connector>> {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(connectors.get(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain::ids::{EosId, PlayerId, SquadId, SteamId, TeamId};
    use domain::layer::Layer;
    use domain::player::Player;
    use domain::squad::Squad;
    use host_api::{EventHandler, OptionsSpecification, Plugin, PluginMeta, TimerCallback, Unsubscribe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct NoopCommands;
    #[async_trait]
    impl CommandApi for NoopCommands {
        async fn broadcast(&self, _message: &str) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn warn(&self, _player_id: PlayerId, _message: &str) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn kick(&self, _player_id: PlayerId, _reason: &str) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn ban(&self, _player_id: PlayerId, _duration: &str, _reason: &str) -> Result<(), SupervisorError> {
            Ok(())
        }
        async fn execute(&self, _command: &str) -> Result<String, SupervisorError> {
            Ok(String::new())
        }
    }

    struct NoopState;
    impl ReadModel for NoopState {
        fn player(&self, _eos_id: &EosId) -> Option<Player> {
            None
        }
        fn player_by_steam_id(&self, _steam_id: &SteamId) -> Option<Player> {
            None
        }
        fn players(&self) -> Vec<Player> {
            Vec::new()
        }
        fn squad(&self, _team_id: TeamId, _squad_id: SquadId) -> Option<Squad> {
            None
        }
        fn squads(&self) -> Vec<Squad> {
            Vec::new()
        }
        fn current_layer(&self) -> Option<Layer> {
            None
        }
        fn next_layer(&self) -> Option<Layer> {
            None
        }
        fn has_permission(&self, _identity: &str, _permission: &str) -> bool {
            false
        }
    }

    struct Recorder {
        meta: PluginMeta,
        options_spec: OptionsSpecification,
        order: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn meta(&self) -> &PluginMeta {
            &self.meta
        }
        fn options_spec(&self) -> &OptionsSpecification {
            &self.options_spec
        }
        async fn mount(&self, _ctx: PluginContext) -> Result<(), SupervisorError> {
            self.order.lock().unwrap().push(self.meta.name.clone());
            Ok(())
        }
        async fn unmount(&self) -> Result<(), SupervisorError> {
            self.order.lock().unwrap().push(format!("unmount:{}", self.meta.name));
            Ok(())
        }
    }

    fn plugin(name: &str, deps: &[&str], order: Arc<Mutex<Vec<String>>>) -> LoadedPlugin {
        let meta = PluginMeta {
            name: name.to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            default_enabled: true,
            author: None,
            url: None,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        };
        LoadedPlugin {
            plugin: Arc::new(Recorder { meta: meta.clone(), options_spec: OptionsSpecification::new(), order }),
            meta,
            options_spec: OptionsSpecification::new(),
            source: "inline".to_string(),
        }
    }

    fn deps() -> ManagerDeps {
        ManagerDeps {
            events: EventBus::new(),
            rcon: Arc::new(NoopCommands),
            state: Arc::new(NoopState),
            connectors: ConnectorRegistry::new(),
            breaker_config: CircuitBreakerConfig::default(),
            runner_config: RunnerConfig::default(),
        }
    }

    #[tokio::test]
    async fn mounts_dependents_after_their_dependencies() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let plugins = vec![plugin("b", &["a"], order.clone()), plugin("a", &[], order.clone())];

        let mut manager = PluginManager::new(deps());
        let report = manager.mount_all(plugins).await;
        assert_eq!(report.mounted, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(*order.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn a_plugin_with_a_missing_dependency_still_mounts() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let plugins = vec![plugin("solo", &["ghost"], order.clone())];

        let mut manager = PluginManager::new(deps());
        let report = manager.mount_all(plugins).await;
        assert_eq!(report.mounted, vec!["solo".to_string()]);
        assert_eq!(report.skipped_missing_dependency, vec!["solo".to_string()]);
    }

    #[tokio::test]
    async fn a_dependency_cycle_mounts_neither_side() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let plugins = vec![plugin("x", &["y"], order.clone()), plugin("y", &["x"], order.clone())];

        let mut manager = PluginManager::new(deps());
        let report = manager.mount_all(plugins).await;
        assert!(report.mounted.is_empty());
        assert_eq!(report.cyclic.len(), 2);
    }

    #[tokio::test]
    async fn unmount_all_runs_in_reverse_mount_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let plugins = vec![plugin("a", &[], order.clone()), plugin("b", &["a"], order.clone())];

        let mut manager = PluginManager::new(deps());
        manager.mount_all(plugins).await;
        order.lock().unwrap().clear();

        let report = manager.unmount_all().await;
        assert_eq!(report.unmounted, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(*order.lock().unwrap(), vec!["unmount:b".to_string(), "unmount:a".to_string()]);
    }

    #[tokio::test]
    async fn unmount_releases_every_tracked_subscription() {
        struct Subscriber {
            meta: PluginMeta,
            options_spec: OptionsSpecification,
        }
        #[async_trait]
        impl Plugin for Subscriber {
            fn meta(&self) -> &PluginMeta {
                &self.meta
            }
            fn options_spec(&self) -> &OptionsSpecification {
                &self.options_spec
            }
            async fn mount(&self, ctx: PluginContext) -> Result<(), SupervisorError> {
                let _: Unsubscribe = ctx.events.on(domain::event::EventKind::ChatMessage, no_op_handler());
                let _: Unsubscribe = ctx.timers.set_timeout(std::time::Duration::from_secs(10), no_op_timer());
                Ok(())
            }
        }
        fn no_op_handler() -> EventHandler {
            Arc::new(|_| Ok(()))
        }
        fn no_op_timer() -> TimerCallback {
            Arc::new(|| Ok(()))
        }

        let meta = PluginMeta {
            name: "sub".to_string(),
            description: String::new(),
            version: "1.0.0".to_string(),
            default_enabled: true,
            author: None,
            url: None,
            dependencies: vec![],
        };
        let loaded = LoadedPlugin {
            plugin: Arc::new(Subscriber { meta: meta.clone(), options_spec: OptionsSpecification::new() }),
            meta,
            options_spec: OptionsSpecification::new(),
            source: "inline".to_string(),
        };

        let mut manager = PluginManager::new(deps());
        manager.mount_all(vec![loaded]).await;
        let breaker = manager.breaker("sub").unwrap();
        assert_eq!(breaker.state(), crate::circuit_breaker::BreakerState::Closed);

        let calls = Arc::new(AtomicUsize::new(0));
        let _ = calls.load(Ordering::Relaxed);
        manager.unmount_all().await;
        assert!(manager.loaded("sub").is_none());
    }
}
