//! The per-plugin [`PluginContext`] (§4.19) and the trait surfaces it is
//! built from: [`CommandApi`]/[`ReadModel`] (implemented by the
//! orchestrator) and [`EventsHandle`] (implemented by `plugin-host`'s
//! subscription manager, scoped so cleanup on unmount only ever revokes
//! that one plugin's subscriptions).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::error::SupervisorError;
use domain::event::{Event, EventKind};
use domain::ids::{EosId, PlayerId, SquadId, SteamId, TeamId};
use domain::layer::Layer;
use domain::player::Player;
use domain::squad::Squad;

use crate::connector::Connector;

pub type EventHandler = Arc<dyn Fn(&Event) -> Result<(), SupervisorError> + Send + Sync>;

/// Calling (or dropping without calling) this does nothing on its own —
/// ownership and bookkeeping live in `plugin-host`'s subscription
/// manager, which returns this wrapped around its own internal
/// unsubscribe so the plugin never touches the event bus directly.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;

pub trait EventsHandle: Send + Sync {
    fn on(&self, kind: EventKind, handler: EventHandler) -> Unsubscribe;
    fn once(&self, kind: EventKind, handler: EventHandler) -> Unsubscribe;
}

pub type TimerCallback = Arc<dyn Fn() -> Result<(), SupervisorError> + Send + Sync>;

/// The `setInterval`/`setTimeout` half of C13: timers are owned by
/// `plugin-host`'s subscription manager (not borrowed from the host
/// runtime, per §9's redesign flag), which auto-removes a timeout from
/// its own bookkeeping once it fires and stops an interval's ticking on
/// unmount.
pub trait TimersHandle: Send + Sync {
    fn set_interval(&self, period: Duration, callback: TimerCallback) -> Unsubscribe;
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> Unsubscribe;
}

/// The orchestrator's command surface (§4.12, §6). Every method rejects
/// with `INVALID_STATE` while the orchestrator is not running.
#[async_trait]
pub trait CommandApi: Send + Sync {
    async fn broadcast(&self, message: &str) -> Result<(), SupervisorError>;
    async fn warn(&self, player_id: PlayerId, message: &str) -> Result<(), SupervisorError>;
    async fn kick(&self, player_id: PlayerId, reason: &str) -> Result<(), SupervisorError>;
    async fn ban(&self, player_id: PlayerId, duration: &str, reason: &str) -> Result<(), SupervisorError>;
    async fn execute(&self, command: &str) -> Result<String, SupervisorError>;
}

/// Read-only snapshot access to the orchestrator's authoritative state
/// (§5: "Plugins access them through read-only views; mutations are
/// impossible from plugin code").
pub trait ReadModel: Send + Sync {
    fn player(&self, eos_id: &EosId) -> Option<Player>;
    fn player_by_steam_id(&self, steam_id: &SteamId) -> Option<Player>;
    fn players(&self) -> Vec<Player>;
    fn squad(&self, team_id: TeamId, squad_id: SquadId) -> Option<Squad>;
    fn squads(&self) -> Vec<Squad>;
    fn current_layer(&self) -> Option<Layer>;
    fn next_layer(&self) -> Option<Layer>;
    fn has_permission(&self, identity: &str, permission: &str) -> bool;
}

/// What the plugin manager hands each plugin on mount. `events` revokes
/// cleanly on unmount; `rcon`/`state` are shared, long-lived handles;
/// `log` is already scoped to the plugin's name; `get_connector` resolves
/// a named connector lazily through the registry (C15).
pub struct PluginContext {
    pub events: Arc<dyn EventsHandle>,
    pub timers: Arc<dyn TimersHandle>,
    pub rcon: Arc<dyn CommandApi>,
    pub state: Arc<dyn ReadModel>,
    pub log: tracing::Span,
    pub get_connector: Arc<dyn Fn(&str) -> Option<Arc<dyn Connector>> + Send + Sync>,
}

impl PluginContext {
    pub fn connector(&self, name: &str) -> Option<Arc<dyn Connector>> {
        (self.get_connector)(name)
    }
}
