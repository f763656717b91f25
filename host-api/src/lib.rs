//! Shared trait surface the plugin host (`plugin-host`) programs
//! against, so it never depends on the orchestrator concretely (§9's
//! "cyclic references (plugin ↔ context ↔ orchestrator)" re-architecture
//! flag). The orchestrator implements [`CommandApi`]/[`ReadModel`];
//! `plugin-host`'s subscription manager implements [`EventsHandle`].
//! Neither side needs to name the other's crate.

pub mod connector;
pub mod context;
pub mod options;

pub use connector::Connector;
pub use context::{
    CommandApi, EventHandler, EventsHandle, PluginContext, ReadModel, TimerCallback, TimersHandle, Unsubscribe,
};
pub use options::{OptionSpec, OptionType, OptionsSpecification, Validator};

use async_trait::async_trait;
use domain::error::SupervisorError;
use domain::ids::PlayerId;

/// Plugin identity and load-time metadata (§4.16). `dependencies` names
/// other plugins by their `name` that must mount first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMeta {
    pub name: String,
    pub description: String,
    pub version: String,
    pub default_enabled: bool,
    pub author: Option<String>,
    pub url: Option<String>,
    pub dependencies: Vec<String>,
}

impl PluginMeta {
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Convenience alias used by [`CommandApi::kick`]/[`ban`] — both take a
/// resolved in-game player id rather than a free-form name.
pub type Target = PlayerId;

/// What a plugin implements (§6 collaborator interface). Rust has no
/// dynamic `import()`, so the loader contract from §9's redesign flag is a
/// named-registration API: a `Plugin` is a constructed instance registered
/// with the plugin manager at boot, not a class discovered at runtime.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn meta(&self) -> &PluginMeta;
    fn options_spec(&self) -> &OptionsSpecification;

    /// Optional pre-mount hook (§4.17 `prepareToMount`). Default is a no-op.
    async fn prepare_to_mount(&self, _ctx: &PluginContext) -> Result<(), SupervisorError> {
        Ok(())
    }

    async fn mount(&self, ctx: PluginContext) -> Result<(), SupervisorError>;

    /// Optional teardown hook. Errors here are recorded but never block the
    /// plugin from reaching `unloaded` (§4.17: "unmount must always
    /// complete").
    async fn unmount(&self) -> Result<(), SupervisorError> {
        Ok(())
    }
}
