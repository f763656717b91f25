//! The plugin host: loads, mounts, and isolates plugin instances against
//! the `host-api` trait surface, without depending on the orchestrator
//! that actually implements it (§9 redesign flag).

pub mod circuit_breaker;
pub mod connectors;
pub mod loader;
pub mod manager;
pub mod options;
pub mod runner;
pub mod subscription;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use connectors::ConnectorRegistry;
pub use loader::{load, load_all, LoadedPlugin, PluginLoadError};
pub use manager::{ManagerDeps, MountReport, PluginManager, UnmountReport};
pub use options::{resolve, ResolvedOptions, ValidationError};
pub use runner::{LifecycleReport, PluginRunner, PluginState, RunnerConfig};
pub use subscription::{CleanupCounts, SubscriptionManager};
