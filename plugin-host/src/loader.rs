//! Plugin loader (C16): validates the load-time contract of a registered
//! plugin instance. Rust has no dynamic `import()` or default/named export
//! resolution, so "loading" here means checking a constructed [`Plugin`]
//! against the same `meta`/`optionsSpec` contract a dynamically loaded one
//! would have to satisfy, not locating code on disk.

use std::fmt;
use std::sync::Arc;

use host_api::{OptionsSpecification, Plugin, PluginMeta};

#[derive(Debug, Clone)]
pub struct PluginLoadError {
    pub source: String,
    pub message: String,
}

impl fmt::Display for PluginLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load plugin '{}': {}", self.source, self.message)
    }
}

impl std::error::Error for PluginLoadError {}

/// The loader's result for a single registration: the plugin paired with
/// the metadata and options schema it declares, plus a `source` label
/// used only for diagnostics (there being no real source path to report).
#[derive(Clone)]
pub struct LoadedPlugin {
    pub plugin: Arc<dyn Plugin>,
    pub meta: PluginMeta,
    pub options_spec: OptionsSpecification,
    pub source: String,
}

/// Validates `plugin`'s contract. Mirrors §4.16's checks: non-empty name,
/// an options spec object (possibly empty is fine), well-formed
/// dependency list.
pub fn load(plugin: Arc<dyn Plugin>, source: impl Into<String>) -> Result<LoadedPlugin, PluginLoadError> {
    let source = source.into();
    let meta = plugin.meta().clone();

    if !meta.is_valid() {
        return Err(PluginLoadError { source, message: "meta.name must be a non-empty string".to_string() });
    }
    if meta.dependencies.iter().any(|dep| dep.trim().is_empty()) {
        return Err(PluginLoadError { source, message: "meta.dependencies must not contain empty names".to_string() });
    }
    if meta.dependencies.iter().any(|dep| dep == &meta.name) {
        return Err(PluginLoadError { source, message: "a plugin cannot depend on itself".to_string() });
    }

    let options_spec = plugin.options_spec().clone();
    Ok(LoadedPlugin { plugin, meta, options_spec, source })
}

/// Loads every entry in `candidates`, in order, continuing past
/// individual failures so one bad registration doesn't block the rest —
/// mirrors `loadAll` iterating the enabled set (§4.19).
pub fn load_all(candidates: Vec<(Arc<dyn Plugin>, String)>) -> (Vec<LoadedPlugin>, Vec<PluginLoadError>) {
    let mut loaded = Vec::new();
    let mut errors = Vec::new();
    for (plugin, source) in candidates {
        match load(plugin, source) {
            Ok(entry) => loaded.push(entry),
            Err(err) => errors.push(err),
        }
    }
    (loaded, errors)
}
