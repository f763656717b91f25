//! Option specification types (C14): the schema shape `OptionsSpecification`
//! plugins declare statically alongside their `meta`. These live in
//! `host-api` rather than `plugin-host` so a plugin crate can describe its
//! options without depending on the plugin host at all — only the
//! *validation logic* that consumes this schema (the resolver) lives in
//! `plugin-host::options`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Player,
    Squad,
    Layer,
}

/// A user-supplied validation hook beyond the built-in constraints
/// (`min`/`max`/`pattern`/`choices`/…). Returns `Err(message)` on failure.
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub struct OptionSpec {
    pub option_type: OptionType,
    pub required: bool,
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub choices: Option<Vec<Value>>,
    /// Names a connector (§4.15) this option resolves to instead of a
    /// plain value. A missing required connector is a validation error.
    pub connector: Option<String>,
    pub properties: Option<OptionsSpecification>,
    pub items: Option<Box<OptionSpec>>,
    pub validate: Option<Validator>,
}

impl fmt::Debug for OptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionSpec")
            .field("option_type", &self.option_type)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("pattern", &self.pattern)
            .field("choices", &self.choices)
            .field("connector", &self.connector)
            .field("properties", &self.properties)
            .field("items", &self.items)
            .field("validate", &self.validate.is_some())
            .finish()
    }
}

impl OptionSpec {
    pub fn new(option_type: OptionType) -> Self {
        Self {
            option_type,
            required: false,
            default: None,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            pattern: None,
            choices: None,
            connector: None,
            properties: None,
            items: None,
            validate: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_connector(mut self, name: impl Into<String>) -> Self {
        self.connector = Some(name.into());
        self
    }
}

/// A mapping of option name to schema (§4.14). Possibly empty — plugins
/// with no options declare one of these with no entries.
pub type OptionsSpecification = HashMap<String, OptionSpec>;
