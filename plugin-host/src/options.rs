//! Option resolver (C14): validates a user-supplied options map against an
//! `OptionsSpecification` (host-api, §4.14) and produces a resolved map
//! with defaults applied, or the full list of validation errors — errors
//! are collected, never short-circuited, so a plugin author sees every
//! problem in one pass.

use std::collections::HashMap;
use std::sync::LazyLock;

use host_api::{OptionSpec, OptionType, OptionsSpecification};
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub option: String,
    pub message: String,
}

impl ValidationError {
    fn new(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self { option: option.into(), message: message.into() }
    }
}

pub type ResolvedOptions = HashMap<String, Value>;

/// Anything a connector-typed option resolves to is looked up by this
/// closure rather than carried inline in the options map — the resolver
/// doesn't need to know the connector registry, only whether a name it is
/// given resolves to something.
pub type ConnectorLookup<'a> = dyn Fn(&str) -> bool + 'a;

/// Validates and fills defaults for `input` against `spec`. On success
/// returns the resolved map (every key `spec` defines, either user-supplied
/// or defaulted); on failure returns every violation found.
pub fn resolve(
    spec: &OptionsSpecification,
    input: &HashMap<String, Value>,
    connector_available: &ConnectorLookup,
) -> Result<ResolvedOptions, Vec<ValidationError>> {
    let mut resolved = ResolvedOptions::new();
    let mut errors = Vec::new();

    for (name, option_spec) in spec {
        if let Some(connector_name) = &option_spec.connector {
            if !connector_available(connector_name) {
                if option_spec.required {
                    errors.push(ValidationError::new(
                        name,
                        format!("required connector '{connector_name}' is not registered"),
                    ));
                }
                continue;
            }
            resolved.insert(name.clone(), Value::String(connector_name.clone()));
            continue;
        }

        match input.get(name) {
            Some(value) => match validate_value(name, option_spec, value, connector_available) {
                Ok(()) => {
                    resolved.insert(name.clone(), value.clone());
                }
                Err(mut errs) => errors.append(&mut errs),
            },
            None => {
                if option_spec.required {
                    errors.push(ValidationError::new(name, "missing required option"));
                } else if let Some(default) = &option_spec.default {
                    resolved.insert(name.clone(), default.clone());
                }
            }
        }
    }

    if errors.is_empty() { Ok(resolved) } else { Err(errors) }
}

fn validate_value(
    name: &str,
    spec: &OptionSpec,
    value: &Value,
    connector_available: &ConnectorLookup,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !matches_type(spec.option_type, value) {
        errors.push(ValidationError::new(name, format!("expected a {:?} value", spec.option_type)));
        return Err(errors);
    }

    if let (Some(min), Some(n)) = (spec.min, value.as_f64()) {
        if n < min {
            errors.push(ValidationError::new(name, format!("{n} is below the minimum of {min}")));
        }
    }
    if let (Some(max), Some(n)) = (spec.max, value.as_f64()) {
        if n > max {
            errors.push(ValidationError::new(name, format!("{n} is above the maximum of {max}")));
        }
    }
    if let Some(s) = value.as_str() {
        if let Some(min_len) = spec.min_length {
            if s.len() < min_len {
                errors.push(ValidationError::new(name, format!("must be at least {min_len} characters")));
            }
        }
        if let Some(max_len) = spec.max_length {
            if s.len() > max_len {
                errors.push(ValidationError::new(name, format!("must be at most {max_len} characters")));
            }
        }
        if let Some(pattern) = &spec.pattern {
            if !compiled(pattern).is_match(s) {
                errors.push(ValidationError::new(name, format!("does not match pattern {pattern}")));
            }
        }
    }
    if let Some(choices) = &spec.choices {
        if !choices.contains(value) {
            errors.push(ValidationError::new(name, "value is not one of the allowed choices"));
        }
    }

    if spec.option_type == OptionType::Object {
        if let (Some(properties), Some(object)) = (&spec.properties, value.as_object()) {
            let nested_input: HashMap<String, Value> = object.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            if let Err(nested_errors) = resolve(properties, &nested_input, connector_available) {
                for nested in nested_errors {
                    errors.push(ValidationError::new(format!("{name}.{}", nested.option), nested.message));
                }
            }
        }
    }

    if spec.option_type == OptionType::Array {
        if let (Some(items_spec), Some(array)) = (&spec.items, value.as_array()) {
            for (index, item) in array.iter().enumerate() {
                if let Err(mut item_errors) = validate_value(&format!("{name}[{index}]"), items_spec, item, connector_available) {
                    errors.append(&mut item_errors);
                }
            }
        }
    }

    if let Some(validate) = &spec.validate {
        if let Err(message) = validate(value) {
            errors.push(ValidationError::new(name, message));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Compiled fresh each call; options are resolved once at mount time. An
/// invalid `pattern` string surfaces as "no match" rather than a panic.
fn compiled(pattern: &str) -> Regex {
    static EMPTY: LazyLock<Regex> = LazyLock::new(|| Regex::new("$^").unwrap());
    Regex::new(pattern).unwrap_or_else(|_| EMPTY.clone())
}

fn matches_type(option_type: OptionType, value: &Value) -> bool {
    match option_type {
        OptionType::String | OptionType::Player | OptionType::Squad | OptionType::Layer => value.is_string(),
        OptionType::Number => value.is_number(),
        OptionType::Boolean => value.is_boolean(),
        OptionType::Array => value.is_array(),
        OptionType::Object => value.is_object(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_connectors(_: &str) -> bool {
        false
    }

    #[test]
    fn applies_defaults_for_missing_optional_fields() {
        let mut spec = OptionsSpecification::new();
        spec.insert("interval".to_string(), OptionSpec::new(OptionType::Number).with_default(json!(30)));
        let resolved = resolve(&spec, &HashMap::new(), &no_connectors).unwrap();
        assert_eq!(resolved.get("interval"), Some(&json!(30)));
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let mut spec = OptionsSpecification::new();
        spec.insert("token".to_string(), OptionSpec::new(OptionType::String).required());
        let errors = resolve(&spec, &HashMap::new(), &no_connectors).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].option, "token");
    }

    #[test]
    fn all_violations_are_collected_not_short_circuited() {
        let mut spec = OptionsSpecification::new();
        spec.insert("a".to_string(), OptionSpec::new(OptionType::String).required());
        spec.insert("b".to_string(), OptionSpec::new(OptionType::Number).required());
        let errors = resolve(&spec, &HashMap::new(), &no_connectors).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn out_of_range_number_is_rejected() {
        let mut spec = OptionsSpecification::new();
        let mut field = OptionSpec::new(OptionType::Number);
        field.min = Some(1.0);
        field.max = Some(10.0);
        spec.insert("n".to_string(), field);
        let mut input = HashMap::new();
        input.insert("n".to_string(), json!(50));
        let errors = resolve(&spec, &input, &no_connectors).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn missing_required_connector_is_an_error() {
        let mut spec = OptionsSpecification::new();
        spec.insert("db".to_string(), OptionSpec::new(OptionType::String).required().with_connector("database"));
        let errors = resolve(&spec, &HashMap::new(), &no_connectors).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].option, "db");
    }

    #[test]
    fn registered_connector_resolves_without_error() {
        let mut spec = OptionsSpecification::new();
        spec.insert("db".to_string(), OptionSpec::new(OptionType::String).required().with_connector("database"));
        let resolved = resolve(&spec, &HashMap::new(), &|name| name == "database").unwrap();
        assert_eq!(resolved.get("db"), Some(&json!("database")));
    }
}
