//! The closed error taxonomy (§7). Every fallible operation in the
//! workspace returns (or wraps) a [`SupervisorError`]; the orchestrator
//! re-emits each one as a `SERVER_ERROR` event without tearing down the
//! process.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Structured context attached to an error, suitable for both
/// `tracing` fields and the `SERVER_ERROR` event payload.
pub type ErrorContext = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidResponse,
    UnexpectedFormat,
    MissingField,
    InvalidId,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginErrorKind {
    Lifecycle,
    Event,
    Connector,
    Rcon,
    Validation,
    Unknown,
}

impl fmt::Display for PluginErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The closed set of error kinds from §7, each carrying its own context
/// map. Variant names mirror the spec table so a reviewer can check one
/// against the other line by line.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("connection refused: {message}")]
    ConnectionRefused { message: String, context: ErrorContext },

    #[error("connection timed out: {message}")]
    ConnectionTimeout { message: String, context: ErrorContext },

    #[error("connection reset: {message}")]
    ConnectionReset { message: String, context: ErrorContext },

    #[error("connection closed: {message}")]
    ConnectionClosed { message: String, context: ErrorContext },

    #[error("not connected")]
    NotConnected { context: ErrorContext },

    #[error("authentication failed: {message}")]
    AuthFailed { message: String, context: ErrorContext },

    #[error("invalid rcon password")]
    InvalidPassword { context: ErrorContext },

    #[error("command timed out: {command}")]
    CommandTimeout { command: String, context: ErrorContext },

    #[error("command aborted: {command}")]
    CommandAborted { command: String, context: ErrorContext },

    #[error("invalid command: {message}")]
    InvalidCommand { message: String, context: ErrorContext },

    #[error("parse error ({kind}): {message}")]
    ParseError {
        kind: ParseErrorKind,
        message: String,
        context: ErrorContext,
    },

    #[error("watch failed: {message}")]
    WatchFailed { message: String, context: ErrorContext },

    #[error("read failed: {message}")]
    ReadFailed { message: String, context: ErrorContext },

    #[error("file not found: {path}")]
    FileNotFound { path: String, context: ErrorContext },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String, context: ErrorContext },

    #[error("already watching: {source}")]
    AlreadyWatching { source: String, context: ErrorContext },

    #[error("not watching: {source}")]
    NotWatching { source: String, context: ErrorContext },

    #[error("rule error on line: {message}")]
    RuleError { message: String, context: ErrorContext },

    #[error("queue full: {queue}")]
    QueueFull { queue: String, context: ErrorContext },

    #[error("options validation failed for plugin {plugin}: {message}")]
    OptionsValidation {
        plugin: String,
        message: String,
        context: ErrorContext,
    },

    #[error("plugin error ({kind}) in {plugin}: {message}")]
    PluginError {
        kind: PluginErrorKind,
        plugin: String,
        message: String,
        context: ErrorContext,
    },

    #[error("invalid state: {message}")]
    InvalidState { message: String, context: ErrorContext },
}

impl SupervisorError {
    /// Whether the condition this error describes is expected to resolve
    /// itself through the component's own recovery path (reconnect,
    /// read-retry, circuit breaker), per the §7 table.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            SupervisorError::ConnectionRefused { .. }
                | SupervisorError::ConnectionTimeout { .. }
                | SupervisorError::ConnectionReset { .. }
                | SupervisorError::ConnectionClosed { .. }
                | SupervisorError::CommandTimeout { .. }
                | SupervisorError::WatchFailed { .. }
                | SupervisorError::ReadFailed { .. }
                | SupervisorError::FileNotFound { .. }
                | SupervisorError::PermissionDenied { .. }
                | SupervisorError::RuleError { .. }
                | SupervisorError::QueueFull { .. }
                | SupervisorError::PluginError { .. }
        )
    }

    /// Short machine-stable code, used as the `error.code` tracing field
    /// and in the `SERVER_ERROR` event context.
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::ConnectionRefused { .. } => "CONNECTION_REFUSED",
            SupervisorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            SupervisorError::ConnectionReset { .. } => "CONNECTION_RESET",
            SupervisorError::ConnectionClosed { .. } => "CONNECTION_CLOSED",
            SupervisorError::NotConnected { .. } => "NOT_CONNECTED",
            SupervisorError::AuthFailed { .. } => "AUTH_FAILED",
            SupervisorError::InvalidPassword { .. } => "INVALID_PASSWORD",
            SupervisorError::CommandTimeout { .. } => "COMMAND_TIMEOUT",
            SupervisorError::CommandAborted { .. } => "COMMAND_ABORTED",
            SupervisorError::InvalidCommand { .. } => "INVALID_COMMAND",
            SupervisorError::ParseError { .. } => "PARSE_ERROR",
            SupervisorError::WatchFailed { .. } => "WATCH_FAILED",
            SupervisorError::ReadFailed { .. } => "READ_FAILED",
            SupervisorError::FileNotFound { .. } => "FILE_NOT_FOUND",
            SupervisorError::PermissionDenied { .. } => "PERMISSION_DENIED",
            SupervisorError::AlreadyWatching { .. } => "ALREADY_WATCHING",
            SupervisorError::NotWatching { .. } => "NOT_WATCHING",
            SupervisorError::RuleError { .. } => "RULE_ERROR",
            SupervisorError::QueueFull { .. } => "QUEUE_FULL",
            SupervisorError::OptionsValidation { .. } => "OPTIONS_VALIDATION",
            SupervisorError::PluginError { .. } => "PLUGIN_ERROR",
            SupervisorError::InvalidState { .. } => "INVALID_STATE",
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            SupervisorError::ConnectionRefused { context, .. }
            | SupervisorError::ConnectionTimeout { context, .. }
            | SupervisorError::ConnectionReset { context, .. }
            | SupervisorError::ConnectionClosed { context, .. }
            | SupervisorError::NotConnected { context }
            | SupervisorError::AuthFailed { context, .. }
            | SupervisorError::InvalidPassword { context }
            | SupervisorError::CommandTimeout { context, .. }
            | SupervisorError::CommandAborted { context, .. }
            | SupervisorError::InvalidCommand { context, .. }
            | SupervisorError::ParseError { context, .. }
            | SupervisorError::WatchFailed { context, .. }
            | SupervisorError::ReadFailed { context, .. }
            | SupervisorError::FileNotFound { context, .. }
            | SupervisorError::PermissionDenied { context, .. }
            | SupervisorError::AlreadyWatching { context, .. }
            | SupervisorError::NotWatching { context, .. }
            | SupervisorError::RuleError { context, .. }
            | SupervisorError::QueueFull { context, .. }
            | SupervisorError::OptionsValidation { context, .. }
            | SupervisorError::PluginError { context, .. }
            | SupervisorError::InvalidState { context, .. } => context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_timeout_is_recoverable_but_aborted_is_not() {
        let timeout = SupervisorError::CommandTimeout {
            command: "ListPlayers".into(),
            context: ErrorContext::new(),
        };
        let aborted = SupervisorError::CommandAborted {
            command: "ListPlayers".into(),
            context: ErrorContext::new(),
        };
        assert!(timeout.recoverable());
        assert!(!aborted.recoverable());
        assert_eq!(timeout.code(), "COMMAND_TIMEOUT");
        assert_eq!(aborted.code(), "COMMAND_ABORTED");
    }

    #[test]
    fn auth_failed_is_fatal() {
        let err = SupervisorError::AuthFailed {
            message: "bad password".into(),
            context: ErrorContext::new(),
        };
        assert!(!err.recoverable());
    }
}
