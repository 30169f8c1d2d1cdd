//! Error types for Interview Assist.

use std::time::Duration;

/// Top-level error type for the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures surfaced by the gateway to the remote interview service.
///
/// Mirrors the three ways a call can go wrong: the request never produced a
/// usable answer, the server answered with an explicit error, or the server
/// answered with something that does not fit the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Network failure, timeout, or an unreadable body.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The server answered with an `error` field.
    #[error("Server error: {message}")]
    Server { message: String, finished: bool },

    /// A field required by the current operation is missing.
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl GatewayError {
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
            finished: false,
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// Build a transport error for a request that exceeded its deadline.
    pub fn timed_out(operation: &str, timeout: Duration) -> Self {
        Self::Transport(format!("{operation} timed out after {timeout:?}"))
    }

    /// Whether the server flagged the flow as over alongside the error.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Server { finished: true, .. })
    }

    /// Whether this failure ends the session with no way to recover.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Front-end channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Channel {name} disconnected: {reason}")]
    Disconnected { name: String, reason: String },
}

/// Result type alias for the client.
pub type Result<T> = std::result::Result<T, Error>;
