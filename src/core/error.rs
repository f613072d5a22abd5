use std::io;
use thiserror::Error;

/// Custom error types for storm_sync
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Discovery probe failed: {0}")]
    Discovery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A control method was invoked against a node in the wrong role.
    #[error("Role violation ({status}): {reason}")]
    RoleViolation {
        /// Status code reported back to the caller
        status: u16,
        /// Human readable reason
        reason: String,
    },

    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Referral chain exceeded {0} hops")]
    ReferralLimit(usize),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    /// Creates a new discovery probe error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Error::Discovery(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new role violation carrying the status code the caller sees
    pub fn role_violation(status: u16, reason: impl Into<String>) -> Self {
        Error::RoleViolation {
            status,
            reason: reason.into(),
        }
    }

    /// Creates a new decoder error
    pub fn decoder(msg: impl Into<String>) -> Self {
        Error::Decoder(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Status code for a control-plane rejection caused by this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MissingParameter(_) => 400,
            Error::RoleViolation { status, .. } => *status,
            _ => 500,
        }
    }
}
