//! Core types and traits for storm_sync
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    AudioFrame,
    AudioSlaveEndpoint,
    Config,
    PeerUrl,
    ServiceRecord,
    SlaveRecord,
};

/// Scheme used when rendering peer control URLs
pub const URL_SCHEME: &str = "storm://";

/// Default advertised service name
pub const DEFAULT_SERVICE_NAME: &str = "Cloud Theater";

/// Default port of the control channel listener
pub const DEFAULT_CONTROL_PORT: u16 = 5000;

/// Capability token advertised by protocol peers
pub const CAPABILITY_TOKEN: &str = "STORM";

/// Time to wait for an existing master before electing ourselves
pub const STARTUP_DELAY_MS: u64 = 2000;

/// Prebuffer threshold: 44.1 kHz x 2 channels x 2 bytes
pub const PREBUFFER_BYTES: usize = 44_100 * 2 * 2;
