//! storm_sync: synchronized audio playback across networked speaker nodes
//!
//! One node is elected master. It receives the incoming audio stream, fans it
//! out over UDP to every registered slave, and tells the slaves when a new
//! stream starts. Every node holds back its first couple of seconds of output
//! in a prebuffer so that playback starts at roughly the same moment
//! everywhere.
//!
//! The streaming audio server, the lossless decoder, the audio device, and
//! service discovery are external collaborators; they plug in through
//! [`sync::AudioServer`], [`sync::DecoderFactory`], [`sync::AudioSink`], and
//! [`network::DiscoveryEvent`].
pub mod core;
pub mod network;
pub mod protocol;
pub mod sync;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Config, Error, Result};
pub use sync::{Node, NodeParts, NodeStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
