//! Synchronization module
//!
//! This module owns the playback side of a node: the slave registry, the
//! per-session codec and prebuffer, and the coordinator that ties election,
//! control requests, and audio frames together.

pub mod codec;
pub mod coordinator;
pub mod node;
pub mod prebuffer;
pub mod registry;
pub mod session;

pub use self::codec::{AlacConfig, AudioCodec, Decoder, DecoderFactory};
pub use self::coordinator::{AudioEvent, Command, Coordinator, LocalPorts, NodeParts, NodeStatus};
pub use self::node::{AudioServer, AudioServerOptions, Node};
pub use self::prebuffer::Prebuffer;
pub use self::registry::{EndpointSet, SlaveRegistry};
pub use self::session::{AudioSink, PlaybackSession};
