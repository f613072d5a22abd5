//! Protocol implementation module
//!
//! This module defines the control channel messages, their framing, and the
//! master election state machine.

pub mod codec;
pub mod message;
pub mod state;

pub use self::codec::MessageCodec;
pub use self::message::{
    ControlRequest, ControlResponse, EncryptionKeys, StartPlaybackArgs,
    CODEC_LOSSLESS, CODEC_RAW_PCM,
};
pub use self::state::{ElectionState, Role, Transition};

/// Maximum control message size in bytes
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
