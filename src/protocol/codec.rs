use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::Error;
use super::MAX_MESSAGE_SIZE;

/// Length-prefixed bincode framing for control messages
///
/// `In` is the message type decoded from the stream, `Out` the type encoded
/// onto it. A server uses `MessageCodec<ControlRequest, ControlResponse>`,
/// a client the reverse.
pub struct MessageCodec<In, Out> {
    _marker: PhantomData<fn(Out) -> In>,
}

impl<In, Out> MessageCodec<In, Out> {
    /// Creates a new message codec
    pub fn new() -> Self {
        MessageCodec {
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for MessageCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> Clone for MessageCodec<In, Out> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<In: DeserializeOwned, Out> Decoder for MessageCodec<In, Out> {
    type Item = In;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            // Need more data to read message length
            return Ok(None);
        }

        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(Error::protocol(format!("Message of {} bytes exceeds limit", length)));
        }

        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let message_bytes = src.split_to(length);

        bincode::deserialize(&message_bytes)
            .map(Some)
            .map_err(|e| Error::protocol(format!("Failed to deserialize message: {}", e)))
    }
}

impl<In, Out: Serialize> Encoder<Out> for MessageCodec<In, Out> {
    type Error = Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = bincode::serialize(&item)
            .map_err(|e| Error::protocol(format!("Failed to serialize message: {}", e)))?;

        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(Error::protocol(format!("Message of {} bytes exceeds limit", bytes.len())));
        }

        dst.reserve(4 + bytes.len());
        dst.put_u32(bytes.len() as u32);
        dst.extend_from_slice(&bytes);

        Ok(())
    }
}
