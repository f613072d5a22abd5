use bytes::Bytes;
use tracing::{info, trace, warn};

use crate::core::{AudioFrame, Result};
use crate::protocol::StartPlaybackArgs;
use super::codec::{AudioCodec, DecoderFactory};
use super::prebuffer::Prebuffer;

/// Local audio output provided by an external component
///
/// Buffers are 16-bit little-endian stereo PCM at 44.1 kHz.
pub trait AudioSink: Send {
    fn write(&mut self, buf: &[u8]) -> Result<()>;
}

/// State for one playback instance
#[derive(Debug)]
pub struct PlaybackSession {
    id: u64,
    codec: AudioCodec,
    prebuffer: Option<Prebuffer>,
}

impl PlaybackSession {
    /// Starts a session with a fresh codec and an empty prebuffer
    pub fn start(
        id: u64,
        args: &StartPlaybackArgs,
        decoders: &dyn DecoderFactory,
        prebuffer_bytes: usize,
    ) -> Self {
        let codec = AudioCodec::from_args(args, decoders);
        info!(session = id, codec = %args.audio_codec, "Playback session started");

        PlaybackSession {
            id,
            codec,
            prebuffer: Some(Prebuffer::new(prebuffer_bytes)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn codec(&self) -> &AudioCodec {
        &self.codec
    }

    /// Whether output is still held back by the prebuffer
    pub fn is_prebuffering(&self) -> bool {
        self.prebuffer.is_some()
    }

    /// Decodes one frame and routes the resulting buffers to the sink
    pub fn process(&mut self, frame: &mut AudioFrame, sink: &mut dyn AudioSink) {
        let PlaybackSession { codec, prebuffer, .. } = self;
        codec.transform(frame, |buf| route(prebuffer, sink, buf));
    }
}

fn route(prebuffer: &mut Option<Prebuffer>, sink: &mut dyn AudioSink, buf: Bytes) {
    match prebuffer {
        Some(queue) => {
            if let Some(backlog) = queue.push(buf) {
                info!(buffers = backlog.len(), "Prebuffer done, writing to sink");
                *prebuffer = None;
                for buf in &backlog {
                    write(sink, buf);
                }
            }
        }
        None => write(sink, &buf),
    }
}

fn write(sink: &mut dyn AudioSink, buf: &[u8]) {
    if let Err(e) = sink.write(buf) {
        warn!(bytes = buf.len(), error = %e, "Sink write failed");
    } else {
        trace!(bytes = buf.len(), "Wrote to sink");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::Error;
    use crate::sync::codec::tests::{lossless_args, SplittingFactory};
    use std::sync::{Arc, Mutex};

    /// Records every buffer written to it
    #[derive(Clone, Default)]
    pub(crate) struct MemorySink {
        pub(crate) writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl MemorySink {
        pub(crate) fn taken(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl AudioSink for MemorySink {
        fn write(&mut self, buf: &[u8]) -> Result<()> {
            self.writes.lock().unwrap().push(buf.to_vec());
            Ok(())
        }
    }

    struct BrokenSink;

    impl AudioSink for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> Result<()> {
            Err(Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "device gone")))
        }
    }

    fn frame(byte: u8, len: usize, sequence: u16) -> AudioFrame {
        AudioFrame::new(vec![byte; len].as_slice(), sequence, 0)
    }

    #[test]
    fn test_prebuffer_flush_ordering() {
        let factory = SplittingFactory::default();
        let mut sink = MemorySink::default();
        let mut session = PlaybackSession::start(1, &StartPlaybackArgs::raw_pcm(), &factory, 10);

        // F1..F3 stay queued (4 + 4 = 8, then 12 > 10 at F3)
        session.process(&mut frame(1, 4, 1), &mut sink);
        session.process(&mut frame(2, 4, 2), &mut sink);
        assert!(sink.taken().is_empty());
        assert!(session.is_prebuffering());

        session.process(&mut frame(3, 4, 3), &mut sink);
        let flushed = sink.taken();
        assert_eq!(flushed.len(), 3);
        assert_eq!(flushed[0], vec![1; 4]);
        assert_eq!(flushed[1], vec![2; 4]);
        assert_eq!(flushed[2], vec![3; 4]);
        assert!(!session.is_prebuffering());

        // F4 goes straight to the sink
        session.process(&mut frame(4, 2, 4), &mut sink);
        assert_eq!(sink.taken().len(), 4);
        assert_eq!(sink.taken()[3], vec![4; 2]);
    }

    #[test]
    fn test_lossless_buffers_routed_individually() {
        let factory = SplittingFactory::default();
        let mut sink = MemorySink::default();
        let mut session = PlaybackSession::start(2, &lossless_args(), &factory, 3);

        session.process(&mut AudioFrame::new(&[1u8, 2, 3, 4, 5, 6][..], 1, 0), &mut sink);
        // First half (3 bytes) stays queued, second half crosses the threshold
        assert_eq!(sink.taken(), vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert!(!session.is_prebuffering());
    }

    #[test]
    fn test_sink_failure_is_contained() {
        let factory = SplittingFactory::default();
        let mut session = PlaybackSession::start(3, &StartPlaybackArgs::raw_pcm(), &factory, 1);
        session.process(&mut frame(9, 4, 1), &mut BrokenSink);
        session.process(&mut frame(9, 4, 2), &mut BrokenSink);
        assert!(!session.is_prebuffering());
    }
}
