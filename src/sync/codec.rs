use bytes::Bytes;
use tracing::{error, warn};

use crate::core::{AudioFrame, Error, Result};
use crate::protocol::{EncryptionKeys, StartPlaybackArgs, CODEC_LOSSLESS, CODEC_RAW_PCM};
use crate::util::swap_bytes_16;

/// Streaming lossless decoder provided by an external component
///
/// Frames are pushed in; zero or more PCM buffers are pulled out.
pub trait Decoder: Send {
    /// Feeds one encoded frame
    fn push(&mut self, frame: &[u8]) -> Result<()>;

    /// Takes the next decoded buffer, if one is ready
    fn pull(&mut self) -> Option<Bytes>;
}

/// Builds a decoder for a lossless session
pub trait DecoderFactory: Send + Sync {
    fn create(&self, config: &AlacConfig, keys: Option<&EncryptionKeys>) -> Result<Box<dyn Decoder>>;
}

/// Apple Lossless stream parameters, taken from the announced fmtp fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlacConfig {
    pub frame_length: u32,
    pub compatible_version: u32,
    pub bit_depth: u32,
    pub pb: u32,
    pub mb: u32,
    pub kb: u32,
    pub channels: u32,
    pub max_run: u32,
    pub max_frame_bytes: u32,
    pub avg_bit_rate: u32,
    pub sample_rate: u32,
}

impl AlacConfig {
    /// Parses fmtp fields; index 0 is the payload type and is skipped
    pub fn from_fmtp(options: &[String]) -> Result<Self> {
        if options.len() < 12 {
            return Err(Error::protocol(format!(
                "Expected 12 lossless format fields, got {}",
                options.len()
            )));
        }

        let field = |index: usize, name: &str| -> Result<u32> {
            options[index].trim().parse::<u32>().map_err(|e| {
                Error::protocol(format!("Invalid {} {:?}: {}", name, options[index], e))
            })
        };

        Ok(AlacConfig {
            frame_length: field(1, "frame_length")?,
            compatible_version: field(2, "compatible_version")?,
            bit_depth: field(3, "bit_depth")?,
            pb: field(4, "pb")?,
            mb: field(5, "mb")?,
            kb: field(6, "kb")?,
            channels: field(7, "channels")?,
            max_run: field(8, "max_run")?,
            max_frame_bytes: field(9, "max_frame_bytes")?,
            avg_bit_rate: field(10, "avg_bit_rate")?,
            sample_rate: field(11, "sample_rate")?,
        })
    }
}

/// Codec of a playback session
pub enum AudioCodec {
    /// Big-endian 16-bit PCM, byte-swapped for output
    RawPcm,
    /// Apple Lossless, decoded by the session decoder
    Lossless(Box<dyn Decoder>),
    /// Anything else; frames are dropped
    Unsupported(String),
}

impl std::fmt::Debug for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioCodec::RawPcm => write!(f, "RawPcm"),
            AudioCodec::Lossless(_) => write!(f, "Lossless"),
            AudioCodec::Unsupported(name) => write!(f, "Unsupported({:?})", name),
        }
    }
}

impl AudioCodec {
    /// Selects the codec for a session, building a decoder when needed
    ///
    /// A lossless session whose parameters cannot be parsed, or whose decoder
    /// cannot be built, falls back to `Unsupported`.
    pub fn from_args(args: &StartPlaybackArgs, decoders: &dyn DecoderFactory) -> Self {
        match args.audio_codec.as_str() {
            CODEC_RAW_PCM => AudioCodec::RawPcm,
            CODEC_LOSSLESS => {
                let options = args.audio_options.as_deref().unwrap_or(&[]);
                let decoder = AlacConfig::from_fmtp(options)
                    .and_then(|config| decoders.create(&config, args.encryption_keys.as_ref()));
                match decoder {
                    Ok(decoder) => AudioCodec::Lossless(decoder),
                    Err(e) => {
                        error!(error = %e, "Failed to set up lossless decoder");
                        AudioCodec::Unsupported(args.audio_codec.clone())
                    }
                }
            }
            other => {
                warn!(error = %Error::UnsupportedCodec(other.to_string()), "Frames of this session will be dropped");
                AudioCodec::Unsupported(other.to_string())
            }
        }
    }

    /// Converts one frame into zero or more output buffers
    pub fn transform(&mut self, frame: &mut AudioFrame, mut emit: impl FnMut(Bytes)) {
        match self {
            AudioCodec::RawPcm => {
                swap_bytes_16(&mut frame.payload);
                emit(frame.payload.split().freeze());
            }
            AudioCodec::Lossless(decoder) => {
                if let Err(e) = decoder.push(&frame.payload) {
                    warn!(sequence = frame.sequence, error = %e, "Decoder rejected frame");
                }
                while let Some(buf) = decoder.pull() {
                    emit(buf);
                }
            }
            AudioCodec::Unsupported(name) => {
                warn!(codec = %name, "Unsupported codec, dropping frame");
            }
        }
    }
}
