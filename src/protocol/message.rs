use serde::{Deserialize, Serialize};

use crate::core::PeerUrl;

/// Codec identifier announced for raw 16-bit big-endian PCM
pub const CODEC_RAW_PCM: &str = "96 L16/44100/2";

/// Codec identifier announced for Apple Lossless
pub const CODEC_LOSSLESS: &str = "96 AppleLossless";

/// Requests carried over the control channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlRequest {
    /// Capability probe; protocol peers list the capability token
    Options,
    /// Asks a peer whether it is master, or who its master is
    StatusCheck,
    /// Slave to master registration
    Register {
        /// Control port of the registering slave
        port: Option<u16>,
    },
    /// Master to slave playback start
    StartPlayback(StartPlaybackArgs),
}

impl ControlRequest {
    /// Method name used in logs
    pub fn method(&self) -> &'static str {
        match self {
            ControlRequest::Options => "OPTIONS",
            ControlRequest::StatusCheck => "STATUS",
            ControlRequest::Register { .. } => "REGISTER",
            ControlRequest::StartPlayback(_) => "START",
        }
    }
}

/// Responses carried over the control channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    /// Capability tokens supported by the responder
    Options {
        public: Vec<String>,
    },
    /// Role of the responder
    Status {
        is_master: bool,
        master_url: Option<PeerUrl>,
    },
    /// Request accepted
    Ok,
    /// Start-playback acknowledgement
    AudioPort {
        audio_port: u16,
    },
    /// Request refused
    Rejected {
        status: u16,
        reason: String,
    },
}

impl ControlResponse {
    /// Status code equivalent of this response
    pub fn status(&self) -> u16 {
        match self {
            ControlResponse::Rejected { status, .. } => *status,
            _ => 200,
        }
    }
}

/// Parameters of a playback session, forwarded verbatim from master to slaves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPlaybackArgs {
    /// Codec identifier, e.g. `96 AppleLossless`
    pub audio_codec: String,
    /// Codec format parameters (fmtp fields), if any
    pub audio_options: Option<Vec<String>>,
    /// Stream encryption material for the lossless codec
    pub encryption_keys: Option<EncryptionKeys>,
}

impl StartPlaybackArgs {
    /// Arguments for a raw PCM session
    pub fn raw_pcm() -> Self {
        StartPlaybackArgs {
            audio_codec: CODEC_RAW_PCM.to_string(),
            audio_options: None,
            encryption_keys: None,
        }
    }
}

/// AES key material negotiated by the audio server
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeys {
    pub aes_key: Vec<u8>,
    pub aes_iv: Vec<u8>,
}

impl std::fmt::Debug for EncryptionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeys")
            .field("aes_key", &format_args!("<{} bytes>", self.aes_key.len()))
            .field("aes_iv", &format_args!("<{} bytes>", self.aes_iv.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status() {
        assert_eq!(ControlResponse::Ok.status(), 200);
        assert_eq!(ControlResponse::AudioPort { audio_port: 6000 }.status(), 200);
        let rejected = ControlResponse::Rejected {
            status: 412,
            reason: "not master".into(),
        };
        assert_eq!(rejected.status(), 412);
    }

    #[test]
    fn test_start_args_serialization() {
        let args = StartPlaybackArgs {
            audio_codec: CODEC_LOSSLESS.to_string(),
            audio_options: Some(vec!["96".into(), "352".into()]),
            encryption_keys: Some(EncryptionKeys {
                aes_key: vec![1; 16],
                aes_iv: vec![2; 16],
            }),
        };

        let encoded = bincode::serialize(&ControlRequest::StartPlayback(args.clone())).unwrap();
        let decoded: ControlRequest = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, ControlRequest::StartPlayback(args));
    }

    #[test]
    fn test_keys_are_not_logged() {
        let keys = EncryptionKeys {
            aes_key: vec![0xAB; 16],
            aes_iv: vec![0xCD; 16],
        };
        let shown = format!("{:?}", keys);
        assert!(shown.contains("<16 bytes>"));
        assert!(!shown.contains("171"));
    }
}
