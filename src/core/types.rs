use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Location of a peer's control channel, rendered as `storm://ip:port`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerUrl(pub SocketAddr);

impl PeerUrl {
    /// Creates a URL pointing at the given control address
    pub fn new(addr: SocketAddr) -> Self {
        PeerUrl(addr)
    }

    /// Socket address of the control channel
    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    /// Host part of the URL
    pub fn host(&self) -> IpAddr {
        self.0.ip()
    }
}

impl fmt::Display for PeerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", super::URL_SCHEME, self.0)
    }
}

impl FromStr for PeerUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(super::URL_SCHEME)
            .or_else(|| s.strip_prefix("http://"))
            .unwrap_or(s)
            .trim_end_matches('/');

        rest.parse::<SocketAddr>()
            .map(PeerUrl)
            .map_err(|e| Error::protocol(format!("Invalid peer URL {:?}: {}", s, e)))
    }
}

impl TryFrom<String> for PeerUrl {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PeerUrl> for String {
    fn from(url: PeerUrl) -> Self {
        url.to_string()
    }
}

/// A service announced by the external discovery component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Advertised service name
    pub name: String,
    /// Resolved candidate addresses, in resolver order
    pub addresses: Vec<IpAddr>,
    /// Advertised control port
    pub port: u16,
}

/// A registered downstream node, keyed by (host, control port)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlaveRecord {
    /// Slave host as seen by the master
    pub host: IpAddr,
    /// Slave control port
    pub port: u16,
}

impl SlaveRecord {
    /// Control URL of this slave
    pub fn url(&self) -> PeerUrl {
        PeerUrl(SocketAddr::new(self.host, self.port))
    }
}

/// A (host, UDP port) pair that receives replicated audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioSlaveEndpoint {
    pub host: IpAddr,
    pub audio_port: u16,
}

impl AudioSlaveEndpoint {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.audio_port)
    }
}

/// One buffer of audio payload delivered by the audio server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Raw payload, mutated in place by the byte-order transform
    pub payload: BytesMut,
    /// RTP sequence number (locally assigned on slaves)
    pub sequence: u16,
    /// RTP timestamp
    pub timestamp: u32,
}

impl AudioFrame {
    pub fn new(payload: impl Into<BytesMut>, sequence: u16, timestamp: u32) -> Self {
        AudioFrame {
            payload: payload.into(),
            sequence,
            timestamp,
        }
    }
}

/// Configuration for a storm_sync node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Advertised service name, also used to ignore our own announcements
    pub service_name: String,
    /// Bind address of the control channel listener
    pub control_addr: SocketAddr,
    /// Bind address of the slave audio ingest socket
    pub audio_addr: SocketAddr,
    /// How long to wait for a master before electing ourselves
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub startup_delay: Duration,
    /// Bytes of decoded audio held back before output starts
    pub prebuffer_bytes: usize,
    /// Timeout applied to each control request
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub request_timeout: Duration,
    /// Maximum number of "my master is at X" hops followed while vetting a peer
    pub max_referral_hops: usize,
    /// Token a peer must advertise in its capability probe
    pub capability_token: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_name: super::DEFAULT_SERVICE_NAME.to_string(),
            control_addr: SocketAddr::from(([0, 0, 0, 0], super::DEFAULT_CONTROL_PORT)),
            audio_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            startup_delay: Duration::from_millis(super::STARTUP_DELAY_MS),
            prebuffer_bytes: super::PREBUFFER_BYTES,
            request_timeout: Duration::from_secs(5),
            max_referral_hops: 8,
            capability_token: super::CAPABILITY_TOKEN.to_string(),
        }
    }
}

impl Config {
    /// Loads a JSON configuration file; absent fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(Error::config("service_name must not be empty"));
        }
        if self.prebuffer_bytes == 0 {
            return Err(Error::config("prebuffer_bytes must be positive"));
        }
        if self.max_referral_hops == 0 {
            return Err(Error::config("max_referral_hops must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("request_timeout must be positive"));
        }
        Ok(())
    }
}
