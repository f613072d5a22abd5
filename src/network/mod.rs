//! Network module
//!
//! Control channel transport, peer vetting, and the UDP audio fan-out.

mod connection;
mod discovery;
mod fanout;

pub use self::connection::{ControlCall, ControlClient, ControlServer, ControlTransport};
pub use self::discovery::{DiscoveryEvent, PeerCandidate, PeerVetter};
pub use self::fanout::{AudioIngest, Fanout};
