use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::core::{AudioFrame, AudioSlaveEndpoint, Error, Result};

/// Socket buffer size requested for audio sockets
const SOCKET_BUFFER_BYTES: usize = 1024 * 1024;

/// Largest datagram accepted by the ingest socket
const MAX_DATAGRAM: usize = 65_507;

/// Builds a non-blocking UDP socket with enlarged kernel buffers
fn audio_socket(addr: SocketAddr) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    // Not every platform grants the full size; the default buffer still works
    if let Err(e) = socket.set_send_buffer_size(SOCKET_BUFFER_BYTES) {
        debug!(error = %e, "Could not enlarge send buffer");
    }
    if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_BYTES) {
        debug!(error = %e, "Could not enlarge receive buffer");
    }

    socket.set_nonblocking(true)?;
    socket
        .bind(&SockAddr::from(addr))
        .map_err(|e| Error::network(format!("Failed to bind audio socket on {}: {}", addr, e)))?;

    Ok(socket.into())
}

/// Master-side replication of audio frames to slave endpoints
///
/// Sends go straight to the non-blocking socket, so every call is a real
/// attempt and only the kernel decides whether a datagram fits.
pub struct Fanout {
    socket: std::net::UdpSocket,
}

impl Fanout {
    /// Binds an ephemeral sending socket on `addr`
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = audio_socket(addr)?;
        debug!(local = %socket.local_addr()?, "Fan-out socket bound");
        Ok(Fanout { socket })
    }

    /// Sends one datagram per endpoint without waiting on any of them
    ///
    /// Returns how many sends the kernel accepted. Failures are logged and
    /// never affect the other endpoints.
    pub fn replicate(&self, payload: &[u8], endpoints: &[AudioSlaveEndpoint]) -> usize {
        let mut sent = 0;
        for endpoint in endpoints {
            match self.socket.send_to(payload, endpoint.addr()) {
                Ok(_) => sent += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    warn!(endpoint = %endpoint.addr(), "Fan-out socket full, dropping frame");
                }
                Err(e) => {
                    warn!(endpoint = %endpoint.addr(), error = %e, "Fan-out send failed");
                }
            }
        }
        sent
    }
}

/// Slave-side receiver for frames replicated by the master
pub struct AudioIngest {
    socket: UdpSocket,
}

impl AudioIngest {
    /// Binds the ingest socket
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(AudioIngest {
            socket: UdpSocket::from_std(audio_socket(addr)?)?,
        })
    }

    /// Port reported back to the master in the start-playback acknowledgement
    pub fn port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Forwards every received datagram as a frame until `frames` closes
    ///
    /// Datagrams carry only the payload, so sequence numbers are assigned in
    /// arrival order.
    pub async fn run(self, frames: mpsc::Sender<AudioFrame>) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut sequence: u16 = 0;

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "Audio ingest receive failed");
                    continue;
                }
            };
            trace!(%from, len, "Received replicated frame");

            let frame = AudioFrame::new(BytesMut::from(&buf[..len]), sequence, 0);
            sequence = sequence.wrapping_add(1);

            if frames.send(frame).await.is_err() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn endpoint(socket: &UdpSocket) -> AudioSlaveEndpoint {
        let addr = socket.local_addr().unwrap();
        AudioSlaveEndpoint {
            host: addr.ip(),
            audio_port: addr.port(),
        }
    }

    async fn receive(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 16];
        let (len, _) = timeout(Duration::from_secs(1), socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf[..len].to_vec()
    }

    #[tokio::test]
    async fn test_replicate_to_every_endpoint() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let fanout = Fanout::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let sent = fanout.replicate(&[1, 2, 3, 4], &[endpoint(&a), endpoint(&b)]);
        assert_eq!(sent, 2);

        assert_eq!(receive(&a).await, vec![1, 2, 3, 4]);
        assert_eq!(receive(&b).await, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_first_frame_after_bind_is_sent() {
        let slave = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = endpoint(&slave);

        // No await point between binding and the first send
        let fanout = Fanout::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert_eq!(fanout.replicate(&[1, 2], &[target]), 1);
        assert_eq!(fanout.replicate(&[3, 4], &[target]), 1);

        assert_eq!(receive(&slave).await, vec![1, 2]);
        assert_eq!(receive(&slave).await, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_failed_send_does_not_affect_other_endpoints() {
        let good = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // An IPv6 destination cannot be reached from an IPv4 socket
        let unreachable = AudioSlaveEndpoint {
            host: "::1".parse().unwrap(),
            audio_port: 9,
        };

        let fanout = Fanout::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let sent = fanout.replicate(&[5, 6, 7, 8], &[unreachable, endpoint(&good)]);
        assert_eq!(sent, 1);
        assert_eq!(receive(&good).await, vec![5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_ingest_forwards_datagrams_in_order() {
        let ingest = AudioIngest::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = ingest.port().unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(ingest.run(tx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[0xAA, 0xBB], ("127.0.0.1", port)).await.unwrap();
        sender.send_to(&[0xCC, 0xDD], ("127.0.0.1", port)).await.unwrap();

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(&first.payload[..], &[0xAA, 0xBB]);
        assert_eq!(first.sequence, 0);
        assert_eq!(&second.payload[..], &[0xCC, 0xDD]);
        assert_eq!(second.sequence, 1);

        handle.abort();
    }
}
