use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, trace, warn};

use crate::core::{Error, PeerUrl, Result};
use crate::protocol::{ControlRequest, ControlResponse, MessageCodec};

/// Issues control requests to peers
///
/// The node only ever needs a single request/response exchange per call, so
/// the seam is one method. Tests substitute scripted transports.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    /// Sends `request` to the peer at `url` and waits for its response
    async fn request(&self, url: PeerUrl, request: ControlRequest) -> Result<ControlResponse>;
}

/// TCP control channel client, one connection per request
#[derive(Debug, Clone)]
pub struct ControlClient {
    timeout: Duration,
}

impl ControlClient {
    /// Creates a client that gives up on a request after `timeout`
    pub fn new(timeout: Duration) -> Self {
        ControlClient { timeout }
    }
}

#[async_trait]
impl ControlTransport for ControlClient {
    async fn request(&self, url: PeerUrl, request: ControlRequest) -> Result<ControlResponse> {
        let method = request.method();
        trace!(%url, method, "Sending control request");

        let exchange = async {
            let stream = TcpStream::connect(url.addr())
                .await
                .map_err(|e| Error::network(format!("Failed to connect to {}: {}", url, e)))?;
            let mut framed = Framed::new(stream, MessageCodec::<ControlResponse, ControlRequest>::new());

            framed.send(request).await?;
            match framed.next().await {
                Some(response) => response,
                None => Err(Error::network(format!("{} closed before responding to {}", url, method))),
            }
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::network(format!("{} request to {} timed out", method, url)))?
    }
}

/// A control request waiting for the node to answer it
#[derive(Debug)]
pub struct ControlCall {
    /// The decoded request
    pub request: ControlRequest,
    /// Remote address of the caller
    pub peer: SocketAddr,
    /// Where the response goes
    pub reply: oneshot::Sender<ControlResponse>,
}

/// Control channel listener
///
/// Each decoded request is handed to the owner of node state as a
/// [`ControlCall`]; the connection task only waits for the reply.
pub struct ControlServer {
    listener: TcpListener,
    calls: mpsc::Sender<ControlCall>,
}

impl ControlServer {
    /// Binds the listener
    pub async fn bind(addr: SocketAddr, calls: mpsc::Sender<ControlCall>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::network(format!("Failed to bind control listener on {}: {}", addr, e)))?;
        Ok(ControlServer { listener, calls })
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
            .map_err(|e| Error::network(format!("Failed to get local address: {}", e)))
    }

    /// Accepts connections until the call channel closes
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Control listener accept failed");
                    continue;
                }
            };

            if self.calls.is_closed() {
                return Ok(());
            }

            let calls = self.calls.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer, calls).await {
                    debug!(%peer, error = %e, "Control connection ended with error");
                }
            });
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    calls: mpsc::Sender<ControlCall>,
) -> Result<()> {
    let mut framed = Framed::new(stream, MessageCodec::<ControlRequest, ControlResponse>::new());

    while let Some(request) = framed.next().await {
        let request = request?;
        trace!(%peer, method = request.method(), "Received control request");

        let (reply, response) = oneshot::channel();
        calls
            .send(ControlCall { request, peer, reply })
            .await
            .map_err(|_| Error::invalid_state("Node stopped accepting control calls"))?;

        let response = response
            .await
            .map_err(|_| Error::invalid_state("Control call dropped without a response"))?;
        framed.send(response).await?;
    }

    Ok(())
}
