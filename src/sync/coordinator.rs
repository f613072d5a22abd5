use std::net::SocketAddr;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::core::{AudioFrame, Config, Error, PeerUrl, Result, SlaveRecord};
use crate::network::{ControlTransport, Fanout};
use crate::protocol::{
    ControlRequest, ControlResponse, ElectionState, Role, StartPlaybackArgs, Transition,
};
use super::codec::DecoderFactory;
use super::registry::{EndpointSet, SlaveRegistry};
use super::session::{AudioSink, PlaybackSession};

/// Events raised by the external audio server
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// A sender connected and announced its stream format
    ClientConnected(StartPlaybackArgs),
    /// One audio frame
    Audio(AudioFrame),
    VolumeChange(f32),
    ProgressChange(String),
    MetadataChange(String),
    Flush,
    /// The sender ended the stream
    Teardown,
    Error(String),
}

/// Results of spawned network tasks, posted back to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Peer vetting resolved a master
    MasterFound(PeerUrl),
    /// A slave acknowledged a start-playback broadcast
    SlaveStarted {
        session: u64,
        slave: SlaveRecord,
        audio_port: u16,
    },
}

/// Snapshot of node state for operators
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStatus {
    pub role: Role,
    /// Registered slaves (master only)
    pub slaves: usize,
    /// Slaves in the audio fan-out of the current session
    pub endpoints: usize,
    /// Conflicting master reports seen
    pub conflicts: u32,
    pub session_active: bool,
}

/// External collaborators a node is built around
pub struct NodeParts {
    pub sink: Box<dyn AudioSink>,
    pub decoders: Arc<dyn DecoderFactory>,
    pub transport: Arc<dyn ControlTransport>,
}

/// Ports this node listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPorts {
    pub control: u16,
    pub audio: u16,
}

/// Sole owner of role, registry, fan-out endpoints, and playback session
///
/// Every mutation happens through `&mut self`; network work is spawned and
/// reports back as a [`Command`].
pub struct Coordinator {
    config: Config,
    ports: LocalPorts,
    election: ElectionState,
    registry: SlaveRegistry,
    endpoints: EndpointSet,
    session: Option<PlaybackSession>,
    last_session: u64,
    sink: Box<dyn AudioSink>,
    decoders: Arc<dyn DecoderFactory>,
    transport: Arc<dyn ControlTransport>,
    fanout: Fanout,
    commands: mpsc::Sender<Command>,
    status: watch::Sender<NodeStatus>,
}

impl Coordinator {
    pub fn new(
        config: Config,
        parts: NodeParts,
        fanout: Fanout,
        ports: LocalPorts,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        let election = ElectionState::new();
        let (status, _) = watch::channel(NodeStatus {
            role: election.role().clone(),
            slaves: 0,
            endpoints: 0,
            conflicts: 0,
            session_active: false,
        });

        Coordinator {
            config,
            ports,
            election,
            registry: SlaveRegistry::new(),
            endpoints: EndpointSet::new(),
            session: None,
            last_session: 0,
            sink: parts.sink,
            decoders: parts.decoders,
            transport: parts.transport,
            fanout,
            commands,
            status,
        }
    }

    pub fn role(&self) -> &Role {
        self.election.role()
    }

    pub fn registry(&self) -> &SlaveRegistry {
        &self.registry
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    /// Subscribes to status snapshots
    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    /// Current status snapshot
    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            role: self.election.role().clone(),
            slaves: self.registry.len(),
            endpoints: self.endpoints.len(),
            conflicts: self.election.conflicts(),
            session_active: self.session.is_some(),
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.status());
    }

    /// Startup delay elapsed
    pub fn on_election_timeout(&mut self) -> Transition {
        let transition = self.election.on_timeout();
        if transition.settles() {
            info!("Start master server");
            self.publish();
        }
        transition
    }

    /// Handles a result posted by a spawned task
    pub fn on_command(&mut self, command: Command) -> Option<Transition> {
        match command {
            Command::MasterFound(url) => Some(self.on_master_found(url)),
            Command::SlaveStarted { session, slave, audio_port } => {
                if self.endpoints.insert(session, slave, audio_port) {
                    self.publish();
                }
                None
            }
        }
    }

    fn on_master_found(&mut self, url: PeerUrl) -> Transition {
        let transition = self.election.on_master_found(url);
        if let Transition::StartedFollowing(master) = transition {
            info!(%master, "Start slave server");
            self.register_with(master);
        }
        self.publish();
        transition
    }

    /// Registers our control port with the master, fire and forget
    fn register_with(&self, master: PeerUrl) {
        let transport = self.transport.clone();
        let request = ControlRequest::Register {
            port: Some(self.ports.control),
        };

        tokio::spawn(async move {
            match transport.request(master, request).await {
                Ok(ControlResponse::Ok) => info!(%master, "Registered with master"),
                Ok(other) => warn!(%master, status = other.status(), "Master refused registration"),
                Err(e) => warn!(%master, error = %e, "Registration with master failed"),
            }
        });
    }

    /// Answers a control request from `peer`
    pub fn handle_control(&mut self, request: ControlRequest, peer: SocketAddr) -> ControlResponse {
        let method = request.method();
        match self.dispatch(request, peer) {
            Ok(response) => response,
            Err(e) => {
                warn!(%peer, method, role = self.election.role().name(), error = %e, "Rejected control request");
                ControlResponse::Rejected {
                    status: e.status_code(),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn dispatch(&mut self, request: ControlRequest, peer: SocketAddr) -> Result<ControlResponse> {
        match request {
            ControlRequest::Options => Ok(ControlResponse::Options {
                public: vec![self.config.capability_token.clone()],
            }),

            ControlRequest::StatusCheck => {
                debug!(%peer, "Status check");
                Ok(ControlResponse::Status {
                    is_master: self.election.is_master(),
                    master_url: self.election.master_url(),
                })
            }

            ControlRequest::Register { port } => {
                if !self.election.is_master() {
                    return Err(Error::role_violation(412, "Register sent to a node that is not master"));
                }
                let port = port.ok_or(Error::MissingParameter("port"))?;

                if self.registry.register(SlaveRecord { host: peer.ip(), port }) {
                    self.publish();
                }
                Ok(ControlResponse::Ok)
            }

            ControlRequest::StartPlayback(args) => {
                match self.election.role() {
                    Role::Master => {
                        return Err(Error::role_violation(400, "Start playback sent to a master"))
                    }
                    Role::Unknown => {
                        return Err(Error::role_violation(412, "Election has not settled"))
                    }
                    Role::Following(_) => {}
                }

                self.start_session(&args);
                Ok(ControlResponse::AudioPort {
                    audio_port: self.ports.audio,
                })
            }
        }
    }

    /// Handles one event from the audio server
    pub fn on_audio_event(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::ClientConnected(args) => {
                info!(codec = %args.audio_codec, "Client connected");
                let session = self.start_session(&args);
                if self.election.is_master() {
                    self.broadcast_start(session, args);
                }
            }
            AudioEvent::Audio(frame) => self.on_frame(frame),
            AudioEvent::VolumeChange(volume) => info!(volume, "Volume change"),
            AudioEvent::ProgressChange(progress) => info!(%progress, "Progress change"),
            AudioEvent::MetadataChange(metadata) => info!(%metadata, "Metadata change"),
            AudioEvent::Flush => info!("Flush"),
            AudioEvent::Teardown => {
                info!("Teardown");
                self.stop_session();
            }
            AudioEvent::Error(message) => error!(%message, "Audio server error"),
        }
    }

    /// Handles a frame replicated to us by the master
    pub fn on_ingest_frame(&mut self, frame: AudioFrame) {
        if self.election.is_following() {
            self.on_frame(frame);
        } else {
            trace!(sequence = frame.sequence, "Dropping replicated frame, not a slave");
        }
    }

    fn on_frame(&mut self, mut frame: AudioFrame) {
        if self.election.is_master() && !self.endpoints.is_empty() {
            self.fanout.replicate(&frame.payload, self.endpoints.endpoints());
        }

        match self.session.as_mut() {
            Some(session) => session.process(&mut frame, self.sink.as_mut()),
            None => trace!(sequence = frame.sequence, "No playback session, dropping frame"),
        }
    }

    fn start_session(&mut self, args: &StartPlaybackArgs) -> u64 {
        self.last_session += 1;
        let id = self.last_session;

        self.session = Some(PlaybackSession::start(
            id,
            args,
            self.decoders.as_ref(),
            self.config.prebuffer_bytes,
        ));
        self.endpoints.reset(id);
        self.publish();
        id
    }

    fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!(session = session.id(), "Playback session stopped");
        }
        // Session ids start at 1, so late acknowledgements are all stale
        self.endpoints.reset(0);
        self.publish();
    }

    /// Sends start-playback to every registered slave concurrently
    ///
    /// Each acknowledgement is posted back as soon as it arrives; slaves that
    /// fail or refuse are left out of the fan-out.
    fn broadcast_start(&self, session: u64, args: StartPlaybackArgs) {
        let slaves = self.registry.slaves().to_vec();
        if slaves.is_empty() {
            return;
        }
        info!(session, slaves = slaves.len(), "Broadcasting playback start");

        let transport = self.transport.clone();
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let mut pending: FuturesUnordered<_> = slaves
                .into_iter()
                .map(|slave| {
                    let transport = transport.clone();
                    let request = ControlRequest::StartPlayback(args.clone());
                    async move { (slave, transport.request(slave.url(), request).await) }
                })
                .collect();

            while let Some((slave, result)) = pending.next().await {
                match result {
                    Ok(ControlResponse::AudioPort { audio_port }) => {
                        let started = Command::SlaveStarted { session, slave, audio_port };
                        if commands.send(started).await.is_err() {
                            return;
                        }
                    }
                    Ok(other) => {
                        warn!(host = %slave.host, status = other.status(), "Slave refused playback start");
                    }
                    Err(e) => {
                        warn!(host = %slave.host, error = %e, "Slave excluded from audio fan-out");
                    }
                }
            }
        });
    }
}
