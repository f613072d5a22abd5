use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::core::{Config, Error, Result};
use crate::network::{AudioIngest, ControlCall, ControlServer, DiscoveryEvent, Fanout, PeerVetter};
use crate::protocol::Role;
use super::coordinator::{AudioEvent, Command, Coordinator, LocalPorts, NodeParts, NodeStatus};

/// Options passed when the external audio server is started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioServerOptions {
    /// Name announced to senders
    pub service_name: String,
    /// Only the master advertises itself to senders
    pub advertise: bool,
}

/// The external streaming audio server
///
/// Its events reach the node through the `AudioEvent` channel given to
/// [`Node::run`]; the node only tells it when to start.
#[async_trait]
pub trait AudioServer: Send {
    async fn start(&mut self, options: AudioServerOptions) -> Result<()>;
}

/// A speaker node: control listener, audio ingest, election, and playback
pub struct Node {
    coordinator: Coordinator,
    vetter: Arc<PeerVetter>,
    audio_server: Box<dyn AudioServer>,
    control: ControlServer,
    ingest: AudioIngest,
    calls: mpsc::Receiver<ControlCall>,
    commands_tx: mpsc::Sender<Command>,
    commands: mpsc::Receiver<Command>,
    control_addr: SocketAddr,
    config: Config,
}

impl Node {
    /// Binds the control listener and audio sockets
    pub async fn bind(
        config: Config,
        parts: NodeParts,
        audio_server: Box<dyn AudioServer>,
    ) -> Result<Self> {
        config.validate()?;

        let (calls_tx, calls) = mpsc::channel(64);
        let control = ControlServer::bind(config.control_addr, calls_tx).await?;
        let control_addr = control.local_addr()?;

        let ingest = AudioIngest::bind(config.audio_addr)?;
        let fanout = Fanout::bind(SocketAddr::new(config.audio_addr.ip(), 0))?;
        let ports = LocalPorts {
            control: control_addr.port(),
            audio: ingest.port()?,
        };

        let (commands_tx, commands) = mpsc::channel(64);
        let vetter = Arc::new(PeerVetter::new(&config, parts.transport.clone()));
        let coordinator = Coordinator::new(config.clone(), parts, fanout, ports, commands_tx.clone());

        info!(
            name = %config.service_name,
            control = %control_addr,
            audio_port = ports.audio,
            "Node bound"
        );

        Ok(Node {
            coordinator,
            vetter,
            audio_server,
            control,
            ingest,
            calls,
            commands_tx,
            commands,
            control_addr,
            config,
        })
    }

    /// Address of the control listener
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Subscribes to status snapshots
    pub fn status(&self) -> watch::Receiver<NodeStatus> {
        self.coordinator.subscribe()
    }

    /// Runs the node until the audio server's event channel closes
    pub async fn run(
        self,
        mut discovery: mpsc::Receiver<DiscoveryEvent>,
        mut audio: mpsc::Receiver<AudioEvent>,
    ) -> Result<()> {
        let Node {
            mut coordinator,
            vetter,
            mut audio_server,
            control,
            ingest,
            mut calls,
            commands_tx,
            mut commands,
            config,
            ..
        } = self;

        let (frames_tx, mut frames) = mpsc::channel(256);
        let control_handle = tokio::spawn(control.run());
        let ingest_handle = tokio::spawn(ingest.run(frames_tx));

        let election = tokio::time::sleep(config.startup_delay);
        tokio::pin!(election);
        let mut election_pending = true;

        let result = loop {
            let transition = tokio::select! {
                _ = &mut election, if election_pending => {
                    election_pending = false;
                    Some(coordinator.on_election_timeout())
                }

                Some(event) = discovery.recv() => {
                    on_discovery(event, &vetter, &commands_tx);
                    None
                }

                Some(command) = commands.recv() => coordinator.on_command(command),

                Some(call) = calls.recv() => {
                    let response = coordinator.handle_control(call.request, call.peer);
                    let _ = call.reply.send(response);
                    None
                }

                Some(frame) = frames.recv() => {
                    coordinator.on_ingest_frame(frame);
                    None
                }

                event = audio.recv() => match event {
                    Some(event) => {
                        coordinator.on_audio_event(event);
                        None
                    }
                    None => {
                        info!("Audio server event stream closed");
                        break Ok(());
                    }
                },
            };

            if let Some(transition) = transition {
                if transition.settles() {
                    let options = AudioServerOptions {
                        service_name: config.service_name.clone(),
                        advertise: *coordinator.role() == Role::Master,
                    };
                    if let Err(e) = audio_server.start(options).await {
                        error!(error = %e, "Failed to start audio server");
                        break Err(Error::invalid_state(format!("Audio server failed to start: {}", e)));
                    }
                    info!(advertise = *coordinator.role() == Role::Master, "Audio server started");
                }
            }
        };

        control_handle.abort();
        ingest_handle.abort();
        result
    }
}

/// Vets an announced service on its own task
fn on_discovery(event: DiscoveryEvent, vetter: &Arc<PeerVetter>, commands: &mpsc::Sender<Command>) {
    match event {
        DiscoveryEvent::ServiceUp(record) => {
            let vetter = vetter.clone();
            let commands = commands.clone();
            tokio::spawn(async move {
                match vetter.vet(&record).await {
                    Ok(Some(master)) => {
                        let _ = commands.send(Command::MasterFound(master)).await;
                    }
                    Ok(None) => {}
                    Err(e) => warn!(name = %record.name, error = %e, "Dropping peer"),
                }
            });
        }
        DiscoveryEvent::ServiceDown { name } => info!(%name, "Service down"),
        DiscoveryEvent::Error(message) => warn!(%message, "Discovery error"),
    }
}
