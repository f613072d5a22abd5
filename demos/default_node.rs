use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use storm_sync::network::ControlClient;
use storm_sync::protocol::{EncryptionKeys, Role, StartPlaybackArgs};
use storm_sync::sync::{
    AlacConfig, AudioEvent, AudioServer, AudioServerOptions, AudioSink, Decoder, DecoderFactory,
};
use storm_sync::core::AudioFrame;
use storm_sync::{util, Config, Error, Node, NodeParts, Result};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::Level;

/// Counts what would have gone to the speaker
struct CountingSink {
    bytes: Arc<AtomicUsize>,
}

impl AudioSink for CountingSink {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.bytes.fetch_add(buf.len(), Ordering::Relaxed);
        Ok(())
    }
}

/// This demo only plays raw PCM
struct NoLossless;

impl DecoderFactory for NoLossless {
    fn create(&self, _config: &AlacConfig, _keys: Option<&EncryptionKeys>) -> Result<Box<dyn Decoder>> {
        Err(Error::decoder("no lossless decoder in this demo"))
    }
}

struct PrintingServer;

#[async_trait]
impl AudioServer for PrintingServer {
    async fn start(&mut self, options: AudioServerOptions) -> Result<()> {
        println!(
            "Audio server \"{}\" started (advertised: {})",
            options.service_name, options.advertise
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    util::init_tracing(Level::INFO);

    // Optional JSON config path; otherwise run on localhost with short delays
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config {
            control_addr: "127.0.0.1:0".parse().map_err(|e| Error::config(format!("{}", e)))?,
            audio_addr: "127.0.0.1:0".parse().map_err(|e| Error::config(format!("{}", e)))?,
            startup_delay: Duration::from_millis(500),
            prebuffer_bytes: 16 * 1024,
            ..Config::default()
        },
    };

    println!("Node configuration:");
    println!("- Service name: {}", config.service_name);
    println!("- Startup delay: {:?}", config.startup_delay);
    println!("- Prebuffer: {} bytes", config.prebuffer_bytes);

    let played = Arc::new(AtomicUsize::new(0));
    let parts = NodeParts {
        sink: Box::new(CountingSink { bytes: played.clone() }),
        decoders: Arc::new(NoLossless),
        transport: Arc::new(ControlClient::new(config.request_timeout)),
    };

    let node = Node::bind(config, parts, Box::new(PrintingServer)).await?;
    println!("\nControl channel on {}", node.control_addr());
    let mut status = node.status();

    // No discovery source here, so the node elects itself
    let (discovery, discovery_rx) = mpsc::channel(8);
    let (audio, audio_rx) = mpsc::channel(64);
    let handle = tokio::spawn(node.run(discovery_rx, audio_rx));

    while status.borrow_and_update().role == Role::Unknown {
        if status.changed().await.is_err() {
            break;
        }
    }
    println!("Role: {:?}", status.borrow().role);

    let send = |event| {
        let audio = audio.clone();
        async move {
            audio
                .send(event)
                .await
                .map_err(|_| Error::invalid_state("node stopped"))
        }
    };

    send(AudioEvent::ClientConnected(StartPlaybackArgs::raw_pcm())).await?;
    for sequence in 0..64u16 {
        // 352 stereo 16-bit samples per frame
        let payload = vec![0u8; 352 * 4];
        send(AudioEvent::Audio(AudioFrame::new(&payload[..], sequence, u32::from(sequence) * 352))).await?;
        sleep(Duration::from_millis(8)).await;
    }
    send(AudioEvent::Teardown).await?;

    // Closing the audio channel stops the node once every event is handled
    drop(send);
    drop(audio);
    drop(discovery);
    handle
        .await
        .map_err(|e| Error::invalid_state(format!("node task failed: {}", e)))??;

    println!("\nPlayed {} bytes", played.load(Ordering::Relaxed));
    println!("Status: {:?}", *status.borrow());
    println!("\nDone");
    Ok(())
}
