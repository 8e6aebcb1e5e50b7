//! Intercom client
//!
//! Connects to the relay, shows the composited screen and broadcasts camera
//! and microphone while broadcasting is toggled on.
//!
//! Usage: `intercom [server_addr] [device_id] [background_image]`

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_intercom::{
    audio::{list_devices, AudioBackend, AudioPlayback, CpalBackend, NullAudioBackend, StreamParams},
    config::AppConfig,
    error::Error,
    constants::{CHUNK_SECONDS, SCREEN_HEIGHT, SCREEN_WIDTH},
    network::connect,
    session::{Controller, Dispatcher, Publisher, Session},
    video::{load_background, Compositor, Layout, SystemVideoDevice, TerminalDisplay},
};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN Intercom");

    let mut config = AppConfig::load()?;
    config.apply_args(std::env::args().skip(1));
    config.validate()?;

    let audio: Arc<dyn AudioBackend> = if config.audio.enabled {
        print_audio_devices();
        Arc::new(CpalBackend {
            input_device: config.audio.input_device.clone(),
            output_device: config.audio.output_device.clone(),
        })
    } else {
        tracing::info!("Audio disabled by configuration");
        Arc::new(NullAudioBackend)
    };
    let params = StreamParams {
        sample_rate: config.audio.sample_rate,
        chunk_samples: (config.audio.sample_rate as f64 * CHUNK_SECONDS) as usize,
        ..StreamParams::default()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("intercom-worker")
        .build()
        .context("Failed to start async runtime")?;

    let cancel = CancellationToken::new();
    let session = Session::new(cancel.clone());

    let (receiver, outbound, writer_handle) = runtime
        .block_on(connect(&config.network.server_addr, cancel.clone()))
        .with_context(|| format!("Cannot reach relay at {}", config.network.server_addr))?;

    let playback = AudioPlayback::new(audio.clone(), params, cancel.clone());
    let dispatcher = Dispatcher::new(receiver, session.clone(), playback);
    let dispatcher_handle = runtime.spawn(dispatcher.run());

    {
        let cancel = cancel.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                        return;
                    }
                    tracing::info!("Interrupted, shutting down");
                    cancel.cancel();
                }
            }
        });
    }

    let background = load_background(
        config.video.background.as_deref(),
        SCREEN_WIDTH,
        SCREEN_HEIGHT,
    );
    let publisher = Publisher::new(
        session.clone(),
        outbound,
        runtime.handle().clone(),
        Arc::new(SystemVideoDevice),
        config.video.device_id.clone(),
        audio,
        params,
    );
    let display = TerminalDisplay::new(config.video.snapshot_path.clone())?;
    let controller = Controller::new(
        session,
        display,
        Compositor::new(background, Layout::default()),
        publisher,
    );

    // The controller owns the main thread until quit or a fatal stream error
    let outcome = controller.run().map_err(Error::from);

    runtime.block_on(async {
        let _ = dispatcher_handle.await;
        let _ = writer_handle.await;
    });
    runtime.shutdown_timeout(std::time::Duration::from_millis(500));

    match outcome {
        Err(e) if e.is_fatal() => return Err(anyhow::Error::new(e).context("Session ended")),
        Err(e) => tracing::warn!("Session ended: {}", e),
        Ok(()) => {}
    }
    tracing::info!("Goodbye");
    Ok(())
}

fn print_audio_devices() {
    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}", device.name, device_type, default_marker);
        println!("    ID: {}", device.id);
    }
    println!();
}
