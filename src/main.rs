//! # obs-overlay
//!
//! Mouse relay server and OBS control-plane client for a browser-source
//! overlay.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use overlay_core::ClientEvent;
use overlay_obs::{ClientConfig, ObsClient, RelayFeed, WsChannel};
use overlay_relay::RelayConfig;
use overlay_settings::OverlaySettings;
use overlay_telemetry::TelemetryConfig;
use tokio::sync::broadcast::error::RecvError;

/// OBS overlay relay and control client.
#[derive(Parser, Debug)]
#[command(name = "obs-overlay", about = "OBS overlay mouse relay and control client")]
struct Cli {
    /// Settings file (defaults to `~/.obs-overlay/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings; RUST_LOG still wins).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// obs-websocket address (overrides settings).
    #[arg(long, global = true)]
    address: Option<String>,

    /// obs-websocket password (overrides settings).
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the mouse relay server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Connect to OBS, follow the relay, and log every client event.
    Watch {
        /// Relay URL to consume (defaults to the local relay from settings).
        #[arg(long)]
        relay_url: Option<String>,
        /// Do not attach to the mouse relay.
        #[arg(long)]
        no_relay: bool,
    },
    /// List scenes and the current program scene.
    Scenes,
    /// Switch the current program scene.
    Switch {
        /// Scene name.
        scene: String,
    },
}

impl Cli {
    fn load_settings(&self) -> Result<OverlaySettings> {
        let path = self.settings.clone().unwrap_or_else(overlay_settings::settings_path);
        let mut settings = overlay_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(address) = &self.address {
            settings.obs.address.clone_from(address);
        }
        if let Some(password) = &self.password {
            settings.obs.password.clone_from(password);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    overlay_telemetry::init_telemetry(&TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ));

    match cli.command {
        Command::Serve { host, port } => serve(&settings, host, port).await,
        Command::Watch { relay_url, no_relay } => {
            let relay_url = (!no_relay).then(|| relay_url.unwrap_or_else(|| local_relay_url(&settings)));
            watch(&settings, relay_url).await
        }
        Command::Scenes => scenes(&settings).await,
        Command::Switch { scene } => switch(&settings, &scene).await,
    }
}

async fn serve(settings: &OverlaySettings, host: Option<String>, port: Option<u16>) -> Result<()> {
    let relay = &settings.relay;
    let config = RelayConfig {
        host: host.unwrap_or_else(|| relay.host.clone()),
        port: port.unwrap_or(relay.port),
        path: relay.path.clone(),
        max_send_queue: relay.max_send_queue,
        heartbeat_interval: std::time::Duration::from_millis(relay.heartbeat_interval_ms),
        client_timeout: std::time::Duration::from_millis(relay.client_timeout_ms),
    };
    let handle = overlay_relay::start(config).await.context("Failed to start relay")?;
    tracing::info!(port = handle.port(), "Relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown();
    Ok(())
}

async fn watch(settings: &OverlaySettings, relay_url: Option<String>) -> Result<()> {
    let client = connect_client(settings).await?;

    let logger = tokio::spawn(log_events(client.clone()));
    let feed = relay_url.map(|url| {
        tracing::info!(url = %url, "Following mouse relay");
        RelayFeed::new(url, settings.mouse_capture).spawn(client.clone())
    });
    fetch_status(&client).await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    if let Some(feed) = feed {
        feed.abort();
    }
    client.disconnect().await;
    logger.abort();
    Ok(())
}

async fn scenes(settings: &OverlaySettings) -> Result<()> {
    let client = connect_client(settings).await?;
    let scenes = client.get_scene_list().await.context("Failed to list scenes")?;
    let current = client.get_current_scene().await.context("Failed to get current scene")?;
    for scene in scenes {
        let marker = if scene == current { "*" } else { " " };
        println!("{marker} {scene}");
    }
    client.disconnect().await;
    Ok(())
}

async fn switch(settings: &OverlaySettings, scene: &str) -> Result<()> {
    let client = connect_client(settings).await?;
    client
        .set_current_scene(scene)
        .await
        .with_context(|| format!("Failed to switch to scene {scene:?}"))?;
    tracing::info!(scene, "Switched scene");
    client.disconnect().await;
    Ok(())
}

async fn connect_client(settings: &OverlaySettings) -> Result<ObsClient> {
    let obs = &settings.obs;
    let channel = Arc::new(WsChannel::new(obs.request_timeout()));
    let client = ObsClient::new(
        channel,
        ClientConfig {
            reconnect_delay: obs.reconnect_delay(),
            max_reconnect_attempts: obs.max_reconnect_attempts,
            hold_threshold: obs.hold_threshold(),
            poll_interval: obs.poll_interval(),
        },
    );
    client
        .connect(&obs.address, obs.credential())
        .await
        .with_context(|| format!("Failed to connect to OBS at {}", obs.address))?;
    Ok(client)
}

fn local_relay_url(settings: &OverlaySettings) -> String {
    format!("ws://127.0.0.1:{}{}", settings.relay.port, settings.relay.path)
}

/// Log every client event; refresh status after each reconnect.
async fn log_events(client: ObsClient) {
    let mut rx = client.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                match &event {
                    ClientEvent::MouseMove { .. } | ClientEvent::MouseHold { .. } => {
                        tracing::trace!(event = %json, "Client event");
                    }
                    _ => tracing::info!(event = %json, "Client event"),
                }
                if event == ClientEvent::Connected {
                    let client = client.clone();
                    tokio::spawn(async move { fetch_status(&client).await });
                }
            }
            Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn fetch_status(client: &ObsClient) {
    match client.get_current_scene().await {
        Ok(scene) => tracing::info!(scene = %scene, "Current scene"),
        Err(e) => tracing::warn!(error = %e, "Failed to get current scene"),
    }
    match client.get_stream_status().await {
        Ok(status) => tracing::info!(active = status.active, timecode = %status.timecode, "Stream status"),
        Err(e) => tracing::warn!(error = %e, "Failed to get stream status"),
    }
    match client.get_record_status().await {
        Ok(status) => tracing::info!(active = status.active, timecode = %status.timecode, "Record status"),
        Err(e) => tracing::warn!(error = %e, "Failed to get record status"),
    }
}
