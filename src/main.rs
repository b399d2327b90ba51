use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use hub_device::{
    Alert, AlertLevel, ClientConfig, HubClient, SensorData, SensorReading, VideoStreamClient,
};
use hub_shared::now_ms;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hub-device")]
#[command(about = "Connect a field device to the hub")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hub-device.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Announce this device to the hub
    Register,

    /// Send one telemetry batch
    Telemetry {
        /// Reading as type=value or type=value:unit, repeatable
        #[arg(short, long = "reading", value_parser = parse_reading)]
        readings: Vec<SensorReading>,
    },

    /// Raise an alert
    Alert {
        #[arg(long)]
        kind: String,

        /// low, medium, high or critical
        #[arg(long, default_value = "medium")]
        level: AlertLevel,

        #[arg(long)]
        message: String,
    },

    /// Print hub alerts and commands as they arrive
    Listen {
        /// How long to stay connected
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },

    /// Video stream registry
    #[command(subcommand)]
    Video(VideoCommands),
}

#[derive(Subcommand)]
enum VideoCommands {
    /// Register a stream for this device
    Register {
        #[arg(long)]
        url: String,

        #[arg(long = "type", default_value = "rtsp")]
        stream_type: String,
    },

    /// List registered streams
    List,

    /// Resolve the stream URL of a device
    Url {
        /// Defaults to this device
        device_id: Option<String>,
    },
}

/// Parse `type=value[:unit]`
fn parse_reading(s: &str) -> Result<SensorReading, String> {
    let (sensor_type, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected type=value[:unit], got '{s}'"))?;
    if sensor_type.is_empty() {
        return Err(format!("missing sensor type in '{s}'"));
    }
    let (value, unit) = rest.split_once(':').unwrap_or((rest, ""));
    let value: f64 = value
        .parse()
        .map_err(|_| format!("invalid value '{value}' for {sensor_type}"))?;
    Ok(SensorReading::new(sensor_type, value, unit, now_ms()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::load(&cli.config)?;
    info!(
        device_id = %config.device.device_id,
        transport = %config.transport.kind(),
        "Loaded configuration from {}",
        cli.config.display()
    );

    match cli.command {
        Commands::Video(command) => run_video(&config, command).await,
        command => run_session(config, command).await,
    }
}

async fn run_session(config: ClientConfig, command: Commands) -> anyhow::Result<()> {
    let timeouts = config.link_timeouts();
    let client = HubClient::new(config.device, &config.transport, timeouts);

    client.set_alert_callback(|alert| {
        info!(id = %alert.id, level = %alert.level, "Hub alert [{}]: {}", alert.kind, alert.message);
    });
    client.set_command_callback(|command| {
        info!(id = %command.id, "Hub command {}: {}", command.name, command.payload);
    });

    client.connect().await.context("connecting to hub")?;
    let result = run_command(&client, command).await;
    client.disconnect().await;
    result
}

async fn run_command(client: &HubClient, command: Commands) -> anyhow::Result<()> {
    client.register_device().await.context("registering device")?;

    match command {
        Commands::Register => info!("Device registered"),
        Commands::Telemetry { readings } => {
            let device_id = client.device().device_id.clone();
            let count = readings.len();
            let data = readings
                .into_iter()
                .fold(SensorData::new(device_id, now_ms()), SensorData::with_reading);
            client.send_telemetry(&data).await.context("sending telemetry")?;
            info!("Sent telemetry with {} readings", count);
        }
        Commands::Alert {
            kind,
            level,
            message,
        } => {
            let id = format!("{}-{}", client.device().device_id, now_ms());
            let alert = Alert::new(id, kind, level, message);
            client.send_alert(&alert).await.context("sending alert")?;
            info!(id = %alert.id, "Alert sent");
        }
        Commands::Listen { seconds } => {
            info!("Listening for {}s", seconds);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
            if !client.is_connected().await {
                let reason = client.last_failure().await;
                warn!(reason = ?reason, "Link dropped while listening");
            }
        }
        Commands::Video(_) => bail!("video commands do not open a hub session"),
    }
    Ok(())
}

async fn run_video(config: &ClientConfig, command: VideoCommands) -> anyhow::Result<()> {
    let Some(video) = &config.video else {
        bail!("no [video] section in configuration");
    };
    let api_key = video
        .api_key
        .clone()
        .unwrap_or_else(|| config.device.api_key.clone());
    let client = VideoStreamClient::new(&video.base_url, Some(api_key))?;
    let device_id = &config.device.device_id;

    match command {
        VideoCommands::Register { url, stream_type } => {
            let stream_id = client.register_stream(device_id, &url, &stream_type).await?;
            info!(stream_id = %stream_id, "Stream registered");
        }
        VideoCommands::List => {
            for stream in client.list_streams().await? {
                println!("{}\t{}\t{}", stream.device_id, stream.stream_type, stream.stream_url);
            }
        }
        VideoCommands::Url { device_id: target } => {
            let target = target.as_deref().unwrap_or(device_id);
            println!("{}", client.get_stream_url(target).await?);
        }
    }
    Ok(())
}
