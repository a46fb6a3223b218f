//! SCRC Client - keyboard-driven racing client for the SCR race server.
//!
//! Connects over UDP, identifies with the configured rangefinder layout and
//! forwards operator input to the car every tick:
//! - Arrow keys steer and work the pedals
//! - `v` / `b` shift up / down
//! - Space returns to neutral, `q` or Ctrl-C quits
//!
//! Every tick is appended to a CSV telemetry log.

use anyhow::{Context, Result};
use clap::Parser;
use scrc_core::{CsvTelemetry, ManualDriver, Session, SessionConfig, SessionMachine, SharedInput, Stage};
use scrc_env::{TransportConfig, UdpTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[cfg(feature = "keyboard")]
mod keyboard;

/// SCRC racing client
#[derive(Parser, Debug)]
#[command(name = "scrc-client")]
#[command(about = "Drive a car on the SCR race server from the keyboard", long_about = None)]
struct Args {
    /// Race server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Race server port
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// Bot id
    #[arg(long, default_value = "SCR")]
    id: String,

    /// Maximum number of learning episodes (0 = until shutdown)
    #[arg(long = "max-episodes", default_value = "1")]
    max_episodes: u32,

    /// Maximum number of steps per episode (0 = unbounded)
    #[arg(long = "max-steps", default_value = "0")]
    max_steps: u32,

    /// Track name
    #[arg(long)]
    track: Option<String>,

    /// Stage (0 - Warm-Up, 1 - Qualifying, 2 - Race, 3 - Unknown)
    #[arg(long, default_value = "3")]
    stage: i32,

    /// Give up after this many unanswered identification requests
    #[arg(long = "identify-attempts")]
    identify_attempts: Option<u32>,

    /// Receive window in milliseconds
    #[arg(long = "timeout-ms", default_value = "1000")]
    timeout_ms: u64,

    /// Telemetry CSV file (rows are appended)
    #[arg(long, default_value = "telemetry_log.csv")]
    telemetry: PathBuf,

    /// Car model written to the telemetry log
    #[arg(long = "car-model", default_value = "kc-coda")]
    car_model: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.id.as_str())
            .with_stage(Stage::from_code(self.stage))
            .with_max_steps(self.max_steps)
            .with_max_episodes(self.max_episodes);
        if let Some(track) = &self.track {
            config = config.with_track(track.as_str());
        }
        if let Some(attempts) = self.identify_attempts {
            config = config.with_identify_cap(attempts);
        }
        config
    }

    fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.host.as_str(), self.port)
            .with_recv_timeout(Duration::from_millis(self.timeout_ms))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_max_level(level);
    // Raw mode does not translate newlines
    #[cfg(feature = "keyboard")]
    let subscriber = builder.with_writer(keyboard::raw_mode_stderr).finish();
    #[cfg(not(feature = "keyboard"))]
    let subscriber = builder.with_writer(std::io::stderr).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let session_config = args.session_config();
    let transport_config = args.transport_config();

    info!("Connecting to server host ip: {} @ port: {}", transport_config.host, transport_config.port);
    info!("Bot ID: {}", session_config.bot_id);
    info!("Maximum episodes: {}", session_config.max_episodes);
    info!("Maximum steps: {}", session_config.max_steps);
    info!("Track: {}", session_config.track.as_deref().unwrap_or("None"));
    info!("Stage: {}", session_config.stage);
    info!("*********************************************");

    let transport = UdpTransport::connect(transport_config.clone())
        .await
        .with_context(|| format!("could not reach {}", transport_config.endpoint()))?;

    let telemetry = CsvTelemetry::append(&args.telemetry, args.car_model.as_str())
        .with_context(|| format!("could not open telemetry log {}", args.telemetry.display()))?;
    info!("Logging telemetry to {}", args.telemetry.display());

    let input = SharedInput::new();
    let machine = SessionMachine::new(session_config, ManualDriver::new(input.clone()))
        .with_observer(telemetry);
    let mut session = Session::new(transport, machine);

    let quit = Arc::new(Notify::new());

    #[cfg(feature = "keyboard")]
    let _keyboard = keyboard::Keyboard::spawn(input, quit.clone())
        .context("could not read the keyboard")?;

    #[cfg(not(feature = "keyboard"))]
    {
        drop(input);
        warn!("Built without the 'keyboard' feature, the car will idle");
    }

    tokio::select! {
        result = session.run() => {
            let summary = result?;
            info!(
                "Race over: {} episode(s), {} control message(s), {} timeout(s)",
                summary.state.episode, summary.stats.control_sends, summary.stats.timeouts
            );
        }
        _ = quit.notified() => {
            warn!("Operator quit, leaving the race");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, leaving the race");
        }
    }

    Ok(())
}
