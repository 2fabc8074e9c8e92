use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ghostradio::config::RadioConfig;
use ghostradio::controller::{ControlLoop, ControlSettings};
use ghostradio::panel::{GpioPanel, Panel, PanelControls, SimulatedPanel};
use ghostradio::player::{LogPlayer, MpvPlayer, Player};
use ghostradio::shutdown::Shutdown;
use ghostradio::state::StatusBoard;
use ghostradio::stations::{SharedStations, StationDirectory, StationManager};
use ghostradio::websocket::{websocket_thread, FeedContext};

#[derive(Parser)]
#[command(name = "ghostradio")]
#[command(about = "Vintage radio controller: power switch and dials drive an internet stream player", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Debug logging and a status line about once a second
    #[arg(short, long)]
    verbose: bool,

    /// Run without hardware: simulated panel, logged playback
    #[arg(long)]
    mock: bool,

    /// Let the simulated dials wander
    #[arg(long, requires = "mock")]
    drift: bool,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    write_config: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "ghostradio=debug" } else { "ghostradio=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting GhostRadio");

    let config = RadioConfig::load_or_default(&cli.config)
        .with_context(|| format!("reading configuration {}", cli.config.display()))?;
    if cli.write_config {
        config
            .save(&cli.config)
            .with_context(|| format!("writing configuration {}", cli.config.display()))?;
        tracing::info!("Configuration written to {}", cli.config.display());
    }

    let shared = SharedStations::new(StationDirectory::load_or_empty(&config.stations_path));
    let manager = Arc::new(StationManager::new(config.stations_path.clone(), shared.clone()));
    let status = StatusBoard::new();

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal().context("installing the stop signal handler")?;
    if let Some(secs) = cli.duration {
        shutdown.trigger_after(Duration::from_secs(secs));
    }

    let settings = ControlSettings::new(config.poll_interval(), config.static_file.clone(), cli.verbose);

    if cli.mock {
        let panel = SimulatedPanel::new(cli.drift);
        start_status_feed(&config, &status, &manager, Some(panel.controls()));
        run_radio(panel, LogPlayer::new(), shared, settings, status, &shutdown);
    } else {
        let panel = GpioPanel::new(&config).context("initializing the front panel GPIO")?;
        start_status_feed(&config, &status, &manager, None);
        let player = MpvPlayer::new(&config.player);
        run_radio(panel, player, shared, settings, status, &shutdown);
    }

    tracing::info!("GhostRadio stopped");
    Ok(())
}

fn start_status_feed(
    config: &RadioConfig,
    status: &StatusBoard,
    stations: &Arc<StationManager>,
    controls: Option<PanelControls>,
) {
    if !config.status.enabled {
        return;
    }

    let bind = config.status.bind.clone();
    let ctx = FeedContext {
        status: status.clone(),
        stations: Arc::clone(stations),
        controls,
    };
    thread::spawn(move || {
        if let Err(e) = websocket_thread(&bind, ctx) {
            tracing::error!("Status feed on {} stopped: {}", bind, e);
        }
    });
}

fn run_radio<P: Panel, A: Player>(
    panel: P,
    player: A,
    stations: SharedStations,
    settings: ControlSettings,
    status: StatusBoard,
    shutdown: &Shutdown,
) {
    let mut control = ControlLoop::new(panel, player, stations, settings, status);
    control.run(shutdown);
}
