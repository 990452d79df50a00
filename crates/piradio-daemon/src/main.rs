mod core;
mod debounce;
mod display;
mod input;
mod net;
mod session;
mod status;
mod watchdog;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use piradio_proto::config::Config;
use piradio_proto::platform;
use piradio_proto::state::{load_stations, PersistedState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::Radio;
use crate::display::screen::Screen;
use crate::display::DisplayQueue;
use crate::input::{Controls, InputPoller};
use crate::session::{SessionManager, SessionSettings};
use crate::watchdog::{Bluetoothctl, Watchdog};

/// Player sessions waiting for the status reader.
const HANDOFF_CAPACITY: usize = 4;

fn init_logging() -> anyhow::Result<std::path::PathBuf> {
    let log_path = platform::log_path();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,piradio=debug")),
        )
        .init();
    Ok(log_path)
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Cannot listen for Ctrl+C: {}", e);
            }
        }
        _ = terminate => {}
    }
    info!("Termination signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    let log_path = init_logging()?;
    info!("Starting piradio, log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", platform::config_path());

    let stations = load_stations(&config.paths.stations_file);
    let persisted = PersistedState::load(&config.paths.state_file);
    info!("{} stations, resuming at {}", stations.len(), persisted.station_idx + 1);

    let device = display::open_panel(&config.display).await;
    let queue = DisplayQueue::start(
        device,
        Duration::from_millis(config.display.scroll_interval_ms),
    )
    .context("starting display")?;
    let screen = Screen::new(queue.clone(), &config.display);

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let (handoff_tx, handoff_rx) = mpsc::channel(HANDOFF_CAPACITY);
    let session = SessionManager::new(
        stations,
        persisted,
        SessionSettings {
            player: config.player.clone(),
            state_file: config.paths.state_file.clone(),
            save_debounce: Duration::from_secs(config.persist.save_debounce_secs),
            address_label: net::address_label(),
        },
        screen.clone(),
        handoff_tx,
    );
    let backlight_off = config
        .backlight
        .auto_off
        .then(|| Duration::from_secs(config.backlight.off_after_secs));
    let radio = Arc::new(Radio::new(session.clone(), screen, backlight_off));
    radio.wake();

    let status_task = tokio::spawn(status::run(
        handoff_rx,
        radio.clone(),
        config.debug,
        shutdown.clone(),
    ));

    // Sinks must be known before the first session picks its route.
    let bluetooth = if config.bluetooth.enabled {
        let probe = Bluetoothctl::new(config.bluetooth.link_device.clone());
        let discovery = probe.discover().await;
        info!("{} paired audio sink(s)", discovery.sinks.len());
        if let Err(e) = session.set_link(discovery.connected).await {
            warn!("Seeding link state failed: {}", e);
        }
        Some((probe, discovery.sinks))
    } else {
        None
    };

    // Buttons work while offline; only the first station waits for the network.
    let mut tasks = Vec::new();
    let poller = InputPoller::from_config(&config.input, radio.clone());
    tasks.push(tokio::spawn(poller.run(shutdown.clone())));

    let first_url = session
        .stations()
        .first()
        .map(|s| s.url.clone())
        .unwrap_or_default();
    let online = net::wait_until_reachable(
        &first_url,
        Duration::from_millis(config.probe.retry_ms),
        Duration::from_secs(config.probe.timeout_secs),
        &shutdown,
    )
    .await;

    if online {
        if let Err(e) = session.switch_to(persisted.station_idx).await {
            error!("Initial station failed: {}", e);
        }
        if let Some((probe, sinks)) = bluetooth {
            let watchdog = Watchdog::new(
                probe,
                session.clone(),
                sinks,
                Duration::from_secs(config.bluetooth.poll_interval_secs),
            );
            tasks.push(tokio::spawn(watchdog.run(shutdown.clone())));
        }
    }

    shutdown.cancelled().await;
    info!("Shutting down");
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Task ended abnormally: {}", e);
        }
    }
    radio.shutdown();
    session.shutdown().await;
    if let Err(e) = status_task.await {
        warn!("Status reader ended abnormally: {}", e);
    }
    queue.close().await;
    info!("Bye");
    Ok(())
}
