//! Connectivity watchdog for the wireless audio sink.
//!
//! The link is polled on a fixed interval. Only edges matter: a change from
//! disconnected to connected (or back) restarts playback once on the
//! matching route, repeated observations of the same state do nothing.
//! While disconnected, known sinks are asked to connect one after another
//! until one accepts.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::session::SessionManager;

const BLUETOOTHCTL: &str = "bluetoothctl";
const AUDIO_SINK_MARKER: &str = "Audio Sink";
const CONNECTED_MARKER: &str = "Connected: yes";

pub trait LinkProbe: Send + Sync {
    /// True while a sink is linked.
    fn is_linked(&self) -> impl Future<Output = bool> + Send;
    /// Ask `sink` to connect. True on success.
    fn connect(&self, sink: &str) -> impl Future<Output = bool> + Send;
}

pub trait LinkObserver: Send + Sync {
    fn link_changed(&self, connected: bool) -> impl Future<Output = ()> + Send;
}

impl LinkObserver for SessionManager {
    async fn link_changed(&self, connected: bool) {
        if let Err(e) = self.set_link(connected).await {
            error!("watchdog: restart after link change failed: {}", e);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unknown,
    Disconnected,
    Connected,
}

/// Turns level observations into edges. The first observation only sets
/// the baseline.
#[derive(Debug)]
pub struct EdgeDetector {
    last: LinkState,
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self {
            last: LinkState::Unknown,
        }
    }
}

impl EdgeDetector {
    /// Returns the new state when `linked` differs from the previous
    /// observation.
    pub fn observe(&mut self, linked: bool) -> Option<bool> {
        let next = if linked {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        };
        let previous = std::mem::replace(&mut self.last, next);
        match previous {
            LinkState::Unknown => None,
            p if p == next => None,
            _ => Some(linked),
        }
    }
}

pub struct Watchdog<P, O> {
    probe: P,
    observer: O,
    sinks: Vec<String>,
    interval: Duration,
    edges: EdgeDetector,
}

impl<P: LinkProbe, O: LinkObserver> Watchdog<P, O> {
    pub fn new(probe: P, observer: O, sinks: Vec<String>, interval: Duration) -> Self {
        Self {
            probe,
            observer,
            sinks,
            interval,
            edges: EdgeDetector::default(),
        }
    }

    pub async fn poll_once(&mut self) {
        let linked = self.probe.is_linked().await;
        if let Some(connected) = self.edges.observe(linked) {
            info!(
                "watchdog: sink {}, restarting playback",
                if connected { "connected" } else { "disconnected" }
            );
            self.observer.link_changed(connected).await;
        }
        if linked {
            return;
        }
        for sink in &self.sinks {
            if self.probe.connect(sink).await {
                info!("watchdog: connected to {}", sink);
                break;
            }
        }
    }

    /// Poll until cancelled. Cancellation also cuts a running poll short;
    /// a session dropped halfway through a restart kills its player.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.poll_once() => {}
            }
        }
        debug!("watchdog: stopped");
    }
}

/// Sinks known to the Bluetooth daemon, and whether one is connected.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub sinks: Vec<String>,
    pub connected: bool,
}

/// Addresses from `bluetoothctl devices` output (`Device <addr> <name>`).
pub fn parse_device_addresses(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split(' ');
            parts.next()?;
            parts.next().filter(|a| !a.is_empty()).map(str::to_string)
        })
        .collect()
}

/// `(is_audio_sink, is_connected)` from `bluetoothctl info <addr>` output.
pub fn parse_device_info(info: &str) -> (bool, bool) {
    (
        info.contains(AUDIO_SINK_MARKER),
        info.contains(CONNECTED_MARKER),
    )
}

/// Link probe backed by `bluetoothctl` and the input node a linked sink
/// exposes.
pub struct Bluetoothctl {
    link_device: PathBuf,
}

impl Bluetoothctl {
    pub fn new(link_device: PathBuf) -> Self {
        Self { link_device }
    }

    async fn query(args: &[&str]) -> std::io::Result<String> {
        let output = Command::new(BLUETOOTHCTL)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Enumerate paired audio sinks in the order the daemon lists them.
    pub async fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();
        let devices = match Self::query(&["devices"]).await {
            Ok(out) => out,
            Err(e) => {
                error!("watchdog: {} devices failed: {}", BLUETOOTHCTL, e);
                return discovery;
            }
        };
        for address in parse_device_addresses(&devices) {
            let info = match Self::query(&["info", &address]).await {
                Ok(info) => info,
                Err(e) => {
                    warn!("watchdog: info for {} failed: {}", address, e);
                    continue;
                }
            };
            let (is_sink, connected) = parse_device_info(&info);
            if !is_sink {
                continue;
            }
            info!("watchdog: paired sink {}", address);
            if connected {
                info!("watchdog: connected to {}", address);
                discovery.connected = true;
            }
            discovery.sinks.push(address);
        }
        discovery
    }
}

impl LinkProbe for Bluetoothctl {
    async fn is_linked(&self) -> bool {
        tokio::fs::metadata(&self.link_device).await.is_ok()
    }

    async fn connect(&self, sink: &str) -> bool {
        let status = Command::new(BLUETOOTHCTL)
            .arg("connect")
            .arg(sink)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("watchdog: connect {} failed: {}", sink, e);
                false
            }
        }
    }
}
