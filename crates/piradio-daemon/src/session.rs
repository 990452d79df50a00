//! Playback session manager.
//!
//! Exactly one player process runs at a time. Switching stations always
//! tears the running player down completely (quit byte, both pipes closed,
//! exit awaited) before the next one is spawned.
//!
//! Two locks guard the session:
//!
//! - the station lock serialises station index, the live session and the
//!   wireless link flag. Every switch runs entirely under it, so switches
//!   apply in the order callers acquire it.
//! - the transport lock guards the player's stdin. Volume and mute bytes
//!   only ever take this one. A switch takes it after the station lock,
//!   never the other way round.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use piradio_proto::config::PlayerConfig;
use piradio_proto::platform;
use piradio_proto::protocol::Transport;
use piradio_proto::state::{PersistedState, Station};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::display::screen::Screen;
use crate::status::SessionOutput;

const TUNING_TIME_FORMAT: &str = "%H:%M:%S  %d.%m.%y";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("player binary {0:?} not found")]
    BinaryMissing(String),
    #[error("failed to start player: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("player {0} is not piped")]
    MissingPipe(&'static str),
    #[error("no player session running")]
    NoSession,
    #[error("writing to player failed: {0}")]
    Transport(#[source] std::io::Error),
    #[error("station list is empty")]
    NoStations,
    #[error("session manager is shut down")]
    ShutDown,
}

/// Audio output path of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Analog,
    Wireless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levels {
    pub analog: u8,
    pub wireless: u8,
    pub route: Route,
    pub muted: bool,
}

impl Levels {
    pub fn level(&self, route: Route) -> u8 {
        match route {
            Route::Analog => self.analog,
            Route::Wireless => self.wireless,
        }
    }

    fn set_active(&mut self, level: u8) {
        match self.route {
            Route::Analog => self.analog = level,
            Route::Wireless => self.wireless = level,
        }
    }
}

pub struct SessionSettings {
    pub player: PlayerConfig,
    pub state_file: PathBuf,
    pub save_debounce: Duration,
    /// Footer of the tuning screen for the first station.
    pub address_label: String,
}

struct Session {
    station: usize,
    child: Child,
    output: CancellationToken,
}

#[derive(Default)]
struct StationState {
    index: Option<usize>,
    session: Option<Session>,
    link_connected: bool,
    closed: bool,
}

impl StationState {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::ShutDown);
        }
        Ok(())
    }
}

struct Inner {
    stations: Vec<Station>,
    settings: SessionSettings,
    screen: Screen,
    handoff: mpsc::Sender<SessionOutput>,
    station: Mutex<StationState>,
    transport: Mutex<Option<ChildStdin>>,
    levels: RwLock<Levels>,
    save: Debouncer,
}

/// Cloneable handle to the one live player session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        stations: Vec<Station>,
        persisted: PersistedState,
        settings: SessionSettings,
        screen: Screen,
        handoff: mpsc::Sender<SessionOutput>,
    ) -> Self {
        let levels = Levels {
            analog: persisted.volume_analog,
            wireless: persisted.volume_wireless,
            route: Route::Analog,
            muted: false,
        };
        let save = Debouncer::new("save", settings.save_debounce);
        Self {
            inner: Arc::new(Inner {
                stations,
                settings,
                screen,
                handoff,
                station: Mutex::new(StationState::default()),
                transport: Mutex::new(None),
                levels: RwLock::new(levels),
                save,
            }),
        }
    }

    pub fn stations(&self) -> &[Station] {
        &self.inner.stations
    }

    /// Volume and mute as last reported. Never waits on a switch.
    pub fn levels(&self) -> Levels {
        *self.inner.read_levels()
    }

    /// Tune to `index` (wrapping) and restart the player.
    pub async fn switch_to(&self, index: usize) -> Result<(), SessionError> {
        let count = self.inner.stations.len();
        if count == 0 {
            return Err(SessionError::NoStations);
        }
        let result = {
            let mut state = self.inner.station.lock().await;
            state.ensure_open()?;
            state.index = Some(index % count);
            self.inner.restart(&mut state).await
        };
        self.schedule_save();
        result
    }

    /// Move `delta` stations from the current one, wrapping at both ends.
    pub async fn switch_by(&self, delta: isize) -> Result<(), SessionError> {
        let count = self.inner.stations.len() as isize;
        if count == 0 {
            return Err(SessionError::NoStations);
        }
        let result = {
            let mut state = self.inner.station.lock().await;
            state.ensure_open()?;
            let next = match state.index {
                Some(current) => (current as isize + delta).rem_euclid(count),
                None if delta < 0 => count - 1,
                None => 0,
            };
            state.index = Some(next as usize);
            self.inner.restart(&mut state).await
        };
        self.schedule_save();
        result
    }

    /// Record the wireless link state. With a station selected the player
    /// is restarted on the matching route; otherwise only the flag changes.
    pub async fn set_link(&self, connected: bool) -> Result<(), SessionError> {
        let result = {
            let mut state = self.inner.station.lock().await;
            state.ensure_open()?;
            state.link_connected = connected;
            if state.index.is_none() {
                return Ok(());
            }
            self.inner.restart(&mut state).await
        };
        self.schedule_save();
        result
    }

    /// Write one control byte to the running player.
    pub async fn send_transport(&self, command: Transport) -> Result<(), SessionError> {
        let mut transport = self.inner.transport.lock().await;
        let stdin = transport.as_mut().ok_or(SessionError::NoSession)?;
        stdin
            .write_all(&[command.byte()])
            .await
            .map_err(SessionError::Transport)?;
        stdin.flush().await.map_err(SessionError::Transport)?;
        debug!("session: sent {:?}", command);
        Ok(())
    }

    /// Store the level the player reported for the active route. Levels
    /// have their own lock; the route only changes while no player runs.
    pub fn record_volume(&self, level: u8) {
        self.inner.write_levels().set_active(level);
        self.schedule_save();
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.write_levels().muted = muted;
    }

    /// Persist station and levels once things have been quiet for a while.
    pub fn schedule_save(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.save.arm(async move {
            inner.persist().await;
        });
    }

    /// Forget a player that exited on its own. A player still running is
    /// left for the next switch to tear down.
    pub async fn reap_exited(&self) {
        let mut state = self.inner.station.lock().await;
        let exited = match state.session.as_mut().map(|s| s.child.try_wait()) {
            Some(Ok(Some(status))) => {
                debug!("session: player exited by itself: {}", status);
                true
            }
            Some(Ok(None)) | None => false,
            Some(Err(e)) => {
                warn!("session: polling player failed: {}", e);
                false
            }
        };
        if exited {
            state.session = None;
            *self.inner.transport.lock().await = None;
        }
    }

    /// Quit the player and persist state immediately. Later switches fail
    /// with [`SessionError::ShutDown`].
    pub async fn shutdown(&self) {
        self.inner.save.cancel();
        {
            let mut state = self.inner.station.lock().await;
            state.closed = true;
            if let Some(session) = state.session.take() {
                self.inner.stop(session).await;
            }
        }
        self.inner.persist().await;
        info!("session: shut down");
    }
}

impl Inner {
    fn read_levels(&self) -> RwLockReadGuard<'_, Levels> {
        match self.levels.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_levels(&self) -> RwLockWriteGuard<'_, Levels> {
        match self.levels.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn tuning_footer(&self, index: usize) -> String {
        if index == 0 {
            self.settings.address_label.clone()
        } else {
            chrono::Local::now().format(TUNING_TIME_FORMAT).to_string()
        }
    }

    /// Replace the running session with one for `state.index`. The caller
    /// holds the station lock.
    async fn restart(&self, state: &mut StationState) -> Result<(), SessionError> {
        let Some(index) = state.index else {
            return Ok(());
        };
        let station = &self.stations[index];
        info!("session: tuning to {}", station.label());
        self.screen
            .tuning(&station.label(), &self.tuning_footer(index));

        if let Some(previous) = state.session.take() {
            self.stop(previous).await;
        }

        let route = if state.link_connected {
            Route::Wireless
        } else {
            Route::Analog
        };
        let volume = {
            let mut levels = self.write_levels();
            levels.route = route;
            levels.muted = false;
            levels.level(route)
        };
        debug!("session: using {:?} volume {}", route, volume);

        match self.spawn(index, volume).await {
            Ok(session) => {
                state.session = Some(session);
                Ok(())
            }
            Err(e) => {
                warn!("session: {} not started: {}", station.name, e);
                Err(e)
            }
        }
    }

    async fn spawn(&self, index: usize, volume: u8) -> Result<Session, SessionError> {
        let station = &self.stations[index];
        let player = &self.settings.player;
        let binary = platform::find_player_binary(&player.binary)
            .ok_or_else(|| SessionError::BinaryMissing(player.binary.clone()))?;

        let mut child = Command::new(&binary)
            .args(&player.args)
            .arg("-volume")
            .arg(volume.to_string())
            .arg(&station.url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(SessionError::Spawn)?;
        let stdin = child.stdin.take().ok_or(SessionError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SessionError::MissingPipe("stdout"))?;

        *self.transport.lock().await = Some(stdin);

        let output = CancellationToken::new();
        let handoff = SessionOutput {
            station: index,
            volume,
            reader: Box::new(stdout),
            cancel: output.clone(),
        };
        if self.handoff.send(handoff).await.is_err() {
            debug!("session: status reader gone, output not read");
        }

        info!(
            "session: player {:?} started for {}",
            child.id(),
            station.name
        );
        Ok(Session {
            station: index,
            child,
            output,
        })
    }

    async fn stop(&self, session: Session) {
        let Session {
            station,
            mut child,
            output,
        } = session;

        // Detach the reader first so the quit does not show up as a stop.
        output.cancel();
        if let Some(mut stdin) = self.transport.lock().await.take() {
            if let Err(e) = stdin.write_all(&[Transport::Quit.byte()]).await {
                debug!("session: quit byte not delivered: {}", e);
            }
            let _ = stdin.flush().await;
        }

        let timeout = Duration::from_secs(self.settings.player.quit_timeout_secs);
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => debug!("session: player for station {} exited: {}", station, status),
            Ok(Err(e)) => warn!("session: waiting for player failed: {}", e),
            Err(_) => {
                warn!("session: player ignored quit for {:?}, killing", timeout);
                if let Err(e) = child.kill().await {
                    warn!("session: kill failed: {}", e);
                }
            }
        }
    }

    async fn persist(&self) {
        let station_idx = self.station.lock().await.index.unwrap_or(0);
        let levels = *self.read_levels();
        let state = PersistedState {
            station_idx,
            volume_analog: levels.analog,
            volume_wireless: levels.wireless,
        };
        if let Err(e) = state.save(&self.settings.state_file) {
            warn!("session: could not persist state: {:#}", e);
        }
    }
}
