//! The radio controller: button actions in, rendered status out.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use piradio_proto::protocol::{StatusEvent, Transport};
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::display::screen::Screen;
use crate::input::{Action, Controls};
use crate::session::{SessionError, SessionManager};
use crate::status::StatusSink;

/// What the footer currently shows.
#[derive(Debug, Default)]
struct StatusView {
    station_name: String,
    bitrate: String,
    volume_label: String,
    muted: bool,
}

pub struct Radio {
    session: SessionManager,
    screen: Screen,
    backlight_off: Option<Debouncer>,
    view: Mutex<StatusView>,
}

impl Radio {
    /// `backlight_off` switches the backlight off after that much inactivity.
    pub fn new(session: SessionManager, screen: Screen, backlight_off: Option<Duration>) -> Self {
        Self {
            session,
            screen,
            backlight_off: backlight_off.map(|after| Debouncer::new("backlight", after)),
            view: Mutex::new(StatusView::default()),
        }
    }

    fn view(&self) -> MutexGuard<'_, StatusView> {
        match self.view.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn render_footer(&self, view: &StatusView) {
        self.screen
            .footer(&view.bitrate, &view.volume_label, view.muted);
    }

    async fn step_volume(&self, command: Transport) -> Result<(), SessionError> {
        self.session.send_transport(command).await?;
        self.session.schedule_save();
        Ok(())
    }

    pub fn shutdown(&self) {
        if let Some(off) = &self.backlight_off {
            off.cancel();
        }
    }
}

/// `"55.0"` or `"55"` as a 0..=100 level.
fn parse_level(level: &str) -> Option<u8> {
    let value: f32 = level.trim().parse().ok()?;
    Some(value.round().clamp(0.0, 100.0) as u8)
}

impl Controls for Radio {
    fn muted(&self) -> bool {
        self.session.levels().muted
    }

    fn wake(&self) {
        let queue = self.screen.queue();
        queue.set_backlight(true);
        if let Some(off) = &self.backlight_off {
            let queue = queue.clone();
            off.arm(async move {
                debug!("radio: idle, backlight off");
                queue.set_backlight(false);
            });
        }
    }

    async fn perform(&self, action: Action) {
        let result = match action {
            Action::NextStation => self.session.switch_by(1).await,
            Action::PrevStation => self.session.switch_by(-1).await,
            Action::VolumeUp => self.step_volume(Transport::VolumeUp).await,
            Action::VolumeDown => self.step_volume(Transport::VolumeDown).await,
            Action::ToggleMute => self.session.send_transport(Transport::ToggleMute).await,
        };
        if let Err(e) = result {
            warn!("radio: {:?} failed: {}", action, e);
        }
    }
}

impl StatusSink for Radio {
    fn session_started(&self, station: usize, volume: u8) {
        debug!("radio: reading status of station {}", station);
        let mut view = self.view();
        view.volume_label = self.screen.volume_label(&volume.to_string());
        view.muted = false;
    }

    fn apply(&self, event: StatusEvent) {
        let mut view = self.view();
        match event {
            StatusEvent::StationName(name) => {
                info!("Station: {}", name);
                self.screen.station_name(&name);
                view.station_name = name;
            }
            StatusEvent::Title(title) => {
                if title.trim() != "-" && title != view.station_name {
                    info!("Title:   {}", title);
                }
                self.screen.title(&title);
            }
            StatusEvent::Bitrate(bitrate) => {
                debug!("radio: bitrate {}", bitrate);
                view.bitrate = bitrate;
                self.render_footer(&view);
            }
            StatusEvent::Volume(level) => {
                debug!("radio: volume {}", level);
                view.volume_label = self.screen.volume_label(&level);
                match parse_level(&level) {
                    Some(value) => self.session.record_volume(value),
                    None => debug!("radio: unparsable volume {:?}", level),
                }
                self.render_footer(&view);
            }
            StatusEvent::Mute(muted) => {
                view.muted = muted;
                self.session.set_muted(muted);
                self.render_footer(&view);
            }
            StatusEvent::Stopped => {
                self.screen.stopped();
                let session = self.session.clone();
                tokio::spawn(async move { session.reap_exited().await });
            }
        }
    }
}
