//! Button poller.
//!
//! Buttons are sampled on a fixed interval. All of them are active-low, and
//! the first active one in priority order wins the tick. Every press goes
//! through the button debouncer, so a held button yields one action per
//! debounce window instead of one per sample.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use piradio_proto::config::InputConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    NextStation,
    PrevStation,
    VolumeUp,
    VolumeDown,
    ToggleMute,
}

impl Action {
    fn is_volume(self) -> bool {
        matches!(self, Action::VolumeUp | Action::VolumeDown)
    }
}

/// One monitored input.
pub trait InputLine: Send {
    /// True while the button is held.
    fn is_active(&mut self) -> std::io::Result<bool>;
}

/// GPIO exported through sysfs. Reads `"0"` while the button pulls the line
/// low.
pub struct SysfsLine {
    value: PathBuf,
}

impl SysfsLine {
    pub fn new(gpio_root: &std::path::Path, pin: u32) -> Self {
        Self {
            value: gpio_root.join(format!("gpio{}", pin)).join("value"),
        }
    }
}

impl InputLine for SysfsLine {
    fn is_active(&mut self) -> std::io::Result<bool> {
        let level = std::fs::read_to_string(&self.value)?;
        Ok(level.trim() == "0")
    }
}

/// What the poller drives.
pub trait Controls: Send + Sync + 'static {
    fn muted(&self) -> bool;
    /// Backlight on, and re-arm its switch-off.
    fn wake(&self);
    fn perform(&self, action: Action) -> impl Future<Output = ()> + Send;
}

struct Button {
    action: Action,
    line: Box<dyn InputLine>,
    failing: bool,
}

pub struct InputPoller<C> {
    buttons: Vec<Button>,
    interval: Duration,
    debounce: Debouncer,
    controls: Arc<C>,
}

impl<C: Controls> InputPoller<C> {
    pub fn new(controls: Arc<C>, interval: Duration, debounce: Duration) -> Self {
        Self {
            buttons: Vec::new(),
            interval,
            debounce: Debouncer::new("buttons", debounce),
            controls,
        }
    }

    /// Poller for the five sysfs buttons in priority order.
    pub fn from_config(config: &InputConfig, controls: Arc<C>) -> Self {
        let pins = &config.pins;
        let root = &config.gpio_root;
        Self::new(
            controls,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.debounce_ms),
        )
        .with_button(Action::NextStation, SysfsLine::new(root, pins.next))
        .with_button(Action::PrevStation, SysfsLine::new(root, pins.prev))
        .with_button(Action::VolumeUp, SysfsLine::new(root, pins.volume_up))
        .with_button(Action::VolumeDown, SysfsLine::new(root, pins.volume_down))
        .with_button(Action::ToggleMute, SysfsLine::new(root, pins.mute))
    }

    pub fn with_button(mut self, action: Action, line: impl InputLine + 'static) -> Self {
        self.buttons.push(Button {
            action,
            line: Box::new(line),
            failing: false,
        });
        self
    }

    /// First active button, if any. A line that cannot be read is reported
    /// once and treated as released until it recovers.
    fn sample(&mut self) -> Option<Action> {
        for button in &mut self.buttons {
            match button.line.is_active() {
                Ok(active) => {
                    if button.failing {
                        info!("input: {:?} line readable again", button.action);
                        button.failing = false;
                    }
                    if active {
                        return Some(button.action);
                    }
                }
                Err(e) => {
                    if !button.failing {
                        warn!("input: cannot read {:?} line: {}", button.action, e);
                        button.failing = true;
                    }
                }
            }
        }
        None
    }

    fn dispatch(&self, action: Action) {
        if !(action.is_volume() && self.controls.muted()) {
            let controls = Arc::clone(&self.controls);
            self.debounce.arm(async move {
                debug!("input: {:?}", action);
                controls.perform(action).await;
            });
        }
        self.controls.wake();
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("input: polling {} buttons", self.buttons.len());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Some(action) = self.sample() {
                        self.dispatch(action);
                    }
                }
            }
        }
        self.debounce.cancel();
        debug!("input: poller stopped");
    }
}
