//! Display command queue.
//!
//! ```text
//!   poller ─┐
//!   ticker ─┼─► DisplayQueue ──(mpsc, FIFO)──► consumer thread ──► Device
//!   status ─┘
//! ```
//!
//! Every producer enqueues a `DisplayCommand` and returns immediately. A
//! single consumer thread owns the `Device` and applies commands strictly in
//! submission order, so writes from different activities never interleave on
//! the transport. A failed device call is logged and the queue keeps going.

pub mod panel;
pub mod screen;
mod ticker;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use piradio_proto::config::{DisplayConfig, DisplayKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use panel::{CharLcd, Device, Geometry, Oled};
use ticker::Ticker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCommand {
    Clear,
    Backlight(bool),
    ClearLine(usize),
    PrintLine { line: usize, text: String },
    Close,
}

struct Inner {
    tx: mpsc::UnboundedSender<DisplayCommand>,
    lines: Mutex<Vec<Option<Ticker>>>,
    geometry: Geometry,
    scroll_interval: Duration,
    runtime: tokio::runtime::Handle,
    shutdown: CancellationToken,
    consumer: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Inner {
    fn lock_lines(&self) -> MutexGuard<'_, Vec<Option<Ticker>>> {
        match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn submit(&self, cmd: DisplayCommand) -> bool {
        if self.tx.send(cmd).is_err() {
            debug!("display: consumer gone, dropping command");
            return false;
        }
        true
    }
}

/// Cloneable producer handle for the display.
#[derive(Clone)]
pub struct DisplayQueue {
    inner: Arc<Inner>,
}

impl DisplayQueue {
    /// Start the consumer thread for `device`. Must be called from within a
    /// tokio runtime; scroll tickers are spawned onto it.
    pub fn start(device: Box<dyn Device>, scroll_interval: Duration) -> std::io::Result<Self> {
        let geometry = device.geometry();
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = std::thread::Builder::new()
            .name("display".into())
            .spawn(move || run_consumer(device, rx))?;

        let inner = Inner {
            tx,
            lines: Mutex::new((0..geometry.rows).map(|_| None).collect()),
            geometry,
            scroll_interval,
            runtime: tokio::runtime::Handle::current(),
            shutdown: CancellationToken::new(),
            consumer: Mutex::new(Some(consumer)),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn chars_per_line(&self) -> usize {
        self.inner.geometry.columns
    }

    pub fn clear(&self) {
        self.inner.submit(DisplayCommand::Clear);
    }

    pub fn set_backlight(&self, on: bool) {
        if !self.inner.geometry.backlight {
            return;
        }
        self.inner.submit(DisplayCommand::Backlight(on));
    }

    #[allow(dead_code)]
    pub fn clear_line(&self, line: usize) {
        self.inner.submit(DisplayCommand::ClearLine(line));
    }

    /// Show `text` on `line`. With `scroll` set and text wider than the panel
    /// a ticker takes over the line; otherwise the text is written once.
    /// Either way any ticker already running on the line is stopped first.
    pub fn print_line(&self, line: usize, text: &str, scroll: bool) {
        if line >= self.inner.geometry.rows {
            debug!("display: ignoring print to line {}", line);
            return;
        }
        if self.inner.shutdown.is_cancelled() {
            return;
        }

        let mut lines = self.inner.lock_lines();
        if let Some(old) = lines[line].take() {
            old.cancel();
        }
        if scroll && text.chars().count() > self.inner.geometry.columns {
            lines[line] = Some(Ticker::spawn(&self.inner, line, text));
        } else {
            self.inner.submit(DisplayCommand::PrintLine {
                line,
                text: text.to_string(),
            });
        }
    }

    /// Stop all tickers, drain the queue and close the device. Commands
    /// submitted afterwards are dropped.
    pub async fn close(&self) {
        {
            let mut lines = self.inner.lock_lines();
            self.inner.shutdown.cancel();
            for slot in lines.iter_mut() {
                if let Some(t) = slot.take() {
                    t.cancel();
                }
            }
        }
        self.inner.submit(DisplayCommand::Close);

        let handle = match self.inner.consumer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            match tokio::task::spawn_blocking(move || handle.join()).await {
                Ok(Ok(())) => info!("display: closed"),
                Ok(Err(_)) => warn!("display: consumer thread panicked"),
                Err(e) => warn!("display: join failed: {}", e),
            }
        }
    }
}

fn run_consumer(mut device: Box<dyn Device>, mut rx: mpsc::UnboundedReceiver<DisplayCommand>) {
    debug!("display: consumer running");
    while let Some(cmd) = rx.blocking_recv() {
        let result = match &cmd {
            DisplayCommand::Clear => device.clear(),
            DisplayCommand::Backlight(on) => device.set_backlight(*on),
            DisplayCommand::ClearLine(line) => device.clear_line(*line),
            DisplayCommand::PrintLine { line, text } => device.write_line(*line, text),
            DisplayCommand::Close => break,
        };
        if let Err(e) = result {
            warn!("display: {:?} failed: {}", cmd, e);
        }
    }
    rx.close();
    if let Err(e) = device.close() {
        warn!("display: close failed: {}", e);
    }
}

/// Open the configured panel variant, rendering frames to stdout.
pub async fn open_panel(config: &DisplayConfig) -> Box<dyn Device> {
    match config.kind {
        DisplayKind::Lcd => {
            info!("display: LCD initializing");
            // HD44780 controllers need a moment after power-up.
            tokio::time::sleep(Duration::from_secs(config.init_delay_secs)).await;
            Box::new(CharLcd::new(std::io::stdout(), !config.scroll_station))
        }
        DisplayKind::Oled => {
            info!("display: OLED initializing");
            Box::new(Oled::new(std::io::stdout()))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::panel::{DeviceError, Geometry};
    use super::*;

    /// Device that records every call it receives.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingDevice {
        pub log: Arc<Mutex<Vec<DisplayCommand>>>,
        pub columns: usize,
    }

    impl RecordingDevice {
        pub fn new(columns: usize) -> Self {
            Self {
                log: Arc::default(),
                columns,
            }
        }

        pub fn commands(&self) -> Vec<DisplayCommand> {
            self.log.lock().unwrap().clone()
        }

        pub fn lines_on(&self, line: usize) -> Vec<String> {
            self.commands()
                .into_iter()
                .filter_map(|c| match c {
                    DisplayCommand::PrintLine { line: l, text } if l == line => Some(text),
                    _ => None,
                })
                .collect()
        }
    }

    impl Device for RecordingDevice {
        fn geometry(&self) -> Geometry {
            Geometry {
                columns: self.columns,
                rows: 4,
                backlight: true,
            }
        }

        fn clear(&mut self) -> Result<(), DeviceError> {
            self.log.lock().unwrap().push(DisplayCommand::Clear);
            Ok(())
        }

        fn set_backlight(&mut self, on: bool) -> Result<(), DeviceError> {
            self.log.lock().unwrap().push(DisplayCommand::Backlight(on));
            Ok(())
        }

        fn clear_line(&mut self, line: usize) -> Result<(), DeviceError> {
            self.log.lock().unwrap().push(DisplayCommand::ClearLine(line));
            Ok(())
        }

        fn write_line(&mut self, line: usize, text: &str) -> Result<(), DeviceError> {
            if text == "fail" {
                return Err(DeviceError::LineOutOfRange(line));
            }
            self.log.lock().unwrap().push(DisplayCommand::PrintLine {
                line,
                text: text.to_string(),
            });
            Ok(())
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_commands_applied_in_submission_order() {
        let device = RecordingDevice::new(20);
        let queue = DisplayQueue::start(Box::new(device.clone()), Duration::from_millis(100)).unwrap();

        queue.clear();
        queue.set_backlight(true);
        queue.print_line(0, "first", false);
        queue.clear_line(1);
        queue.print_line(1, "fail", false);
        queue.print_line(1, "second", false);
        queue.set_backlight(false);
        queue.close().await;

        assert_eq!(
            device.commands(),
            vec![
                DisplayCommand::Clear,
                DisplayCommand::Backlight(true),
                DisplayCommand::PrintLine { line: 0, text: "first".into() },
                DisplayCommand::ClearLine(1),
                DisplayCommand::PrintLine { line: 1, text: "second".into() },
                DisplayCommand::Backlight(false),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_keep_per_producer_order() {
        let device = RecordingDevice::new(20);
        let queue = DisplayQueue::start(Box::new(device.clone()), Duration::from_millis(100)).unwrap();

        let mut tasks = Vec::new();
        for producer in 0..4usize {
            let q = queue.clone();
            tasks.push(tokio::spawn(async move {
                for seq in 0..200usize {
                    q.print_line(producer, &format!("{}", seq), false);
                    if seq % 16 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        queue.close().await;

        for producer in 0..4usize {
            let seen: Vec<usize> = device
                .lines_on(producer)
                .iter()
                .map(|s| s.parse().unwrap())
                .collect();
            assert_eq!(seen, (0..200).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_short_text_with_scroll_writes_once() {
        let device = RecordingDevice::new(10);
        let queue = DisplayQueue::start(Box::new(device.clone()), Duration::from_millis(10)).unwrap();
        queue.print_line(2, "short", true);
        tokio::time::sleep(Duration::from_millis(60)).await;
        queue.close().await;
        assert_eq!(device.lines_on(2), vec!["short".to_string()]);
    }

    #[tokio::test]
    async fn test_ticker_rotates_long_text() {
        let device = RecordingDevice::new(4);
        let queue = DisplayQueue::start(Box::new(device.clone()), Duration::from_millis(10)).unwrap();
        queue.print_line(1, "abcdef", true);
        tokio::time::sleep(Duration::from_millis(45)).await;
        queue.close().await;

        let frames = device.lines_on(1);
        assert!(frames.len() >= 3, "frames: {:?}", frames);
        assert_eq!(frames[0], "abcd");
        assert_eq!(frames[1], "bcde");
        assert_eq!(frames[2], "cdef");
        assert!(frames.iter().all(|f| f.chars().count() == 4));
    }

    #[tokio::test]
    async fn test_new_ticker_replaces_old_one() {
        let device = RecordingDevice::new(4);
        let queue = DisplayQueue::start(Box::new(device.clone()), Duration::from_millis(10)).unwrap();
        queue.print_line(1, "aaaaaaaa", true);
        settle().await;
        queue.print_line(1, "bbbbbbbb", true);
        settle().await;
        queue.close().await;

        let frames = device.lines_on(1);
        let first_b = frames
            .iter()
            .position(|f| f.starts_with('b'))
            .expect("second ticker never drew");
        assert!(
            frames[first_b..].iter().all(|f| !f.contains('a')),
            "old ticker still active: {:?}",
            frames
        );
    }

    #[tokio::test]
    async fn test_plain_print_stops_ticker() {
        let device = RecordingDevice::new(4);
        let queue = DisplayQueue::start(Box::new(device.clone()), Duration::from_millis(10)).unwrap();
        queue.print_line(2, "scrolling text", true);
        settle().await;
        queue.print_line(2, "done", false);
        settle().await;
        queue.close().await;

        let frames = device.lines_on(2);
        assert_eq!(frames.last().map(String::as_str), Some("done"));
        assert_eq!(frames.iter().filter(|f| *f == "done").count(), 1);
    }

    #[tokio::test]
    async fn test_print_after_close_is_dropped() {
        let device = RecordingDevice::new(20);
        let queue = DisplayQueue::start(Box::new(device.clone()), Duration::from_millis(10)).unwrap();
        queue.close().await;
        queue.print_line(0, "late", false);
        assert!(device.commands().is_empty());
    }
}
