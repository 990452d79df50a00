//! Trailing-edge debouncer.
//!
//! `arm` schedules a future to run once the channel has been quiet for the
//! whole window. Arming again before the window elapses drops the pending
//! future and restarts the window, so a burst of calls produces exactly one
//! firing: the last one armed. Once a firing has started it runs to
//! completion; later arms only ever replace pending (not yet started) work.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::debug;

#[derive(Default)]
struct Slot {
    generation: u64,
    pending: Option<AbortHandle>,
}

pub struct Debouncer {
    name: &'static str,
    window: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl Debouncer {
    pub fn new(name: &'static str, window: Duration) -> Self {
        Self {
            name,
            window,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Replace any pending action with `action` and restart the window.
    pub fn arm<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(prev) = slot.pending.take() {
            prev.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        let window = self.window;
        let shared = Arc::clone(&self.slot);
        let name = self.name;
        // The slot stays locked until the handle is stored, so the task can
        // never claim its firing before `pending` points at it.
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if !claim(&shared, generation) {
                return;
            }
            debug!("debounce[{}]: firing", name);
            action.await;
        });
        slot.pending = Some(task.abort_handle());
    }

    /// Drop the pending action, if any.
    pub fn cancel(&self) {
        let mut slot = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(prev) = slot.pending.take() {
            prev.abort();
        }
    }
}

/// Mark the firing for `generation` as started. Returns false when a newer
/// arm (or a cancel) superseded it.
fn claim(slot: &Mutex<Slot>, generation: u64) -> bool {
    let mut slot = match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if slot.generation != generation {
        return false;
    }
    slot.pending = None;
    true
}
