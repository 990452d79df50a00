use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{DisplayCommand, Inner};

/// Blank columns appended so the end of the text is separated from its start
/// while it wraps around.
const SCROLL_GAP: usize = 5;

/// Handle for one running scroll ticker. Dropping it does not stop the task;
/// call `cancel`.
pub(super) struct Ticker {
    cancel: CancellationToken,
}

impl Ticker {
    /// Start rotating `text` on `line`. The caller must hold the line lock and
    /// store the returned handle in the line's slot before releasing it.
    pub(super) fn spawn(inner: &Arc<Inner>, line: usize, text: &str) -> Self {
        let cancel = inner.shutdown.child_token();
        let token = cancel.clone();
        let runtime = inner.runtime.clone();
        let inner = Arc::clone(inner);
        let width = inner.geometry.columns;
        let period = inner.scroll_interval;
        let mut window: Vec<char> = text.chars().collect();
        window.extend(std::iter::repeat(' ').take(SCROLL_GAP));

        runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let visible: String = window.iter().take(width).collect();
                        if !submit_frame(&inner, &token, line, visible) {
                            break;
                        }
                        window.rotate_left(1);
                    }
                }
            }
            trace!("ticker[{}]: stopped", line);
        });

        Self { cancel }
    }

    pub(super) fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Queue one frame while holding the line lock. A ticker that was cancelled
/// between its tick and this point sees the cancellation under the same lock
/// `print_line` uses, so it can never write after its replacement.
fn submit_frame(inner: &Inner, token: &CancellationToken, line: usize, text: String) -> bool {
    let _lines = inner.lock_lines();
    if token.is_cancelled() {
        return false;
    }
    inner.submit(DisplayCommand::PrintLine { line, text })
}
