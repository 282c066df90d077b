//! The visible window over the document.
//!
//! `top` and `height` are in layout units. Raw scroll notifications are
//! coalesced by a debounce task into a single [`Settled`] event once scrolling
//! has been quiet for the configured period. Scrolls issued by the engine itself
//! swallow the notification they produce so they never re-trigger prefetching.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

/// Emitted once per scroll gesture after the quiet period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settled;

/// Boundaries beyond which loaded segments may be evicted. `None` means the
/// viewport is still close enough to that end of the document that nothing on
/// that side is evicted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FarRange {
    pub top: Option<u64>,
    pub bottom: Option<u64>,
}

/// Number of viewport heights kept loaded on each side of the window.
const KEEP_PAGES: u64 = 2;

struct ViewportState {
    top: u64,
    height: u64,
    document_extent: u64,
    suppress_next: bool,
    notifier: Option<UnboundedSender<()>>,
}

pub struct Viewport {
    state: Mutex<ViewportState>,
}

impl Viewport {
    pub fn new(height: u64) -> Self {
        Self {
            state: Mutex::new(ViewportState {
                top: 0,
                height,
                document_extent: 0,
                suppress_next: false,
                notifier: None,
            }),
        }
    }

    pub fn top(&self) -> u64 {
        self.state.lock().top
    }

    pub fn height(&self) -> u64 {
        self.state.lock().height
    }

    pub fn bottom(&self) -> u64 {
        let state = self.state.lock();
        state.top + state.height
    }

    pub fn document_extent(&self) -> u64 {
        self.state.lock().document_extent
    }

    /// End of the next page, clamped to the document extent.
    pub fn next_page_position(&self) -> u64 {
        let state = self.state.lock();
        let position = state.top + 2 * state.height;
        position.min(state.document_extent)
    }

    /// Start of the previous page, clamped to zero.
    pub fn prev_page_position(&self) -> u64 {
        let state = self.state.lock();
        state.top.saturating_sub(state.height)
    }

    pub fn to_unload_positions(&self) -> FarRange {
        let state = self.state.lock();
        let reach = KEEP_PAGES * state.height;
        let top = state.top.checked_sub(reach).filter(|top| *top > 0);
        let bottom = Some(state.top + state.height + reach)
            .filter(|bottom| *bottom < state.document_extent);
        FarRange { top, bottom }
    }

    pub fn set_height(&self, height: u64) {
        let mut state = self.state.lock();
        state.height = height;
        clamp_top(&mut state);
    }

    /// Called after every layout change; keeps `top` inside the scrollable range.
    pub fn set_document_extent(&self, extent: u64) {
        let mut state = self.state.lock();
        state.document_extent = extent;
        clamp_top(&mut state);
    }

    /// Engine-initiated relative scroll.
    pub fn scroll_by(&self, delta: i64) {
        let target = self.top().saturating_add_signed(delta);
        self.scroll_to(target);
    }

    /// Engine-initiated absolute scroll.
    pub fn scroll_to(&self, position: u64) {
        let moved = {
            let mut state = self.state.lock();
            let before = state.top;
            state.top = position;
            clamp_top(&mut state);
            let moved = state.top != before;
            if moved {
                state.suppress_next = true;
            }
            moved
        };
        if moved {
            trace!(target = "pager::viewport", position, "engine scroll");
            self.notify_scroll();
        }
    }

    /// Scroll caused by the user (wheel, scroll keys).
    pub fn user_scroll_by(&self, delta: i64) {
        let moved = {
            let mut state = self.state.lock();
            let before = state.top;
            state.top = state.top.saturating_add_signed(delta);
            clamp_top(&mut state);
            state.top != before
        };
        if moved {
            self.notify_scroll();
        }
    }

    /// Raw scroll notification. The first notification after an engine scroll
    /// is swallowed; everything else re-arms the settle timer.
    pub fn notify_scroll(&self) {
        let mut state = self.state.lock();
        if state.suppress_next {
            state.suppress_next = false;
            return;
        }
        if let Some(notifier) = &state.notifier {
            if notifier.send(()).is_err() {
                state.notifier = None;
            }
        }
    }

    /// Starts the debounce task and returns the stream of settle events.
    /// Must be called from within a tokio runtime.
    pub fn settle_events(&self, quiet: Duration) -> UnboundedReceiver<Settled> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        self.state.lock().notifier = Some(raw_tx);
        tokio::spawn(debounce(raw_rx, settled_tx, quiet));
        settled_rx
    }
}

fn clamp_top(state: &mut ViewportState) {
    let max_top = state.document_extent.saturating_sub(state.height);
    if state.top > max_top {
        state.top = max_top;
    }
}

async fn debounce(
    mut raw: UnboundedReceiver<()>,
    settled: UnboundedSender<Settled>,
    quiet: Duration,
) {
    while raw.recv().await.is_some() {
        loop {
            tokio::select! {
                next = raw.recv() => {
                    if next.is_none() {
                        return;
                    }
                }
                _ = tokio::time::sleep(quiet) => break,
            }
        }
        if settled.send(Settled).is_err() {
            return;
        }
    }
}
