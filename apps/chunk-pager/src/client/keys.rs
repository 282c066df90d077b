use crate::client::chunks_map::{ChunksMap, NavError};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavKey {
    Previous,
    Next,
    PageBack,
    PageForward,
    First,
    Last,
}

impl NavKey {
    /// Navigation meaning of a key press. Modified keys are left to the
    /// caller (they scroll instead of moving the selection).
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        if key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
        {
            return None;
        }
        match key.code {
            KeyCode::Up => Some(NavKey::Previous),
            KeyCode::Down => Some(NavKey::Next),
            KeyCode::PageUp => Some(NavKey::PageBack),
            KeyCode::PageDown => Some(NavKey::PageForward),
            KeyCode::Home => Some(NavKey::First),
            KeyCode::End => Some(NavKey::Last),
            _ => None,
        }
    }
}

/// Captures navigation keys and runs them against the directory on a worker
/// task, in arrival order. Input handling never waits for a load.
pub struct KeyController {
    tx: UnboundedSender<NavKey>,
}

impl KeyController {
    /// Must be called from within a tokio runtime. Navigation failures are
    /// reported on the returned receiver.
    pub fn spawn(map: ChunksMap) -> (Self, UnboundedReceiver<NavError>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<NavKey>();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(key) = rx.recv().await {
                debug!(target = "pager::nav", ?key, "navigation key");
                if let Err(err) = map.navigate(key).await {
                    warn!(target = "pager::nav", ?key, error = %err, "navigation failed");
                    if err_tx.send(err).is_err() {
                        break;
                    }
                }
            }
        });
        (Self { tx }, err_rx)
    }

    /// Returns whether the key was captured.
    pub fn handle(&self, key: &KeyEvent) -> bool {
        let Some(nav) = NavKey::from_key(key) else {
            return false;
        };
        self.dispatch(nav)
    }

    pub fn dispatch(&self, key: NavKey) -> bool {
        self.tx.send(key).is_ok()
    }
}
