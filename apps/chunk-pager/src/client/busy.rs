use std::sync::atomic::{AtomicUsize, Ordering};

/// Loading indicator shown while the visible region waits on a load.
/// Every `show` is paired with exactly one `hide`.
pub trait BusyIndicator: Send + Sync {
    fn show(&self);
    fn hide(&self);
}

/// Busy counter read by the status line. Overlapping loads each hold the
/// indicator; it clears when the last one finishes.
#[derive(Debug, Default)]
pub struct StatusBusy {
    holders: AtomicUsize,
}

impl StatusBusy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.holders.load(Ordering::Acquire) > 0
    }
}

impl BusyIndicator for StatusBusy {
    fn show(&self) {
        self.holders.fetch_add(1, Ordering::AcqRel);
    }

    fn hide(&self) {
        let _ = self
            .holders
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
    }
}
