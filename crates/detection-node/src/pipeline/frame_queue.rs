//! Single-slot mailbox between capture and inference.
//!
//! Capture always runs faster than inference, so the queue holds exactly one
//! item: pushing replaces any unread item and never blocks, popping waits for
//! the next item. Replaced items are counted so frame drops stay observable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

pub struct FrameQueue<T> {
    slot: Mutex<Slot<T>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                value: None,
                closed: false,
            }),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Stores `item`, replacing any unread one. Returns `true` when an
    /// unread item was dropped. Never blocks; after `close` items are
    /// discarded.
    pub fn push(&self, item: T) -> bool {
        let replaced = {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if slot.closed {
                return false;
            }
            slot.value.replace(item).is_some()
        };
        if replaced {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        replaced
    }

    /// Waits for the next item. Returns `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut slot = match self.slot.lock() {
                    Ok(slot) => slot,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Some(value) = slot.value.take() {
                    return Some(value);
                }
                if slot.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Marks the queue closed. A pending item is still delivered before
    /// `pop` starts returning `None`.
    pub fn close(&self) {
        {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.closed = true;
        }
        self.notify.notify_one();
    }

    /// Items replaced before they were read.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
