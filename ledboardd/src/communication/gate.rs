//! Suspend gate
//!
//! Serializes board access between the discovery poller and the command
//! dispatcher. The dispatcher takes an exclusive hold for the whole of a
//! command; poll ticks skip their work while a hold is active or pending.

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Mutual-exclusion coordinator for board transport use
#[derive(Debug, Default)]
pub struct SuspendGate {
    /// Held by whoever currently talks to a board
    transport: Mutex<()>,
    /// Exclusive holds taken or waiting
    holds: AtomicUsize,
}

/// Counts a hold from the moment it is requested until it is released,
/// including a waiting acquisition that gets cancelled.
#[derive(Debug)]
struct HoldCount<'a>(&'a AtomicUsize);

impl<'a> HoldCount<'a> {
    fn new(holds: &'a AtomicUsize) -> Self {
        holds.fetch_add(1, Ordering::SeqCst);
        Self(holds)
    }
}

impl Drop for HoldCount<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive board access for a foreground command
///
/// Released when dropped.
#[derive(Debug)]
#[must_use = "the hold is released as soon as it is dropped"]
pub struct ExclusiveHold<'a> {
    // Unlock before the count drops so ticks keep skipping until both are gone
    _transport: MutexGuard<'a, ()>,
    _count: HoldCount<'a>,
}

impl ExclusiveHold<'_> {
    /// Release the hold; ticks resume on the next timer firing
    pub fn release(self) {
        debug!("Exclusive hold released");
    }
}

/// Board access for one poll tick
#[derive(Debug)]
pub struct TickGuard<'a> {
    _transport: MutexGuard<'a, ()>,
}

impl SuspendGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no poll tick is running, then hold the transport.
    ///
    /// New ticks skip from the moment this is called, so the wait is
    /// bounded by the duration of the tick already in flight.
    pub async fn acquire_exclusive(&self) -> ExclusiveHold<'_> {
        let count = HoldCount::new(&self.holds);
        let transport = self.transport.lock().await;
        debug!("Exclusive hold acquired");

        ExclusiveHold {
            _transport: transport,
            _count: count,
        }
    }

    /// Whether an exclusive hold is active or being acquired
    pub fn is_held(&self) -> bool {
        self.holds.load(Ordering::SeqCst) > 0
    }

    /// Start a poll tick, unless a foreground command holds the transport.
    ///
    /// Never waits.
    pub fn try_begin_tick(&self) -> Option<TickGuard<'_>> {
        if self.is_held() {
            return None;
        }

        self.transport
            .try_lock()
            .ok()
            .map(|transport| TickGuard {
                _transport: transport,
            })
    }
}
