//! Discovery poller
//!
//! Runs discovery on a fixed interval, feeds the result through the registry
//! diff and publishes what changed. Ticks that find the suspend gate held do
//! nothing.

use std::sync::Arc;
use std::time::Duration;

use ledboard_hardware::DiscoverySource;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::EventBus;
use super::gate::SuspendGate;
use super::registry::BoardRegistry;

/// Shortest interval the poller accepts
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A foreground command holds the transport
    Suspended,
    /// Discovery failed; the next tick tries again
    DiscoveryFailed,
    Polled { notifications: usize },
}

pub struct Poller {
    discovery: Arc<dyn DiscoverySource>,
    registry: Arc<Mutex<BoardRegistry>>,
    gate: Arc<SuspendGate>,
    bus: Arc<EventBus>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        discovery: Arc<dyn DiscoverySource>,
        registry: Arc<Mutex<BoardRegistry>>,
        gate: Arc<SuspendGate>,
        bus: Arc<EventBus>,
        interval: Duration,
    ) -> Self {
        Self {
            discovery,
            registry,
            gate,
            bus,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one discovery tick
    ///
    /// The transport stays claimed until the tick's notifications are
    /// published, so a command's notifications never interleave with them.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_tick) = self.gate.try_begin_tick() else {
            debug!("Poll tick skipped: board access suspended");
            return TickOutcome::Suspended;
        };

        let discovered = match self.discovery.list_boards().await {
            Ok(boards) => boards,
            Err(e) => {
                warn!("Board discovery failed: {}", e);
                return TickOutcome::DiscoveryFailed;
            }
        };

        let events = self.registry.lock().apply(discovered);
        let notifications = events.len();
        for event in events {
            self.bus.publish(event);
        }

        TickOutcome::Polled { notifications }
    }

    /// Tick until cancelled, starting with an immediate tick.
    ///
    /// Cancellation is checked between ticks; a tick in progress finishes.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Polling for boards every {}ms", self.interval.as_millis());

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        debug!("Poller stopped");
    }
}
