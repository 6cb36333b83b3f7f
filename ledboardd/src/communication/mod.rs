//! Board communication coordinator
//!
//! A poller task and a dispatcher task share the boards' serial ports
//! through a [`SuspendGate`]: foreground commands take an exclusive hold,
//! poll ticks skip while one is active. [`Communicator`] owns both tasks.

mod communicator;
mod dispatcher;
mod events;
mod gate;
mod poller;
mod registry;

pub use communicator::Communicator;
pub use dispatcher::{Dispatcher, Request};
pub use events::{
    BoardEvent, CommandKind, EventBus, EventCategory, EventFilter, SubscriptionId,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use gate::{ExclusiveHold, SuspendGate, TickGuard};
pub use poller::{Poller, TickOutcome, MIN_POLL_INTERVAL};
pub use registry::BoardRegistry;
