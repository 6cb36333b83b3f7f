//! Board notifications and the event bus that delivers them
//!
//! Observers either take a broadcast receiver (async consumers) or register
//! a synchronous callback with a category filter. Both see events in the
//! order they were published.
//!
//! Callbacks run on the publishing task and never miss an event. A receiver
//! buffers at most the channel capacity; one that falls further behind gets
//! `RecvError::Lagged` and loses the oldest events.

use ledboard_core::{ControlParameters, HardwareConfiguration, HardwareInfo, ListedBoard};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Default broadcast capacity; receivers further behind than this lag
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Foreground commands, as named in failure notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    FetchDetails,
    FetchControlParameters,
    SetControlParameters,
    SaveControlParameters,
    Reboot,
    UploadFirmware,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::FetchDetails => "fetch details",
            CommandKind::FetchControlParameters => "fetch control parameters",
            CommandKind::SetControlParameters => "set control parameters",
            CommandKind::SaveControlParameters => "save control parameters",
            CommandKind::Reboot => "reboot",
            CommandKind::UploadFirmware => "upload firmware",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification published by the poller or the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// The set of attached boards changed; carries every current board
    BoardsListed(Vec<ListedBoard>),
    /// One board's availability changed, or a refresh was requested
    BoardChanged(ListedBoard),
    /// A details request was taken up
    DetailsRequested(ListedBoard),
    DetailsAcquired {
        port: String,
        info: HardwareInfo,
        configuration: HardwareConfiguration,
    },
    DetailsAcquisitionFailed {
        port: String,
        reason: String,
    },
    ControlParametersAcquired {
        port: String,
        parameters: ControlParameters,
    },
    ControlParametersSaved {
        port: String,
    },
    /// A board seen again after a reboot or firmware upload
    BoardRebooted(ListedBoard),
    /// Any command other than a details fetch failed
    CommandFailed {
        port: String,
        command: CommandKind,
        reason: String,
    },
}

/// Coarse grouping used by callback filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    Discovery,
    Details,
    ControlParameters,
    Failure,
}

impl BoardEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            BoardEvent::BoardsListed(_)
            | BoardEvent::BoardChanged(_)
            | BoardEvent::BoardRebooted(_) => EventCategory::Discovery,
            BoardEvent::DetailsRequested(_)
            | BoardEvent::DetailsAcquired { .. }
            | BoardEvent::DetailsAcquisitionFailed { .. } => EventCategory::Details,
            BoardEvent::ControlParametersAcquired { .. }
            | BoardEvent::ControlParametersSaved { .. } => EventCategory::ControlParameters,
            BoardEvent::CommandFailed { .. } => EventCategory::Failure,
        }
    }

    /// Port of the board the event is about, if it is about a single board
    pub fn port(&self) -> Option<&str> {
        match self {
            BoardEvent::BoardsListed(_) => None,
            BoardEvent::BoardChanged(board)
            | BoardEvent::DetailsRequested(board)
            | BoardEvent::BoardRebooted(board) => Some(&board.port),
            BoardEvent::DetailsAcquired { port, .. }
            | BoardEvent::DetailsAcquisitionFailed { port, .. }
            | BoardEvent::ControlParametersAcquired { port, .. }
            | BoardEvent::ControlParametersSaved { port }
            | BoardEvent::CommandFailed { port, .. } => Some(port),
        }
    }
}

impl fmt::Display for BoardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardEvent::BoardsListed(boards) => write!(f, "{} board(s) listed", boards.len()),
            BoardEvent::BoardChanged(board) => write!(f, "board changed: {}", board),
            BoardEvent::DetailsRequested(board) => {
                write!(f, "fetching details for {}", board.port)
            }
            BoardEvent::DetailsAcquired { port, info, .. } => write!(
                f,
                "details acquired for {}: {} (firmware {})",
                port, info.name, info.firmware_revision
            ),
            BoardEvent::DetailsAcquisitionFailed { port, reason } => {
                write!(f, "details for {} unavailable: {}", port, reason)
            }
            BoardEvent::ControlParametersAcquired { port, .. } => {
                write!(f, "control parameters acquired for {}", port)
            }
            BoardEvent::ControlParametersSaved { port } => {
                write!(f, "control parameters saved on {}", port)
            }
            BoardEvent::BoardRebooted(board) => write!(f, "board rebooted: {}", board),
            BoardEvent::CommandFailed {
                port,
                command,
                reason,
            } => write!(f, "{} failed on {}: {}", command, port, reason),
        }
    }
}

/// Filter to receive only specific event categories
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    #[default]
    All,
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    pub fn matches(&self, event: &BoardEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

/// Handle for removing a callback subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type EventHandler = Box<dyn Fn(&BoardEvent) + Send + Sync>;

/// Publish/subscribe fabric for board notifications
pub struct EventBus {
    sender: broadcast::Sender<BoardEvent>,
    /// Held for the whole of a publish so deliveries never interleave
    handlers: Mutex<Vec<(SubscriptionId, EventFilter, EventHandler)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Deliver an event to every callback, then to every receiver.
    ///
    /// Returns the number of broadcast receivers reached. Having no
    /// observers at all is not an error.
    pub fn publish(&self, event: BoardEvent) -> usize {
        debug!("Publishing: {}", event);

        let handlers = self.handlers.lock();
        for (_, filter, handler) in handlers.iter() {
            if filter.matches(&event) {
                handler(&event);
            }
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Register a callback, called on the publishing task.
    ///
    /// Callbacks must return quickly and must not subscribe or unsubscribe.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&BoardEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, filter, Box::new(handler)));
        debug!("Subscription {} added", id);
        id
    }

    /// Returns true if the subscription was found and removed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _, _)| *existing != id);
        let removed = handlers.len() != before;
        if removed {
            debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Receiver for async consumers; sees events published from now on.
    ///
    /// Lossy once it falls more than the channel capacity behind. Use
    /// [`EventBus::subscribe`] when every event matters.
    pub fn receiver(&self) -> broadcast::Receiver<BoardEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
