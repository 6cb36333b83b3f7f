//! Communicator facade
//!
//! Owns the poller and dispatcher tasks. Callers submit requests and
//! observe notifications through it; they never touch the registry, the
//! gate or a board session directly.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ledboard_core::{ControlParameters, LedBoardError, ListedBoard, Result, StaticConfig};
use ledboard_hardware::{DiscoverySource, SerialDiscovery, SerialSessionFactory, SessionFactory};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::dispatcher::{Dispatcher, Request};
use super::events::{BoardEvent, EventBus, EventFilter, SubscriptionId};
use super::gate::SuspendGate;
use super::poller::Poller;
use super::registry::BoardRegistry;

/// Tasks of a running communicator
struct Worker {
    requests: mpsc::UnboundedSender<Request>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

enum Lifecycle {
    Stopped,
    Running(Worker),
    /// Cancelled; the tracked tasks may still be touching the transport
    Stopping(TaskTracker),
}

/// Entry point for board discovery and board commands
pub struct Communicator {
    discovery: Arc<dyn DiscoverySource>,
    sessions: Arc<dyn SessionFactory>,
    gate: Arc<SuspendGate>,
    registry: Arc<Mutex<BoardRegistry>>,
    bus: Arc<EventBus>,
    poll_interval: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl Communicator {
    pub fn new(
        discovery: Arc<dyn DiscoverySource>,
        sessions: Arc<dyn SessionFactory>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            discovery,
            sessions,
            gate: Arc::new(SuspendGate::new()),
            registry: Arc::new(Mutex::new(BoardRegistry::new())),
            bus: Arc::new(EventBus::new()),
            poll_interval,
            lifecycle: Mutex::new(Lifecycle::Stopped),
        }
    }

    /// Communicator over the system's serial ports
    pub fn from_config(config: &StaticConfig) -> Self {
        let discovery = SerialDiscovery::new(config.discovery.clone(), config.serial.baud_rate);
        let sessions = SerialSessionFactory::new(config.serial.clone());
        Self::new(
            Arc::new(discovery),
            Arc::new(sessions),
            config.polling.interval(),
        )
    }

    /// Start polling and accepting requests. No-op when already running.
    ///
    /// Each start begins from an empty board set, so the first tick that
    /// finds boards publishes a full list. When a stop is still winding
    /// down, the new run begins once the previous tasks are gone. Must be
    /// called within a Tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = self.lifecycle.lock();
        let previous = match &*lifecycle {
            Lifecycle::Running(_) => {
                debug!("Communicator already running");
                return;
            }
            Lifecycle::Stopping(tasks) => Some(tasks.clone()),
            Lifecycle::Stopped => None,
        };

        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        let (requests, rx) = mpsc::unbounded_channel();

        let poller = Poller::new(
            self.discovery.clone(),
            self.registry.clone(),
            self.gate.clone(),
            self.bus.clone(),
            self.poll_interval,
        );
        let dispatcher = Dispatcher::new(
            self.sessions.clone(),
            self.registry.clone(),
            self.gate.clone(),
            self.bus.clone(),
        );

        tasks.spawn({
            let tasks = tasks.clone();
            let cancel = cancel.clone();
            let registry = self.registry.clone();
            async move {
                if let Some(previous) = previous {
                    debug!("Waiting for the previous run to finish");
                    previous.wait().await;
                }
                registry.lock().clear();

                tasks.spawn(poller.run(cancel.clone()));
                tasks.spawn(dispatcher.run(rx, cancel));
            }
        });

        *lifecycle = Lifecycle::Running(Worker {
            requests,
            cancel,
            tasks,
        });

        info!("Board communication started");
    }

    /// Stop both tasks and wait for them to finish.
    ///
    /// A command already executing completes (and publishes its result)
    /// before this returns; no board access happens afterwards. Concurrent
    /// calls all wait for the same tasks.
    pub async fn stop(&self) {
        let tasks = {
            let mut lifecycle = self.lifecycle.lock();
            let tasks = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Stopped => {
                    debug!("Communicator already stopped");
                    return;
                }
                Lifecycle::Running(worker) => {
                    worker.cancel.cancel();
                    drop(worker.requests);
                    worker.tasks.close();
                    worker.tasks
                }
                Lifecycle::Stopping(tasks) => tasks,
            };
            *lifecycle = Lifecycle::Stopping(tasks.clone());
            tasks
        };

        tasks.wait().await;

        let mut lifecycle = self.lifecycle.lock();
        if matches!(&*lifecycle, Lifecycle::Stopping(current) if TaskTracker::ptr_eq(current, &tasks)) {
            *lifecycle = Lifecycle::Stopped;
            info!("Board communication stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    /// Receiver for every notification published from now on.
    ///
    /// Falls behind and loses the oldest events past the bus capacity;
    /// callbacks registered with [`Communicator::subscribe`] do not.
    pub fn events(&self) -> broadcast::Receiver<BoardEvent> {
        self.bus.receiver()
    }

    /// Register a synchronous callback; see [`EventBus::subscribe`]
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&BoardEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(filter, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Boards known as of the last poll tick
    pub fn boards(&self) -> Vec<ListedBoard> {
        self.registry.lock().boards()
    }

    fn submit(&self, request: Request) -> Result<()> {
        let lifecycle = self.lifecycle.lock();
        let Lifecycle::Running(worker) = &*lifecycle else {
            return Err(LedBoardError::NotRunning);
        };

        debug!("Submitting {:?} for {}", request.command(), request.board().port);
        worker
            .requests
            .send(request)
            .map_err(|_| LedBoardError::NotRunning)
    }

    /// Read hardware info and configuration; answered by `DetailsAcquired`
    /// or `DetailsAcquisitionFailed`
    pub fn request_details(&self, board: &ListedBoard) -> Result<()> {
        self.submit(Request::Details(board.clone()))
    }

    /// Answered by `ControlParametersAcquired` or `CommandFailed`
    pub fn request_control_parameters(&self, board: &ListedBoard) -> Result<()> {
        self.submit(Request::ControlParameters(board.clone()))
    }

    /// Silent on success
    pub fn set_control_parameters(
        &self,
        board: &ListedBoard,
        parameters: ControlParameters,
    ) -> Result<()> {
        self.submit(Request::SetControlParameters(board.clone(), parameters))
    }

    pub fn request_save_parameters(&self, board: &ListedBoard) -> Result<()> {
        self.submit(Request::SaveControlParameters(board.clone()))
    }

    /// Answered by `BoardRebooted` once the board is seen again
    pub fn request_reboot(&self, board: &ListedBoard) -> Result<()> {
        self.submit(Request::Reboot(board.clone()))
    }

    pub fn request_firmware_upload(
        &self,
        board: &ListedBoard,
        image_path: impl Into<PathBuf>,
    ) -> Result<()> {
        self.submit(Request::UploadFirmware(board.clone(), image_path.into()))
    }

    /// Force a `BoardChanged` on the next tick that sees the board
    pub fn request_refresh(&self, board: &ListedBoard) -> Result<()> {
        self.submit(Request::Refresh(board.clone()))
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        if let Lifecycle::Running(worker) = self.lifecycle.get_mut() {
            worker.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::{CommandKind, EventCategory};
    use crate::test_utils::{
        collect_for, wait_for, MockSessions, ScriptedDiscovery, TransportProbe,
    };

    const INTERVAL: Duration = Duration::from_millis(20);
    const WAIT: Duration = Duration::from_secs(2);
    const SLOW_DISCOVERY: Duration = Duration::from_millis(300);

    struct Fixture {
        probe: Arc<TransportProbe>,
        discovery: Arc<ScriptedDiscovery>,
        sessions: MockSessions,
        communicator: Communicator,
    }

    fn fixture(boards: Vec<ListedBoard>) -> Fixture {
        let probe = Arc::new(TransportProbe::default());
        let discovery = Arc::new(ScriptedDiscovery::new(boards, probe.clone()));
        let sessions = MockSessions::new(probe.clone());
        let communicator =
            Communicator::new(discovery.clone(), Arc::new(sessions.clone()), INTERVAL);

        Fixture {
            probe,
            discovery,
            sessions,
            communicator,
        }
    }

    fn a() -> ListedBoard {
        ListedBoard::new("A", true)
    }

    fn b() -> ListedBoard {
        ListedBoard::new("B", false)
    }

    fn is_listed(event: &BoardEvent) -> bool {
        matches!(event, BoardEvent::BoardsListed(_))
    }

    #[tokio::test]
    async fn test_requests_rejected_while_stopped() {
        let f = fixture(vec![a()]);
        assert!(!f.communicator.is_running());
        assert!(matches!(
            f.communicator.request_reboot(&a()),
            Err(LedBoardError::NotRunning)
        ));

        f.communicator.start();
        assert!(f.communicator.request_refresh(&a()).is_ok());

        f.communicator.stop().await;
        assert!(matches!(
            f.communicator.request_details(&a()),
            Err(LedBoardError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let f = fixture(vec![a(), b()]);
        let mut events = f.communicator.events();

        f.communicator.start();
        let listed = wait_for(&mut events, WAIT, is_listed).await;
        assert_eq!(listed, Some(BoardEvent::BoardsListed(vec![a(), b()])));

        // A second start must not restart polling from an empty board set
        f.communicator.start();
        let later = collect_for(&mut events, INTERVAL * 5).await;
        assert!(later.is_empty(), "unexpected events: {:?}", later);
        assert_eq!(f.communicator.boards(), vec![a(), b()]);

        f.communicator.stop().await;
    }

    #[tokio::test]
    async fn test_restart_lists_boards_again() {
        let f = fixture(vec![a()]);
        let mut events = f.communicator.events();

        f.communicator.start();
        assert!(wait_for(&mut events, WAIT, is_listed).await.is_some());
        f.communicator.stop().await;
        assert!(!f.communicator.is_running());

        f.communicator.start();
        let listed = wait_for(&mut events, WAIT, is_listed).await;
        assert_eq!(listed, Some(BoardEvent::BoardsListed(vec![a()])));
        f.communicator.stop().await;
    }

    #[tokio::test]
    async fn test_no_board_access_after_stop() {
        let f = fixture(vec![a()]);
        let mut events = f.communicator.events();

        f.communicator.start();
        assert!(wait_for(&mut events, WAIT, is_listed).await.is_some());
        f.communicator.request_details(&a()).unwrap();
        f.communicator.stop().await;

        let after_stop = f.probe.total();
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(f.probe.total(), after_stop);
    }

    #[tokio::test]
    async fn test_overlapping_stops_both_wait_for_tasks() {
        let f = fixture(vec![a()]);
        f.discovery.set_delay(SLOW_DISCOVERY);

        f.communicator.start();
        tokio::time::sleep(INTERVAL).await;
        assert_eq!(f.probe.in_flight(), 1);

        let (first, second) = tokio::join!(
            async {
                f.communicator.stop().await;
                f.probe.in_flight()
            },
            async {
                f.communicator.stop().await;
                f.probe.in_flight()
            },
        );
        assert_eq!((first, second), (0, 0));
        assert!(!f.communicator.is_running());
    }

    #[tokio::test]
    async fn test_start_during_stop_waits_for_previous_run() {
        let f = fixture(vec![a()]);
        f.discovery.set_delay(SLOW_DISCOVERY);
        let mut events = f.communicator.events();

        f.communicator.start();
        tokio::time::sleep(INTERVAL).await;

        let stopping = f.communicator.stop();
        tokio::pin!(stopping);
        // The first tick is still enumerating
        assert!(tokio::time::timeout(INTERVAL, &mut stopping).await.is_err());
        assert!(!f.communicator.is_running());
        assert!(f.communicator.request_details(&a()).is_err());

        f.communicator.start();
        assert!(f.communicator.is_running());
        stopping.await;
        assert!(f.communicator.is_running());

        f.communicator.request_details(&a()).unwrap();
        let acquired = wait_for(&mut events, WAIT, |e| {
            matches!(e, BoardEvent::DetailsAcquired { .. })
        })
        .await;
        assert!(acquired.is_some());
        assert_eq!(f.communicator.boards(), vec![a()]);

        f.communicator.stop().await;
        assert_eq!(f.probe.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_reboot_round_trip() {
        let f = fixture(vec![a(), b()]);
        let mut events = f.communicator.events();

        f.communicator.start();
        assert!(wait_for(&mut events, WAIT, is_listed).await.is_some());

        f.communicator.request_reboot(&a()).unwrap();
        let rebooted = wait_for(&mut events, WAIT, |e| {
            matches!(e, BoardEvent::BoardRebooted(_))
        })
        .await;
        assert_eq!(rebooted, Some(BoardEvent::BoardRebooted(a())));

        let later = collect_for(&mut events, INTERVAL * 5).await;
        assert!(!later
            .iter()
            .any(|e| matches!(e, BoardEvent::BoardRebooted(_))));
        assert_eq!(f.sessions.count("reboot"), 1);

        f.communicator.stop().await;
    }

    #[tokio::test]
    async fn test_refresh_emits_one_board_changed() {
        let f = fixture(vec![a(), b()]);
        let mut events = f.communicator.events();

        f.communicator.start();
        assert!(wait_for(&mut events, WAIT, is_listed).await.is_some());

        f.communicator.request_refresh(&b()).unwrap();
        let changed = wait_for(&mut events, WAIT, |e| {
            matches!(e, BoardEvent::BoardChanged(_))
        })
        .await;
        assert_eq!(changed, Some(BoardEvent::BoardChanged(b())));

        let later = collect_for(&mut events, INTERVAL * 5).await;
        assert!(later.is_empty(), "unexpected events: {:?}", later);

        f.communicator.stop().await;
    }

    #[tokio::test]
    async fn test_availability_flip_publishes_board_changed_only() {
        let f = fixture(vec![a(), b()]);
        let mut events = f.communicator.events();

        f.communicator.start();
        assert!(wait_for(&mut events, WAIT, is_listed).await.is_some());

        let busy_a = ListedBoard::new("A", false);
        f.discovery.set_boards(vec![busy_a.clone(), b()]);
        let changed = wait_for(&mut events, WAIT, |_| true).await;
        assert_eq!(changed, Some(BoardEvent::BoardChanged(busy_a)));

        f.communicator.stop().await;
    }

    #[tokio::test]
    async fn test_details_failure_path() {
        let f = fixture(vec![a()]);
        f.sessions.fail("info");
        let mut events = f.communicator.events();

        f.communicator.start();
        assert!(wait_for(&mut events, WAIT, is_listed).await.is_some());

        f.communicator.request_details(&a()).unwrap();
        let details = collect_for(&mut events, INTERVAL * 10).await;

        assert_eq!(details.first(), Some(&BoardEvent::DetailsRequested(a())));
        let failures = details
            .iter()
            .filter(|e| matches!(e, BoardEvent::DetailsAcquisitionFailed { .. }))
            .count();
        assert_eq!(failures, 1);
        assert!(!details
            .iter()
            .any(|e| matches!(e, BoardEvent::DetailsAcquired { .. })));

        f.communicator.stop().await;
    }

    #[tokio::test]
    async fn test_failed_upload_is_notified() {
        let f = fixture(vec![a()]);
        f.sessions.fail("upload");
        let mut events = f.communicator.events();

        f.communicator.start();
        f.communicator
            .request_firmware_upload(&a(), "firmware.bin")
            .unwrap();

        let failed = wait_for(&mut events, WAIT, |e| {
            matches!(e, BoardEvent::CommandFailed { .. })
        })
        .await;
        assert!(matches!(
            failed,
            Some(BoardEvent::CommandFailed {
                command: CommandKind::UploadFirmware,
                ..
            })
        ));

        f.communicator.stop().await;
    }

    #[tokio::test]
    async fn test_discovery_failures_do_not_stop_polling() {
        let f = fixture(vec![a()]);
        f.discovery.set_failing(true);
        let mut events = f.communicator.events();

        f.communicator.start();
        tokio::time::sleep(INTERVAL * 3).await;
        assert!(f.discovery.calls() >= 2);
        assert!(f.communicator.boards().is_empty());

        f.discovery.set_failing(false);
        let listed = wait_for(&mut events, WAIT, is_listed).await;
        assert_eq!(listed, Some(BoardEvent::BoardsListed(vec![a()])));

        f.communicator.stop().await;
    }

    #[tokio::test]
    async fn test_board_access_is_mutually_exclusive() {
        let f = fixture(vec![a(), b()]);
        let mut events = f.communicator.events();

        f.communicator.start();
        assert!(wait_for(&mut events, WAIT, is_listed).await.is_some());

        for _ in 0..5 {
            f.communicator.request_details(&a()).unwrap();
            f.communicator.request_control_parameters(&b()).unwrap();
            f.communicator.request_save_parameters(&a()).unwrap();
            tokio::time::sleep(INTERVAL / 2).await;
        }

        let mut saved = 0;
        while saved < 5 {
            match wait_for(&mut events, WAIT, |e| {
                matches!(e, BoardEvent::ControlParametersSaved { .. })
            })
            .await
            {
                Some(_) => saved += 1,
                None => panic!("save confirmations missing"),
            }
        }
        f.communicator.stop().await;

        assert!(f.discovery.calls() > 1);
        assert_eq!(f.probe.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_callbacks_see_receiver_order() {
        let f = fixture(vec![a()]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            f.communicator.subscribe(
                EventFilter::Categories(vec![EventCategory::Discovery, EventCategory::Details]),
                move |event| seen.lock().push(event.clone()),
            );
        }
        let mut events = f.communicator.events();

        f.communicator.start();
        assert!(wait_for(&mut events, WAIT, is_listed).await.is_some());
        f.communicator.request_details(&a()).unwrap();
        assert!(wait_for(&mut events, WAIT, |e| {
            matches!(e, BoardEvent::DetailsAcquired { .. })
        })
        .await
        .is_some());
        f.communicator.stop().await;

        let seen = seen.lock();
        assert!(matches!(seen[0], BoardEvent::BoardsListed(_)));
        assert_eq!(seen[1], BoardEvent::DetailsRequested(a()));
        assert!(matches!(seen[2], BoardEvent::DetailsAcquired { .. }));
    }
}
