//! In-memory discovery and board sessions for coordinator tests
//!
//! Every mock operation goes through a shared [`TransportProbe`] so tests can
//! assert that board access never overlapped.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledboard_core::{
    ControlParameters, HardwareConfiguration, HardwareInfo, LedBoardError, ListedBoard, Result,
};
use ledboard_hardware::{BoardSession, DiscoverySource, SessionFactory};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::communication::BoardEvent;

/// Simulated duration of one transport operation
pub const OPERATION_DELAY: Duration = Duration::from_millis(3);

/// Counts transport use and remembers the highest overlap seen
#[derive(Debug, Default)]
pub struct TransportProbe {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    total: AtomicUsize,
}

pub struct ProbeGuard<'a>(&'a TransportProbe);

impl TransportProbe {
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        ProbeGuard(self)
    }

    /// Operations running right now
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of operations started so far
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Discovery returning whatever boards the test sets
pub struct ScriptedDiscovery {
    boards: Mutex<Vec<ListedBoard>>,
    failing: AtomicBool,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    probe: Arc<TransportProbe>,
}

impl ScriptedDiscovery {
    pub fn new(boards: Vec<ListedBoard>, probe: Arc<TransportProbe>) -> Self {
        Self {
            boards: Mutex::new(boards),
            failing: AtomicBool::new(false),
            delay: Mutex::new(OPERATION_DELAY),
            calls: AtomicUsize::new(0),
            probe,
        }
    }

    pub fn set_boards(&self, boards: Vec<ListedBoard>) {
        *self.boards.lock() = boards;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How long each enumeration takes
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoverySource for ScriptedDiscovery {
    async fn list_boards(&self) -> Result<Vec<ListedBoard>> {
        let _probe = self.probe.enter();
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        tokio::time::sleep(delay).await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(LedBoardError::Serial("enumeration failed".to_string()));
        }
        Ok(self.boards.lock().clone())
    }
}

/// State shared by the mock factory and the sessions it opens
#[derive(Default)]
struct MockBoardState {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    parameters: Mutex<ControlParameters>,
}

impl MockBoardState {
    fn record(&self, operation: &'static str, port: &str) -> Result<()> {
        self.calls.lock().push(format!("{} {}", operation, port));
        if self.failing.lock().contains(operation) {
            return Err(LedBoardError::DeviceCommunication(format!(
                "{} rejected by board",
                operation
            )));
        }
        Ok(())
    }
}

/// Session factory backed by in-memory boards
///
/// Operation names usable with [`MockSessions::fail`]: `open`, `info`,
/// `config`, `get_params`, `set_params`, `save`, `reboot`, `upload`.
#[derive(Clone)]
pub struct MockSessions {
    state: Arc<MockBoardState>,
    probe: Arc<TransportProbe>,
}

impl MockSessions {
    pub fn new(probe: Arc<TransportProbe>) -> Self {
        Self {
            state: Arc::new(MockBoardState::default()),
            probe,
        }
    }

    /// Make every later call of this operation fail
    pub fn fail(&self, operation: &'static str) {
        self.state.failing.lock().insert(operation);
    }

    /// Recorded calls, as `"<operation> <port>"`
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }
}

#[async_trait]
impl SessionFactory for MockSessions {
    async fn open(&self, port: &str) -> Result<Box<dyn BoardSession>> {
        let _probe = self.probe.enter();
        tokio::time::sleep(OPERATION_DELAY).await;
        self.state.record("open", port)?;

        Ok(Box::new(MockSession {
            port: port.to_string(),
            state: self.state.clone(),
            probe: self.probe.clone(),
        }))
    }
}

pub struct MockSession {
    port: String,
    state: Arc<MockBoardState>,
    probe: Arc<TransportProbe>,
}

impl MockSession {
    async fn operation(&self, name: &'static str) -> Result<()> {
        let _probe = self.probe.enter();
        tokio::time::sleep(OPERATION_DELAY).await;
        self.state.record(name, &self.port)
    }
}

pub fn sample_info() -> HardwareInfo {
    HardwareInfo {
        name: "LED Board".to_string(),
        firmware_revision: 7,
        hardware_revision: 2,
        unique_id: "E6616408432B5F2E".to_string(),
        led_count: 64,
    }
}

#[async_trait]
impl BoardSession for MockSession {
    async fn get_hardware_info(&mut self) -> Result<HardwareInfo> {
        self.operation("info").await?;
        Ok(sample_info())
    }

    async fn get_configuration(&mut self) -> Result<HardwareConfiguration> {
        self.operation("config").await?;
        let mut configuration = HardwareConfiguration::default();
        configuration.set("led_type", serde_json::json!("ws2812"));
        Ok(configuration)
    }

    async fn get_control_parameters(&mut self) -> Result<ControlParameters> {
        self.operation("get_params").await?;
        Ok(self.state.parameters.lock().clone())
    }

    async fn set_control_parameters(&mut self, parameters: &ControlParameters) -> Result<()> {
        self.operation("set_params").await?;
        *self.state.parameters.lock() = parameters.clone();
        Ok(())
    }

    async fn save_control_parameters(&mut self) -> Result<()> {
        self.operation("save").await
    }

    async fn reboot(&mut self) -> Result<()> {
        self.operation("reboot").await
    }

    async fn upload_firmware(&mut self, _image_path: &Path) -> Result<()> {
        self.operation("upload").await
    }
}

/// Wait for the first event matching `predicate`, skipping others
pub async fn wait_for<F>(
    events: &mut broadcast::Receiver<BoardEvent>,
    timeout: Duration,
    mut predicate: F,
) -> Option<BoardEvent>
where
    F: FnMut(&BoardEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Everything received within `window`
pub async fn collect_for(
    events: &mut broadcast::Receiver<BoardEvent>,
    window: Duration,
) -> Vec<BoardEvent> {
    let mut collected = Vec::new();
    let _ = tokio::time::timeout(window, async {
        while let Ok(event) = events.recv().await {
            collected.push(event);
        }
    })
    .await;
    collected
}
