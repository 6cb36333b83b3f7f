//! Command dispatcher
//!
//! Executes foreground requests one at a time. Each command holds the
//! suspend gate from before its session opens until its result has been
//! published, and releases it on every exit path.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use ledboard_core::{ControlParameters, LedBoardError, ListedBoard, Result};
use ledboard_hardware::{BoardSession, SessionFactory};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{BoardEvent, CommandKind, EventBus};
use super::gate::SuspendGate;
use super::registry::BoardRegistry;

/// A request submitted through the communicator
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Details(ListedBoard),
    ControlParameters(ListedBoard),
    SetControlParameters(ListedBoard, ControlParameters),
    SaveControlParameters(ListedBoard),
    Reboot(ListedBoard),
    UploadFirmware(ListedBoard, PathBuf),
    /// Re-surface the board on the next tick; no board access
    Refresh(ListedBoard),
}

impl Request {
    pub fn board(&self) -> &ListedBoard {
        match self {
            Request::Details(board)
            | Request::ControlParameters(board)
            | Request::SetControlParameters(board, _)
            | Request::SaveControlParameters(board)
            | Request::Reboot(board)
            | Request::UploadFirmware(board, _)
            | Request::Refresh(board) => board,
        }
    }

    /// The board command this request runs, if any
    pub fn command(&self) -> Option<CommandKind> {
        match self {
            Request::Details(_) => Some(CommandKind::FetchDetails),
            Request::ControlParameters(_) => Some(CommandKind::FetchControlParameters),
            Request::SetControlParameters(..) => Some(CommandKind::SetControlParameters),
            Request::SaveControlParameters(_) => Some(CommandKind::SaveControlParameters),
            Request::Reboot(_) => Some(CommandKind::Reboot),
            Request::UploadFirmware(..) => Some(CommandKind::UploadFirmware),
            Request::Refresh(_) => None,
        }
    }
}

pub struct Dispatcher {
    sessions: Arc<dyn SessionFactory>,
    registry: Arc<Mutex<BoardRegistry>>,
    gate: Arc<SuspendGate>,
    bus: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        registry: Arc<Mutex<BoardRegistry>>,
        gate: Arc<SuspendGate>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            sessions,
            registry,
            gate,
            bus,
        }
    }

    /// Handle one request to completion
    pub async fn handle(&self, request: Request) {
        if let Request::Refresh(board) = request {
            debug!("Refresh requested for {}", board.port);
            self.registry.lock().request_refresh(board.port);
            return;
        }

        if let Request::Details(board) = &request {
            self.bus.publish(BoardEvent::DetailsRequested(board.clone()));
        }

        let hold = self.gate.acquire_exclusive().await;
        self.execute(request).await;
        hold.release();
    }

    /// Run a command against an open session; the session closes afterwards
    ///
    /// The closure must return a boxed future:
    ///
    /// ```ignore
    /// dispatcher.with_session(port, |session| Box::pin(async move {
    ///     session.reboot().await
    /// })).await
    /// ```
    async fn with_session<F, T>(&self, port: &str, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(
            &'a mut dyn BoardSession,
        ) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    {
        debug!("Opening session on {}", port);
        let mut session = self.sessions.open(port).await?;
        f(&mut *session).await
    }

    async fn execute(&self, request: Request) {
        match request {
            Request::Details(board) => {
                let result = self
                    .with_session(&board.port, |session| {
                        Box::pin(async move {
                            let info = session.get_hardware_info().await?;
                            let configuration = session.get_configuration().await?;
                            Ok::<_, LedBoardError>((info, configuration))
                        })
                    })
                    .await;

                match result {
                    Ok((info, configuration)) => {
                        info!(
                            "Read details of {}: {} (firmware {})",
                            board.port, info.name, info.firmware_revision
                        );
                        self.bus.publish(BoardEvent::DetailsAcquired {
                            port: board.port,
                            info,
                            configuration,
                        });
                    }
                    Err(e) => {
                        warn!("Failed to read details of {}: {}", board.port, e);
                        self.bus.publish(BoardEvent::DetailsAcquisitionFailed {
                            port: board.port,
                            reason: e.to_string(),
                        });
                    }
                }
            }

            Request::ControlParameters(board) => {
                let result = self
                    .with_session(&board.port, |session| {
                        Box::pin(async move { session.get_control_parameters().await })
                    })
                    .await;

                match result {
                    Ok(parameters) => {
                        debug!("Read control parameters of {}", board.port);
                        self.bus.publish(BoardEvent::ControlParametersAcquired {
                            port: board.port,
                            parameters,
                        });
                    }
                    Err(e) => {
                        self.report_failure(board.port, CommandKind::FetchControlParameters, e)
                    }
                }
            }

            Request::SetControlParameters(board, parameters) => {
                if let Err(e) = parameters.validate() {
                    self.report_failure(board.port, CommandKind::SetControlParameters, e);
                    return;
                }

                let result = self
                    .with_session(&board.port, |session| {
                        Box::pin(async move { session.set_control_parameters(&parameters).await })
                    })
                    .await;

                match result {
                    Ok(()) => debug!("Wrote control parameters to {}", board.port),
                    Err(e) => {
                        self.report_failure(board.port, CommandKind::SetControlParameters, e)
                    }
                }
            }

            Request::SaveControlParameters(board) => {
                let result = self
                    .with_session(&board.port, |session| {
                        Box::pin(async move { session.save_control_parameters().await })
                    })
                    .await;

                match result {
                    Ok(()) => {
                        info!("Saved control parameters on {}", board.port);
                        self.bus
                            .publish(BoardEvent::ControlParametersSaved { port: board.port });
                    }
                    Err(e) => {
                        self.report_failure(board.port, CommandKind::SaveControlParameters, e)
                    }
                }
            }

            Request::Reboot(board) => {
                let result = self
                    .with_session(&board.port, |session| {
                        Box::pin(async move { session.reboot().await })
                    })
                    .await;

                match result {
                    Ok(()) => {
                        info!("Rebooting {}", board.port);
                        self.registry.lock().expect_reboot(board.port);
                    }
                    Err(e) => self.report_failure(board.port, CommandKind::Reboot, e),
                }
            }

            Request::UploadFirmware(board, image_path) => {
                info!(
                    "Uploading firmware {} to {}",
                    image_path.display(),
                    board.port
                );
                let result = self
                    .with_session(&board.port, |session| {
                        Box::pin(async move { session.upload_firmware(&image_path).await })
                    })
                    .await;

                match result {
                    Ok(()) => {
                        info!("Firmware uploaded to {}, waiting for reboot", board.port);
                        self.registry.lock().expect_reboot(board.port);
                    }
                    Err(e) => self.report_failure(board.port, CommandKind::UploadFirmware, e),
                }
            }

            Request::Refresh(_) => {}
        }
    }

    fn report_failure(&self, port: String, command: CommandKind, error: LedBoardError) {
        warn!("Failed to {} on {}: {}", command, port, error);
        self.bus.publish(BoardEvent::CommandFailed {
            port,
            command,
            reason: error.to_string(),
        });
    }

    /// Handle requests in submission order until cancelled or the
    /// submitting side goes away.
    ///
    /// A command in progress is never interrupted; requests still queued
    /// at that point are dropped.
    pub async fn run(
        self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }

        requests.close();
        let mut dropped = 0usize;
        while requests.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Dropped {} queued request(s)", dropped);
        }

        debug!("Dispatcher stopped");
    }
}
