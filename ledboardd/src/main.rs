//! LED board communication daemon
//!
//! Watches attached boards and runs one-shot board commands through the
//! communicator. Without a subcommand it watches until interrupted.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use ledboard_core::{default_config_path, ControlParameters, ListedBoard};
use ledboardd::{BoardEvent, Communicator, RuntimeConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

/// Minimum wait for a board to come back after flashing
const FLASH_TIMEOUT: Duration = Duration::from_secs(60);

/// LED board communication daemon
#[derive(Parser, Debug)]
#[command(name = "ledboardd")]
#[command(version, about = "LED board discovery and control", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Seconds to wait for a board to answer one-shot commands
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log every board notification until interrupted
    Watch,
    /// Print the attached boards
    List,
    /// Print hardware info and configuration of a board
    Details { port: String },
    /// Print the live control parameters of a board as JSON
    Params { port: String },
    /// Write control parameters from a JSON file
    SetParams { port: String, file: PathBuf },
    /// Persist the live control parameters to the board's flash
    Save { port: String },
    /// Reboot a board and wait for it to come back
    Reboot { port: String },
    /// Upload a firmware image (defaults to the last image used)
    Flash {
        port: String,
        image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // CLI flag > env var > default
    let config_path = args.config.unwrap_or_else(|| {
        std::env::var("LEDBOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path())
    });

    let config = RuntimeConfig::load(&config_path).await?;
    info!("Configuration file: {}", config_path.display());
    info!("Data directory: {}", config.data_dir().display());

    let communicator = Communicator::from_config(config.static_config());
    let mut events = communicator.events();
    communicator.start();

    let timeout = Duration::from_secs(args.timeout);
    let command = args.command.unwrap_or(Command::Watch);
    let result = run(command, &communicator, &config, &mut events, timeout).await;

    communicator.stop().await;

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

async fn run(
    command: Command,
    communicator: &Communicator,
    config: &RuntimeConfig,
    events: &mut broadcast::Receiver<BoardEvent>,
    timeout: Duration,
) -> Result<()> {
    match command {
        Command::Watch => watch(events).await,

        Command::List => {
            let boards = wait_for_boards(events, timeout).await?;
            if boards.is_empty() {
                println!("No boards found");
            }
            for board in boards {
                println!("{}", board);
            }
            Ok(())
        }

        Command::Details { port } => {
            let board = find_board(events, &port, timeout).await?;
            communicator.request_details(&board)?;

            let (info, configuration) = wait_for(events, timeout, |event| match event {
                BoardEvent::DetailsAcquired {
                    port: p,
                    info,
                    configuration,
                } if *p == port => Some(Ok((info.clone(), configuration.clone()))),
                BoardEvent::DetailsAcquisitionFailed { port: p, reason } if *p == port => {
                    Some(Err(anyhow!("{}", reason)))
                }
                _ => None,
            })
            .await?;

            println!("Name:              {}", info.name);
            println!("Firmware revision: {}", info.firmware_revision);
            println!("Hardware revision: {}", info.hardware_revision);
            println!("Unique ID:         {}", info.unique_id);
            println!("LED count:         {}", info.led_count);
            for (key, value) in configuration.iter() {
                println!("{:<18} {}", format!("{}:", key), value);
            }
            Ok(())
        }

        Command::Params { port } => {
            let board = find_board(events, &port, timeout).await?;
            communicator.request_control_parameters(&board)?;
            let parameters = wait_for_parameters(events, &port, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&parameters)?);
            Ok(())
        }

        Command::SetParams { port, file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let parameters: ControlParameters = serde_json::from_str(&content)
                .with_context(|| format!("Invalid control parameters in {}", file.display()))?;

            let board = find_board(events, &port, timeout).await?;
            communicator.set_control_parameters(&board, parameters)?;
            // Writes are silent; read back to confirm
            communicator.request_control_parameters(&board)?;
            let applied = wait_for_parameters(events, &port, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&applied)?);
            Ok(())
        }

        Command::Save { port } => {
            let board = find_board(events, &port, timeout).await?;
            communicator.request_save_parameters(&board)?;
            wait_for(events, timeout, |event| match event {
                BoardEvent::ControlParametersSaved { port: p } if *p == port => Some(Ok(())),
                _ => command_failure(event, &port),
            })
            .await?;
            println!("Control parameters saved on {}", port);
            Ok(())
        }

        Command::Reboot { port } => {
            let board = find_board(events, &port, timeout).await?;
            communicator.request_reboot(&board)?;
            wait_for_reboot(events, &port, timeout).await?;
            println!("{} rebooted", port);
            Ok(())
        }

        Command::Flash { port, image } => {
            let remembered = config.settings().await.firmware_path.clone();
            let image = image
                .or(remembered)
                .ok_or_else(|| anyhow!("No firmware image given and none used before"))?;
            if !image.is_file() {
                bail!("Firmware image not found: {}", image.display());
            }
            config.set_firmware_path(image.clone()).await?;

            let board = find_board(events, &port, timeout).await?;
            communicator.request_firmware_upload(&board, image.clone())?;
            wait_for_reboot(events, &port, timeout.max(FLASH_TIMEOUT)).await?;
            println!("Flashed {} with {}", port, image.display());
            Ok(())
        }
    }
}

async fn watch(events: &mut broadcast::Receiver<BoardEvent>) -> Result<()> {
    info!("Watching boards, press Ctrl+C to stop");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            event = events.recv() => match event {
                Ok(event) => info!("{}", event),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} notification(s)", skipped),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// Wait until `select` picks an event, giving up after `timeout`
async fn wait_for<T, F>(
    events: &mut broadcast::Receiver<BoardEvent>,
    timeout: Duration,
    mut select: F,
) -> Result<T>
where
    F: FnMut(&BoardEvent) -> Option<Result<T>>,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(result) = select(&event) {
                        return result;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} notification(s)", skipped);
                }
                Err(RecvError::Closed) => bail!("Board communication stopped"),
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| anyhow!("Timed out after {}s", timeout.as_secs()))?
}

/// `CommandFailed` for this port as an error
fn command_failure<T>(event: &BoardEvent, port: &str) -> Option<Result<T>> {
    match event {
        BoardEvent::CommandFailed {
            port: p,
            command,
            reason,
        } if p == port => Some(Err(anyhow!("Failed to {}: {}", command, reason))),
        _ => None,
    }
}

async fn wait_for_boards(
    events: &mut broadcast::Receiver<BoardEvent>,
    timeout: Duration,
) -> Result<Vec<ListedBoard>> {
    wait_for(events, timeout, |event| match event {
        BoardEvent::BoardsListed(boards) => Some(Ok(boards.clone())),
        _ => None,
    })
    .await
    .or_else(|_| Ok(Vec::new()))
}

async fn find_board(
    events: &mut broadcast::Receiver<BoardEvent>,
    port: &str,
    timeout: Duration,
) -> Result<ListedBoard> {
    let boards = wait_for_boards(events, timeout).await?;
    let board = boards
        .into_iter()
        .find(|board| board.port == port)
        .ok_or_else(|| anyhow!("No board found at {}", port))?;

    if !board.available {
        bail!("Board at {} is in use by another program", port);
    }
    Ok(board)
}

async fn wait_for_parameters(
    events: &mut broadcast::Receiver<BoardEvent>,
    port: &str,
    timeout: Duration,
) -> Result<ControlParameters> {
    wait_for(events, timeout, |event| match event {
        BoardEvent::ControlParametersAcquired {
            port: p,
            parameters,
        } if p == port => Some(Ok(parameters.clone())),
        _ => command_failure(event, port),
    })
    .await
}

async fn wait_for_reboot(
    events: &mut broadcast::Receiver<BoardEvent>,
    port: &str,
    timeout: Duration,
) -> Result<()> {
    wait_for(events, timeout, |event| match event {
        BoardEvent::BoardRebooted(board) if board.port == port => Some(Ok(())),
        _ => command_failure(event, port),
    })
    .await
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
