pub mod diagnostics;
pub mod errors;
pub mod models;
pub mod paths;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod ui;
pub mod worker;

use crate::errors::{AppError, AppResult};
use crate::models::{AppSettings, Framing, SessionState};
use crate::paths::{PathResolver, SettingsPaths};
use crate::session::{SessionController, UiCommand};
use crate::ui::console::ConsoleUi;
use crate::worker::probe::{probe_interpreter, PROBE_TIMEOUT};
use crate::worker::ProcessLauncher;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const APP_DIR_NAME: &str = "vidcsv-desk";
const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Parser)]
#[command(name = "vidcsv-desk", version, about = "Convert a video to CSV by driving the conversion worker")]
pub struct Cli {
    /// Settings file; defaults to settings.json in the app data directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Answer the open dialog with this file instead of asking.
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Answer the first save dialog with this file or directory.
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// How worker stdout is split into messages: `chunk` or `line`.
    #[arg(long, value_name = "MODE")]
    pub framing: Option<Framing>,
}

pub fn run() -> AppResult<()> {
    let cli = Cli::parse();

    let app_data_dir = app_data_dir()?;
    let log_dir = cli.log_dir.clone().unwrap_or_else(|| app_data_dir.join("logs"));
    init_tracing(&log_dir)?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| app_data_dir.join(SETTINGS_FILE_NAME));
    let mut settings = settings::load_settings(&config_path)?;
    if let Some(framing) = cli.framing {
        settings.framing = framing;
    }
    tracing::info!(
        config = %config_path.display(),
        framing = settings.framing.as_str(),
        "settings loaded"
    );

    let paths = SettingsPaths::beside_current_exe(&settings)?;
    if settings.probe_interpreter {
        log_interpreter_probe(&paths);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_session(cli, settings, paths))
}

async fn run_session(cli: Cli, settings: AppSettings, paths: SettingsPaths) -> AppResult<()> {
    let ui = Arc::new(ConsoleUi::stdio().with_presets(cli.input, cli.output));
    let controller = SessionController::new(ui, Arc::new(paths), Arc::new(ProcessLauncher), settings);
    let mut states = controller.subscribe();

    let (commands_tx, commands_rx) = mpsc::channel(8);
    commands_tx
        .send(UiCommand::OpenFile)
        .await
        .map_err(|error| AppError::ChannelClosed(error.to_string()))?;
    commands_tx
        .send(UiCommand::Shutdown)
        .await
        .map_err(|error| AppError::ChannelClosed(error.to_string()))?;

    controller.run(commands_rx).await;

    let outcome = *states.borrow_and_update();
    match outcome {
        SessionState::Done => tracing::info!("conversion finished"),
        SessionState::Failed => tracing::warn!("conversion failed"),
        other => tracing::info!(state = other.as_str(), "stopped without a conversion"),
    }
    Ok(())
}

fn app_data_dir() -> AppResult<PathBuf> {
    let base = dirs::data_dir().ok_or_else(|| AppError::NotFound("no data directory for this user".to_string()))?;
    let dir = base.join(APP_DIR_NAME);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn log_interpreter_probe(paths: &SettingsPaths) {
    let executable = match paths.resolve_worker_executable() {
        Ok(executable) => executable,
        Err(error) => {
            tracing::warn!(error = %error, "skipping interpreter probe");
            return;
        }
    };
    match probe_interpreter(&executable, PROBE_TIMEOUT) {
        Ok(reported) => tracing::info!(
            executable = %executable.display(),
            interpreter = %reported,
            "worker interpreter probed"
        ),
        Err(error) => tracing::warn!(
            executable = %executable.display(),
            error = %error,
            "interpreter probe failed"
        ),
    }
}

fn init_tracing(log_dir: &Path) -> AppResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "session.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
