//! Service assembly, the control address lock and the foreground host loop.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use filetask_api::{ApiServer, AppState};
use filetask_config::{ApiConfig, Config, CronTimezone, LoggingConfig};
use filetask_engine::{ScheduleTimezone, TaskOrchestrator};
use filetask_store::{
    FileHistoryStore, InvalidStrmStore, MemoryStore, SqliteStore, TaskLogStore, TaskStore,
};
use filetask_worker::{StrmChecker, StrmWorkUnit, WorkerSettings};
use tokio::net::TcpListener;

/// Initialize tracing with console and rolling file output.
///
/// Console output goes to stderr so command results on stdout stay clean.
pub(crate) fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("failed to create log directory {}", config.dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("filetask")
        .filename_suffix("log")
        .max_log_files(config.max_files)
        .build(&config.dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer flushes on drop, so the guard lives for the whole process.
    static GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(config.ansi)
                .with_writer(std::io::stderr),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// The engine wired over one store, plus the stores the control API reads
/// directly.
pub(crate) struct Service {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub history: Arc<dyn FileHistoryStore>,
    pub invalid: Arc<dyn InvalidStrmStore>,
    pub checker: Arc<StrmChecker>,
}

impl Service {
    /// Open the configured store and wire the engine over it.
    pub(crate) async fn open(config: &Config, in_memory: bool) -> anyhow::Result<Self> {
        if in_memory {
            info!("Using in-memory store");
            return Ok(Self::assemble(Arc::new(MemoryStore::new()), config));
        }
        let path = &config.storage.db_path;
        let store = SqliteStore::open(path)
            .await
            .with_context(|| format!("failed to open database {}", path.display()))?;
        info!(path = %path.display(), "Opened task database");
        Ok(Self::assemble(Arc::new(store), config))
    }

    fn assemble<S>(store: Arc<S>, config: &Config) -> Self
    where
        S: TaskStore + TaskLogStore + FileHistoryStore + InvalidStrmStore + 'static,
    {
        let history: Arc<dyn FileHistoryStore> = store.clone();
        let invalid: Arc<dyn InvalidStrmStore> = store.clone();
        let checker = Arc::new(StrmChecker::new(history.clone(), invalid.clone()));

        let mut work_unit = StrmWorkUnit::new(history.clone(), WorkerSettings::from(&config.worker));
        if config.worker.check_after_run {
            work_unit = work_unit.with_checker(checker.clone());
        }
        let zone = match config.scheduler.timezone {
            CronTimezone::Local => ScheduleTimezone::Local,
            CronTimezone::Utc => ScheduleTimezone::Utc,
        };
        let orchestrator = TaskOrchestrator::new(store.clone(), store, Arc::new(work_unit))
            .with_schedule_timezone(zone);
        Self {
            orchestrator: Arc::new(orchestrator),
            history,
            invalid,
            checker,
        }
    }

    pub(crate) fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(
            self.orchestrator.clone(),
            self.history.clone(),
            self.invalid.clone(),
            self.checker.clone(),
        ))
    }

    /// Reconcile state left by a previous host. Only safe while holding the
    /// control address.
    pub(crate) async fn recover(&self) -> anyhow::Result<()> {
        let report = self.orchestrator.recover().await?;
        if !report.is_clean() {
            warn!(
                tasks_reset = report.tasks_reset,
                logs_closed = report.logs_closed,
                logs_created = report.logs_created,
                "Recovered state from an interrupted run"
            );
        }
        Ok(())
    }

    /// Stop the engine, then the control API in front of it.
    pub(crate) async fn shutdown(&self, api: ApiServer, timeout_secs: u64) {
        if !self
            .orchestrator
            .shutdown(Duration::from_secs(timeout_secs))
            .await
        {
            warn!(timeout_secs, "Jobs still running after shutdown timeout");
        }
        api.stop().await;
    }
}

/// Bind the control address. Whoever holds it hosts the engine.
pub(crate) async fn bind_control(config: &ApiConfig) -> std::io::Result<TcpListener> {
    TcpListener::bind(config.addr()).await
}

/// Run the scheduler and the control API in the foreground until SIGINT
/// or SIGTERM.
pub(crate) async fn run_foreground(config: &Config, in_memory: bool) -> anyhow::Result<()> {
    info!("Starting filetask v{}", env!("CARGO_PKG_VERSION"));

    let addr = config.api.addr();
    let listener = bind_control(&config.api).await.with_context(|| {
        format!(
            "cannot bind {}; another filetask process already hosts the engine",
            addr
        )
    })?;

    let service = Service::open(config, in_memory).await?;
    service.recover().await?;

    if config.scheduler.enabled {
        let armed = service.orchestrator.load_schedules().await?;
        info!(armed, timezone = ?config.scheduler.timezone, "Scheduler running");
    } else {
        info!("Scheduler disabled by configuration; only manual runs are possible");
    }

    let api = ApiServer::start(listener, service.app_state())?;

    wait_for_shutdown_signal().await?;

    info!("Shutting down...");
    service.shutdown(api, config.queue.shutdown_timeout_secs).await;
    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C");
    Ok(())
}
