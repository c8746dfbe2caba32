use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use procwatch_daemon::{
    collector::{LinuxProcessCollector, ProcessCollector},
    commands::{CommandHandler, PollCursor},
    config::{Config, TOKEN_ENV},
    db::Store,
    detector::ChangeDetector,
    notifier::Notifier,
    pipeline,
    state::StateManager,
    transport::{BotApi, Transport},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Watches the process table and alerts chat recipients about new processes
#[derive(Parser)]
#[command(name = "procwatchd")]
struct Cli {
    /// Config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Where the state database lives
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

struct DaemonState {
    collector: Arc<LinuxProcessCollector>,
    state: Arc<StateManager>,
    notifier: Arc<Notifier>,
    config: Config,
}

async fn monitoring_loop(daemon: Arc<DaemonState>, mut detector: ChangeDetector) {
    let general = &daemon.config.general;
    let mut interval = tokio::time::interval(general.sample_interval());
    let mut last_stats_save = Instant::now();

    loop {
        interval.tick().await;

        // Per-process CPU sampling blocks
        let collector = Arc::clone(&daemon.collector);
        let sampled = tokio::task::spawn_blocking(move || {
            let appeared = detector.detect(collector.as_ref());
            (detector, appeared)
        })
        .await;
        let appeared = match sampled {
            Ok((returned, appeared)) => {
                detector = returned;
                appeared
            }
            Err(e) => {
                error!("Sampling task failed: {}", e);
                // Detector state was lost with the task; start over from the live table
                detector = ChangeDetector::primed(daemon.collector.list_pids());
                continue;
            }
        };

        if !appeared.is_empty() {
            let report =
                pipeline::route_appeared(&daemon.state, &daemon.notifier, &appeared, Local::now())
                    .await;
            info!(
                appeared = appeared.len(),
                queued = report.queued,
                sent = report.sent,
                suppressed = report.suppressed,
                failed = report.failed,
                "New processes"
            );
        }

        if last_stats_save.elapsed() >= general.stats_save_interval() {
            daemon.state.save_stats().await;
            last_stats_save = Instant::now();
        }
    }
}

async fn flush_loop(daemon: Arc<DaemonState>) {
    let mut interval = tokio::time::interval(daemon.config.general.flush_interval());
    loop {
        interval.tick().await;
        let report = pipeline::flush_pending(&daemon.state, &daemon.notifier, Local::now()).await;
        if report != Default::default() {
            info!(
                sent = report.sent,
                suppressed = report.suppressed,
                failed = report.failed,
                "Flushed pending notifications"
            );
        }
    }
}

async fn command_loop(daemon: Arc<DaemonState>) {
    let handler = CommandHandler::new(Arc::clone(&daemon.state), Arc::clone(&daemon.notifier));
    let mut cursor = PollCursor::new();
    info!("Command listener started");

    loop {
        match daemon.notifier.transport().poll(cursor.next_offset()).await {
            Ok(updates) => {
                for update in &updates {
                    handler.handle_update(update).await;
                }
                cursor.advance(&updates);
                tokio::time::sleep(daemon.config.general.poll_interval()).await;
            }
            Err(e) => {
                warn!("Polling for updates failed: {}", e);
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        // An explicitly named file must be readable
        Some(path) => Config::load(path)?,
        None => {
            let config_path = Config::config_path();
            if config_path.exists() {
                Config::load(&config_path).unwrap_or_else(|e| {
                    warn!("Failed to load config: {:#}, using defaults", e);
                    Config::default()
                })
            } else {
                info!("No config file found, using defaults");
                Config::default()
            }
        }
    };
    if let Some(dir) = &cli.data_dir {
        config.general.data_dir = Some(dir.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("procwatch daemon starting...");

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let Some(token) = config.telegram.resolve_token() else {
        bail!("no bot token: set {} or telegram.token in the config file", TOKEN_ENV);
    };

    let db_path = config.database_path();
    let store = Store::open(&db_path)
        .with_context(|| format!("opening state database {}", db_path.display()))?;
    let state = Arc::new(StateManager::load(
        store,
        config.defaults.clone(),
        &config.filter.system_processes,
    ));

    let transport: Arc<dyn Transport> = Arc::new(BotApi::new(
        &config.telegram.api_base,
        &token,
        config.telegram.send_timeout(),
        config.telegram.poll_timeout(),
    ));
    let notifier = Arc::new(Notifier::new(transport));

    let collector = Arc::new(LinuxProcessCollector::new(config.general.cpu_window()));
    let detector = ChangeDetector::primed(collector.list_pids());
    info!(known = detector.known().len(), "Initial process table recorded");

    let daemon = Arc::new(DaemonState {
        collector,
        state: Arc::clone(&state),
        notifier,
        config,
    });

    tokio::spawn(command_loop(Arc::clone(&daemon)));
    tokio::spawn(flush_loop(Arc::clone(&daemon)));
    tokio::spawn(monitoring_loop(Arc::clone(&daemon), detector));

    info!("Daemon ready, monitoring processes");
    shutdown_signal().await;

    info!("Shutting down, saving state");
    state.save_all().await;
    info!("State saved");
    Ok(())
}
