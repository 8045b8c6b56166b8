use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use tidewatch_core::config;
use tidewatch_reconcile::{Credentials, Reconciler, RepoStateStore};

use crate::error::{io_err, DaemonError};
use crate::paths::{DEFAULT_MAX_BACKOFF, INITIAL_BACKOFF};

/// Startup-only settings of the loop. Everything else is re-read from the
/// config file at the start of each cycle.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub config_path: PathBuf,
    /// Ceiling for the config-error back-off.
    pub max_backoff: Duration,
}

impl LoopSettings {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Counters returned when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Cycles that loaded a config and walked the repositories.
    pub cycles: u64,
    pub config_errors: u64,
    pub repo_failures: u64,
}

/// Doubling delay between failed config loads, reset by a successful one.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns twice as much, capped.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Start the loop and block the current thread until a termination signal.
pub fn start_blocking(reconciler: Reconciler, settings: LoopSettings) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(Arc::new(reconciler), settings))
}

/// Run the loop until SIGINT or SIGTERM.
pub async fn run(reconciler: Arc<Reconciler>, settings: LoopSettings) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let stop = Arc::new(AtomicBool::new(false));

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let stop = stop.clone();
        tokio::spawn(async move { signal_task(shutdown, stop).await })
    };

    tracing::info!(
        config = %settings.config_path.display(),
        detection = reconciler.strategy_name(),
        builder = reconciler.tool_name(),
        "tidewatch started",
    );

    let loop_result = reconcile_loop(reconciler, settings, stop, shutdown_tx.subscribe()).await;
    let _ = shutdown_tx.send(());
    handle_join("signal_handler", signal_handle.await)?;

    let stats = loop_result?;
    tracing::info!(
        cycles = stats.cycles,
        config_errors = stats.config_errors,
        repo_failures = stats.repo_failures,
        "tidewatch stopped",
    );
    Ok(())
}

/// The reconciliation loop proper.
///
/// Each iteration reloads the config, then runs one cycle on the blocking
/// pool with the state store moved in and handed back. A config error backs
/// off and retries; only `shutdown` (or `stop`) ends the loop.
pub async fn reconcile_loop(
    reconciler: Arc<Reconciler>,
    settings: LoopSettings,
    stop: Arc<AtomicBool>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<LoopStats, DaemonError> {
    let mut store = RepoStateStore::new();
    let mut backoff = Backoff::new(INITIAL_BACKOFF, settings.max_backoff);
    let mut stats = LoopStats::default();

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let cycle = {
            let reconciler = reconciler.clone();
            let stop = stop.clone();
            let path = settings.config_path.clone();
            tokio::task::spawn_blocking(move || {
                let loaded = config::load_at(&path).map(|config| {
                    let credentials = Credentials::from_env();
                    let report =
                        reconciler.run_cycle(&config, credentials.as_ref(), &mut store, &stop);
                    (config.interval(), report)
                });
                (store, loaded)
            })
            .await
        };

        let delay = match cycle {
            Ok((returned, Ok((interval, report)))) => {
                store = returned;
                backoff.reset();
                stats.cycles += 1;
                stats.repo_failures += report.failed() as u64;
                if report.interrupted {
                    break;
                }
                tracing::debug!(seconds = interval.as_secs(), tracked = store.len(), "sleeping until next cycle");
                interval
            }
            Ok((returned, Err(err))) => {
                store = returned;
                stats.config_errors += 1;
                let delay = backoff.next_delay();
                tracing::error!(error = %err, retry_in_secs = delay.as_secs(), "config load failed; retrying");
                delay
            }
            Err(err) => {
                // The store went down with the task; every repo rebuilds once.
                store = RepoStateStore::new();
                let delay = backoff.next_delay();
                tracing::error!(error = %err, retry_in_secs = delay.as_secs(), "reconciliation cycle panicked; retrying");
                delay
            }
        };

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    Ok(stats)
}

async fn signal_task(
    shutdown: broadcast::Sender<()>,
    stop: Arc<AtomicBool>,
) -> Result<(), DaemonError> {
    let mut shutdown_rx = shutdown.subscribe();
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        signal = wait_for_signal() => match signal {
            Ok(name) => {
                tracing::info!(signal = name, "received termination signal; finishing current repository");
                stop.store(true, Ordering::SeqCst);
                let _ = shutdown.send(());
                Ok(())
            }
            Err(err) => Err(DaemonError::Signal(err)),
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::TaskJoin {
            task,
            reason: err.to_string(),
        }),
    }
}
