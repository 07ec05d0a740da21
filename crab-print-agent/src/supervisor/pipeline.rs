//! Service Supervisor
//!
//! Runs the watcher → dispatcher pipeline and restarts it when it crashes.
//!
//! | Pipeline exit | Supervisor |
//! |---------------|------------|
//! | shutdown requested | returns `Ok` |
//! | configuration error | returns the error, no restart |
//! | panic or other error | waits `delay`, restarts while the budget lasts |

use super::restart::{RestartPolicy, RestartTracker};
use super::service::ServiceError;
use crate::client::{HttpOrderFeed, OrderFeed};
use crate::core::{
    AgentError, AgentResult, AgentSettings, BackgroundTasks, ConfigError, ConfigStore, TaskExit,
    TaskKind,
};
use crate::printing::{JobQueue, PrintDispatcher};
use crate::watcher::{CursorStore, OrderWatcher};
use crab_printer::{PrintError, Printer, PrinterTarget};
use shared::LocationConfig;
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long a stopping pipeline may take to finish an in-flight print
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// How one pipeline run ended
#[derive(Debug)]
enum PipelineExit {
    Stopped,
    Fatal(AgentError),
    Crashed(String),
}

pub struct Supervisor {
    config: LocationConfig,
    settings: AgentSettings,
    feed: Arc<dyn OrderFeed>,
    printer: Arc<dyn Printer>,
    queue: JobQueue,
    tracker: RestartTracker,
}

impl Supervisor {
    /// Load the location config and build the real feed and printer
    ///
    /// Fails with a configuration error before anything starts.
    pub fn load(settings: AgentSettings) -> AgentResult<Self> {
        let config = ConfigStore::new(&settings.work_dir).load()?;

        let feed = HttpOrderFeed::new(
            &config.server_url,
            &config.location_id,
            settings.request_timeout(),
        )?;
        let printer = PrinterTarget::parse(&config.printer_name)
            .map_err(|e| match e {
                PrintError::InvalidConfig(msg) => AgentError::from(ConfigError::Invalid(msg)),
                other => AgentError::from(other),
            })?
            .open(settings.request_timeout());

        Self::new(config, settings, Arc::new(feed), printer)
    }

    /// Build with explicit feed and printer
    pub fn new(
        config: LocationConfig,
        settings: AgentSettings,
        feed: Arc<dyn OrderFeed>,
        printer: Arc<dyn Printer>,
    ) -> AgentResult<Self> {
        let queue = JobQueue::open(settings.queue_db())?;
        let tracker = RestartTracker::new(RestartPolicy::from_settings(&settings));
        Ok(Self {
            config,
            settings,
            feed,
            printer,
            queue,
            tracker,
        })
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Run until shutdown, a configuration error or an exhausted restart budget
    pub async fn run(mut self, shutdown: CancellationToken) -> AgentResult<()> {
        let cutoff = now_millis() - self.settings.printed_retention().as_millis() as i64;
        let purged = self.queue.purge_printed(cutoff)?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired printed marks");
        }

        tracing::info!(
            location_id = %self.config.location_id,
            location_name = %self.config.location_name,
            printer = %self.printer.describe(),
            "Print agent supervisor started"
        );

        loop {
            match self.run_pipeline(&shutdown).await {
                PipelineExit::Stopped => {
                    tracing::info!("Print agent stopped");
                    return Ok(());
                }
                PipelineExit::Fatal(error) => {
                    tracing::error!(
                        location_id = %self.config.location_id,
                        error = %error,
                        "Configuration error, not restarting"
                    );
                    return Err(error);
                }
                PipelineExit::Crashed(reason) => {
                    let policy = *self.tracker.policy();
                    if !self.tracker.try_restart(Instant::now()) {
                        tracing::error!(
                            restarts = self.tracker.count(),
                            window_secs = policy.window.as_secs(),
                            reason = %reason,
                            "Restart budget exhausted"
                        );
                        return Err(ServiceError::RestartBudgetExceeded {
                            restarts: self.tracker.count(),
                            window: policy.window,
                        }
                        .into());
                    }

                    tracing::warn!(
                        location_id = %self.config.location_id,
                        restart = self.tracker.count(),
                        max_restarts = policy.max_restarts,
                        delay_ms = policy.delay.as_millis() as u64,
                        reason = %reason,
                        "Pipeline crashed, restarting"
                    );

                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(policy.delay) => {}
                    }
                }
            }
        }
    }

    async fn run_pipeline(&self, shutdown: &CancellationToken) -> PipelineExit {
        let watcher = match OrderWatcher::new(
            self.feed.clone(),
            self.queue.clone(),
            CursorStore::new(self.settings.cursor_file()),
            &self.config.location_id,
            Duration::from_millis(self.config.poll_interval_ms),
            self.settings.poll_backoff_max(),
        ) {
            Ok(watcher) => watcher,
            Err(e) if e.is_config() => return PipelineExit::Fatal(e),
            Err(e) => return PipelineExit::Crashed(e.to_string()),
        };

        let dispatcher = PrintDispatcher::new(
            self.queue.clone(),
            self.printer.clone(),
            self.feed.clone(),
            &self.config.location_id,
            &self.config.location_name,
            &self.settings,
        );

        let mut tasks = BackgroundTasks::new(shutdown.child_token());
        tasks.spawn("order_watcher", TaskKind::Poller, watcher.run(tasks.shutdown_token()));
        tasks.spawn(
            "print_dispatcher",
            TaskKind::Worker,
            dispatcher.run(tasks.shutdown_token()),
        );
        tasks.log_summary();

        let exit = tasks.wait_any().await;
        tasks.shutdown(SHUTDOWN_GRACE).await;

        match exit {
            Some(TaskExit::Failed { error, .. }) if error.is_config() => PipelineExit::Fatal(error),
            Some(TaskExit::Failed { name, error }) => PipelineExit::Crashed(format!("{name}: {error}")),
            Some(TaskExit::Panicked { name, message }) => {
                PipelineExit::Crashed(format!("{name} panicked: {message}"))
            }
            Some(TaskExit::Completed { name }) if !shutdown.is_cancelled() => {
                PipelineExit::Crashed(format!("{name} exited unexpectedly"))
            }
            _ => PipelineExit::Stopped,
        }
    }
}
