//! Pipeline task management
//!
//! Registers the long-running pipeline tasks, catches their panics and
//! reports the first one to exit so the supervisor can decide what to do.
//!
//! # Task kinds
//!
//! - [`TaskKind::Worker`] - drains the print queue
//! - [`TaskKind::Poller`] - polls the order feed

use crate::core::error::AgentError;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Worker,
    Poller,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Worker => write!(f, "Worker"),
            TaskKind::Poller => write!(f, "Poller"),
        }
    }
}

/// How a task ended
#[derive(Debug)]
pub enum TaskExit {
    /// Returned `Ok(())`, normally after a shutdown request
    Completed { name: &'static str },
    /// Returned an error
    Failed {
        name: &'static str,
        error: AgentError,
    },
    /// Panicked
    Panicked { name: &'static str, message: String },
}

impl TaskExit {
    pub fn name(&self) -> &'static str {
        match self {
            TaskExit::Completed { name }
            | TaskExit::Failed { name, .. }
            | TaskExit::Panicked { name, .. } => name,
        }
    }
}

/// Pipeline task manager
///
/// ```ignore
/// let mut tasks = BackgroundTasks::new(shutdown.child_token());
/// tasks.spawn("order_watcher", TaskKind::Poller, watcher.run(tasks.shutdown_token()));
/// tasks.spawn("print_dispatcher", TaskKind::Worker, dispatcher.run(tasks.shutdown_token()));
///
/// let exit = tasks.wait_any().await;
/// tasks.shutdown(Duration::from_secs(30)).await;
/// ```
pub struct BackgroundTasks {
    tasks: JoinSet<TaskExit>,
    registered: Vec<(&'static str, TaskKind)>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            registered: Vec::new(),
            shutdown,
        }
    }

    /// Token cancelled on shutdown (passed into tasks)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Register and start a task
    ///
    /// The future is wrapped so a panic becomes a [`TaskExit::Panicked`].
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = Result<(), AgentError>> + Send + 'static,
    {
        let wrapped_future = async move {
            let result = AssertUnwindSafe(future).catch_unwind().await;
            match result {
                Ok(Ok(())) => TaskExit::Completed { name },
                Ok(Err(error)) => {
                    tracing::error!(task = %name, kind = %kind, error = %error, "Pipeline task failed");
                    TaskExit::Failed { name, error }
                }
                Err(panic_info) => {
                    let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    tracing::error!(task = %name, kind = %kind, panic = %message, "Pipeline task panicked");
                    TaskExit::Panicked { name, message }
                }
            }
        };

        self.tasks.spawn(wrapped_future);
        tracing::debug!(task = %name, kind = %kind, "Registered pipeline task");
        self.registered.push((name, kind));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn log_summary(&self) {
        let names: Vec<String> = self
            .registered
            .iter()
            .map(|(name, kind)| format!("{name} ({kind})"))
            .collect();
        tracing::info!("Pipeline tasks registered: {}", names.join(", "));
    }

    /// Wait for the first task to exit
    ///
    /// Returns `None` when no tasks are left.
    pub async fn wait_any(&mut self) -> Option<TaskExit> {
        loop {
            match self.tasks.join_next().await? {
                Ok(exit) => return Some(exit),
                // Aborted by shutdown(); keep waiting on the rest
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    return Some(TaskExit::Panicked {
                        name: "unknown",
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Cancel all tasks and wait for them to finish
    ///
    /// Tasks still running after `grace` are aborted.
    pub async fn shutdown(mut self, grace: Duration) {
        tracing::info!("Shutting down {} pipeline tasks...", self.tasks.len());
        self.shutdown.cancel();

        let drain = async {
            while let Some(result) = self.tasks.join_next().await {
                match result {
                    Ok(exit) => tracing::debug!(task = %exit.name(), "Task stopped"),
                    Err(e) => tracing::error!(error = ?e, "Task join failed"),
                }
            }
        };

        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!("Pipeline tasks did not stop within {:?}, aborting", grace);
            self.tasks.abort_all();
        }

        tracing::info!("All pipeline tasks stopped");
    }
}
