//! Print Dispatcher
//!
//! Drains the job queue one job at a time, strictly FIFO:
//!
//! 1. pick up reprint requests from the spool
//! 2. take the head job; wait if it is backing off
//! 3. resolve the template, render, mark `Printing`, send to the printer
//! 4. `Done` → printed mark + best-effort acknowledgement;
//!    retryable failure → `Failed` with a backoff deadline or dead letter;
//!    non-retryable failure → dead letter

use super::dead_letter::{DeadLetterLog, ReprintSpool};
use super::encoder::{encode, logo_width_dots};
use super::renderer::ReceiptRenderer;
use super::storage::{EnqueueOutcome, JobQueue};
use super::types::{DeadLetter, DeadLetterReason, JobState, LineKind, PrintJob, ReceiptDocument};
use crate::client::{FeedError, OrderFeed, TemplateCache};
use crate::core::{AgentError, AgentResult, AgentSettings, Backoff, ErrorClass};
use crab_printer::{Charset, Printer};
use shared::Order;
use shared::util::now_millis;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often an idle dispatcher looks at the reprint spool
const IDLE_TICK: Duration = Duration::from_secs(2);

/// Outcome of one delivery attempt
#[derive(Debug)]
pub enum Attempt {
    Success,
    /// Printer or network trouble; try again later
    Retryable(AgentError),
    /// The job can never print as-is
    NonRetryable(AgentError),
}

/// What one [`PrintDispatcher::drain_once`] call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStep {
    /// Queue empty
    Idle,
    /// Head job is backing off for this long
    Waiting(Duration),
    /// Head job attempted; `state` is where it ended up
    Processed { order_number: u64, state: JobState },
}

/// Retry policy for printer failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            max_retries: settings.print_max_retries.max(1),
            base: settings.print_retry_base(),
            max: settings.print_retry_max(),
        }
    }

    /// Delay after the `attempts`-th failure
    pub fn delay_for(&self, attempts: u32) -> Duration {
        Backoff::delay_for(self.base, self.max, attempts)
    }
}

pub struct PrintDispatcher {
    queue: JobQueue,
    printer: Arc<dyn Printer>,
    feed: Arc<dyn OrderFeed>,
    templates: TemplateCache,
    renderer: ReceiptRenderer,
    dead_letters: DeadLetterLog,
    reprints: ReprintSpool,
    location_id: String,
    charset: Charset,
    policy: RetryPolicy,
    /// (url, width) -> raster, `None` when the logo cannot be printed
    logos: HashMap<(String, u32), Option<Vec<u8>>>,
}

impl PrintDispatcher {
    pub fn new(
        queue: JobQueue,
        printer: Arc<dyn Printer>,
        feed: Arc<dyn OrderFeed>,
        location_id: impl Into<String>,
        location_name: impl Into<String>,
        settings: &AgentSettings,
    ) -> Self {
        Self {
            queue,
            printer,
            templates: TemplateCache::new(feed.clone()),
            feed,
            renderer: ReceiptRenderer::new(location_name),
            dead_letters: DeadLetterLog::new(settings.dead_letter_file()),
            reprints: ReprintSpool::new(settings.reprint_dir()),
            location_id: location_id.into(),
            charset: settings.printer_charset,
            policy: RetryPolicy::from_settings(settings),
            logos: HashMap::new(),
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Enqueue an order (idempotent on order number)
    pub fn enqueue(&self, order: Order) -> AgentResult<EnqueueOutcome> {
        Ok(self.queue.enqueue(order, now_millis())?)
    }

    /// Run until shutdown
    ///
    /// Shutdown is only observed between jobs, so an in-flight print always
    /// completes.
    pub async fn run(mut self, shutdown: CancellationToken) -> AgentResult<()> {
        let recovered = self.queue.recover_printing()?;
        tracing::info!(
            location_id = %self.location_id,
            printer = %self.printer.describe(),
            recovered,
            "Print dispatcher started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.drain_once().await? {
                DrainStep::Processed { .. } => continue,
                DrainStep::Idle => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.queue.changed() => {}
                        _ = tokio::time::sleep(IDLE_TICK) => {}
                    }
                }
                DrainStep::Waiting(delay) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!("Print dispatcher stopped");
        Ok(())
    }

    /// Attempt the head job once
    ///
    /// Errors returned here stop the dispatcher: configuration errors
    /// (location unknown to the server) and local storage failures.
    pub async fn drain_once(&mut self) -> AgentResult<DrainStep> {
        self.take_reprint_requests()?;

        let Some(mut job) = self.queue.head()? else {
            return Ok(DrainStep::Idle);
        };

        let now = now_millis();
        if job.not_before > now {
            // A deadline past the cap means the wall clock moved back
            let cap = self.policy.max.as_millis() as i64;
            if job.not_before - now > cap {
                tracing::warn!(
                    order_number = job.order_number(),
                    location_id = %self.location_id,
                    behind_ms = job.not_before - now - cap,
                    "Retry deadline beyond backoff cap, clamping"
                );
                job.not_before = now + cap;
                self.queue.save(&job)?;
            }
            return Ok(DrainStep::Waiting(Duration::from_millis(
                (job.not_before - now) as u64,
            )));
        }

        if job.state == JobState::Failed {
            job.state = JobState::Queued;
            self.queue.save(&job)?;
        }

        let attempt = self.attempt(&mut job).await?;
        let order_number = job.order_number();

        let state = match attempt {
            Attempt::Success => {
                self.queue.complete(job.seq, now_millis())?;
                tracing::info!(
                    order_number,
                    location_id = %self.location_id,
                    attempt = job.attempts + 1,
                    "Receipt printed"
                );
                self.acknowledge(order_number).await;
                JobState::Done
            }
            Attempt::Retryable(error) => self.record_failure(job, error)?,
            Attempt::NonRetryable(error) => {
                job.attempts += 1;
                job.last_error = Some(error.to_string());
                self.dead_letter(job, DeadLetterReason::RenderFailed)?;
                JobState::DeadLettered
            }
        };

        Ok(DrainStep::Processed {
            order_number,
            state,
        })
    }

    /// Resolve, render and print one job
    async fn attempt(&mut self, job: &mut PrintJob) -> AgentResult<Attempt> {
        let template = match self.templates.resolve().await {
            Ok(template) => template,
            Err(e) => return classify_feed_error(e),
        };
        job.template = Some((*template).clone());

        let doc = match self.renderer.render(&job.order, &template) {
            Ok(doc) => doc,
            Err(e) => return Ok(Attempt::NonRetryable(e.into())),
        };

        job.state = JobState::Printing;
        self.queue.save(job)?;

        let logo = self.logo_for(&doc).await;
        let bytes = encode(&doc, self.charset, logo.as_deref());

        tracing::debug!(
            order_number = job.order_number(),
            location_id = %self.location_id,
            attempt = job.attempts + 1,
            bytes = bytes.len(),
            "Sending receipt to printer"
        );

        match self.printer.print(&bytes).await {
            Ok(()) => Ok(Attempt::Success),
            Err(e) => Ok(Attempt::Retryable(e.into())),
        }
    }

    fn record_failure(&self, mut job: PrintJob, error: AgentError) -> AgentResult<JobState> {
        job.attempts += 1;
        job.last_error = Some(error.to_string());

        if job.attempts >= self.policy.max_retries {
            self.dead_letter(job, DeadLetterReason::RetriesExhausted)?;
            return Ok(JobState::DeadLettered);
        }

        let delay = self.policy.delay_for(job.attempts);
        job.state = JobState::Failed;
        job.not_before = now_millis() + delay.as_millis() as i64;
        tracing::warn!(
            order_number = job.order_number(),
            location_id = %self.location_id,
            attempt = job.attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "Print attempt failed"
        );
        self.queue.save(&job)?;
        Ok(JobState::Failed)
    }

    /// Park a job in the dead-letter log, then drop it from the queue
    fn dead_letter(&self, job: PrintJob, reason: DeadLetterReason) -> AgentResult<()> {
        let last_error = job.last_error.clone().unwrap_or_default();
        tracing::error!(
            order_number = job.order_number(),
            location_id = %self.location_id,
            attempt = job.attempts,
            reason = %reason,
            error = %last_error,
            "Print job dead-lettered"
        );

        let record = DeadLetter {
            order: job.order,
            template: job.template,
            attempts: job.attempts,
            reason,
            last_error,
            location_id: self.location_id.clone(),
            dead_lettered_at: now_millis(),
        };
        self.dead_letters.append(&record)?;
        self.queue.remove(job.seq)?;
        Ok(())
    }

    fn take_reprint_requests(&self) -> AgentResult<()> {
        for (path, order) in self.reprints.pending()? {
            let order_number = order.order_number;
            let outcome = self.enqueue(order)?;
            tracing::info!(order_number, outcome = ?outcome, "Reprint request picked up");
            self.reprints.done(&path)?;
        }
        Ok(())
    }

    async fn acknowledge(&self, order_number: u64) {
        if let Err(e) = self.feed.acknowledge(order_number).await {
            tracing::warn!(
                order_number,
                location_id = %self.location_id,
                error = %e,
                "Print acknowledgement failed"
            );
        }
    }

    /// Raster for the document's logo line
    ///
    /// Failures only cost the logo; a transient download failure is
    /// retried on the next receipt.
    async fn logo_for(&mut self, doc: &ReceiptDocument) -> Option<Vec<u8>> {
        let url = doc.lines.iter().find_map(|l| match &l.kind {
            LineKind::Logo(url) => Some(url.clone()),
            _ => None,
        })?;
        let width = logo_width_dots(doc);
        let key = (url, width);

        if let Some(cached) = self.logos.get(&key) {
            return cached.clone();
        }

        match self.feed.fetch_logo(&key.0).await {
            Ok(bytes) => {
                let raster = crab_printer::rasterize_logo(&bytes, width);
                if raster.is_none() {
                    tracing::warn!(url = %key.0, "Logo could not be decoded, printing without it");
                }
                self.logos.insert(key, raster.clone());
                raster
            }
            Err(e) if e.class() == ErrorClass::Transient => {
                tracing::warn!(url = %key.0, error = %e, "Logo download failed");
                None
            }
            Err(e) => {
                tracing::warn!(url = %key.0, error = %e, "Logo unavailable, printing without it");
                self.logos.insert(key, None);
                None
            }
        }
    }
}

/// Template fetch failures inside a job
fn classify_feed_error(e: FeedError) -> AgentResult<Attempt> {
    match e.class() {
        ErrorClass::Config => Err(e.into()),
        ErrorClass::Transient => Ok(Attempt::Retryable(e.into())),
        ErrorClass::Data => Ok(Attempt::NonRetryable(e.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_is_geometric_and_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base: Duration::from_secs(2),
            max: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
    }

    #[test]
    fn test_feed_error_classification() {
        let fatal = FeedError::Fatal {
            status: 404,
            url: "http://central/api".into(),
        };
        assert!(classify_feed_error(fatal).is_err());

        let timeout = FeedError::Timeout("10s".into());
        assert!(matches!(
            classify_feed_error(timeout),
            Ok(Attempt::Retryable(_))
        ));

        let malformed = FeedError::InvalidResponse("bad template".into());
        assert!(matches!(
            classify_feed_error(malformed),
            Ok(Attempt::NonRetryable(_))
        ));
    }
}
