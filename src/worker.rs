//! Per-topic worker harness. Each topic gets one puller task with its own
//! concurrency budget; a claimed job runs to completion in one handler
//! invocation, under the topic's timeout. Handler failure hands the job
//! back to the queue's retry policy.

use crate::config::Config;
use crate::engine::RuleEngine;
use crate::error::{EngineError, EngineResult};
use crate::hash;
use crate::notify::{EmailSink, NotificationSink};
use crate::processor::{Effect, ViolationProcessor};
use crate::queue::{Job, JobQueue, Topic};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// What caused a fraud check to be enqueued. Carried in the payload for the
/// audit log; the evaluation itself does not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggeredBy {
    Create,
    Update,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FraudJobPayload {
    listing_id: String,
    triggered_by: TriggeredBy,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageJobPayload {
    listing_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmailJobPayload {
    to: String,
    subject: String,
    html: String,
}

/// The trigger interface the listing service calls on create/update of a
/// listing's fraud-relevant fields.
pub fn enqueue_fraud_detection(
    queue: &JobQueue,
    config: &Config,
    listing_id: &str,
    triggered_by: TriggeredBy,
) -> EngineResult<i64> {
    let payload = serde_json::to_value(FraudJobPayload {
        listing_id: listing_id.to_string(),
        triggered_by,
    })?;
    queue.enqueue(
        Topic::FraudDetection,
        &payload,
        config.topics.fraud_detection.max_attempts,
    )
}

pub struct Worker {
    config: Config,
    store: Store,
    queue: JobQueue,
    engine: RuleEngine,
    processor: ViolationProcessor,
    notifications: NotificationSink,
    email_sink: Arc<dyn EmailSink>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        config: Config,
        store: Store,
        queue: JobQueue,
        email_sink: Arc<dyn EmailSink>,
    ) -> Self {
        Worker {
            engine: RuleEngine::new(store.clone()),
            processor: ViolationProcessor::new(store.clone()),
            notifications: NotificationSink::new(store.clone()),
            config,
            store,
            queue,
            email_sink,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag the loops to stop after their current job.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run all topic workers until shutdown is flagged.
    pub async fn run(self: Arc<Self>) {
        if let Err(e) = self.queue.recover_stale(self.config.stale_job_secs as i64) {
            log::error!("Stale-job recovery failed: {e}");
        }

        let mut handles = Vec::new();
        // Periodic sweep for jobs orphaned by a worker that died mid-run.
        {
            let worker = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                let every = Duration::from_secs((worker.config.stale_job_secs / 2).max(1));
                let tick = Duration::from_millis(200);
                let mut slept = Duration::ZERO;
                while !worker.shutdown.load(Ordering::Relaxed) {
                    tokio::time::sleep(tick).await;
                    slept += tick;
                    if slept < every {
                        continue;
                    }
                    slept = Duration::ZERO;
                    if let Err(e) = worker
                        .queue
                        .recover_stale(worker.config.stale_job_secs as i64)
                    {
                        log::error!("Stale-job recovery failed: {e}");
                    }
                }
            }));
        }
        for topic in Topic::ALL {
            let worker = Arc::clone(&self);
            handles.push(tokio::spawn(worker.topic_loop(topic)));
        }
        for handle in handles {
            let _ = handle.await;
        }
        log::info!("All topic workers stopped");
    }

    async fn topic_loop(self: Arc<Self>, topic: Topic) {
        let settings = self.config.settings_for(topic).clone();
        let semaphore = Arc::new(Semaphore::new(settings.concurrency));
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        // Dispatch gap keeping the email topic under the provider cap.
        let dispatch_gap = if topic == Topic::EmailNotification {
            Some(Duration::from_millis(
                1000 / self.config.emails_per_second.max(1) as u64,
            ))
        } else {
            None
        };
        log::info!(
            "Worker for '{topic}' started (concurrency {}, timeout {}s)",
            settings.concurrency,
            settings.timeout_seconds
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            // Long jobs can hold every permit; keep checking the shutdown
            // flag instead of parking on the semaphore.
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = tokio::time::sleep(poll_interval) => continue,
            };
            let job = match self.queue.claim(topic) {
                Ok(Some(job)) => job,
                Ok(None) => {
                    drop(permit);
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
                Err(e) => {
                    drop(permit);
                    log::error!("Claim on '{topic}' failed: {e}");
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            };

            let worker = Arc::clone(&self);
            let timeout = Duration::from_secs(settings.timeout_seconds);
            tokio::spawn(async move {
                worker.run_job(topic, job, timeout).await;
                drop(permit);
            });

            if let Some(gap) = dispatch_gap {
                tokio::time::sleep(gap).await;
            }
        }
        // In-flight jobs hand their permits back when they finish; wait for
        // all of them so nothing is left 'active' for stale recovery.
        let _ = Arc::clone(&semaphore)
            .acquire_many_owned(settings.concurrency as u32)
            .await;
        log::info!("Worker for '{topic}' stopping");
    }

    async fn run_job(&self, topic: Topic, job: Job, timeout: Duration) {
        let job_id = job.id;
        let outcome = tokio::time::timeout(timeout, self.handle(topic, &job)).await;
        let result = match outcome {
            Ok(Ok(())) => self.queue.complete(job_id),
            Ok(Err(e)) => self.queue.fail(job_id, &e.to_string()),
            Err(_) => self
                .queue
                .fail(job_id, &format!("timed out after {}s", timeout.as_secs())),
        };
        if let Err(e) = result {
            // The job stays 'active' and comes back via stale recovery.
            log::error!("Failed to record outcome of job {job_id} on '{topic}': {e}");
        }
    }

    /// Process every currently-due job on a topic inline. Used by the CLI
    /// and tests; the daemon path goes through `topic_loop`.
    pub async fn drain_topic(&self, topic: Topic) -> EngineResult<usize> {
        let timeout = Duration::from_secs(self.config.settings_for(topic).timeout_seconds);
        let mut processed = 0;
        while let Some(job) = self.queue.claim(topic)? {
            self.run_job(topic, job, timeout).await;
            processed += 1;
        }
        Ok(processed)
    }

    async fn handle(&self, topic: Topic, job: &Job) -> EngineResult<()> {
        match topic {
            Topic::FraudDetection => self.handle_fraud_detection(job).await,
            Topic::EmailNotification => self.handle_email(job).await,
            Topic::ImageProcessing => self.handle_image_processing(job).await,
            // The remaining topics belong to subsystems not wired into this
            // build; completing keeps their producers unblocked.
            other => {
                log::info!("No handler for '{other}' in this build, completing job {}", job.id);
                Ok(())
            }
        }
    }

    /// Evaluate, process, then dispatch effects. Effect failures are logged
    /// and never fail the job: the state the processor wrote stands.
    async fn handle_fraud_detection(&self, job: &Job) -> EngineResult<()> {
        let payload: FraudJobPayload = serde_json::from_value(job.payload.clone())?;
        let listing_id = payload.listing_id.as_str();
        log::info!(
            "Fraud detection for listing {listing_id} (trigger {:?}, attempt {})",
            payload.triggered_by,
            job.attempts + 1
        );

        let violations = self.engine.evaluate(listing_id).await?;
        if violations.is_empty() {
            log::debug!("Listing {listing_id} is clean");
            return Ok(());
        }
        let outcome = self.processor.process(listing_id, &violations).await?;
        log::info!(
            "Listing {listing_id}: {} violation(s), seller total {}",
            violations.len(),
            outcome.total_violations
        );

        for effect in outcome.effects {
            match effect {
                Effect::Notify {
                    user_id,
                    title,
                    message,
                    link,
                    source_type,
                    source_id,
                } => {
                    self.notifications
                        .create(&user_id, &title, &message, &link, &source_type, &source_id);
                }
                Effect::Email { to, subject, html } => {
                    let payload =
                        serde_json::to_value(EmailJobPayload { to, subject, html })?;
                    if let Err(e) = self.queue.enqueue(
                        Topic::EmailNotification,
                        &payload,
                        self.config.topics.email_notification.max_attempts,
                    ) {
                        log::warn!("Failed to enqueue fraud-alert email for listing {listing_id}: {e}");
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_email(&self, job: &Job) -> EngineResult<()> {
        let payload: EmailJobPayload = serde_json::from_value(job.payload.clone())?;
        self.email_sink
            .send(&payload.to, &payload.subject, &payload.html)
            .map_err(|e| EngineError::Delivery(e.to_string()))
    }

    /// Hash a listing's pending images so the duplicate-photo checker has
    /// something to compare. Undecodable files are skipped, not fatal.
    async fn handle_image_processing(&self, job: &Job) -> EngineResult<()> {
        let payload: ImageJobPayload = serde_json::from_value(job.payload.clone())?;
        let pending = self.store.unhashed_images(&payload.listing_id)?;
        for (image_id, file_path) in pending {
            let bytes = match std::fs::read(&file_path) {
                Ok(b) => b,
                Err(e) => {
                    log::warn!("Image {image_id}: cannot read {file_path}: {e}, skipping");
                    continue;
                }
            };
            match hash::perceptual_hash(&bytes) {
                Ok(h) => self.store.set_image_hash(image_id, &h)?,
                Err(e) => {
                    log::warn!("Image {image_id}: {e}, skipping");
                }
            }
        }
        Ok(())
    }
}
