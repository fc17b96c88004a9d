use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use scrap_common::health::HealthHandle;
use scrap_common::kafka_messages::dead_letter::ScrapDeadLetter;
use scrap_common::kafka_messages::scrap_processed::ScrapProcessed;
use scrap_common::scrap::{Scrap, ScrapEnvelope, StorageLocator};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{StageError, WorkerError};
use crate::inflight::{InFlightGuard, InFlightSet};
use crate::limiter::ConcurrencyLimiter;
use crate::notifier::Notifier;
use crate::source::ScrapSource;
use crate::stage::StageRegistry;
use crate::storage::StorageGateway;

/// What happened to the messages of one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    /// Dispatched to a processing task.
    pub accepted: usize,
    /// Skipped because a scrap with the same hash was already in flight.
    pub duplicates: usize,
    /// Skipped because the payload was not a usable scrap envelope.
    pub malformed: usize,
    pub processed: usize,
    pub failed: usize,
    /// Could not be resolved to a local file.
    pub storage_errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrapOutcome {
    Processed,
    Failed,
    StorageUnavailable,
}

/// Everything a processing task needs, cheap to clone into each task.
#[derive(Clone)]
struct Pipeline {
    storage: Arc<dyn StorageGateway>,
    notifier: Arc<dyn Notifier>,
    stages: Arc<StageRegistry>,
    limiter: ConcurrencyLimiter,
}

impl Pipeline {
    /// Process one accepted scrap once a concurrency slot is free. The in-flight
    /// marker is held until everything else, storage release included, is done.
    async fn process(
        self,
        scrap: Scrap,
        locator: StorageLocator,
        guard: InFlightGuard,
    ) -> ScrapOutcome {
        let _permit = self.limiter.acquire().await;
        gauge!("scrap_worker_saturation_percent").set(self.limiter.saturation());

        let started = Instant::now();
        let outcome = self.handle(scrap, &locator).await;
        histogram!("scrap_worker_scrap_processing_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        drop(guard);
        outcome
    }

    async fn handle(&self, mut scrap: Scrap, locator: &StorageLocator) -> ScrapOutcome {
        let path = match self.storage.resolve(locator).await {
            Ok(path) => path,
            Err(e) => {
                counter!("scrap_worker_storage_errors").increment(1);
                error!(
                    scrap_id = scrap.id,
                    hash = scrap.hash,
                    "failed to resolve {} storage: {}",
                    locator.kind(),
                    e
                );
                return ScrapOutcome::StorageUnavailable;
            }
        };
        scrap.file_path = Some(path);

        if let Err(e) = self.stages.run(&scrap).await {
            counter!("scrap_worker_scraps_failed").increment(1);
            error!(
                scrap_id = scrap.id,
                hash = scrap.hash,
                stage = e.stage,
                "processing failed, keeping storage for replay: {}",
                e.message
            );
            self.dead_letter(&scrap, locator, &e).await;
            self.discard(&scrap, locator).await;
            return ScrapOutcome::Failed;
        }

        if let Err(e) = self.notifier.publish(&ScrapProcessed::from(&scrap)).await {
            counter!("scrap_worker_notifications_failed").increment(1);
            error!(
                scrap_id = scrap.id,
                hash = scrap.hash,
                "failed to publish completion notification: {}",
                e
            );
        }

        if let Err(e) = self.storage.release(locator).await {
            counter!("scrap_worker_storage_errors").increment(1);
            error!(
                scrap_id = scrap.id,
                hash = scrap.hash,
                "failed to release {} storage: {}",
                locator.kind(),
                e
            );
        }

        counter!("scrap_worker_scraps_processed").increment(1);
        debug!(scrap_id = scrap.id, hash = scrap.hash, "scrap processed");
        ScrapOutcome::Processed
    }

    /// Drop the local copy of a failed scrap. The payload itself stays for replay.
    async fn discard(&self, scrap: &Scrap, locator: &StorageLocator) {
        if let Err(e) = self.storage.discard(locator).await {
            counter!("scrap_worker_storage_errors").increment(1);
            error!(
                scrap_id = scrap.id,
                hash = scrap.hash,
                "failed to discard local copy of {} storage: {}",
                locator.kind(),
                e
            );
        }
    }

    async fn dead_letter(&self, scrap: &Scrap, locator: &StorageLocator, failure: &StageError) {
        let letter = ScrapDeadLetter::new(scrap, locator, &failure.stage, &failure.message);

        match self.notifier.dead_letter(&letter).await {
            Ok(()) => counter!("scrap_worker_dead_letters").increment(1),
            Err(e) => {
                counter!("scrap_worker_notifications_failed").increment(1);
                error!(
                    scrap_id = scrap.id,
                    hash = scrap.hash,
                    "failed to record dead letter: {}",
                    e
                );
            }
        }
    }
}

/// Pulls batches of scraps, processes every new one concurrently and commits the
/// batch only once all of its processing tasks have finished.
pub struct ScrapWorker {
    /// An identifier for this worker, used in logs.
    name: String,
    source: Arc<dyn ScrapSource>,
    pipeline: Pipeline,
    /// Hashes currently being processed. Shared by every task of this worker.
    inflight: Arc<InFlightSet>,
    /// The liveness check handle, reported on every loop iteration.
    liveness: HealthHandle,
}

impl ScrapWorker {
    pub fn new(
        name: &str,
        source: Arc<dyn ScrapSource>,
        storage: Arc<dyn StorageGateway>,
        notifier: Arc<dyn Notifier>,
        stages: StageRegistry,
        limiter: ConcurrencyLimiter,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            name: name.to_owned(),
            source,
            pipeline: Pipeline {
                storage,
                notifier,
                stages: Arc::new(stages),
                limiter,
            },
            inflight: Arc::new(InFlightSet::new()),
            liveness,
        }
    }

    pub fn inflight(&self) -> &Arc<InFlightSet> {
        &self.inflight
    }

    /// Process batches until `shutdown` turns true or a fatal error occurs. The
    /// batch in progress when shutdown is requested is finished and committed.
    /// The notifier and the source are closed on every exit path.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        info!(
            worker = self.name,
            capacity = self.pipeline.limiter.capacity(),
            stages = self.pipeline.stages.len(),
            "starting scrap worker"
        );

        let result = self.consume(&shutdown).await;
        if let Err(e) = &result {
            error!(worker = self.name, "scrap worker stopping on error: {}", e);
        }

        self.pipeline.notifier.close().await;
        self.source.close().await;
        info!(worker = self.name, "scrap worker stopped");

        result
    }

    async fn consume(&self, shutdown: &watch::Receiver<bool>) -> Result<(), WorkerError> {
        loop {
            let stop = *shutdown.borrow();
            if stop {
                info!(worker = self.name, "shutdown requested");
                return Ok(());
            }

            self.liveness.report_healthy();
            self.process_next_batch().await?;
        }
    }

    /// Pull one batch and see it through: decode, drop duplicates, process the rest
    /// concurrently, then commit. Only queue errors are returned; anything that goes
    /// wrong with a single scrap is logged and counted in the report.
    pub async fn process_next_batch(&self) -> Result<BatchReport, WorkerError> {
        let messages = self.source.next_batch().await?;
        let mut report = BatchReport {
            received: messages.len(),
            ..Default::default()
        };

        if messages.is_empty() {
            return Ok(report);
        }

        let started = Instant::now();
        counter!("scrap_worker_messages_received").increment(messages.len() as u64);

        let mut tasks = JoinSet::new();
        for message in &messages {
            let decoded = ScrapEnvelope::decode(message.payload.as_deref())
                .and_then(ScrapEnvelope::into_parts);
            let (scrap, locator) = match decoded {
                Ok(parts) => parts,
                Err(e) => {
                    report.malformed += 1;
                    counter!("scrap_worker_malformed_messages").increment(1);
                    warn!(
                        partition = message.partition,
                        offset = message.offset,
                        "skipping malformed message: {}",
                        e
                    );
                    continue;
                }
            };

            let Some(guard) = InFlightGuard::acquire(&self.inflight, &scrap.hash) else {
                report.duplicates += 1;
                counter!("scrap_worker_duplicates_skipped").increment(1);
                debug!(
                    scrap_id = scrap.id,
                    hash = scrap.hash,
                    "already in flight, skipping"
                );
                continue;
            };

            report.accepted += 1;
            tasks.spawn(self.pipeline.clone().process(scrap, locator, guard));
        }
        gauge!("scrap_worker_inflight_scraps").set(self.inflight.len() as f64);

        while let Some(joined) = tasks.join_next().await {
            self.liveness.report_healthy();
            match joined {
                Ok(ScrapOutcome::Processed) => report.processed += 1,
                Ok(ScrapOutcome::Failed) => report.failed += 1,
                Ok(ScrapOutcome::StorageUnavailable) => report.storage_errors += 1,
                Err(e) => {
                    report.failed += 1;
                    counter!("scrap_worker_scraps_failed").increment(1);
                    error!("scrap processing task did not complete: {}", e);
                }
            }
        }
        gauge!("scrap_worker_inflight_scraps").set(self.inflight.len() as f64);
        gauge!("scrap_worker_saturation_percent").set(self.pipeline.limiter.saturation());

        self.source.commit(&messages).await?;
        counter!("scrap_worker_batches_committed").increment(1);
        histogram!("scrap_worker_batch_duration_seconds").record(started.elapsed().as_secs_f64());

        info!(
            batch_size = report.received,
            processed = report.processed,
            failed = report.failed,
            duplicates = report.duplicates,
            malformed = report.malformed,
            storage_errors = report.storage_errors,
            "batch committed"
        );

        Ok(report)
    }
}
