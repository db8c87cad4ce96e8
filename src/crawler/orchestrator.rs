//! Batch orchestrator - detail crawl coordination
//!
//! Batches run as tokio tasks, at most `max_concurrency` at a time. Each task
//! owns one session and walks its units one after the other. Results come back
//! through the join loop in completion order; that loop is the only place the
//! accumulator is mutated and the progress file written.

use crate::config::Credentials;
use crate::crawler::batch::{partition, Batch, UnitRange};
use crate::crawler::extractor::DetailExtractor;
use crate::crawler::pick_delay;
use crate::crawler::session::{Session, SessionProvider};
use crate::output::ProgressPersister;
use crate::state::{FailureReason, Record, ResultAccumulator};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Everything a batch worker needs, shared read-only between workers
pub struct BatchContext {
    pub sessions: SessionProvider,
    pub extractor: DetailExtractor,

    /// Log in at batch start when present
    pub credentials: Option<Credentials>,

    /// Bounds of the uniform random pause between two units
    pub unit_delay: (Duration, Duration),
}

/// Runs batches on a bounded pool of workers
pub struct BatchOrchestrator {
    context: Arc<BatchContext>,
    max_concurrency: usize,
    persister: Option<ProgressPersister>,
}

impl BatchOrchestrator {
    pub fn new(context: BatchContext, max_concurrency: usize) -> Self {
        Self {
            context: Arc::new(context),
            max_concurrency: max_concurrency.max(1),
            persister: None,
        }
    }

    /// Rewrites this snapshot after every completed batch
    pub fn with_persister(mut self, persister: ProgressPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Partitions `range` and runs every batch
    pub async fn run(&self, range: UnitRange, batch_size: usize) -> ResultAccumulator {
        let batches = partition(range, batch_size);
        self.run_batches(batches, ResultAccumulator::new()).await
    }

    /// Runs `batches`, merging their records into `accumulator`
    ///
    /// The returned accumulator holds exactly one record per unit of every
    /// batch, on top of whatever it was seeded with.
    pub async fn run_batches(
        &self,
        batches: Vec<Batch>,
        mut accumulator: ResultAccumulator,
    ) -> ResultAccumulator {
        let total = accumulator.len() + batches.iter().map(Batch::len).sum::<usize>();
        tracing::info!(
            "Dispatching {} batches ({} units) to {} workers",
            batches.len(),
            total - accumulator.len(),
            self.max_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut workers = JoinSet::new();
        let mut in_flight = HashMap::new();

        for batch in batches {
            let context = Arc::clone(&self.context);
            let semaphore = Arc::clone(&semaphore);
            let work = batch.clone();

            let handle = workers.spawn(async move {
                // The semaphore is never closed, so a permit always arrives
                let _permit = semaphore.acquire_owned().await.ok();
                process_batch(&context, work).await
            });
            in_flight.insert(handle.id(), batch);
        }

        while let Some(joined) = workers.join_next_with_id().await {
            let (batch, records) = match joined {
                Ok((id, records)) => (in_flight.remove(&id), records),
                Err(e) => {
                    let batch = in_flight.remove(&e.id());
                    tracing::error!("Batch worker crashed: {}", e);
                    let records = batch
                        .as_ref()
                        .map(|b| fail_units(&b.units, &FailureReason::WorkerCrashed(e.to_string())))
                        .unwrap_or_default();
                    (batch, records)
                }
            };

            if let Some(batch) = &batch {
                debug_assert_eq!(batch.len(), records.len());
                tracing::debug!("Merging batch {} ({} records)", batch.number, records.len());
            }

            accumulator.merge(records);
            tracing::info!(
                "Progress: {}/{} | ok: {} | failed: {}",
                accumulator.len(),
                total,
                accumulator.success_count(),
                accumulator.failure_count()
            );

            if let Some(persister) = &self.persister {
                if let Err(e) = persister.persist(&accumulator) {
                    tracing::error!(
                        "Failed to write progress to {}: {}",
                        persister.path().display(),
                        e
                    );
                }
            }
        }

        accumulator
    }
}

/// Processes one batch on its own session
///
/// Never fails: every unit of the batch comes back as exactly one record.
pub async fn process_batch(context: &BatchContext, batch: Batch) -> Vec<Record> {
    let started = Instant::now();

    let mut session = match context
        .sessions
        .acquire(format!("batch {}", batch.number))
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Batch {}: {}", batch.number, e);
            return fail_units(&batch.units, &FailureReason::SessionInit(e.to_string()));
        }
    };

    let records = run_session(context, &batch, &mut session).await;
    context.sessions.release(session).await;

    tracing::info!(
        "Batch {} finished in {:.2}s",
        batch.number,
        started.elapsed().as_secs_f64()
    );
    records
}

async fn run_session(context: &BatchContext, batch: &Batch, session: &mut Session) -> Vec<Record> {
    if let Some(credentials) = &context.credentials {
        if !context.sessions.authenticate(session, credentials).await {
            return fail_units(&batch.units, &FailureReason::AuthenticationFailed);
        }
    }

    tracing::info!("Batch {}: {} units", batch.number, batch.len());

    let mut records = Vec::with_capacity(batch.len());
    for (index, &unit) in batch.units.iter().enumerate() {
        tracing::info!("[batch {} - {}/{}] unit {}", batch.number, index + 1, batch.len(), unit);

        match context.extractor.extract_detail(session.driver(), unit).await {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::error!("Batch {} aborted at unit {}: {}", batch.number, unit, e);
                let reason = FailureReason::BatchFatal(e.to_string());
                records.extend(fail_units(&batch.units[index..], &reason));
                return records;
            }
        }

        if index + 1 < batch.len() {
            tokio::time::sleep(pick_delay(context.unit_delay)).await;
        }
    }

    records
}

/// One failure record per unit, all with the same reason
pub fn fail_units(units: &[u64], reason: &FailureReason) -> Vec<Record> {
    units.iter().map(|&unit| Record::failed(unit, reason)).collect()
}
