use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use super::{Issuer, PaymentApproved};
use crate::core::SifenError;

/// Work accepted by the issuance queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Issue(PaymentApproved),
    Retry { business_ref: String },
}

impl Job {
    pub fn business_ref(&self) -> &str {
        match self {
            Self::Issue(event) => &event.business_ref,
            Self::Retry { business_ref } => business_ref,
        }
    }
}

/// Background worker running [`Issuer`] jobs.
///
/// The channel is bounded, so producers feel backpressure when the worker
/// falls behind. At most `max_concurrent` jobs run at once; jobs for the
/// same business reference still run one after another.
pub struct IssuanceQueue;

impl IssuanceQueue {
    /// Spawn the worker. It stops once every [`QueueHandle`] is dropped and
    /// the jobs already accepted have finished.
    pub fn start(
        issuer: Arc<Issuer>,
        capacity: usize,
        max_concurrent: usize,
    ) -> (QueueHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(issuer, rx, max_concurrent.max(1)));
        (QueueHandle { tx }, worker)
    }
}

async fn run_worker(issuer: Arc<Issuer>, mut rx: mpsc::Receiver<Job>, max_concurrent: usize) {
    let permits = Arc::new(Semaphore::new(max_concurrent));
    let mut running = JoinSet::new();

    while let Some(job) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let issuer = Arc::clone(&issuer);
        running.spawn(async move {
            let _permit = permit;
            let business_ref = job.business_ref().to_string();
            let outcome = match &job {
                Job::Issue(event) => issuer.issue(event).await,
                Job::Retry { business_ref } => issuer.retry(business_ref).await,
            };
            match outcome {
                Ok(record) => tracing::info!(
                    business_ref = %business_ref,
                    attempt = record.attempt,
                    status = ?record.status,
                    failure = ?record.failure,
                    "job finished"
                ),
                Err(e) => tracing::error!(business_ref = %business_ref, error = %e, "job failed"),
            }
        });
        // Reap finished tasks so the set does not grow without bound.
        while running.try_join_next().is_some() {}
    }

    while running.join_next().await.is_some() {}
    tracing::debug!("issuance queue drained");
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<Job>,
}

impl QueueHandle {
    /// Enqueue an invoice for an approved payment and return immediately
    /// once the job is accepted. Waits while the queue is full.
    pub async fn on_payment_approved(&self, event: PaymentApproved) -> Result<(), SifenError> {
        tracing::info!(business_ref = %event.business_ref, "invoice enqueued");
        self.send(Job::Issue(event)).await
    }

    /// Enqueue a manual retry for `business_ref`.
    pub async fn retry(&self, business_ref: impl Into<String>) -> Result<(), SifenError> {
        let business_ref = business_ref.into();
        tracing::info!(business_ref = %business_ref, "retry enqueued");
        self.send(Job::Retry { business_ref }).await
    }

    /// Enqueue without waiting; fails when the queue is full.
    pub fn try_enqueue(&self, job: Job) -> Result<(), SifenError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => SifenError::Store(format!(
                "issuance queue full, {} not accepted",
                job.business_ref()
            )),
            mpsc::error::TrySendError::Closed(_) => {
                SifenError::Store("issuance queue is closed".into())
            }
        })
    }

    async fn send(&self, job: Job) -> Result<(), SifenError> {
        self.tx
            .send(job)
            .await
            .map_err(|_| SifenError::Store("issuance queue is closed".into()))
    }
}
