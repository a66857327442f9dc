use crate::model::{CancellationRecord, WorkItem};
use crate::services::completion_barrier::BarrierSlot;
use crate::services::persistence_service::CancellationStore;
use crate::services::queue_service::{QueueClient, QueueError};
use crate::services::rail_service::ServiceLookup;
use crate::utils::today;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Ports shared by every worker of the pool.
#[derive(Clone)]
pub struct WorkerDeps {
    pub queue: Arc<dyn QueueClient>,
    pub lookup: Arc<dyn ServiceLookup>,
    pub store: Arc<dyn CancellationStore>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Recorded(CancellationRecord),
    NotCancelled,
}

pub struct Worker {
    id: usize,
    deps: WorkerDeps,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(id: usize, deps: WorkerDeps, cancel: CancellationToken) -> Self {
        Worker { id, deps, cancel }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Drains the queue until the cancellation token is observed by a pop.
    ///
    /// Per-item failures are logged and the loop moves on; nothing here
    /// escalates to the caller. The barrier slot goes back when this returns.
    pub async fn run(self, _slot: BarrierSlot) {
        info!("Worker {}: listening", self.id);

        loop {
            let payload = match self.deps.queue.pop(&self.cancel).await {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(QueueError::Cancelled) => {
                    info!("Worker {}: cancellation observed, exiting", self.id);
                    return;
                }
                Err(e) => {
                    warn!("Worker {}: error popping from queue: {}", self.id, e);
                    continue;
                }
            };

            match self.handle(&payload).await {
                Ok(Outcome::Recorded(record)) => {
                    info!(
                        "Worker {}: {} cancelled by {} ({})",
                        self.id, record.train_id, record.operator, record.reason
                    );
                }
                Ok(Outcome::NotCancelled) => debug!("Worker {}: train not cancelled", self.id),
                Err(e) => warn!("Worker {}: dropped item: {:#}", self.id, e),
            }
        }
    }

    /// Decode, look up and, when cancelled, persist one queue payload.
    pub async fn handle(&self, payload: &str) -> Result<Outcome> {
        let item = WorkItem::decode(payload)
            .with_context(|| format!("malformed payload {:?}", payload))?;

        let details = self
            .deps
            .lookup
            .get_service_details(&item.id)
            .await
            .with_context(|| format!("service details lookup failed for {}", item.id))?;

        let Some(record) = CancellationRecord::from_details(&item.id, &details, today()) else {
            return Ok(Outcome::NotCancelled);
        };

        self.deps
            .store
            .insert_cancellation(&record)
            .await
            .with_context(|| format!("could not persist cancellation of {}", item.id))?;

        Ok(Outcome::Recorded(record))
    }
}
