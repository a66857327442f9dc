//! In-memory doubles for the queue, lookup and persistence ports.

use crate::model::{CancellationRecord, Operator, ServiceDetails};
use crate::services::persistence_service::CancellationStore;
use crate::services::queue_service::{QueueClient, QueueError};
use crate::services::rail_service::ServiceLookup;
use anyhow::{Result, anyhow};
use async_channel::{Receiver, Sender, unbounded};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

static SIGNAL_HANDLERS: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Held by every test that installs SIGINT/SIGTERM handlers. Signals go to
/// the whole test process, so one test raising them must not cancel another.
pub async fn signal_handlers_lock() -> tokio::sync::MutexGuard<'static, ()> {
    SIGNAL_HANDLERS.lock().await
}

/// Cancellation-aware queue: a pop blocked on an empty channel returns as
/// soon as the token fires.
pub struct MemoryQueue {
    tx: Sender<String>,
    rx: Receiver<String>,
    pops: AtomicUsize,
    failures: AtomicUsize,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        MemoryQueue {
            tx,
            rx,
            pops: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, payload: &str) {
        self.tx
            .try_send(payload.to_string())
            .expect("memory queue is unbounded");
    }

    pub fn fail_next_pops(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn pop_calls(&self) -> usize {
        self.pops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn pop(&self, cancel: &CancellationToken) -> Result<Option<String>, QueueError> {
        self.pops.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(QueueError::Malformed("injected failure".into()));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueueError::Cancelled),
            item = self.rx.recv() => item.map(Some).map_err(|_| QueueError::PoolClosed),
        }
    }
}

/// Lookup answering from a fixed table; unknown ids are errors.
pub struct StubLookup {
    services: Mutex<HashMap<String, ServiceDetails>>,
    calls: AtomicUsize,
}

impl StubLookup {
    pub fn new() -> Self {
        StubLookup {
            services: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn cancelled(&self, id: &str, operator: &str, reason: Option<&str>) {
        self.insert(id, true, operator, reason);
    }

    pub fn running(&self, id: &str, operator: &str) {
        self.insert(id, false, operator, None);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn insert(&self, id: &str, is_cancelled: bool, operator: &str, reason: Option<&str>) {
        let details = ServiceDetails {
            is_cancelled,
            operator: Operator {
                name: operator.to_string(),
            },
            cancel_reason: reason.map(str::to_string),
        };
        self.services.lock().unwrap().insert(id.to_string(), details);
    }
}

#[async_trait]
impl ServiceLookup for StubLookup {
    async fn get_service_details(&self, service_id: &str) -> Result<ServiceDetails> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.services
            .lock()
            .unwrap()
            .get(service_id)
            .cloned()
            .ok_or_else(|| anyhow!("no such service: {}", service_id))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<CancellationRecord>>,
    inserts: AtomicUsize,
    fail_next: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CancellationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn fail_next_insert(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn count_for(&self, date: NaiveDate) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.cancellation_date == date)
            .count()
    }

    pub async fn wait_for_records(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.records.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {} records", count));
    }
}

#[async_trait]
impl CancellationStore for MemoryStore {
    async fn migrate(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_cancellation(&self, record: &CancellationRecord) -> Result<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn cancellation_count_for_date(&self, date: NaiveDate) -> Result<i64> {
        Ok(self.count_for(date) as i64)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_counts_per_date() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(store.cancellation_count_for_date(date).await.unwrap(), 0);

        let record = CancellationRecord {
            train_id: "S1".into(),
            operator: "Avanti".into(),
            cancellation_date: date,
            reason: "NO REASON GIVEN".into(),
        };
        store.insert_cancellation(&record).await.unwrap();
        store.insert_cancellation(&record).await.unwrap();

        assert_eq!(store.cancellation_count_for_date(date).await.unwrap(), 2);
        let other = date.succ_opt().unwrap();
        assert_eq!(store.cancellation_count_for_date(other).await.unwrap(), 0);
    }
}
