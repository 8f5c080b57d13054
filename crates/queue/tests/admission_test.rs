//! End-to-end admission tests: gateway, bounded channel and worker pool
//! wired together the way the results service wires them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};

use courtside_core::{CancellationSource, CancellationToken};
use courtside_queue::{
    AdmissionChannel, AdmissionOutcome, IngestionPool, IngestionStats, ProcessReport, QueueError,
    ResultProcessor, StagedResource, SubmissionGateway,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Upload {
    id: u32,
    releases: Arc<Mutex<HashMap<u32, u32>>>,
}

impl fmt::Display for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload-{}", self.id)
    }
}

#[async_trait]
impl StagedResource for Upload {
    async fn release(&self) -> Result<(), QueueError> {
        *self.releases.lock().unwrap().entry(self.id).or_default() += 1;
        Ok(())
    }
}

/// Blocks every call until the test hands out a permit.
struct GatedProcessor {
    gate: Arc<Semaphore>,
    processed: AtomicU32,
}

#[async_trait]
impl ResultProcessor<Upload> for GatedProcessor {
    async fn process(&self, _resource: &Upload, _cancel: &CancellationToken) -> anyhow::Result<ProcessReport> {
        self.gate.acquire().await?.forget();
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessReport { records: 1 })
    }
}

struct Harness {
    gateway: SubmissionGateway<Upload>,
    channel: Arc<AdmissionChannel<Upload>>,
    stats: Arc<IngestionStats>,
    processor: Arc<GatedProcessor>,
    gate: Arc<Semaphore>,
    releases: Arc<Mutex<HashMap<u32, u32>>>,
    source: CancellationSource,
    pool: Option<IngestionPool>,
}

impl Harness {
    fn new(capacity: usize, workers: usize, admission_timeout: Duration) -> Self {
        let channel = Arc::new(AdmissionChannel::<Upload>::new(capacity).unwrap());
        let stats = Arc::new(IngestionStats::new());
        let gate = Arc::new(Semaphore::new(0));
        let processor = Arc::new(GatedProcessor {
            gate: gate.clone(),
            processed: AtomicU32::new(0),
        });
        let source = CancellationSource::new();
        let pool = IngestionPool::spawn(
            workers,
            channel.clone(),
            processor.clone(),
            stats.clone(),
            None,
            &source.token(),
        );
        let gateway = SubmissionGateway::new(channel.clone(), stats.clone())
            .with_admission_timeout(admission_timeout);

        Self {
            gateway,
            channel,
            stats,
            processor,
            gate,
            releases: Arc::new(Mutex::new(HashMap::new())),
            source,
            pool: Some(pool),
        }
    }

    fn upload(&self, id: u32) -> Upload {
        Upload {
            id,
            releases: self.releases.clone(),
        }
    }

    fn releases_of(&self, id: u32) -> u32 {
        self.releases.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    async fn stop(&mut self) {
        self.source.cancel();
        if let Some(pool) = self.pool.take() {
            timeout(TIMEOUT, pool.join()).await.expect("workers did not stop");
        }
    }

    async fn wait_for_processed(&self, n: u32) {
        timeout(TIMEOUT, async {
            while self.processor.processed.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("workers did not finish in time");
    }
}

#[tokio::test]
async fn submission_past_capacity_times_out_and_is_released() {
    let mut h = Harness::new(2, 1, Duration::from_millis(150));
    let none = CancellationToken::none();

    assert_eq!(h.gateway.submit(h.upload(1), &none).await, AdmissionOutcome::Admitted);
    assert_eq!(h.gateway.submit(h.upload(2), &none).await, AdmissionOutcome::Admitted);
    assert_eq!(h.channel.in_flight(), 2);

    let started = Instant::now();
    let outcome = h.gateway.submit(h.upload(3), &none).await;
    let waited = started.elapsed();

    assert_eq!(outcome, AdmissionOutcome::TimedOut);
    assert!(waited >= Duration::from_millis(150), "returned too early: {waited:?}");
    assert!(waited < Duration::from_secs(2), "returned too late: {waited:?}");
    assert_eq!(h.releases_of(3), 1);

    // Let the stalled worker through; admitted uploads are each released once.
    h.gate.add_permits(2);
    h.wait_for_processed(2).await;
    timeout(TIMEOUT, async {
        while h.channel.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(h.releases_of(1), 1);
    assert_eq!(h.releases_of(2), 1);
    assert_eq!(h.releases_of(3), 1);

    let snap = h.stats.snapshot();
    assert_eq!(snap.admitted, 2);
    assert_eq!(snap.timed_out, 1);
    assert_eq!(snap.processed, 2);
    assert_eq!(snap.released, 3);

    h.stop().await;
}

#[tokio::test]
async fn waiting_submission_is_admitted_when_a_slot_frees() {
    let mut h = Harness::new(1, 1, Duration::from_secs(3));
    let none = CancellationToken::none();

    assert!(h.gateway.submit(h.upload(1), &none).await.is_admitted());

    let waiting = {
        let gateway = h.gateway.clone();
        let upload = h.upload(2);
        tokio::spawn(async move { gateway.submit(upload, &CancellationToken::none()).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiting.is_finished(), "second submission should be waiting for a slot");

    // Finishing the first upload frees its slot.
    h.gate.add_permits(1);
    let outcome = timeout(TIMEOUT, waiting).await.unwrap().unwrap();
    assert_eq!(outcome, AdmissionOutcome::Admitted);
    assert_eq!(h.releases_of(2), 0, "admitted upload belongs to the pipeline");

    h.gate.add_permits(1);
    h.wait_for_processed(2).await;

    h.stop().await;
    assert_eq!(h.releases_of(1), 1);
    assert_eq!(h.releases_of(2), 1);
}

#[tokio::test]
async fn shutdown_wakes_blocked_submitters() {
    let mut h = Harness::new(1, 1, Duration::from_secs(10));
    let none = CancellationToken::none();
    assert!(h.gateway.submit(h.upload(1), &none).await.is_admitted());

    let blocked = {
        let gateway = h.gateway.clone();
        let upload = h.upload(2);
        tokio::spawn(async move { gateway.submit(upload, &CancellationToken::none()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    h.channel.close();

    let outcome = timeout(Duration::from_secs(1), blocked).await.unwrap().unwrap();
    assert!(matches!(outcome, AdmissionOutcome::Rejected(_)));
    assert_eq!(h.releases_of(2), 1);

    h.gate.add_permits(1);
    h.stop().await;
    assert_eq!(h.releases_of(1), 1);
}
