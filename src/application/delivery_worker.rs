//! Background delivery job runner
//!
//! Owns the durable half of delivery. Two kinds of job run here, one at a
//! time and only while the network is up:
//!
//! * ingest: rebuild the event from the job input, recover a missing phone
//!   number through the reverse identity mapping, append it to the durable
//!   queue and trigger a drain;
//! * drain: drop stale entries at the queue head, push the queue to the
//!   remote store in order and remove the delivered prefix. The first
//!   failure stops the drain and reschedules it with exponential backoff.
//!
//! Ingest jobs are journalled in the key-value store until they finish, so
//! `WorkerHandle::resume` can restart whatever a killed process left behind.
//! Delivery is at-least-once.

use crate::domain::delivery::{parse_job_input, JobInput, JobScheduler, RemoteStore};
use crate::domain::event_queue::{DurableEventQueue, QueueEntry};
use crate::domain::identity::CallIdentityRegistry;
use crate::domain::shared::{CorrelationId, DomainError, PhoneKey, Result};
use crate::domain::storage::{keys, KeyValueStore};
use metrics::counter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Exponential backoff for failed jobs
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Scale each delay by a random factor in [0.5, 1.0]
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64()).max(0.0);
        let secs = if self.use_jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub retry: RetryPolicy,
    /// Reverse-mapping lookups before giving up on a missing number
    pub phone_recovery_attempts: u32,
    pub phone_recovery_delay: Duration,
    /// Queue head entries older than this are garbage-collected
    pub stale_after_ms: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            phone_recovery_attempts: 5,
            phone_recovery_delay: Duration::from_millis(50),
            stale_after_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Network-available precondition for background jobs
#[derive(Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    pub fn new(available: bool) -> Self {
        let (tx, _) = watch::channel(available);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_available(&self, available: bool) {
        let previous = self.tx.send_replace(available);
        if previous != available {
            info!("Network {}", if available { "available" } else { "unavailable" });
        }
    }

    pub fn is_available(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait_until_available(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|available| *available).await;
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Ingest job as recorded in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournaledJob {
    pub id: String,
    pub input: JobInput,
}

/// Ingest jobs not yet completed, persisted under one key
pub struct JobJournal {
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl JobJournal {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub async fn pending(&self) -> Vec<JournaledJob> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    pub async fn append(&self, job: &JournaledJob) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut jobs = self.load().await;
        if jobs.iter().any(|existing| existing.id == job.id) {
            return Ok(());
        }
        jobs.push(job.clone());
        self.save(&jobs).await
    }

    pub async fn complete(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut jobs = self.load().await;
        let before = jobs.len();
        jobs.retain(|job| job.id != id);
        if jobs.len() == before {
            return Ok(());
        }
        self.save(&jobs).await
    }

    async fn load(&self) -> Vec<JournaledJob> {
        let raw = match self.store.get(keys::PENDING_WORK).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("Failed to read job journal: {}", e);
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw).map_err(DomainError::from) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Resetting job journal: {}", e);
                if let Err(e) = self.store.remove(keys::PENDING_WORK).await {
                    error!("Failed to reset job journal: {}", e);
                }
                Vec::new()
            }
        }
    }

    async fn save(&self, jobs: &[JournaledJob]) -> Result<()> {
        if jobs.is_empty() {
            return self.store.remove(keys::PENDING_WORK).await;
        }
        let raw = serde_json::to_string(jobs)
            .map_err(|e| DomainError::Internal(format!("Failed to encode job journal: {}", e)))?;
        self.store.put(keys::PENDING_WORK, &raw).await
    }
}

enum Job {
    Ingest {
        job: JournaledJob,
        attempt: u32,
        journaled: bool,
    },
    Drain,
}

/// Cheap handle used to schedule jobs on the worker
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Job>,
    in_flight: Arc<watch::Sender<usize>>,
    journal: Arc<JobJournal>,
}

impl WorkerHandle {
    fn submit(&self, job: Job) {
        self.in_flight.send_modify(|n| *n += 1);
        if self.tx.send(job).is_err() {
            self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
            error!("Delivery worker is gone, job dropped");
        }
    }

    fn finished(&self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Re-schedule journalled jobs left by a previous process, then drain.
    /// Returns how many jobs were resumed.
    pub async fn resume(&self) -> usize {
        let jobs = self.journal.pending().await;
        let count = jobs.len();
        for job in jobs {
            self.submit(Job::Ingest {
                job,
                attempt: 0,
                journaled: true,
            });
        }
        self.submit(Job::Drain);
        if count > 0 {
            info!("Resumed {} journalled delivery jobs", count);
        }
        count
    }

    /// Wait until no job is queued or running. Delayed retries that have
    /// not fired yet do not count.
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl JobScheduler for WorkerHandle {
    fn schedule_delivery(&self, input: JobInput) {
        self.submit(Job::Ingest {
            job: JournaledJob {
                id: Uuid::new_v4().to_string(),
                input,
            },
            attempt: 0,
            journaled: false,
        });
    }

    fn schedule_drain(&self) {
        self.submit(Job::Drain);
    }
}

/// Collaborators of the worker
pub struct WorkerParts {
    pub queue: Arc<DurableEventQueue>,
    pub registry: Arc<CallIdentityRegistry>,
    pub remote: Arc<dyn RemoteStore>,
    pub store: Arc<dyn KeyValueStore>,
    pub network: NetworkMonitor,
}

pub struct DeliveryWorker {
    queue: Arc<DurableEventQueue>,
    registry: Arc<CallIdentityRegistry>,
    remote: Arc<dyn RemoteStore>,
    journal: Arc<JobJournal>,
    network: NetworkMonitor,
    config: WorkerConfig,
    handle: WorkerHandle,
    drain_attempt: u32,
    drain_retry_pending: Arc<AtomicBool>,
}

impl DeliveryWorker {
    /// Start the worker task
    pub fn spawn(parts: WorkerParts, config: WorkerConfig) -> (WorkerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (in_flight, _) = watch::channel(0usize);
        let journal = Arc::new(JobJournal::new(parts.store));
        let handle = WorkerHandle {
            tx,
            in_flight: Arc::new(in_flight),
            journal: journal.clone(),
        };

        let worker = Self {
            queue: parts.queue,
            registry: parts.registry,
            remote: parts.remote,
            journal,
            network: parts.network,
            config,
            handle: handle.clone(),
            drain_attempt: 0,
            drain_retry_pending: Arc::new(AtomicBool::new(false)),
        };
        let task = tokio::spawn(worker.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>) {
        info!("Delivery worker started");
        let network = self.network.clone();
        let mut backlog: VecDeque<Job> = VecDeque::new();
        let mut open = true;

        loop {
            let job = match backlog.pop_front() {
                Some(job) => job,
                None if open => match rx.recv().await {
                    Some(job) => self.journal_job(job).await,
                    None => break,
                },
                None => break,
            };

            // Keep journalling whatever is scheduled during an outage, so a
            // kill before the network returns loses nothing
            while open && !network.is_available() {
                debug!("Waiting for network, {} jobs held", backlog.len() + 1);
                tokio::select! {
                    _ = network.wait_until_available() => {}
                    next = rx.recv() => match next {
                        Some(next) => backlog.push_back(self.journal_job(next).await),
                        None => open = false,
                    },
                }
            }
            if !open && !network.is_available() {
                network.wait_until_available().await;
            }

            match job {
                Job::Ingest { job, attempt, .. } => self.ingest(job, attempt).await,
                Job::Drain => self.drain().await,
            }
            self.handle.finished();
        }
        info!("Delivery worker stopped");
    }

    /// Record an ingest job in the journal unless it already is
    async fn journal_job(&self, mut job: Job) -> Job {
        if let Job::Ingest { job, journaled, .. } = &mut job {
            if !*journaled {
                if let Err(e) = self.journal.append(job).await {
                    warn!("Failed to journal delivery job {}: {}", job.id, e);
                }
                *journaled = true;
            }
        }
        job
    }

    async fn ingest(&mut self, job: JournaledJob, attempt: u32) {
        match self.persist(&job.input).await {
            Ok(()) => {
                if let Err(e) = self.journal.complete(&job.id).await {
                    warn!("Failed to complete delivery job {}: {}", job.id, e);
                }
                self.handle.submit(Job::Drain);
            }
            Err(DomainError::InvalidSignal(reason)) => {
                error!("Discarding malformed delivery job {}: {}", job.id, reason);
                if let Err(e) = self.journal.complete(&job.id).await {
                    warn!("Failed to complete delivery job {}: {}", job.id, e);
                }
            }
            Err(e) => {
                let delay = self.config.retry.delay_for(attempt);
                warn!(
                    "Delivery job {} failed on attempt {}, retrying in {:?}: {}",
                    job.id,
                    attempt + 1,
                    delay,
                    e
                );
                self.schedule_later(
                    Job::Ingest {
                        job,
                        attempt: attempt + 1,
                        journaled: true,
                    },
                    delay,
                    None,
                );
            }
        }
    }

    async fn persist(&self, input: &JobInput) -> Result<()> {
        let (mut event, received_at) = parse_job_input(input)?;
        if event.phone_key().is_empty() {
            match self.recover_phone_key(event.correlation_id()).await {
                Some(key) => event = event.with_phone_key(key),
                None => warn!(
                    "No phone number recovered for {}, queueing without one",
                    event.correlation_id()
                ),
            }
        }
        self.queue.enqueue(QueueEntry::new(event, received_at)).await
    }

    /// The reverse mapping may land a few milliseconds after the job was
    /// scheduled, so look it up more than once.
    async fn recover_phone_key(&self, correlation_id: &CorrelationId) -> Option<PhoneKey> {
        let attempts = self.config.phone_recovery_attempts;
        for attempt in 1..=attempts {
            match self.registry.phone_key_for(correlation_id).await {
                Ok(key) => {
                    debug!("Recovered {} for {} on attempt {}", key, correlation_id, attempt);
                    return Some(key);
                }
                Err(DomainError::NotFound(_)) => {}
                Err(e) => warn!("Reverse lookup for {} failed: {}", correlation_id, e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.phone_recovery_delay).await;
            }
        }
        None
    }

    async fn drain(&mut self) {
        match self
            .queue
            .remove_old_entries_older_than(self.config.stale_after_ms)
            .await
        {
            Ok(0) => {}
            Ok(removed) => warn!("Dropped {} stale queue entries before drain", removed),
            Err(e) => warn!("Queue garbage collection failed: {}", e),
        }

        let entries = self.queue.peek_all().await;
        if entries.is_empty() {
            self.drain_attempt = 0;
            return;
        }

        let mut delivered = 0;
        let mut failure = None;
        for entry in &entries {
            match self.remote.store(entry).await {
                Ok(()) => {
                    counter!("calltrack_remote_deliveries_total", "result" => "ok").increment(1);
                    delivered += 1;
                }
                Err(e) => {
                    counter!("calltrack_remote_deliveries_total", "result" => "error").increment(1);
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Err(e) = self.queue.remove_first_n(delivered).await {
            error!("Failed to remove {} delivered entries: {}", delivered, e);
        }

        match failure {
            None => {
                info!("Drained {} queued events to remote store", delivered);
                self.drain_attempt = 0;
            }
            Some(e) => {
                let delay = self.config.retry.delay_for(self.drain_attempt);
                self.drain_attempt = self.drain_attempt.saturating_add(1);
                warn!(
                    "Remote delivery stopped after {} of {} events, retrying in {:?}: {}",
                    delivered,
                    entries.len(),
                    delay,
                    e
                );
                if !self.drain_retry_pending.swap(true, Ordering::SeqCst) {
                    self.schedule_later(Job::Drain, delay, Some(self.drain_retry_pending.clone()));
                }
            }
        }
    }

    fn schedule_later(&self, job: Job, delay: Duration, pending: Option<Arc<AtomicBool>>) {
        let handle = self.handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(pending) = pending {
                pending.store(false, Ordering::SeqCst);
            }
            handle.submit(job);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::{CallDirection, CallEvent, CallOutcome};
    use crate::domain::delivery::{job_input, MockRemoteStore};
    use crate::domain::identity::IdentityWindows;
    use crate::domain::shared::{Clock, ManualClock};
    use crate::infrastructure::persistence::MemoryKvStore;
    use crate::infrastructure::remote::InMemoryRemoteStore;

    const NOW: i64 = 1_700_000_000_000;

    struct Fixture {
        store: Arc<MemoryKvStore>,
        queue: Arc<DurableEventQueue>,
        registry: Arc<CallIdentityRegistry>,
        network: NetworkMonitor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryKvStore::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(NOW));
        Fixture {
            queue: Arc::new(DurableEventQueue::new(store.clone(), clock.clone(), 1000)),
            registry: Arc::new(CallIdentityRegistry::new(
                store.clone(),
                clock,
                IdentityWindows::default(),
            )),
            network: NetworkMonitor::new(true),
            store,
        }
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            retry: RetryPolicy {
                use_jitter: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn spawn(f: &Fixture, remote: Arc<dyn RemoteStore>) -> WorkerHandle {
        let (handle, _task) = DeliveryWorker::spawn(
            WorkerParts {
                queue: f.queue.clone(),
                registry: f.registry.clone(),
                remote,
                store: f.store.clone(),
                network: f.network.clone(),
            },
            config(),
        );
        handle
    }

    fn event(number: &str, id: &str) -> CallEvent {
        CallEvent::new(
            PhoneKey::normalize(number),
            CallDirection::Inbound,
            CallOutcome::Ended,
            NOW,
            Some(12),
            CorrelationId::from_string(id),
            None,
        )
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            backoff_multiplier: 2.0,
            use_jitter: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(10), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_half_to_full_delay() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1_000),
            ..Default::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_for(0);
            assert!(delay >= Duration::from_millis(500) && delay <= Duration::from_millis(1_000));
        }
    }

    #[tokio::test]
    async fn test_delivery_lands_in_remote_store_in_order() {
        let f = fixture();
        let remote = Arc::new(InMemoryRemoteStore::new());
        let handle = spawn(&f, remote.clone());

        handle.schedule_delivery(job_input(&event("4155550199", "a"), NOW));
        handle.schedule_delivery(job_input(&event("2125550123", "b"), NOW));
        handle.wait_idle().await;

        let ids: Vec<String> = remote
            .entries()
            .await
            .iter()
            .map(|e| e.event.correlation_id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(f.queue.size().await, 0);
        assert!(f.store.get(keys::PENDING_WORK).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_undelivered_tail() {
        let f = fixture();
        f.queue.enqueue(QueueEntry::new(event("1", "a"), NOW)).await.unwrap();
        f.queue.enqueue(QueueEntry::new(event("2", "b"), NOW)).await.unwrap();
        f.queue.enqueue(QueueEntry::new(event("3", "c"), NOW)).await.unwrap();

        let mut remote = MockRemoteStore::new();
        remote.expect_store().returning(|entry| {
            if entry.event.correlation_id().as_str() == "b" {
                Err(DomainError::DeliveryPathUnavailable("503".to_string()))
            } else {
                Ok(())
            }
        });
        let handle = spawn(&f, Arc::new(remote));

        handle.schedule_drain();
        handle.wait_idle().await;

        let left: Vec<String> = f
            .queue
            .peek_all()
            .await
            .iter()
            .map(|e| e.event.correlation_id().to_string())
            .collect();
        assert_eq!(left, vec!["b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_remote_retried_with_backoff() {
        let f = fixture();
        let remote = Arc::new(InMemoryRemoteStore::new());
        remote.set_unavailable(true);
        let handle = spawn(&f, remote.clone());

        handle.schedule_delivery(job_input(&event("4155550199", "a"), NOW));
        handle.wait_idle().await;
        assert_eq!(f.queue.size().await, 1);

        remote.set_unavailable(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.wait_idle().await;

        assert_eq!(remote.entries().await.len(), 1);
        assert_eq!(f.queue.size().await, 0);
    }

    #[tokio::test]
    async fn test_missing_number_recovered_from_reverse_mapping() {
        let f = fixture();
        let key = PhoneKey::normalize("4155550199");
        let id = f.registry.ensure(&key).await.unwrap();
        let remote = Arc::new(InMemoryRemoteStore::new());
        let handle = spawn(&f, remote.clone());

        let mut input = job_input(&event("4155550199", id.as_str()), NOW);
        input.remove("phoneNumber");
        handle.schedule_delivery(input);
        handle.wait_idle().await;

        let entries = remote.entries().await;
        assert_eq!(entries[0].event.phone_key(), &key);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_wait_for_network() {
        let f = fixture();
        f.network.set_available(false);
        let remote = Arc::new(InMemoryRemoteStore::new());
        let handle = spawn(&f, remote.clone());

        handle.schedule_delivery(job_input(&event("4155550199", "a"), NOW));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(f.queue.size().await, 0);
        assert!(remote.entries().await.is_empty());

        f.network.set_available(true);
        handle.wait_idle().await;
        assert_eq!(remote.entries().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_scheduled_offline_survive_worker_kill() {
        let f = fixture();
        f.network.set_available(false);
        let (handle, task) = DeliveryWorker::spawn(
            WorkerParts {
                queue: f.queue.clone(),
                registry: f.registry.clone(),
                remote: Arc::new(InMemoryRemoteStore::new()),
                store: f.store.clone(),
                network: f.network.clone(),
            },
            config(),
        );

        for (number, id) in [("4155550199", "a"), ("2125550123", "b"), ("5550100", "c")] {
            handle.schedule_delivery(job_input(&event(number, id), NOW));
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        task.abort();
        let _ = task.await;

        let journalled: Vec<String> = JobJournal::new(f.store.clone())
            .pending()
            .await
            .iter()
            .map(|job| job.input["callId"].clone())
            .collect();
        assert_eq!(journalled, vec!["a", "b", "c"]);

        f.network.set_available(true);
        let remote = Arc::new(InMemoryRemoteStore::new());
        let restarted = spawn(&f, remote.clone());
        assert_eq!(restarted.resume().await, 3);
        restarted.wait_idle().await;

        let delivered: Vec<String> = remote
            .entries()
            .await
            .iter()
            .map(|e| e.event.correlation_id().to_string())
            .collect();
        assert_eq!(delivered, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_resume_replays_journal() {
        let f = fixture();
        let journal = JobJournal::new(f.store.clone());
        journal
            .append(&JournaledJob {
                id: "left-over".to_string(),
                input: job_input(&event("4155550199", "a"), NOW),
            })
            .await
            .unwrap();

        let remote = Arc::new(InMemoryRemoteStore::new());
        let handle = spawn(&f, remote.clone());
        assert_eq!(handle.resume().await, 1);
        handle.wait_idle().await;

        assert_eq!(remote.entries().await.len(), 1);
        assert!(journal.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_job_discarded() {
        let f = fixture();
        let remote = Arc::new(InMemoryRemoteStore::new());
        let handle = spawn(&f, remote.clone());

        let mut input = job_input(&event("4155550199", "a"), NOW);
        input.remove("direction");
        handle.schedule_delivery(input);
        handle.wait_idle().await;

        assert_eq!(f.queue.size().await, 0);
        assert!(JobJournal::new(f.store.clone()).pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_journal_reads_empty() {
        let f = fixture();
        f.store.put(keys::PENDING_WORK, "[oops").await.unwrap();
        let journal = JobJournal::new(f.store.clone());
        assert!(journal.pending().await.is_empty());
        assert!(f.store.get(keys::PENDING_WORK).await.unwrap().is_none());
    }
}
