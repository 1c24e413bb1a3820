//! Call tracker
//!
//! Wires the registry, reconciler, delivery scheduler, durable queue and
//! background worker together. Signal sources only ever talk to this.

use crate::application::delivery_worker::{
    DeliveryWorker, NetworkMonitor, WorkerConfig, WorkerHandle, WorkerParts,
};
use crate::domain::call::{Signal, TelephonyState};
use crate::domain::delivery::{DeliveryScheduler, DeliveryStatus, EventSink, RemoteStore};
use crate::domain::event_queue::DurableEventQueue;
use crate::domain::finalization::{FinalizationGuard, GuardWindows};
use crate::domain::identity::{CallIdentityRegistry, IdentityWindows};
use crate::domain::marker::OutgoingMarkerStore;
use crate::domain::notification::NotificationPresenter;
use crate::domain::reconciler::{CallStateReconciler, ReconcilerParts, ReconcilerTimings};
use crate::domain::shared::{Clock, Result};
use crate::domain::storage::KeyValueStore;
use crate::infrastructure::call_log::SnapshotCallLog;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Every tunable of the tracker
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub identity: IdentityWindows,
    pub marker_window_ms: i64,
    pub guard: GuardWindows,
    pub timings: ReconcilerTimings,
    pub queue_cap: usize,
    pub pending_cap: usize,
    pub worker: WorkerConfig,
    pub tenant_tag: Option<String>,
    pub call_log_permission: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            identity: IdentityWindows::default(),
            marker_window_ms: 12_000,
            guard: GuardWindows::default(),
            timings: ReconcilerTimings::default(),
            queue_cap: crate::domain::event_queue::DEFAULT_QUEUE_CAP,
            pending_cap: crate::domain::delivery::DEFAULT_PENDING_CAP,
            worker: WorkerConfig::default(),
            tenant_tag: None,
            call_log_permission: true,
        }
    }
}

pub struct CallTracker {
    reconciler: Arc<CallStateReconciler>,
    delivery: Arc<DeliveryScheduler>,
    queue: Arc<DurableEventQueue>,
    call_log: Arc<SnapshotCallLog>,
    worker: WorkerHandle,
    worker_task: JoinHandle<()>,
    network: NetworkMonitor,
}

impl CallTracker {
    /// Build every component over `store` and start the delivery worker
    pub fn start(
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteStore>,
        presenter: Arc<dyn NotificationPresenter>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> Self {
        let registry = Arc::new(CallIdentityRegistry::new(
            store.clone(),
            clock.clone(),
            settings.identity,
        ));
        let queue = Arc::new(DurableEventQueue::new(
            store.clone(),
            clock.clone(),
            settings.queue_cap,
        ));
        let network = NetworkMonitor::new(true);

        let (worker, worker_task) = DeliveryWorker::spawn(
            WorkerParts {
                queue: queue.clone(),
                registry: registry.clone(),
                remote,
                store: store.clone(),
                network: network.clone(),
            },
            settings.worker.clone(),
        );

        let delivery = Arc::new(DeliveryScheduler::new(
            Arc::new(worker.clone()),
            clock.clone(),
            settings.pending_cap,
        ));
        let call_log = Arc::new(SnapshotCallLog::new(settings.call_log_permission));

        let reconciler = Arc::new(CallStateReconciler::new(
            ReconcilerParts {
                registry,
                markers: Arc::new(OutgoingMarkerStore::new(
                    store.clone(),
                    clock.clone(),
                    settings.marker_window_ms,
                )),
                guard: Arc::new(FinalizationGuard::new(store, clock.clone(), settings.guard)),
                call_log: call_log.clone(),
                delivery: delivery.clone(),
                presenter,
                clock,
            },
            settings.timings,
            settings.tenant_tag,
        ));

        info!("Call tracker started");
        Self {
            reconciler,
            delivery,
            queue,
            call_log,
            worker,
            worker_task,
            network,
        }
    }

    /// Record one signal from any source
    pub async fn ingest(&self, signal: Signal) -> Result<()> {
        match signal {
            Signal::CallLogSnapshot { rows } => {
                self.call_log.replace(rows).await;
                Ok(())
            }
            other => self.reconciler.handle(other).await,
        }
    }

    pub async fn state(&self) -> TelephonyState {
        self.reconciler.state().await
    }

    /// Attach the live consumer; returns how many buffered events it got
    pub fn attach(&self, sink: Arc<dyn EventSink>) -> usize {
        self.delivery.attach(sink)
    }

    pub fn detach(&self) {
        self.delivery.detach();
    }

    /// Manual flush of both delivery paths
    pub fn flush(&self) -> usize {
        self.delivery.flush()
    }

    pub fn delivery_status(&self) -> DeliveryStatus {
        self.delivery.status()
    }

    pub fn queue(&self) -> &Arc<DurableEventQueue> {
        &self.queue
    }

    pub fn call_log(&self) -> &Arc<SnapshotCallLog> {
        &self.call_log
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Re-run delivery jobs journalled by a previous process
    pub async fn resume(&self) -> usize {
        self.worker.resume().await
    }

    /// Wait for in-flight finalizations and background jobs
    pub async fn wait_idle(&self) {
        self.reconciler.wait_idle().await;
        self.worker.wait_idle().await;
    }

    pub fn shutdown(&self) {
        self.worker_task.abort();
        info!("Call tracker stopped");
    }
}
