//! Shared setup for integration tests

#![allow(dead_code)]

use calltrack::application::{CallTracker, RetryPolicy, TrackerSettings, WorkerConfig};
use calltrack::domain::call::{Signal, TelephonyState};
use calltrack::domain::call_log::CallLogRow;
use calltrack::domain::reconciler::ReconcilerTimings;
use calltrack::domain::shared::ManualClock;
use calltrack::infrastructure::notification::TracingNotificationPresenter;
use calltrack::infrastructure::persistence::MemoryKvStore;
use calltrack::infrastructure::remote::InMemoryRemoteStore;
use std::sync::Arc;
use std::time::Duration;

pub const T: i64 = 1_700_000_000_000;

pub struct TestEnv {
    pub tracker: Arc<CallTracker>,
    pub remote: Arc<InMemoryRemoteStore>,
    pub store: MemoryKvStore,
    pub clock: ManualClock,
}

pub fn settings() -> TrackerSettings {
    TrackerSettings {
        timings: ReconcilerTimings {
            settle_delay: Duration::from_millis(200),
            retry_delay: Duration::from_millis(100),
            ..Default::default()
        },
        worker: WorkerConfig {
            retry: RetryPolicy {
                initial_delay: Duration::from_millis(100),
                use_jitter: false,
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Tracker over `store`; pass a clone of an earlier store to simulate a restart
pub fn start_with(store: MemoryKvStore, clock: ManualClock) -> TestEnv {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let tracker = Arc::new(CallTracker::start(
        Arc::new(store.clone()),
        remote.clone(),
        Arc::new(TracingNotificationPresenter),
        Arc::new(clock.clone()),
        settings(),
    ));
    TestEnv {
        tracker,
        remote,
        store,
        clock,
    }
}

pub fn start() -> TestEnv {
    start_with(MemoryKvStore::new(), ManualClock::new(T))
}

pub fn state(state: TelephonyState, number: Option<&str>) -> Signal {
    Signal::StateChanged {
        state,
        number: number.map(str::to_string),
    }
}

pub fn outgoing(number: &str) -> Signal {
    Signal::OutgoingIntercepted {
        number: number.to_string(),
    }
}

pub fn snapshot(rows: Vec<CallLogRow>) -> Signal {
    Signal::CallLogSnapshot { rows }
}

pub fn row(number: &str, type_code: i32, duration_secs: i64, timestamp_ms: i64) -> CallLogRow {
    CallLogRow {
        number: number.to_string(),
        type_code,
        duration_secs,
        timestamp_ms,
    }
}
