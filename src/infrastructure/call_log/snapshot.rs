//! Call history fed by `call_log_snapshot` signals
//!
//! The process cannot read the device history itself; the signal source
//! that can pushes the latest rows here. Each snapshot replaces the
//! previous one.

use crate::domain::call_log::{CallLogProvider, CallLogRow};
use crate::domain::shared::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

pub struct SnapshotCallLog {
    rows: RwLock<Vec<CallLogRow>>,
    permission: AtomicBool,
}

impl SnapshotCallLog {
    pub fn new(permission_granted: bool) -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            permission: AtomicBool::new(permission_granted),
        }
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    /// Replace the known history
    pub async fn replace(&self, rows: Vec<CallLogRow>) {
        debug!("Call log snapshot replaced with {} rows", rows.len());
        *self.rows.write().await = rows;
    }
}

#[async_trait]
impl CallLogProvider for SnapshotCallLog {
    async fn has_permission(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    async fn recent_rows(&self, since_ms: i64, limit: usize) -> Result<Vec<CallLogRow>> {
        let mut rows: Vec<CallLogRow> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| row.timestamp_ms >= since_ms)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        rows.truncate(limit);
        Ok(rows)
    }
}
