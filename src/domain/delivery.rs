//! Delivery scheduler
//!
//! Every emitted event takes two independent paths:
//!
//! * an immediate hand-off to the live consumer, if one is attached. When
//!   none is attached, or the hand-off fails, the event waits in a bounded
//!   in-memory buffer that is drained in order on the next attach;
//! * a durable background job that persists the event into the durable
//!   queue and drains it to the remote store. Only this path survives a
//!   process restart.

use crate::domain::call::{CallDirection, CallEvent, CallOutcome};
use crate::domain::event_queue::QueueEntry;
use crate::domain::shared::{Clock, CorrelationId, DomainError, PhoneKey, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub const DEFAULT_PENDING_CAP: usize = 200;

/// Live consumer of call events
pub trait EventSink: Send + Sync {
    fn send(&self, event: &CallEvent) -> Result<()>;
}

/// Remote document store the durable queue drains into
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn store(&self, entry: &QueueEntry) -> Result<()>;
}

/// Flattened key-value input of the background delivery job
pub type JobInput = BTreeMap<String, String>;

/// Schedules durable background work
pub trait JobScheduler: Send + Sync {
    /// Persist one event into the durable queue, then drain
    fn schedule_delivery(&self, input: JobInput);

    /// Drain the durable queue to the remote store
    fn schedule_drain(&self);
}

/// Snapshot of the scheduler's in-memory side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStatus {
    pub consumer_attached: bool,
    pub pending: usize,
}

pub struct DeliveryScheduler {
    sink: Mutex<Option<Arc<dyn EventSink>>>,
    pending: Mutex<VecDeque<CallEvent>>,
    pending_cap: usize,
    jobs: Arc<dyn JobScheduler>,
    clock: Arc<dyn Clock>,
}

impl DeliveryScheduler {
    pub fn new(jobs: Arc<dyn JobScheduler>, clock: Arc<dyn Clock>, pending_cap: usize) -> Self {
        Self {
            sink: Mutex::new(None),
            pending: Mutex::new(VecDeque::new()),
            pending_cap: pending_cap.max(1),
            jobs,
            clock,
        }
    }

    /// Hand an event to the live consumer and to the durable job.
    /// Never fails the caller.
    pub fn deliver(&self, event: CallEvent) {
        self.hand_off(event.clone());

        let input = job_input(&event, self.clock.now_ms());
        self.jobs.schedule_delivery(input);
    }

    /// Live path. A new event never overtakes one still buffered: with a
    /// backlog it joins the tail and the whole buffer drains in order.
    fn hand_off(&self, event: CallEvent) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let Some(sink) = self.current_sink() else {
            debug!("No live consumer, buffering event {}", event.dedup_key());
            self.buffer(&mut pending, event);
            return;
        };

        if pending.is_empty() {
            if let Err(e) = sink.send(&event) {
                debug!("Buffering event {}: {}", event.dedup_key(), e);
                self.buffer(&mut pending, event);
            }
            return;
        }

        self.buffer(&mut pending, event);
        Self::drain_into(sink.as_ref(), &mut pending);
    }

    fn buffer(&self, pending: &mut VecDeque<CallEvent>, event: CallEvent) {
        pending.push_back(event);
        while pending.len() > self.pending_cap {
            if let Some(dropped) = pending.pop_front() {
                warn!("Pending buffer full, dropping oldest event {}", dropped.dedup_key());
            }
        }
    }

    fn current_sink(&self) -> Option<Arc<dyn EventSink>> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Attach a live consumer and drain the pending buffer into it
    pub fn attach(&self, sink: Arc<dyn EventSink>) -> usize {
        // Held across publish and drain so no delivery slips in between
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink.clone());
        info!("Live consumer attached");
        Self::drain_into(sink.as_ref(), &mut pending)
    }

    pub fn detach(&self) {
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = None;
        info!("Live consumer detached");
    }

    /// Manual flush: drain the in-memory buffer and kick the durable drain
    pub fn flush(&self) -> usize {
        let drained = self.drain_pending();
        self.jobs.schedule_drain();
        drained
    }

    fn drain_pending(&self) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match self.current_sink() {
            Some(sink) => Self::drain_into(sink.as_ref(), &mut pending),
            None => 0,
        }
    }

    /// Send buffered events in original order. A failed send goes back to
    /// the front and stops the drain.
    fn drain_into(sink: &dyn EventSink, pending: &mut VecDeque<CallEvent>) -> usize {
        let mut sent = 0;
        while let Some(event) = pending.pop_front() {
            if let Err(e) = sink.send(&event) {
                warn!("Drain to live consumer failed after {} events: {}", sent, e);
                pending.push_front(event);
                break;
            }
            sent += 1;
        }
        if sent > 0 {
            info!("Drained {} pending events to live consumer", sent);
        }
        sent
    }

    pub fn status(&self) -> DeliveryStatus {
        DeliveryStatus {
            consumer_attached: self.current_sink().is_some(),
            pending: self.pending.lock().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }
}

/// Flatten an event into the job's key-value input
pub fn job_input(event: &CallEvent, received_at: i64) -> JobInput {
    let mut input = JobInput::new();
    if !event.phone_key().is_empty() {
        input.insert("phoneNumber".to_string(), event.phone_key().to_string());
    }
    input.insert("direction".to_string(), event.direction().as_str().to_string());
    input.insert("outcome".to_string(), event.outcome().as_str().to_string());
    input.insert("timestamp".to_string(), event.timestamp_ms().to_string());
    if let Some(duration) = event.duration_secs() {
        input.insert("durationInSeconds".to_string(), duration.to_string());
    }
    input.insert("callId".to_string(), event.correlation_id().to_string());
    if let Some(tag) = event.tenant_tag() {
        input.insert("tenantTag".to_string(), tag.to_string());
    }
    input.insert("receivedAt".to_string(), received_at.to_string());
    input
}

/// Rebuild the event and its `receivedAt` from a job's input. An absent
/// phone number yields an empty key for the job to recover.
pub fn parse_job_input(input: &JobInput) -> Result<(CallEvent, i64)> {
    fn field<'a>(input: &'a JobInput, name: &str) -> Result<&'a str> {
        input
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| DomainError::InvalidSignal(format!("job input missing {}", name)))
    }

    fn number(input: &JobInput, name: &str) -> Result<i64> {
        field(input, name)?
            .parse::<i64>()
            .map_err(|_| DomainError::InvalidSignal(format!("job input {} is not a number", name)))
    }

    let direction = CallDirection::from_str(field(input, "direction")?)
        .ok_or_else(|| DomainError::InvalidSignal("unknown direction".to_string()))?;
    let outcome = CallOutcome::from_str(field(input, "outcome")?)
        .ok_or_else(|| DomainError::InvalidSignal("unknown outcome".to_string()))?;
    let duration = match input.get("durationInSeconds") {
        Some(_) => Some(number(input, "durationInSeconds")?),
        None => None,
    };

    let event = CallEvent::new(
        input
            .get("phoneNumber")
            .map(|raw| PhoneKey::normalize(raw))
            .unwrap_or_else(PhoneKey::unknown),
        direction,
        outcome,
        number(input, "timestamp")?,
        duration,
        CorrelationId::from_string(field(input, "callId")?),
        input.get("tenantTag").cloned(),
    );
    Ok((event, number(input, "receivedAt")?))
}
