//! Call State Reconciler
//!
//! Consumes the racing signal sources and rebuilds one canonical event
//! stream per physical call:
//!
//! ```text
//! IDLE --ringing--> RINGING --offhook--> OFFHOOK --idle--> IDLE (finalize)
//!   \                  \_____________idle____________________/
//!    \--offhook (outgoing, or early outbound via marker)--> OFFHOOK
//! ```
//!
//! Finalization never trusts the transition signal for duration. It waits
//! for the call history to settle, queries it with a bounded retry, picks a
//! row and classifies it. When the history is unreadable or stays empty,
//! the outgoing marker (or whatever the tracked call knows) produces a
//! provisional final so a call never ends without an event.

use crate::domain::call::{CallDirection, CallEvent, CallOutcome, Signal, TelephonyState};
use crate::domain::call_log::{classify, select_row, CallLogProvider, CallLogRow};
use crate::domain::delivery::DeliveryScheduler;
use crate::domain::finalization::{FinalizationGuard, GuardVerdict};
use crate::domain::identity::CallIdentityRegistry;
use crate::domain::marker::{OutgoingMarker, OutgoingMarkerStore};
use crate::domain::notification::{CallStatus, NotificationPresenter};
use crate::domain::shared::{Clock, CorrelationId, DomainError, PhoneKey, Result};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Timing of the history settle / retry loop
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerTimings {
    /// Wait before the first history query
    pub settle_delay: Duration,
    /// Extra attempts after an empty or failed first query
    pub query_retries: u32,
    pub retry_delay: Duration,
    /// Only rows newer than this are considered
    pub history_lookback_ms: i64,
    pub history_limit: usize,
}

impl Default for ReconcilerTimings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1_500),
            query_retries: 6,
            retry_delay: Duration::from_millis(900),
            history_lookback_ms: 5 * 60 * 1000,
            history_limit: 10,
        }
    }
}

/// Collaborators of the reconciler
pub struct ReconcilerParts {
    pub registry: Arc<CallIdentityRegistry>,
    pub markers: Arc<OutgoingMarkerStore>,
    pub guard: Arc<FinalizationGuard>,
    pub call_log: Arc<dyn CallLogProvider>,
    pub delivery: Arc<DeliveryScheduler>,
    pub presenter: Arc<dyn NotificationPresenter>,
    pub clock: Arc<dyn Clock>,
}

/// What the reconciler knows about the call in flight
#[derive(Debug, Clone)]
struct TrackedCall {
    state: TelephonyState,
    number: Option<PhoneKey>,
    direction: Option<CallDirection>,
    correlation_id: Option<CorrelationId>,
    /// Marker consumed by an early-outbound attribution
    marker: Option<OutgoingMarker>,
}

impl TrackedCall {
    fn idle() -> Self {
        Self {
            state: TelephonyState::Idle,
            number: None,
            direction: None,
            correlation_id: None,
            marker: None,
        }
    }
}

/// Snapshot handed to a finalization task
#[derive(Debug, Clone)]
struct FinalizationContext {
    number: Option<PhoneKey>,
    direction: Option<CallDirection>,
    correlation_id: Option<CorrelationId>,
    marker: Option<OutgoingMarker>,
    ended_at_ms: i64,
}

pub struct CallStateReconciler {
    registry: Arc<CallIdentityRegistry>,
    markers: Arc<OutgoingMarkerStore>,
    guard: Arc<FinalizationGuard>,
    call_log: Arc<dyn CallLogProvider>,
    delivery: Arc<DeliveryScheduler>,
    presenter: Arc<dyn NotificationPresenter>,
    clock: Arc<dyn Clock>,
    timings: ReconcilerTimings,
    tenant_tag: Option<String>,
    tracked: Mutex<TrackedCall>,
    finalizations: std::sync::Mutex<JoinSet<()>>,
}

impl CallStateReconciler {
    pub fn new(parts: ReconcilerParts, timings: ReconcilerTimings, tenant_tag: Option<String>) -> Self {
        Self {
            registry: parts.registry,
            markers: parts.markers,
            guard: parts.guard,
            call_log: parts.call_log,
            delivery: parts.delivery,
            presenter: parts.presenter,
            clock: parts.clock,
            timings,
            tenant_tag,
            tracked: Mutex::new(TrackedCall::idle()),
            finalizations: std::sync::Mutex::new(JoinSet::new()),
        }
    }

    /// Current telephony state of the tracked call
    pub async fn state(&self) -> TelephonyState {
        self.tracked.lock().await.state
    }

    /// Record one signal. Finalization, when triggered, runs on a spawned
    /// task so this returns as soon as the signal is recorded.
    pub async fn handle(self: &Arc<Self>, signal: Signal) -> Result<()> {
        counter!("calltrack_signals_total", "kind" => signal.kind()).increment(1);
        debug!("Signal received: {:?}", signal);

        match signal {
            Signal::OutgoingIntercepted { number } => self.on_outgoing(&number).await,
            Signal::StateChanged { state, number } => {
                self.on_state_changed(state, number.as_deref().and_then(PhoneKey::parse))
                    .await
            }
            Signal::SessionAdded { number } => {
                self.on_session_added(number.as_deref().and_then(PhoneKey::parse))
                    .await
            }
            Signal::SessionRemoved { number } => {
                self.on_session_removed(number.as_deref().and_then(PhoneKey::parse))
                    .await
            }
            Signal::CallLogSnapshot { rows } => {
                debug!("Call log snapshot with {} rows is not a call-state signal", rows.len());
                Ok(())
            }
        }
    }

    async fn on_outgoing(&self, raw_number: &str) -> Result<()> {
        let key = PhoneKey::parse(raw_number).ok_or_else(|| {
            DomainError::InvalidSignal(format!("outgoing call without a dialable number: {:?}", raw_number))
        })?;

        self.markers.mark(&key).await?;
        let correlation_id = self.registry.ensure(&key).await?;
        {
            let mut tracked = self.tracked.lock().await;
            tracked.number = Some(key.clone());
            tracked.direction = Some(CallDirection::Outbound);
            tracked.correlation_id = Some(correlation_id.clone());
        }

        info!("Outgoing call to {} intercepted ({})", key, correlation_id);
        self.presenter.present(&CallStatus::Dialing { number: key.clone() });
        self.emit(CallEvent::new(
            key,
            CallDirection::Outbound,
            CallOutcome::OutgoingStart,
            self.clock.now_ms(),
            None,
            correlation_id,
            self.tenant_tag.clone(),
        ));
        Ok(())
    }

    async fn on_state_changed(self: &Arc<Self>, state: TelephonyState, number: Option<PhoneKey>) -> Result<()> {
        let mut tracked = self.tracked.lock().await;
        if tracked.number.is_none() {
            tracked.number = number.clone();
        }
        let previous = tracked.state;

        match (previous, state) {
            (TelephonyState::Idle, TelephonyState::Ringing) => {
                tracked.state = TelephonyState::Ringing;
                tracked.direction = Some(CallDirection::Inbound);
                if let Some(key) = tracked.number.clone() {
                    tracked.correlation_id = Some(self.registry.ensure(&key).await?);
                }
                info!("Incoming call ringing from {:?}", tracked.number);
                self.presenter.present(&CallStatus::Ringing {
                    number: tracked.number.clone(),
                });
            }
            (TelephonyState::Idle, TelephonyState::Offhook) => {
                tracked.state = TelephonyState::Offhook;
                self.on_offhook_from_idle(&mut tracked, number).await?;
            }
            (TelephonyState::Ringing, TelephonyState::Offhook) => {
                tracked.state = TelephonyState::Offhook;
                let marker = self.markers.fresh().await?;
                let outbound = match (&marker, &tracked.number) {
                    (Some(marker), Some(key)) => marker.phone_key.matches(key),
                    _ => false,
                };
                let direction = if outbound {
                    CallDirection::Outbound
                } else {
                    tracked.direction.unwrap_or(CallDirection::Inbound)
                };
                tracked.direction = Some(direction);
                info!("Call answered ({})", direction.as_str());
                self.emit_answered(&mut tracked).await?;
            }
            (TelephonyState::Ringing | TelephonyState::Offhook, TelephonyState::Idle) => {
                let context = self.finalization_context(&tracked);
                *tracked = TrackedCall::idle();
                drop(tracked);
                info!("Call ended after {}, finalizing", previous.as_str());
                self.spawn_finalization(context);
            }
            (TelephonyState::Offhook, TelephonyState::Ringing) => {
                debug!("Second call ringing while off-hook, not tracked");
            }
            _ => {
                debug!("Repeated {} state ignored", state.as_str());
            }
        }
        Ok(())
    }

    /// OFFHOOK straight from IDLE: either an outgoing call whose intercept
    /// signal has already landed, or one we can only guess at.
    async fn on_offhook_from_idle(&self, tracked: &mut TrackedCall, reported: Option<PhoneKey>) -> Result<()> {
        let known = reported.or_else(|| tracked.number.clone());
        let attributed = self
            .markers
            .fresh()
            .await?
            .filter(|marker| known.as_ref().map_or(true, |key| marker.phone_key.matches(key)));

        match attributed {
            Some(marker) => {
                info!("Early outbound call to {} attributed to outgoing marker", marker.phone_key);
                if tracked.number.is_none() {
                    tracked.number = Some(marker.phone_key.clone());
                }
                tracked.direction = Some(CallDirection::Outbound);
                self.markers.clear().await?;
                tracked.marker = Some(marker);
            }
            None => {
                tracked.direction = Some(tracked.direction.unwrap_or(CallDirection::Outbound));
            }
        }
        self.emit_answered(tracked).await
    }

    async fn emit_answered(&self, tracked: &mut TrackedCall) -> Result<()> {
        let direction = tracked.direction.unwrap_or(CallDirection::Inbound);
        self.presenter.present(&CallStatus::InCall {
            number: tracked.number.clone(),
            direction,
        });

        let (phone_key, correlation_id) = match (&tracked.number, &tracked.correlation_id) {
            (Some(key), _) => (key.clone(), self.registry.ensure(key).await?),
            (None, Some(id)) => (PhoneKey::unknown(), id.clone()),
            (None, None) => {
                debug!("Answered call has no number or id yet, no event emitted");
                return Ok(());
            }
        };
        tracked.correlation_id = Some(correlation_id.clone());

        self.emit(CallEvent::new(
            phone_key,
            direction,
            CallOutcome::Answered,
            self.clock.now_ms(),
            None,
            correlation_id,
            self.tenant_tag.clone(),
        ));
        Ok(())
    }

    async fn on_session_added(&self, number: Option<PhoneKey>) -> Result<()> {
        let Some(key) = number else {
            debug!("Session added without a number");
            return Ok(());
        };

        let correlation_id = self.registry.ensure(&key).await?;
        let marker = self.markers.fresh().await?;
        let mut tracked = self.tracked.lock().await;
        if tracked.number.is_none() {
            tracked.number = Some(key.clone());
        }
        if tracked.correlation_id.is_none() {
            tracked.correlation_id = Some(correlation_id);
        }
        if marker.map_or(false, |m| m.phone_key.matches(&key)) {
            tracked.direction = Some(CallDirection::Outbound);
        }
        debug!("Session added for {}", key);
        Ok(())
    }

    async fn on_session_removed(self: &Arc<Self>, number: Option<PhoneKey>) -> Result<()> {
        let mut tracked = self.tracked.lock().await;
        if !tracked.state.is_active() {
            debug!("Session removed after the call already finalized");
            return Ok(());
        }
        if tracked.number.is_none() {
            tracked.number = number;
        }
        let context = self.finalization_context(&tracked);
        *tracked = TrackedCall::idle();
        drop(tracked);
        info!("Session removed before idle transition, finalizing");
        self.spawn_finalization(context);
        Ok(())
    }

    fn finalization_context(&self, tracked: &TrackedCall) -> FinalizationContext {
        FinalizationContext {
            number: tracked.number.clone(),
            direction: tracked.direction,
            correlation_id: tracked.correlation_id.clone(),
            marker: tracked.marker.clone(),
            ended_at_ms: self.clock.now_ms(),
        }
    }

    fn spawn_finalization(self: &Arc<Self>, context: FinalizationContext) {
        let reconciler = Arc::clone(self);
        let mut tasks = self.finalizations.lock().unwrap_or_else(|e| e.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            reconciler.finalize(context).await;
        });
    }

    /// Wait for every finalization started so far
    pub async fn wait_idle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.finalizations.lock().unwrap_or_else(|e| e.into_inner()));
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!("Finalization task failed: {}", e);
                }
            }
        }
    }

    async fn finalize(&self, context: FinalizationContext) {
        let marker = match context.marker.clone() {
            Some(marker) => Some(marker),
            None => self.markers.last().await.unwrap_or_else(|e| {
                warn!("Failed to read outgoing marker: {}", e);
                None
            }),
        };

        let event = match self.resolve_from_history(&context, marker.as_ref()).await {
            Ok(event) => event,
            Err(e) => {
                let reason = match e {
                    DomainError::PermissionUnavailable => "permission",
                    _ => "history_empty",
                };
                warn!("Finalizing from fallback: {}", e);
                counter!("calltrack_finalization_fallback_total", "reason" => reason).increment(1);
                self.fallback_event(&context, marker.as_ref()).await
            }
        };
        self.emit_final(event).await;
    }

    async fn resolve_from_history(
        &self,
        context: &FinalizationContext,
        marker: Option<&OutgoingMarker>,
    ) -> Result<CallEvent> {
        if !self.call_log.has_permission().await {
            return Err(DomainError::PermissionUnavailable);
        }

        tokio::time::sleep(self.timings.settle_delay).await;
        let rows = self.query_with_retry().await;
        let window = self.markers.window_ms();
        let row = select_row(&rows, marker, window).ok_or_else(|| {
            DomainError::TransientQueryEmpty(format!(
                "still empty after {} retries",
                self.timings.query_retries
            ))
        })?;
        let (outcome, mut direction) = classify(row, context.direction);
        let row_key = row.phone_key();
        if marker.map_or(false, |m| m.correlates(&row_key, row.timestamp_ms, window)) {
            direction = CallDirection::Outbound;
        }

        let phone_key = if row_key.is_empty() {
            context.number.clone().unwrap_or_else(PhoneKey::unknown)
        } else {
            row_key
        };
        let correlation_id = self.correlation_for(&phone_key, context).await;
        info!(
            "Call to/from {} resolved from history: {} {} {}s",
            phone_key,
            direction.as_str(),
            outcome.as_str(),
            row.duration_secs
        );

        Ok(CallEvent::new(
            phone_key,
            direction,
            outcome,
            row.timestamp_ms,
            Some(row.duration_secs),
            correlation_id,
            self.tenant_tag.clone(),
        ))
    }

    async fn query_with_retry(&self) -> Vec<CallLogRow> {
        for attempt in 0..=self.timings.query_retries {
            let since = self.clock.now_ms() - self.timings.history_lookback_ms;
            match self.call_log.recent_rows(since, self.timings.history_limit).await {
                Ok(rows) if !rows.is_empty() => return rows,
                Ok(_) => debug!("Call history empty on attempt {}", attempt + 1),
                Err(e) => warn!("Call history query failed on attempt {}: {}", attempt + 1, e),
            }
            if attempt < self.timings.query_retries {
                tokio::time::sleep(self.timings.retry_delay).await;
            }
        }
        Vec::new()
    }

    /// Provisional final built from the marker and the tracked call
    async fn fallback_event(&self, context: &FinalizationContext, marker: Option<&OutgoingMarker>) -> CallEvent {
        let marker = marker.filter(|m| context.number.as_ref().map_or(true, |key| m.phone_key.matches(key)));
        let (phone_key, direction) = match marker {
            Some(marker) => (
                context.number.clone().unwrap_or_else(|| marker.phone_key.clone()),
                CallDirection::Outbound,
            ),
            None => (
                context.number.clone().unwrap_or_else(PhoneKey::unknown),
                context.direction.unwrap_or(CallDirection::Inbound),
            ),
        };
        let correlation_id = self.correlation_for(&phone_key, context).await;
        info!("Fallback final for {:?}: {}", phone_key.as_str(), direction.as_str());

        CallEvent::new(
            phone_key,
            direction,
            CallOutcome::Ended,
            context.ended_at_ms,
            None,
            correlation_id,
            self.tenant_tag.clone(),
        )
    }

    async fn correlation_for(&self, phone_key: &PhoneKey, context: &FinalizationContext) -> CorrelationId {
        if let (Some(id), Some(number)) = (&context.correlation_id, &context.number) {
            if number.matches(phone_key) {
                return id.clone();
            }
        }
        if phone_key.is_empty() {
            return context.correlation_id.clone().unwrap_or_default();
        }
        match self.registry.ensure(phone_key).await {
            Ok(id) => id,
            Err(e) => {
                error!("Identity lookup failed for {}: {}", phone_key, e);
                context.correlation_id.clone().unwrap_or_default()
            }
        }
    }

    /// Pass a final through the duplicate guards and deliver it
    pub(crate) async fn emit_final(&self, event: CallEvent) -> GuardVerdict {
        let verdict = match self.guard.admit(&event).await {
            Ok(verdict) => verdict,
            Err(e) => {
                // A broken guard store must not swallow the final
                error!("Finalization guard unavailable, delivering anyway: {}", e);
                GuardVerdict::Accepted
            }
        };
        if let Err(e) = verdict.check(&event) {
            info!("Final dropped: {}", e);
            return verdict;
        }

        if !event.phone_key().is_empty() {
            if let Err(e) = self.registry.clear(event.phone_key()).await {
                error!("Failed to clear identity for {}: {}", event.phone_key(), e);
            }
            match self.markers.last().await {
                Ok(Some(marker)) if marker.phone_key.matches(event.phone_key()) => {
                    if let Err(e) = self.markers.clear().await {
                        error!("Failed to clear outgoing marker: {}", e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to read outgoing marker: {}", e),
            }
        }

        self.presenter.present(&CallStatus::Ended {
            number: event.phone_key().clone(),
            outcome: event.outcome(),
        });
        self.emit(event);
        verdict
    }

    fn emit(&self, event: CallEvent) {
        counter!("calltrack_events_emitted_total", "outcome" => event.outcome().as_str()).increment(1);
        self.delivery.deliver(event);
    }
}
