//! 調度協調器：每個 tick 執行一次 套用終態 → 拉取 → 轉換 → 去重 → 決定車輛 → 下單 → 記錄。
//!
//! 單寫者：所有可變狀態（fetch marker、冪等紀錄、序列）都在同一把鎖後面，
//! `run_once` 以 `try_lock` 取得，拿不到代表上一輪仍在執行，本輪直接略過。

use crate::core::ledger::{DispatchState, Membership};
use crate::core::transform::build_request;
use crate::domain::eligibility::{first_eligible, ineligibility_reason};
use crate::domain::model::{
    FetchBatch, OutcomeNotification, RawOrder, SubmitOutcome, TransportOrderRequest,
    VehicleSnapshot,
};
use crate::domain::object::TcsObject;
use crate::domain::ports::{ConfigProvider, KernelClient, OrderSource, Storage};
use crate::domain::sequence::{OrderSequence, SequenceTransition};
use crate::utils::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// 訂單期限 = 拉取時間 + order_horizon
    pub order_horizon: Duration,
    /// 冪等紀錄保留時間
    pub retention: Duration,
    /// 單一 tick 的處理上限，超過則剩餘訂單延到下一輪
    pub tick_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            order_horizon: Duration::from_secs(120 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
            tick_timeout: Duration::from_secs(8),
        }
    }
}

impl DispatchSettings {
    pub fn from_config<C: ConfigProvider>(config: &C) -> Self {
        Self {
            order_horizon: config.order_horizon(),
            retention: config.retention(),
            tick_timeout: config.tick_timeout(),
        }
    }
}

/// 一筆 (訂單編號, 原因)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReason {
    pub order_id: String,
    pub reason: String,
}

impl ItemReason {
    fn new(order_id: &str, reason: impl Into<String>) -> Self {
        Self {
            order_id: order_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// 每個 tick 的處理匯總
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub tick_started_at: DateTime<Utc>,
    pub skipped: bool,
    pub fetched: usize,
    pub submitted: Vec<String>,
    pub duplicates: usize,
    pub deferred: Vec<ItemReason>,
    pub rejected: Vec<ItemReason>,
    pub sequence_transitions: Vec<SequenceTransition>,
    pub sequence_errors: Vec<ItemReason>,
    pub outcomes_recorded: usize,
    pub marker_advanced: bool,
    pub interrupted: bool,
    pub fetch_error: Option<String>,
}

impl TickSummary {
    fn new(tick_started_at: DateTime<Utc>) -> Self {
        Self {
            tick_started_at,
            skipped: false,
            fetched: 0,
            submitted: Vec::new(),
            duplicates: 0,
            deferred: Vec::new(),
            rejected: Vec::new(),
            sequence_transitions: Vec::new(),
            sequence_errors: Vec::new(),
            outcomes_recorded: 0,
            marker_advanced: false,
            interrupted: false,
            fetch_error: None,
        }
    }

    pub fn has_problems(&self) -> bool {
        !self.rejected.is_empty() || !self.sequence_errors.is_empty() || self.fetch_error.is_some()
    }
}

impl fmt::Display for TickSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "skipped (previous pass still running)");
        }
        write!(
            f,
            "fetched={} submitted={} duplicates={} deferred={} rejected={} transitions={} outcomes={} marker_advanced={}",
            self.fetched,
            self.submitted.len(),
            self.duplicates,
            self.deferred.len(),
            self.rejected.len(),
            self.sequence_transitions.len(),
            self.outcomes_recorded,
            self.marker_advanced
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        if let Some(err) = &self.fetch_error {
            write!(f, " fetch_error=\"{}\"", err)?;
        }
        Ok(())
    }
}

enum Bounded<T> {
    Done(T),
    Cancelled,
    TimedOut,
}

async fn bounded<T>(
    cancel: &CancellationToken,
    deadline: Instant,
    work: impl Future<Output = T>,
) -> Bounded<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        _ = tokio::time::sleep_until(deadline) => Bounded::TimedOut,
        value = work => Bounded::Done(value),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Disposition {
    Submitted,
    Duplicate,
    Rejected(String),
    Deferred(String),
    Interrupted,
}

enum VehiclePool {
    Unloaded,
    Loaded(Vec<VehicleSnapshot>),
    Unavailable(String),
}

/// 單一輪處理中的暫存狀態
struct PassContext {
    fetched_at: DateTime<Utc>,
    deadline: Instant,
    seen: HashSet<String>,
    blocked_sequences: HashSet<String>,
    claimed_vehicles: HashSet<String>,
    pool: VehiclePool,
    persist_failed: bool,
}

pub struct DispatchCoordinator<S: Storage> {
    source: Arc<dyn OrderSource>,
    kernel: Arc<dyn KernelClient>,
    storage: S,
    settings: DispatchSettings,
    state: Mutex<DispatchState>,
}

impl<S: Storage> DispatchCoordinator<S> {
    /// 建立協調器並從 storage 載入上次保存的狀態
    pub async fn new(
        source: Arc<dyn OrderSource>,
        kernel: Arc<dyn KernelClient>,
        storage: S,
        settings: DispatchSettings,
    ) -> Result<Self> {
        let state = DispatchState::load(&storage).await?;
        Ok(Self {
            source,
            kernel,
            storage,
            settings,
            state: Mutex::new(state),
        })
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// 目前狀態的副本（會等待進行中的 pass 結束）
    pub async fn snapshot(&self) -> DispatchState {
        self.state.lock().await.clone()
    }

    pub async fn sequence(&self, name: &str) -> Option<OrderSequence> {
        self.state.lock().await.sequences.get(name).cloned()
    }

    /// 執行一輪調度。若上一輪尚未結束，立即回傳 `skipped`。
    pub async fn run_once(&self, cancel: &CancellationToken) -> TickSummary {
        let started_at = Utc::now();
        let mut summary = TickSummary::new(started_at);

        let Ok(mut state) = self.state.try_lock() else {
            tracing::info!("⏭️ Previous dispatch pass still running, skipping tick");
            summary.skipped = true;
            return summary;
        };

        let purged = state.purge_expired(started_at, self.settings.retention);
        if purged > 0 {
            tracing::debug!("🧹 Purged {} expired ledger entries/sequences", purged);
        }

        let mut ctx = PassContext {
            fetched_at: started_at,
            deadline: Instant::now() + self.settings.tick_timeout,
            seen: HashSet::new(),
            blocked_sequences: HashSet::new(),
            claimed_vehicles: HashSet::new(),
            pool: VehiclePool::Unloaded,
            persist_failed: false,
        };

        // Outcomes：kernel 的終態回報與來源是否可用無關，每輪先套用
        if !cancel.is_cancelled() {
            match bounded(cancel, ctx.deadline, self.kernel.poll_outcomes()).await {
                Bounded::Done(Ok(notifications)) => {
                    self.apply_notifications(&mut state, notifications, &mut summary);
                }
                Bounded::Done(Err(e)) => {
                    tracing::warn!("⚠️ Polling order outcomes failed: {}", e);
                }
                Bounded::Cancelled | Bounded::TimedOut => {
                    tracing::warn!("⏹️ Dispatch pass interrupted while polling outcomes");
                    summary.interrupted = true;
                }
            }
        }

        // Fetch：失敗只略過本輪的下單，不影響其餘步驟
        let marker = state.marker.clone();
        tracing::debug!("📥 Fetching pending orders since {:?}", marker);
        match bounded(cancel, ctx.deadline, self.source.fetch_pending(marker.as_deref())).await {
            Bounded::Done(Ok(batch)) => {
                self.dispatch_batch(&mut state, batch, &mut ctx, &mut summary, cancel)
                    .await;
            }
            Bounded::Done(Err(e)) => {
                tracing::warn!("⚠️ Fetching pending orders failed: {}", e);
                summary.fetch_error = Some(e.to_string());
            }
            Bounded::Cancelled | Bounded::TimedOut => {
                tracing::warn!("⏹️ Dispatch pass interrupted while fetching");
                summary.interrupted = true;
            }
        }

        let dirty = !summary.rejected.is_empty()
            || !summary.sequence_transitions.is_empty()
            || summary.outcomes_recorded > 0
            || ctx.persist_failed
            || purged > 0;
        if dirty {
            if let Err(e) = state.save(&self.storage).await {
                tracing::error!("💾 Could not persist dispatch state: {}", e);
            }
        }

        summary
    }

    async fn dispatch_batch(
        &self,
        state: &mut DispatchState,
        batch: FetchBatch,
        ctx: &mut PassContext,
        summary: &mut TickSummary,
        cancel: &CancellationToken,
    ) {
        summary.fetched = batch.orders.len() + batch.malformed.len();
        if summary.fetched > 0 {
            tracing::info!("📥 Fetched {} pending orders", summary.fetched);
        }

        let mut all_terminal = true;
        for (position, raw) in batch.orders.iter().enumerate() {
            let disposition = if cancel.is_cancelled() || Instant::now() >= ctx.deadline {
                Disposition::Interrupted
            } else {
                self.process_record(state, raw, ctx, summary, cancel).await
            };

            match disposition {
                Disposition::Submitted => summary.submitted.push(raw.external_id.clone()),
                Disposition::Duplicate => summary.duplicates += 1,
                Disposition::Rejected(reason) => {
                    tracing::warn!("❌ Order {} rejected: {}", raw.external_id, reason);
                    summary
                        .rejected
                        .push(ItemReason::new(&raw.external_id, reason));
                }
                Disposition::Deferred(reason) => {
                    tracing::info!("⏸️ Order {} deferred: {}", raw.external_id, reason);
                    all_terminal = false;
                    if let Some(sequence) = raw.sequence_name() {
                        ctx.blocked_sequences.insert(sequence.to_string());
                    }
                    summary
                        .deferred
                        .push(ItemReason::new(&raw.external_id, reason));
                }
                Disposition::Interrupted => {
                    all_terminal = false;
                    summary.interrupted = true;
                    tracing::warn!(
                        "⏹️ Dispatch pass interrupted, deferring {} remaining orders",
                        batch.orders.len() - position
                    );
                    for remaining in &batch.orders[position..] {
                        summary
                            .deferred
                            .push(ItemReason::new(&remaining.external_id, "pass interrupted"));
                    }
                    break;
                }
            }
        }

        // 無法解碼的紀錄直接拒絕；有編號者寫入冪等紀錄，不再重試
        for record in &batch.malformed {
            let label = record.label();
            if let Some(order_id) = record.order_id.as_deref() {
                if !ctx.seen.insert(order_id.to_string()) || state.ledger.contains(order_id) {
                    summary.duplicates += 1;
                    continue;
                }
                state
                    .ledger
                    .record_rejected(order_id, &record.reason, ctx.fetched_at);
            }
            tracing::warn!("❌ Order {} rejected: {}", label, record.reason);
            summary
                .rejected
                .push(ItemReason::new(&label, record.reason.clone()));
        }

        // 所有訂單都有終態且狀態已落盤，才推進 marker
        if all_terminal && !ctx.persist_failed {
            if let Some(next_marker) = batch.next_marker {
                if state.marker.as_deref() != Some(next_marker.as_str()) {
                    let previous = state.marker.replace(next_marker);
                    match state.save(&self.storage).await {
                        Ok(()) => {
                            summary.marker_advanced = true;
                            tracing::debug!("📌 Fetch marker advanced to {:?}", state.marker);
                        }
                        Err(e) => {
                            tracing::error!("💾 Could not persist fetch marker: {}", e);
                            state.marker = previous;
                            ctx.persist_failed = true;
                        }
                    }
                }
            }
        }
    }

    async fn process_record(
        &self,
        state: &mut DispatchState,
        raw: &RawOrder,
        ctx: &mut PassContext,
        summary: &mut TickSummary,
        cancel: &CancellationToken,
    ) -> Disposition {
        let order_id = raw.external_id.as_str();

        if !ctx.seen.insert(order_id.to_string()) {
            tracing::debug!("🔁 Order {} appears twice in one batch", order_id);
            return Disposition::Duplicate;
        }
        if let Some(entry) = state.ledger.get(order_id) {
            tracing::debug!(
                "🔁 Order {} already handled ({:?} at {})",
                order_id,
                entry.disposition,
                entry.recorded_at
            );
            return Disposition::Duplicate;
        }
        if let Some(sequence) = raw.sequence_name() {
            if ctx.blocked_sequences.contains(sequence) {
                return Disposition::Deferred(format!(
                    "an earlier order of sequence '{}' is still pending",
                    sequence
                ));
            }
            // 冪等紀錄過期但序列仍保有此訂單：kernel 早已收單，補回紀錄即可
            let member = state
                .sequences
                .get(sequence)
                .is_some_and(|s| s.index_of(order_id).is_some());
            if member {
                tracing::debug!(
                    "🔁 Order {} already belongs to sequence {}, restoring ledger entry",
                    order_id,
                    sequence
                );
                state.ledger.record_submitted(order_id, ctx.fetched_at);
                return Disposition::Duplicate;
            }
        }

        let request = match build_request(raw, ctx.fetched_at, self.settings.order_horizon) {
            Ok(request) => request,
            Err(e) => return self.reject(state, order_id, e.to_string(), ctx.fetched_at),
        };

        let request = match raw.sequence.as_ref() {
            Some(sequence_ref) => {
                let vehicle = self
                    .resolve_sequence_vehicle(state, &request, &sequence_ref.name, ctx, cancel)
                    .await;
                let resolved = match vehicle {
                    Ok(Some(vehicle)) => request.with_intended_vehicle(Some(vehicle)),
                    Ok(None) => return Disposition::Interrupted,
                    Err(e @ BridgeError::VehicleMismatch { .. }) => {
                        summary
                            .sequence_errors
                            .push(ItemReason::new(order_id, e.to_string()));
                        return self.reject(state, order_id, e.to_string(), ctx.fetched_at);
                    }
                    Err(e) => return Disposition::Deferred(e.to_string()),
                };

                if let Some(sequence) = state.sequences.get(&sequence_ref.name) {
                    if let Err(e) = sequence.check_append(
                        order_id,
                        resolved.intended_vehicle(),
                        resolved.order_type(),
                    ) {
                        let e = BridgeError::from(e);
                        summary
                            .sequence_errors
                            .push(ItemReason::new(order_id, e.to_string()));
                        return self.reject(state, order_id, e.to_string(), ctx.fetched_at);
                    }
                }
                resolved
            }
            None => request,
        };

        // Submit
        let outcome = match bounded(cancel, ctx.deadline, self.kernel.submit(&request)).await {
            Bounded::Done(outcome) => outcome,
            Bounded::Cancelled | Bounded::TimedOut => {
                tracing::warn!("⏹️ Submission of {} interrupted, outcome unknown", order_id);
                return Disposition::Interrupted;
            }
        };

        match outcome {
            Ok(SubmitOutcome::Accepted(accepted_id)) => {
                tracing::info!(
                    "✅ Order {} accepted by kernel as {} (vehicle: {})",
                    order_id,
                    accepted_id,
                    request.intended_vehicle().unwrap_or("any")
                );
                self.record_acceptance(state, raw, &request, ctx, summary)
                    .await;
                Disposition::Submitted
            }
            Ok(SubmitOutcome::Rejected(reason)) => {
                self.reject(state, order_id, reason, ctx.fetched_at)
            }
            // 結果未知一律視為暫時失敗；相同編號下一輪重送，kernel 以 409 去重
            Err(e) => Disposition::Deferred(e.to_string()),
        }
    }

    fn reject(
        &self,
        state: &mut DispatchState,
        order_id: &str,
        reason: String,
        at: DateTime<Utc>,
    ) -> Disposition {
        state.ledger.record_rejected(order_id, &reason, at);
        Disposition::Rejected(reason)
    }

    /// 決定序列訂單的車輛。`Ok(None)` 表示查詢車輛時被中斷。
    async fn resolve_sequence_vehicle(
        &self,
        state: &DispatchState,
        request: &TransportOrderRequest,
        sequence_name: &str,
        ctx: &mut PassContext,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let bound = state
            .sequences
            .get(sequence_name)
            .and_then(|sequence| sequence.bound_vehicle());

        match (bound, request.intended_vehicle()) {
            (Some(bound), Some(requested)) if bound != requested => {
                Err(BridgeError::VehicleMismatch {
                    sequence: sequence_name.to_string(),
                    expected: bound.to_string(),
                    got: requested.to_string(),
                })
            }
            (Some(bound), _) => Ok(Some(bound.to_string())),
            (None, Some(requested)) => Ok(Some(requested.to_string())),
            (None, None) => self.pick_vehicle(request.order_type(), ctx, cancel).await,
        }
    }

    async fn pick_vehicle(
        &self,
        order_type: &str,
        ctx: &mut PassContext,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        if let VehiclePool::Unloaded = ctx.pool {
            ctx.pool = match bounded(cancel, ctx.deadline, self.kernel.list_vehicles()).await {
                Bounded::Done(Ok(vehicles)) => {
                    tracing::debug!("🚗 Vehicle pool has {} vehicles", vehicles.len());
                    VehiclePool::Loaded(vehicles)
                }
                Bounded::Done(Err(e)) => VehiclePool::Unavailable(e.to_string()),
                Bounded::Cancelled | Bounded::TimedOut => return Ok(None),
            };
        }

        let vehicles = match &ctx.pool {
            VehiclePool::Loaded(vehicles) => vehicles,
            VehiclePool::Unavailable(reason) => {
                return Err(BridgeError::transient(format!(
                    "vehicle pool unavailable: {}",
                    reason
                )))
            }
            VehiclePool::Unloaded => return Ok(None),
        };

        let available: Vec<VehicleSnapshot> = vehicles
            .iter()
            .filter(|vehicle| !ctx.claimed_vehicles.contains(vehicle.name()))
            .cloned()
            .collect();

        match first_eligible(&available, order_type) {
            Some(vehicle) => Ok(Some(vehicle.name().to_string())),
            None => {
                for vehicle in &available {
                    if let Some(reason) = ineligibility_reason(vehicle, order_type) {
                        tracing::debug!("🚫 {} not eligible: {}", vehicle.name(), reason);
                    }
                }
                Err(BridgeError::NoEligibleVehicle {
                    order_type: order_type.to_string(),
                })
            }
        }
    }

    async fn record_acceptance(
        &self,
        state: &mut DispatchState,
        raw: &RawOrder,
        request: &TransportOrderRequest,
        ctx: &mut PassContext,
        summary: &mut TickSummary,
    ) {
        let order_id = request.order_id();
        state.ledger.record_submitted(order_id, Utc::now());

        if let Some(vehicle) = request.intended_vehicle() {
            ctx.claimed_vehicles.insert(vehicle.to_string());
        }

        if let Some(sequence_ref) = raw.sequence.as_ref() {
            let sequence = state
                .sequences
                .entry(sequence_ref.name.clone())
                .or_insert_with(|| {
                    tracing::info!("🧵 Creating order sequence {}", sequence_ref.name);
                    OrderSequence::new(sequence_ref.name.clone())
                        .with_order_type(request.order_type())
                        .with_failure_fatal(sequence_ref.failure_fatal)
                });

            let mut appended = sequence
                .append(order_id, request.intended_vehicle(), request.order_type())
                .map_err(BridgeError::from);
            if appended.is_ok() {
                if let Some(vehicle) = request.intended_vehicle() {
                    appended = sequence
                        .assign_processing_vehicle(vehicle)
                        .map_err(BridgeError::from);
                }
            }

            match appended {
                Ok(()) => {
                    state.memberships.insert(
                        order_id.to_string(),
                        Membership {
                            sequence: sequence_ref.name.clone(),
                            index: sequence.len() - 1,
                        },
                    );
                    if sequence_ref.complete {
                        match sequence.mark_complete() {
                            Ok(transition) => {
                                tracing::info!("🧵 {}", transition);
                                summary.sequence_transitions.push(transition);
                            }
                            Err(e) => summary
                                .sequence_errors
                                .push(ItemReason::new(order_id, e.to_string())),
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("🧵 Accepted order {} could not join its sequence: {}", order_id, e);
                    summary
                        .sequence_errors
                        .push(ItemReason::new(order_id, e.to_string()));
                }
            }
        }

        if let Err(e) = state.save(&self.storage).await {
            tracing::error!("💾 Could not persist acceptance of {}: {}", order_id, e);
            ctx.persist_failed = true;
        }
    }

    /// 套用單筆終態通知（供推送式 outcome feed 使用）
    pub async fn record_outcome(
        &self,
        notification: OutcomeNotification,
    ) -> Result<Option<SequenceTransition>> {
        let mut state = self.state.lock().await;
        let transition = apply_outcome(&mut state, &notification)?;
        if transition.is_some() {
            state.save(&self.storage).await?;
        }
        Ok(transition)
    }

    fn apply_notifications(
        &self,
        state: &mut DispatchState,
        mut notifications: Vec<OutcomeNotification>,
        summary: &mut TickSummary,
    ) {
        // 同一序列依索引排序，確保依序回報
        notifications.sort_by_cached_key(|n| outcome_sort_key(state, n));

        for notification in notifications {
            match apply_outcome(state, &notification) {
                Ok(Some(transition)) => {
                    summary.outcomes_recorded += 1;
                    // 只記錄實際的階段變化
                    if transition.from != transition.to || !transition.cascaded.is_empty() {
                        tracing::info!("🧵 {}", transition);
                        summary.sequence_transitions.push(transition);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        "🧵 Outcome {} for {} not applied: {}",
                        notification.outcome,
                        notification.order_id,
                        e
                    );
                    summary
                        .sequence_errors
                        .push(ItemReason::new(&notification.order_id, e.to_string()));
                }
            }
        }
    }
}

fn outcome_sort_key(state: &DispatchState, notification: &OutcomeNotification) -> (String, usize) {
    if let Some(membership) = state.memberships.get(&notification.order_id) {
        return (membership.sequence.clone(), membership.index);
    }
    (
        notification.sequence_id.clone().unwrap_or_default(),
        notification.index.unwrap_or(usize::MAX),
    )
}

/// 將終態套用到所屬序列。未追蹤或已記錄過的訂單回傳 `Ok(None)`。
pub(crate) fn apply_outcome(
    state: &mut DispatchState,
    notification: &OutcomeNotification,
) -> Result<Option<SequenceTransition>> {
    let order_id = notification.order_id.as_str();
    let membership = state.memberships.get(order_id).cloned();

    let (sequence_name, index) = match (membership, notification.sequence_id.as_ref()) {
        (Some(membership), _) => (membership.sequence, notification.index.unwrap_or(membership.index)),
        (None, Some(sequence_name)) => {
            let Some(sequence) = state.sequences.get(sequence_name) else {
                return Err(BridgeError::InvalidSequenceState {
                    sequence: sequence_name.clone(),
                    message: format!("unknown sequence for order '{}'", order_id),
                });
            };
            match sequence.index_of(order_id) {
                Some(known) if sequence.outcome_of(known).is_some() => {
                    tracing::debug!("Outcome of {} already recorded", order_id);
                    return Ok(None);
                }
                Some(known) => (sequence_name.clone(), notification.index.unwrap_or(known)),
                None => {
                    return Err(BridgeError::InvalidSequenceState {
                        sequence: sequence_name.clone(),
                        message: format!("order '{}' is not a member", order_id),
                    })
                }
            }
        }
        (None, None) => {
            tracing::debug!(
                "Outcome {} for untracked order {}",
                notification.outcome,
                order_id
            );
            return Ok(None);
        }
    };

    let sequence = state.sequences.get_mut(&sequence_name).ok_or_else(|| {
        BridgeError::InvalidSequenceState {
            sequence: sequence_name.clone(),
            message: "sequence no longer tracked".to_string(),
        }
    })?;
    let transition = sequence.record_outcome(index, notification.outcome)?;

    state.memberships.remove(order_id);
    for cascaded in &transition.cascaded {
        state.memberships.remove(cascaded);
    }
    Ok(Some(transition))
}
