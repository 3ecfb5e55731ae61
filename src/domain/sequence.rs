//! 訂單序列狀態機
//!
//! 一個序列是一串必須由同一台車依序執行的運輸訂單。規則：
//! - 只有在 `Open` 階段才能追加訂單；
//! - 追加訂單的指定車輛必須與序列一致，序列尚未指定時採用第一筆訂單的車輛；
//! - 完成結果必須依序回報，`finished_index` 每次只前進一格；
//! - `failure_fatal` 的序列中任一訂單失敗，其後所有訂單一併視為失敗並結束序列。
//!
//! 所有被拒絕的轉換都不會修改序列。

use crate::domain::model::{OrderOutcome, ORDER_TYPE_ANY};
use crate::domain::object::{ObjectHistory, TcsObject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequencePhase {
    /// 可追加訂單
    Open,
    /// 不再追加，仍有訂單未結束
    CompletePending,
    Finished,
    FinishedViaFatalFailure,
}

impl SequencePhase {
    pub fn is_complete(self) -> bool {
        self != SequencePhase::Open
    }

    pub fn is_finished(self) -> bool {
        matches!(
            self,
            SequencePhase::Finished | SequencePhase::FinishedViaFatalFailure
        )
    }
}

impl fmt::Display for SequencePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SequencePhase::Open => "OPEN",
            SequencePhase::CompletePending => "COMPLETE_PENDING",
            SequencePhase::Finished => "FINISHED",
            SequencePhase::FinishedViaFatalFailure => "FINISHED_VIA_FATAL_FAILURE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("sequence '{sequence}': {message}")]
    InvalidState { sequence: String, message: String },

    #[error("sequence '{sequence}' is bound to vehicle '{expected}', order intends '{got}'")]
    VehicleMismatch {
        sequence: String,
        expected: String,
        got: String,
    },

    #[error("sequence '{sequence}' has type '{expected}', order has type '{got}'")]
    OrderTypeMismatch {
        sequence: String,
        expected: String,
        got: String,
    },

    #[error("sequence '{sequence}': expected outcome for index {expected}, got {got}")]
    OutOfOrderCompletion {
        sequence: String,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub order_id: String,
    pub outcome: Option<OrderOutcome>,
}

/// 一次成功轉換的紀錄，供 tick 匯總使用
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceTransition {
    pub sequence: String,
    pub from: SequencePhase,
    pub to: SequencePhase,
    pub finished_index: Option<usize>,
    /// 因 failure_fatal 而連帶失敗的訂單
    pub cascaded: Vec<String>,
}

impl fmt::Display for SequenceTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.sequence, self.from, self.to)?;
        if !self.cascaded.is_empty() {
            write!(f, " (cascaded: {})", self.cascaded.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSequence {
    name: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    history: ObjectHistory,
    order_type: String,
    orders: Vec<SequenceEntry>,
    finished_index: Option<usize>,
    phase: SequencePhase,
    failure_fatal: bool,
    intended_vehicle: Option<String>,
    processing_vehicle: Option<String>,
}

impl OrderSequence {
    pub fn new(name: impl Into<String>) -> Self {
        let mut history = ObjectHistory::new();
        history.record("SEQUENCE_CREATED", None);
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
            history,
            order_type: ORDER_TYPE_ANY.to_string(),
            orders: Vec::new(),
            finished_index: None,
            phase: SequencePhase::Open,
            failure_fatal: false,
            intended_vehicle: None,
            processing_vehicle: None,
        }
    }

    pub fn with_order_type(mut self, order_type: impl Into<String>) -> Self {
        self.order_type = order_type.into();
        self
    }

    pub fn with_failure_fatal(mut self, failure_fatal: bool) -> Self {
        self.failure_fatal = failure_fatal;
        self
    }

    pub fn with_intended_vehicle(mut self, vehicle: Option<String>) -> Self {
        self.intended_vehicle = vehicle;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn order_type(&self) -> &str {
        &self.order_type
    }

    pub fn phase(&self) -> SequencePhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_complete()
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_finished()
    }

    pub fn is_failure_fatal(&self) -> bool {
        self.failure_fatal
    }

    pub fn intended_vehicle(&self) -> Option<&str> {
        self.intended_vehicle.as_deref()
    }

    pub fn processing_vehicle(&self) -> Option<&str> {
        self.processing_vehicle.as_deref()
    }

    /// 後續訂單應使用的車輛：指定車輛優先，其次為實際執行中的車輛
    pub fn bound_vehicle(&self) -> Option<&str> {
        self.intended_vehicle().or(self.processing_vehicle())
    }

    pub fn finished_index(&self) -> Option<usize> {
        self.finished_index
    }

    /// 以 -1 表示尚無完成訂單
    pub fn finished_index_raw(&self) -> i64 {
        self.finished_index.map(|i| i as i64).unwrap_or(-1)
    }

    pub fn entries(&self) -> &[SequenceEntry] {
        &self.orders
    }

    pub fn order_ids(&self) -> impl Iterator<Item = &str> {
        self.orders.iter().map(|entry| entry.order_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn index_of(&self, order_id: &str) -> Option<usize> {
        self.orders.iter().position(|entry| entry.order_id == order_id)
    }

    pub fn outcome_of(&self, index: usize) -> Option<OrderOutcome> {
        self.orders.get(index).and_then(|entry| entry.outcome)
    }

    fn next_index(&self) -> usize {
        self.finished_index.map(|i| i + 1).unwrap_or(0)
    }

    pub fn next_unfinished_order(&self) -> Option<&str> {
        if self.is_finished() {
            return None;
        }
        self.orders
            .get(self.next_index())
            .map(|entry| entry.order_id.as_str())
    }

    fn invalid_state(&self, message: impl Into<String>) -> SequenceError {
        SequenceError::InvalidState {
            sequence: self.name.clone(),
            message: message.into(),
        }
    }

    /// 檢查訂單能否追加，不修改序列
    pub fn check_append(
        &self,
        order_id: &str,
        intended_vehicle: Option<&str>,
        order_type: &str,
    ) -> Result<(), SequenceError> {
        if self.is_complete() {
            return Err(self.invalid_state(format!(
                "cannot append '{}' in phase {}",
                order_id, self.phase
            )));
        }
        if self.index_of(order_id).is_some() {
            return Err(self.invalid_state(format!("order '{}' already in sequence", order_id)));
        }
        if order_type != self.order_type {
            return Err(SequenceError::OrderTypeMismatch {
                sequence: self.name.clone(),
                expected: self.order_type.clone(),
                got: order_type.to_string(),
            });
        }
        if let Some(expected) = self.intended_vehicle.as_deref() {
            if intended_vehicle != Some(expected) {
                return Err(SequenceError::VehicleMismatch {
                    sequence: self.name.clone(),
                    expected: expected.to_string(),
                    got: intended_vehicle.unwrap_or("<none>").to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn append(
        &mut self,
        order_id: &str,
        intended_vehicle: Option<&str>,
        order_type: &str,
    ) -> Result<(), SequenceError> {
        self.check_append(order_id, intended_vehicle, order_type)?;

        if self.intended_vehicle.is_none() {
            self.intended_vehicle = intended_vehicle.map(str::to_string);
        }
        self.orders.push(SequenceEntry {
            order_id: order_id.to_string(),
            outcome: None,
        });
        self.history
            .record("ORDER_APPENDED", Some(order_id.to_string()));
        Ok(())
    }

    pub fn mark_complete(&mut self) -> Result<SequenceTransition, SequenceError> {
        if self.phase != SequencePhase::Open {
            return Err(self.invalid_state(format!("cannot mark complete in phase {}", self.phase)));
        }

        let from = self.phase;
        self.phase = if self.next_index() == self.orders.len() {
            SequencePhase::Finished
        } else {
            SequencePhase::CompletePending
        };
        self.history
            .record("SEQUENCE_COMPLETED", Some(self.phase.to_string()));

        Ok(self.transition(from, Vec::new()))
    }

    pub fn record_outcome(
        &mut self,
        index: usize,
        outcome: OrderOutcome,
    ) -> Result<SequenceTransition, SequenceError> {
        if self.is_finished() {
            return Err(self.invalid_state(format!(
                "cannot record outcome for index {} in phase {}",
                index, self.phase
            )));
        }
        let expected = self.next_index();
        if index != expected || index >= self.orders.len() {
            return Err(SequenceError::OutOfOrderCompletion {
                sequence: self.name.clone(),
                expected,
                got: index,
            });
        }

        let from = self.phase;
        self.orders[index].outcome = Some(outcome);
        self.finished_index = Some(index);
        self.history.record(
            format!("ORDER_{}", outcome),
            Some(self.orders[index].order_id.clone()),
        );

        let mut cascaded = Vec::new();
        if outcome == OrderOutcome::Failed && self.failure_fatal {
            for entry in self.orders.iter_mut().skip(index + 1) {
                entry.outcome = Some(OrderOutcome::Failed);
                cascaded.push(entry.order_id.clone());
            }
            self.finished_index = Some(self.orders.len() - 1);
            self.phase = SequencePhase::FinishedViaFatalFailure;
            self.history
                .record("SEQUENCE_FAILED", Some(self.orders[index].order_id.clone()));
        } else if self.is_complete() && self.next_index() == self.orders.len() {
            self.phase = SequencePhase::Finished;
            self.history.record("SEQUENCE_FINISHED", None);
        }

        Ok(self.transition(from, cascaded))
    }

    /// 第一次派車時記錄執行車輛，之後不可更換
    pub fn assign_processing_vehicle(&mut self, vehicle: &str) -> Result<(), SequenceError> {
        match self.processing_vehicle.as_deref() {
            Some(current) if current == vehicle => Ok(()),
            Some(current) => Err(SequenceError::VehicleMismatch {
                sequence: self.name.clone(),
                expected: current.to_string(),
                got: vehicle.to_string(),
            }),
            None => {
                self.processing_vehicle = Some(vehicle.to_string());
                self.history
                    .record("PROCESSING_VEHICLE_ASSIGNED", Some(vehicle.to_string()));
                Ok(())
            }
        }
    }

    fn transition(&self, from: SequencePhase, cascaded: Vec<String>) -> SequenceTransition {
        SequenceTransition {
            sequence: self.name.clone(),
            from,
            to: self.phase,
            finished_index: self.finished_index,
            cascaded,
        }
    }
}

impl TcsObject for OrderSequence {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    fn history(&self) -> &ObjectHistory {
        &self.history
    }
}
