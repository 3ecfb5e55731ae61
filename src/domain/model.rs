use crate::domain::object::{ObjectHistory, TcsObject};
use crate::utils::error::{BridgeError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_range};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 萬用訂單類型：請求端表示「任何類型」，車輛端表示「接受所有類型」
pub const ORDER_TYPE_ANY: &str = "ANY";

/// 目前所有目的地都是單純移動
pub const OPERATION_MOVE: &str = "MOVE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub location_name: String,
    pub operation: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Destination {
    pub fn new(location_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            location_name: location_name.into(),
            operation: operation.into(),
            properties: Vec::new(),
        }
    }

    pub fn movement(location_name: impl Into<String>) -> Self {
        Self::new(location_name, OPERATION_MOVE)
    }
}

/// 送往 kernel 的單一運輸訂單。建立後不可變。
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOrderRequest {
    order_id: String,
    destinations: Vec<Destination>,
    created_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    intended_vehicle: Option<String>,
    order_type: String,
    dependencies: BTreeSet<String>,
    properties: Vec<Property>,
    wrapping_sequence: Option<String>,
}

impl TransportOrderRequest {
    /// 建立請求並檢查不變量：目的地非空、期限晚於建立時間
    pub fn new(
        order_id: impl Into<String>,
        destinations: Vec<Destination>,
        created_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<Self> {
        let order_id = order_id.into();
        if order_id.trim().is_empty() {
            return Err(BridgeError::validation("order id must not be blank"));
        }
        if destinations.is_empty() {
            return Err(BridgeError::validation(format!(
                "order '{}' has no destinations",
                order_id
            )));
        }
        for (index, destination) in destinations.iter().enumerate() {
            if destination.location_name.trim().is_empty() {
                return Err(BridgeError::validation(format!(
                    "order '{}': destination {} has a blank location name",
                    order_id, index
                )));
            }
            if destination.operation.trim().is_empty() {
                return Err(BridgeError::validation(format!(
                    "order '{}': destination {} has a blank operation",
                    order_id, index
                )));
            }
        }
        if deadline <= created_at {
            return Err(BridgeError::validation(format!(
                "order '{}': deadline {} is not after creation time {}",
                order_id, deadline, created_at
            )));
        }

        Ok(Self {
            order_id,
            destinations,
            created_at,
            deadline,
            intended_vehicle: None,
            order_type: ORDER_TYPE_ANY.to_string(),
            dependencies: BTreeSet::new(),
            properties: Vec::new(),
            wrapping_sequence: None,
        })
    }

    pub fn with_intended_vehicle(mut self, vehicle: Option<String>) -> Self {
        self.intended_vehicle = vehicle.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn with_order_type(mut self, order_type: impl Into<String>) -> Self {
        let order_type = order_type.into();
        if !order_type.trim().is_empty() {
            self.order_type = order_type;
        }
        self
    }

    pub fn with_dependencies<I: IntoIterator<Item = String>>(mut self, dependencies: I) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    pub fn with_properties(mut self, properties: Vec<Property>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_wrapping_sequence(mut self, sequence: Option<String>) -> Self {
        self.wrapping_sequence = sequence;
        self
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn intended_vehicle(&self) -> Option<&str> {
        self.intended_vehicle.as_deref()
    }

    pub fn order_type(&self) -> &str {
        &self.order_type
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn wrapping_sequence(&self) -> Option<&str> {
        self.wrapping_sequence.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDestination {
    pub location_name: String,
    #[serde(default)]
    pub operation: Option<String>,
}

/// 外部訂單所屬的訂單序列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceRef {
    pub name: String,
    #[serde(default)]
    pub failure_fatal: bool,
    /// 此訂單為序列的最後一筆
    #[serde(default)]
    pub complete: bool,
}

/// 外部訂單來源提供的原始紀錄
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    #[serde(rename = "orderNum", alias = "id")]
    pub external_id: String,
    #[serde(default)]
    pub loading_location: Option<String>,
    #[serde(default)]
    pub unloading_location: Option<String>,
    #[serde(default)]
    pub destinations: Option<Vec<RawDestination>>,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub intended_vehicle: Option<String>,
    #[serde(default)]
    pub sequence: Option<SequenceRef>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl RawOrder {
    pub fn new(
        external_id: impl Into<String>,
        loading_location: impl Into<String>,
        unloading_location: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            loading_location: Some(loading_location.into()),
            unloading_location: Some(unloading_location.into()),
            destinations: None,
            order_type: None,
            intended_vehicle: None,
            sequence: None,
            dependencies: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn in_sequence(mut self, name: impl Into<String>, failure_fatal: bool, complete: bool) -> Self {
        self.sequence = Some(SequenceRef {
            name: name.into(),
            failure_fatal,
            complete,
        });
        self
    }

    pub fn with_vehicle(mut self, vehicle: impl Into<String>) -> Self {
        self.intended_vehicle = Some(vehicle.into());
        self
    }

    pub fn with_order_type(mut self, order_type: impl Into<String>) -> Self {
        self.order_type = Some(order_type.into());
        self
    }

    pub fn sequence_name(&self) -> Option<&str> {
        self.sequence.as_ref().map(|s| s.name.as_str())
    }

    pub fn effective_order_type(&self) -> &str {
        self.order_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(ORDER_TYPE_ANY)
    }
}

/// 來源回應中無法解碼的單筆紀錄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    /// 在回應中的位置（0 起算）
    pub position: usize,
    /// 紀錄帶有可讀的編號時才有值
    pub order_id: Option<String>,
    pub reason: String,
}

impl MalformedRecord {
    /// 摘要與日誌用的識別：有編號用編號，否則用位置
    pub fn label(&self) -> String {
        match &self.order_id {
            Some(order_id) => order_id.clone(),
            None => format!("#{}", self.position),
        }
    }
}

/// 一次拉取的結果，`next_marker` 為處理完畢後應推進到的位置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchBatch {
    pub orders: Vec<RawOrder>,
    pub malformed: Vec<MalformedRecord>,
    pub next_marker: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationLevel {
    ToBeIgnored,
    ToBeNoticed,
    ToBeRespected,
    ToBeUtilized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcState {
    Idle,
    AwaitingOrder,
    ProcessingOrder,
}

fn default_allowed_order_types() -> BTreeSet<String> {
    BTreeSet::from([ORDER_TYPE_ANY.to_string()])
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VehicleSnapshotWire {
    name: String,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    energy_level: i64,
    energy_level_critical: i64,
    energy_level_good: i64,
    integration_level: IntegrationLevel,
    proc_state: ProcState,
    #[serde(default = "default_allowed_order_types")]
    allowed_order_types: BTreeSet<String>,
}

/// 車輛目前狀態的唯讀快照，每次資格檢查時由 kernel 重新提供
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "VehicleSnapshotWire")]
pub struct VehicleSnapshot {
    name: String,
    properties: BTreeMap<String, String>,
    energy_level: u8,
    energy_level_critical: u8,
    energy_level_good: u8,
    integration_level: IntegrationLevel,
    proc_state: ProcState,
    allowed_order_types: BTreeSet<String>,
    history: ObjectHistory,
}

impl VehicleSnapshot {
    pub fn new(
        name: impl Into<String>,
        energy_level: i64,
        energy_level_critical: i64,
        energy_level_good: i64,
        integration_level: IntegrationLevel,
        proc_state: ProcState,
    ) -> Result<Self> {
        let name = name.into();
        validate_non_empty_string("vehicle.name", &name)
            .map_err(|e| BridgeError::validation(e.to_string()))?;
        for (field, value) in [
            ("energyLevel", energy_level),
            ("energyLevelCritical", energy_level_critical),
            ("energyLevelGood", energy_level_good),
        ] {
            validate_range(field, value, 0, 100).map_err(|e| {
                BridgeError::validation(format!("vehicle '{}': {}", name, e))
            })?;
        }
        if energy_level_critical > energy_level_good {
            return Err(BridgeError::validation(format!(
                "vehicle '{}': critical energy level {} exceeds good energy level {}",
                name, energy_level_critical, energy_level_good
            )));
        }

        Ok(Self {
            name,
            properties: BTreeMap::new(),
            energy_level: energy_level as u8,
            energy_level_critical: energy_level_critical as u8,
            energy_level_good: energy_level_good as u8,
            integration_level,
            proc_state,
            allowed_order_types: default_allowed_order_types(),
            history: ObjectHistory::new(),
        })
    }

    pub fn with_allowed_order_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_order_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn energy_level(&self) -> u8 {
        self.energy_level
    }

    pub fn energy_level_critical(&self) -> u8 {
        self.energy_level_critical
    }

    pub fn energy_level_good(&self) -> u8 {
        self.energy_level_good
    }

    pub fn integration_level(&self) -> IntegrationLevel {
        self.integration_level
    }

    pub fn proc_state(&self) -> ProcState {
        self.proc_state
    }

    pub fn allowed_order_types(&self) -> &BTreeSet<String> {
        &self.allowed_order_types
    }

    pub fn is_energy_level_critical(&self) -> bool {
        self.energy_level <= self.energy_level_critical
    }

    pub fn is_energy_level_degraded(&self) -> bool {
        self.energy_level <= self.energy_level_good
    }

    pub fn is_energy_level_good(&self) -> bool {
        self.energy_level > self.energy_level_good
    }
}

impl TryFrom<VehicleSnapshotWire> for VehicleSnapshot {
    type Error = BridgeError;

    fn try_from(wire: VehicleSnapshotWire) -> Result<Self> {
        let mut snapshot = VehicleSnapshot::new(
            wire.name,
            wire.energy_level,
            wire.energy_level_critical,
            wire.energy_level_good,
            wire.integration_level,
            wire.proc_state,
        )?
        .with_allowed_order_types(wire.allowed_order_types);
        snapshot.properties = wire.properties;
        Ok(snapshot)
    }
}

impl TcsObject for VehicleSnapshot {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderOutcome {
    Finished,
    Failed,
}

impl fmt::Display for OrderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderOutcome::Finished => write!(f, "FINISHED"),
            OrderOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// kernel 回報的訂單終態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeNotification {
    pub order_id: String,
    #[serde(default)]
    pub sequence_id: Option<String>,
    #[serde(default)]
    pub index: Option<usize>,
    pub outcome: OrderOutcome,
}

impl OutcomeNotification {
    pub fn new(order_id: impl Into<String>, outcome: OrderOutcome) -> Self {
        Self {
            order_id: order_id.into(),
            sequence_id: None,
            index: None,
            outcome,
        }
    }

    pub fn in_sequence(mut self, sequence_id: impl Into<String>, index: usize) -> Self {
        self.sequence_id = Some(sequence_id.into());
        self.index = Some(index);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(String),
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_request_rejects_empty_destinations() {
        let now = Utc::now();
        let result = TransportOrderRequest::new("R1", vec![], now, now + Duration::hours(2));
        assert!(matches!(result, Err(BridgeError::Validation { .. })));
    }

    #[test]
    fn test_request_rejects_deadline_not_in_future() {
        let now = Utc::now();
        let destinations = vec![Destination::movement("Point-0034")];
        assert!(TransportOrderRequest::new("R1", destinations.clone(), now, now).is_err());
        assert!(
            TransportOrderRequest::new("R1", destinations, now, now - Duration::seconds(1)).is_err()
        );
    }

    #[test]
    fn test_request_defaults_to_wildcard_type() {
        let now = Utc::now();
        let request = TransportOrderRequest::new(
            "R1",
            vec![Destination::movement("Point-0034")],
            now,
            now + Duration::minutes(5),
        )
        .unwrap()
        .with_order_type("")
        .with_intended_vehicle(Some("  ".to_string()));

        assert_eq!(request.order_type(), ORDER_TYPE_ANY);
        assert_eq!(request.intended_vehicle(), None);
        assert!(request.dependencies().is_empty());
    }

    #[test]
    fn test_raw_order_parses_original_telegram() {
        let json = r#"{"orderNum":"R202106101735","loadingLocation":"Point-0034","unloadingLocation":"Point-0110"}"#;
        let raw: RawOrder = serde_json::from_str(json).unwrap();

        assert_eq!(raw.external_id, "R202106101735");
        assert_eq!(raw.loading_location.as_deref(), Some("Point-0034"));
        assert_eq!(raw.unloading_location.as_deref(), Some("Point-0110"));
        assert!(raw.sequence.is_none());
        assert_eq!(raw.effective_order_type(), ORDER_TYPE_ANY);
    }

    #[test]
    fn test_vehicle_snapshot_validates_energy_fields() {
        assert!(VehicleSnapshot::new(
            "Vehicle-01",
            101,
            10,
            50,
            IntegrationLevel::ToBeUtilized,
            ProcState::Idle
        )
        .is_err());
        assert!(VehicleSnapshot::new(
            "Vehicle-01",
            80,
            60,
            50,
            IntegrationLevel::ToBeUtilized,
            ProcState::Idle
        )
        .is_err());

        let vehicle = VehicleSnapshot::new(
            "Vehicle-01",
            30,
            30,
            50,
            IntegrationLevel::ToBeUtilized,
            ProcState::Idle,
        )
        .unwrap();
        assert!(vehicle.is_energy_level_critical());
        assert!(vehicle.is_energy_level_degraded());
        assert!(!vehicle.is_energy_level_good());
    }

    #[test]
    fn test_vehicle_snapshot_deserializes_kernel_json() {
        let json = serde_json::json!({
            "name": "Vehicle-02",
            "properties": {"color": "red"},
            "length": 1000,
            "energyLevelGood": 90,
            "energyLevelCritical": 30,
            "energyLevel": 75,
            "integrationLevel": "TO_BE_UTILIZED",
            "procState": "IDLE",
            "state": "IDLE"
        });
        let vehicle: VehicleSnapshot = serde_json::from_value(json).unwrap();

        assert_eq!(vehicle.name(), "Vehicle-02");
        assert_eq!(vehicle.property("color"), Some("red"));
        assert_eq!(vehicle.energy_level(), 75);
        assert_eq!(vehicle.integration_level(), IntegrationLevel::ToBeUtilized);
        assert!(vehicle.allowed_order_types().contains(ORDER_TYPE_ANY));
    }

    #[test]
    fn test_vehicle_snapshot_rejects_invalid_kernel_json() {
        let json = serde_json::json!({
            "name": "Vehicle-03",
            "energyLevelGood": 20,
            "energyLevelCritical": 40,
            "energyLevel": 75,
            "integrationLevel": "TO_BE_UTILIZED",
            "procState": "IDLE"
        });
        assert!(serde_json::from_value::<VehicleSnapshot>(json).is_err());
    }
}
