use crate::domain::model::{
    Destination, Property, RawOrder, TransportOrderRequest, OPERATION_MOVE,
};
use crate::utils::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// 把外部訂單轉為運輸訂單請求。
///
/// 期限 = 拉取時間 + `order_horizon`。目的地為 (裝貨點, 卸貨點) 兩個 MOVE，
/// 外部紀錄另帶的目的地依原順序接在後面；沒有裝卸貨點時只用目的地清單。
pub fn build_request(
    raw: &RawOrder,
    fetched_at: DateTime<Utc>,
    order_horizon: Duration,
) -> Result<TransportOrderRequest> {
    let horizon = chrono::Duration::from_std(order_horizon)
        .map_err(|e| BridgeError::validation(format!("order horizon out of range: {}", e)))?;

    let destinations = build_destinations(raw)?;

    let properties = raw
        .properties
        .iter()
        .map(|(key, value)| Property {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();

    let request = TransportOrderRequest::new(
        raw.external_id.clone(),
        destinations,
        fetched_at,
        fetched_at + horizon,
    )?
    .with_order_type(raw.effective_order_type())
    .with_intended_vehicle(raw.intended_vehicle.clone())
    .with_dependencies(raw.dependencies.iter().cloned())
    .with_properties(properties)
    .with_wrapping_sequence(raw.sequence_name().map(str::to_string));

    Ok(request)
}

fn build_destinations(raw: &RawOrder) -> Result<Vec<Destination>> {
    let extras: Vec<Destination> = raw
        .destinations
        .iter()
        .flatten()
        .map(|d| {
            Destination::new(
                d.location_name.clone(),
                d.operation
                    .clone()
                    .filter(|op| !op.trim().is_empty())
                    .unwrap_or_else(|| OPERATION_MOVE.to_string()),
            )
        })
        .collect();

    let loading = non_blank(raw.loading_location.as_deref());
    let unloading = non_blank(raw.unloading_location.as_deref());

    match (loading, unloading) {
        (Some(loading), Some(unloading)) => {
            let mut destinations = vec![
                Destination::movement(loading),
                Destination::movement(unloading),
            ];
            destinations.extend(extras);
            Ok(destinations)
        }
        // 只有目的地清單時直接沿用
        (None, None) if !extras.is_empty() => Ok(extras),
        (None, _) => Err(BridgeError::validation(format!(
            "order '{}' has no loading location",
            raw.external_id
        ))),
        (Some(_), None) => Err(BridgeError::validation(format!(
            "order '{}' has no unloading location",
            raw.external_id
        ))),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{RawDestination, ORDER_TYPE_ANY};

    const TWO_HOURS: Duration = Duration::from_secs(2 * 60 * 60);

    #[test]
    fn test_pair_of_move_destinations() {
        let raw = RawOrder::new("R1", "Point-0034", "Point-0110");
        let fetched_at = Utc::now();

        let request = build_request(&raw, fetched_at, TWO_HOURS).unwrap();

        assert_eq!(request.order_id(), "R1");
        assert_eq!(
            request.destinations(),
            &[
                Destination::new("Point-0034", "MOVE"),
                Destination::new("Point-0110", "MOVE"),
            ]
        );
        assert!(request.deadline() > fetched_at);
        assert_eq!(request.deadline() - fetched_at, chrono::Duration::hours(2));
        assert_eq!(request.order_type(), ORDER_TYPE_ANY);
        assert_eq!(request.intended_vehicle(), None);
        assert_eq!(request.wrapping_sequence(), None);
    }

    fn raw_destination(location_name: &str, operation: Option<&str>) -> RawDestination {
        RawDestination {
            location_name: location_name.to_string(),
            operation: operation.map(str::to_string),
        }
    }

    fn location_names(request: &TransportOrderRequest) -> Vec<&str> {
        request
            .destinations()
            .iter()
            .map(|d| d.location_name.as_str())
            .collect()
    }

    #[test]
    fn test_destination_list_alone_preserved_in_order() {
        let mut raw = RawOrder::new("R2", "", "");
        raw.loading_location = None;
        raw.unloading_location = None;
        raw.destinations = Some(vec![
            raw_destination("Storage 01", Some("Load cargo")),
            raw_destination("Point-0050", None),
            raw_destination("Workshop", Some("Unload cargo")),
        ]);

        let request = build_request(&raw, Utc::now(), TWO_HOURS).unwrap();

        assert_eq!(location_names(&request), vec!["Storage 01", "Point-0050", "Workshop"]);
        assert_eq!(request.destinations()[1].operation, "MOVE");
        assert_eq!(request.destinations()[2].operation, "Unload cargo");
    }

    #[test]
    fn test_extra_destinations_follow_loading_and_unloading() {
        let mut raw = RawOrder::new("R1", "Point-0034", "Point-0110");
        raw.destinations = Some(vec![
            raw_destination("Point-0200", None),
            raw_destination("Workshop", Some("Unload cargo")),
        ]);

        let request = build_request(&raw, Utc::now(), TWO_HOURS).unwrap();

        assert_eq!(
            location_names(&request),
            vec!["Point-0034", "Point-0110", "Point-0200", "Workshop"]
        );
        assert_eq!(request.destinations()[0].operation, "MOVE");
        assert_eq!(request.destinations()[2].operation, "MOVE");
        assert_eq!(request.destinations()[3].operation, "Unload cargo");
    }

    #[test]
    fn test_missing_location_is_validation_error() {
        let mut raw = RawOrder::new("R3", "Point-0034", "");
        assert!(matches!(
            build_request(&raw, Utc::now(), TWO_HOURS),
            Err(BridgeError::Validation { .. })
        ));

        raw.unloading_location = None;
        raw.destinations = Some(vec![]);
        assert!(build_request(&raw, Utc::now(), TWO_HOURS).is_err());
    }

    #[test]
    fn test_zero_horizon_is_rejected() {
        let raw = RawOrder::new("R4", "Point-0034", "Point-0110");
        assert!(build_request(&raw, Utc::now(), Duration::ZERO).is_err());
    }

    #[test]
    fn test_optional_fields_are_carried_over() {
        let mut raw = RawOrder::new("R5", "Point-0034", "Point-0110")
            .with_vehicle("Vehicle-02")
            .with_order_type("Transport")
            .in_sequence("Seq-9", true, false);
        raw.dependencies = vec!["R1".to_string(), "R0".to_string()];
        raw.properties.insert("priority".to_string(), "high".to_string());

        let request = build_request(&raw, Utc::now(), TWO_HOURS).unwrap();

        assert_eq!(request.intended_vehicle(), Some("Vehicle-02"));
        assert_eq!(request.order_type(), "Transport");
        assert_eq!(request.wrapping_sequence(), Some("Seq-9"));
        assert_eq!(request.dependencies().len(), 2);
        assert_eq!(request.properties()[0].key, "priority");
    }
}
