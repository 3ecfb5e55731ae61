use crate::domain::model::{IntegrationLevel, ProcState, VehicleSnapshot, ORDER_TYPE_ANY};
use std::fmt;

/// 車輛不具資格的原因，依檢查順序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    NotUtilized(IntegrationLevel),
    NotIdle(ProcState),
    EnergyCritical { level: u8, critical: u8 },
    OrderTypeNotAllowed,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::NotUtilized(level) => write!(f, "integration level is {:?}", level),
            Ineligibility::NotIdle(state) => write!(f, "processing state is {:?}", state),
            Ineligibility::EnergyCritical { level, critical } => {
                write!(f, "energy level {} is at or below critical {}", level, critical)
            }
            Ineligibility::OrderTypeNotAllowed => write!(f, "order type not allowed"),
        }
    }
}

/// 回傳第一個不符合的規則；`None` 表示可接新訂單
pub fn ineligibility_reason(vehicle: &VehicleSnapshot, order_type: &str) -> Option<Ineligibility> {
    if vehicle.integration_level() != IntegrationLevel::ToBeUtilized {
        return Some(Ineligibility::NotUtilized(vehicle.integration_level()));
    }
    if vehicle.proc_state() != ProcState::Idle {
        return Some(Ineligibility::NotIdle(vehicle.proc_state()));
    }
    if vehicle.is_energy_level_critical() {
        return Some(Ineligibility::EnergyCritical {
            level: vehicle.energy_level(),
            critical: vehicle.energy_level_critical(),
        });
    }

    let allowed = vehicle.allowed_order_types();
    if order_type != ORDER_TYPE_ANY
        && !allowed.contains(ORDER_TYPE_ANY)
        && !allowed.contains(order_type)
    {
        return Some(Ineligibility::OrderTypeNotAllowed);
    }

    None
}

pub fn is_eligible(vehicle: &VehicleSnapshot, order_type: &str) -> bool {
    ineligibility_reason(vehicle, order_type).is_none()
}

/// 依 kernel 提供的順序挑第一台合格車輛
pub fn first_eligible<'a>(
    pool: &'a [VehicleSnapshot],
    order_type: &str,
) -> Option<&'a VehicleSnapshot> {
    pool.iter().find(|vehicle| is_eligible(vehicle, order_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::object::TcsObject;

    fn vehicle(name: &str, energy: i64) -> VehicleSnapshot {
        VehicleSnapshot::new(
            name,
            energy,
            30,
            80,
            IntegrationLevel::ToBeUtilized,
            ProcState::Idle,
        )
        .unwrap()
    }

    #[test]
    fn test_fit_vehicle_is_eligible() {
        assert!(is_eligible(&vehicle("Vehicle-01", 90), ORDER_TYPE_ANY));
        assert!(is_eligible(&vehicle("Vehicle-01", 31), "Transport"));
    }

    #[test]
    fn test_integration_level_must_be_utilized() {
        for level in [
            IntegrationLevel::ToBeIgnored,
            IntegrationLevel::ToBeNoticed,
            IntegrationLevel::ToBeRespected,
        ] {
            let v = VehicleSnapshot::new("Vehicle-01", 90, 30, 80, level, ProcState::Idle).unwrap();
            assert_eq!(
                ineligibility_reason(&v, ORDER_TYPE_ANY),
                Some(Ineligibility::NotUtilized(level))
            );
        }
    }

    #[test]
    fn test_busy_vehicle_is_not_eligible() {
        for state in [ProcState::AwaitingOrder, ProcState::ProcessingOrder] {
            let v = VehicleSnapshot::new(
                "Vehicle-01",
                90,
                30,
                80,
                IntegrationLevel::ToBeUtilized,
                state,
            )
            .unwrap();
            assert!(!is_eligible(&v, ORDER_TYPE_ANY));
        }
    }

    #[test]
    fn test_critical_energy_never_eligible() {
        for energy in 0..=30 {
            let v = vehicle("Vehicle-01", energy);
            assert!(!is_eligible(&v, ORDER_TYPE_ANY), "energy {} must be ineligible", energy);
            assert!(!is_eligible(&v, "Transport"));
        }
    }

    #[test]
    fn test_order_type_rules() {
        let restricted = vehicle("Vehicle-01", 90).with_allowed_order_types(["Park", "Charge"]);
        assert!(is_eligible(&restricted, "Park"));
        assert!(is_eligible(&restricted, ORDER_TYPE_ANY));
        assert_eq!(
            ineligibility_reason(&restricted, "Transport"),
            Some(Ineligibility::OrderTypeNotAllowed)
        );

        let wildcard = vehicle("Vehicle-02", 90).with_allowed_order_types([ORDER_TYPE_ANY]);
        assert!(is_eligible(&wildcard, "Transport"));
    }

    #[test]
    fn test_first_eligible_keeps_pool_order() {
        let pool = vec![
            vehicle("Vehicle-01", 10),
            vehicle("Vehicle-02", 70),
            vehicle("Vehicle-03", 95),
        ];
        let picked = first_eligible(&pool, ORDER_TYPE_ANY).unwrap();
        assert_eq!(picked.name(), "Vehicle-02");

        let drained = vec![vehicle("Vehicle-01", 5)];
        assert!(first_eligible(&drained, ORDER_TYPE_ANY).is_none());
    }
}
