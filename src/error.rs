//! Error taxonomy for the dispatch engine.
//!
//! A budget-exhausted heuristic is not an error: it surfaces as
//! [`SolveStatus::Timeout`](crate::optimizer::SolveStatus) on a successful
//! result.

use thiserror::Error;

use crate::models::{BranchId, DriverId, HubId, ShipmentId, StopId, VehicleId};

/// Errors returned by engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// Input that cannot be interpreted at all (bad coordinates, negative
    /// demand, duplicate ids). Rejected before any computation.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Valid input for which no capacity-feasible route can exist.
    #[error("infeasible input: stop {stop_id} {reason}")]
    InfeasibleInput {
        /// Offending stop (or the first stop of the offending group).
        stop_id: StopId,
        /// What capacity bound is broken.
        reason: String,
    },

    /// No active lane path matches the requested service level.
    #[error("no path from hub {origin} to hub {dest}")]
    NoPathFound {
        /// Origin hub.
        origin: HubId,
        /// Destination hub.
        dest: HubId,
    },

    /// A hub or driver would go over its limit at commit time.
    #[error("capacity exceeded for {entity}: {detail}")]
    CapacityExceeded {
        /// `hub <id>` or `driver <id>`.
        entity: String,
        /// Human readable account of the bound.
        detail: String,
    },

    /// No driver in the branch can absorb the shipment.
    #[error("no eligible driver for shipment {shipment_id}")]
    NoEligibleDriver {
        /// Shipment that could not be placed.
        shipment_id: ShipmentId,
    },

    /// The route changed since the caller read it.
    #[error("route for vehicle {vehicle_id} is at version {actual}, caller holds {expected}")]
    ConcurrentModification {
        /// Vehicle whose route is contended.
        vehicle_id: VehicleId,
        /// Version the caller presented.
        expected: u64,
        /// Version currently committed.
        actual: u64,
    },

    /// A newer optimization request for the same vehicle replaced this one.
    #[error("optimization for vehicle {vehicle_id} superseded by a newer request")]
    Superseded {
        /// Vehicle the request was for.
        vehicle_id: VehicleId,
    },

    #[error("unknown shipment {0}")]
    UnknownShipment(ShipmentId),

    #[error("unknown driver {0}")]
    UnknownDriver(DriverId),

    #[error("unknown hub {0}")]
    UnknownHub(HubId),

    #[error("{entity} belongs to branch {actual}, not {expected}")]
    BranchMismatch {
        entity: String,
        expected: BranchId,
        actual: BranchId,
    },

    #[error("shipment {shipment_id} already has an active assignment to driver {driver_id:?}")]
    AlreadyAssigned {
        shipment_id: ShipmentId,
        driver_id: Option<DriverId>,
    },

    #[error("shipment {shipment_id}: cannot move assignment from {from} to {to}")]
    InvalidTransition {
        shipment_id: ShipmentId,
        from: String,
        to: String,
    },

    /// A collaborator store failed.
    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn infeasible<S: Into<String>>(stop_id: StopId, reason: S) -> Self {
        Self::InfeasibleInput {
            stop_id,
            reason: reason.into(),
        }
    }

    pub fn hub_capacity<S: Into<String>>(hub: HubId, detail: S) -> Self {
        Self::CapacityExceeded {
            entity: format!("hub {hub}"),
            detail: detail.into(),
        }
    }

    pub fn driver_capacity<S: Into<String>>(driver: DriverId, detail: S) -> Self {
        Self::CapacityExceeded {
            entity: format!("driver {driver}"),
            detail: detail.into(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Errors that may succeed if the caller re-reads state and tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::ConcurrentModification { .. }
                | DispatchError::Superseded { .. }
                | DispatchError::Store(_)
        )
    }

    /// Errors no amount of retrying fixes.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::MalformedInput(_) | DispatchError::Config(_)
        )
    }
}

impl From<toml::de::Error> for DispatchError {
    fn from(err: toml::de::Error) -> Self {
        DispatchError::Config(err.to_string())
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let stale = DispatchError::ConcurrentModification {
            vehicle_id: 1,
            expected: 2,
            actual: 3,
        };
        assert!(stale.is_retryable());
        assert!(!stale.is_fatal());
        assert!(DispatchError::malformed("lat is NaN").is_fatal());
        assert!(!DispatchError::NoEligibleDriver { shipment_id: 4 }.is_retryable());
    }

    #[test]
    fn test_messages() {
        let err = DispatchError::infeasible(7, "demand exceeds vehicle capacity");
        assert_eq!(
            err.to_string(),
            "infeasible input: stop 7 demand exceeds vehicle capacity"
        );
        let err = DispatchError::hub_capacity(3, "105 of 100");
        assert_eq!(err.to_string(), "capacity exceeded for hub 3: 105 of 100");
    }
}
