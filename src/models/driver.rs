//! Driver records as read from the driver store.

use serde::{Deserialize, Serialize};

use super::{BranchId, DriverId, GeoPoint, Stop, VehicleId};

/// A driver available to a branch.
///
/// `assigned_stops` is the stop list the driver already carries when the
/// engine first sees them; the engine owns the list from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub branch_id: BranchId,
    pub vehicle_id: Option<VehicleId>,
    pub current_location: GeoPoint,
    pub remaining_minutes: f64,
    pub active: bool,
    pub assigned_stops: Vec<Stop>,
}

impl Driver {
    pub fn new(
        id: DriverId,
        branch_id: BranchId,
        current_location: GeoPoint,
        remaining_minutes: f64,
    ) -> Self {
        Self {
            id,
            branch_id,
            vehicle_id: None,
            current_location,
            remaining_minutes,
            active: true,
            assigned_stops: Vec::new(),
        }
    }

    pub fn with_vehicle(mut self, vehicle_id: VehicleId) -> Self {
        self.vehicle_id = Some(vehicle_id);
        self
    }

    pub fn with_assigned_stops(mut self, stops: Vec<Stop>) -> Self {
        self.assigned_stops = stops;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}
