//! Vehicle type with capacity and cost parameters, and the per-request
//! constraints a route is planned under.

use serde::{Deserialize, Serialize};

use super::{Demand, DriverId, GeoPoint, VehicleId};

/// A vehicle that services routes.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{GeoPoint, Vehicle};
///
/// let v = Vehicle::new(3, 1_000.0, 12.0, GeoPoint::new(52.37, 4.89), 480.0)
///     .with_speed_kmh(35.0);
/// assert_eq!(v.id(), 3);
/// assert_eq!(v.capacity().weight, 1_000.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    id: VehicleId,
    capacity_weight: f64,
    capacity_volume: f64,
    home_location: GeoPoint,
    max_working_minutes: f64,
    speed_kmh: f64,
    cost_per_km: f64,
    cost_per_minute: f64,
}

impl Vehicle {
    /// Default: 40 km/h, cost 1.0 per km, no time cost.
    pub fn new(
        id: VehicleId,
        capacity_weight: f64,
        capacity_volume: f64,
        home_location: GeoPoint,
        max_working_minutes: f64,
    ) -> Self {
        Self {
            id,
            capacity_weight,
            capacity_volume,
            home_location,
            max_working_minutes,
            speed_kmh: 40.0,
            cost_per_km: 1.0,
            cost_per_minute: 0.0,
        }
    }

    pub fn with_speed_kmh(mut self, speed: f64) -> Self {
        self.speed_kmh = speed;
        self
    }

    pub fn with_cost_per_km(mut self, cost: f64) -> Self {
        self.cost_per_km = cost;
        self
    }

    pub fn with_cost_per_minute(mut self, cost: f64) -> Self {
        self.cost_per_minute = cost;
        self
    }

    /// Vehicle ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Weight and volume capacity.
    pub fn capacity(&self) -> Demand {
        Demand::new(self.capacity_weight, self.capacity_volume)
    }

    /// Depot the vehicle starts from.
    pub fn home_location(&self) -> GeoPoint {
        self.home_location
    }

    /// Working time per day, in minutes.
    pub fn max_working_minutes(&self) -> f64 {
        self.max_working_minutes
    }

    /// Average travel speed.
    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    pub fn cost_per_km(&self) -> f64 {
        self.cost_per_km
    }

    /// Cost per minute of route time.
    pub fn cost_per_minute(&self) -> f64 {
        self.cost_per_minute
    }
}

/// Everything a single optimization request knows about the vehicle side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConstraints {
    pub vehicle: Vehicle,
    pub driver_id: Option<DriverId>,
    /// Where the route begins (driver position or depot).
    pub start_location: GeoPoint,
    /// Route clock at departure, in minutes. Time windows use the same clock.
    pub start_minute: f64,
    /// Working time available for this route.
    pub available_minutes: f64,
    /// Whether the route closes back at the vehicle's home location.
    pub return_to_home: bool,
}

impl VehicleConstraints {
    /// Starts and ends at the vehicle's home, with its full working day.
    pub fn for_vehicle(vehicle: Vehicle) -> Self {
        Self {
            start_location: vehicle.home_location(),
            available_minutes: vehicle.max_working_minutes(),
            vehicle,
            driver_id: None,
            start_minute: 0.0,
            return_to_home: true,
        }
    }

    /// Assigns the route to a driver.
    pub fn with_driver(mut self, driver_id: DriverId) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    pub fn starting_at(mut self, location: GeoPoint, minute: f64) -> Self {
        self.start_location = location;
        self.start_minute = minute;
        self
    }

    pub fn with_available_minutes(mut self, minutes: f64) -> Self {
        self.available_minutes = minutes;
        self
    }

    /// The route ends at its last stop.
    pub fn open_ended(mut self) -> Self {
        self.return_to_home = false;
        self
    }

    pub fn end_location(&self) -> Option<GeoPoint> {
        self.return_to_home.then(|| self.vehicle.home_location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_defaults() {
        let v = Vehicle::new(0, 200.0, 2.0, GeoPoint::new(0.0, 0.0), 480.0);
        assert_eq!(v.capacity(), Demand::new(200.0, 2.0));
        assert_eq!(v.speed_kmh(), 40.0);
        assert_eq!(v.cost_per_km(), 1.0);
        assert_eq!(v.cost_per_minute(), 0.0);
    }

    #[test]
    fn test_vehicle_builder() {
        let v = Vehicle::new(1, 100.0, 1.0, GeoPoint::new(0.0, 0.0), 300.0)
            .with_speed_kmh(60.0)
            .with_cost_per_km(1.5)
            .with_cost_per_minute(0.2);
        assert_eq!(v.speed_kmh(), 60.0);
        assert_eq!(v.cost_per_km(), 1.5);
        assert_eq!(v.cost_per_minute(), 0.2);
        assert_eq!(v.max_working_minutes(), 300.0);
    }

    #[test]
    fn test_constraints_from_vehicle() {
        let home = GeoPoint::new(10.0, 10.0);
        let v = Vehicle::new(1, 100.0, 1.0, home, 300.0);
        let c = VehicleConstraints::for_vehicle(v)
            .with_driver(9)
            .starting_at(GeoPoint::new(10.1, 10.1), 480.0)
            .with_available_minutes(120.0);
        assert_eq!(c.driver_id, Some(9));
        assert_eq!(c.start_minute, 480.0);
        assert_eq!(c.available_minutes, 120.0);
        assert_eq!(c.end_location(), Some(home));
        assert_eq!(c.open_ended().end_location(), None);
    }
}
