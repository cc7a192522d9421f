//! Shipment records as read from the shipment store.

use serde::{Deserialize, Serialize};

use super::{BranchId, Demand, GeoPoint, ServiceLevel, ShipmentId, Stop, TimeWindow};

/// A shipment waiting for last-mile dispatch.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{GeoPoint, ServiceLevel, Shipment};
///
/// let s = Shipment::new(4, 1, GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.1), 25.0, 0.2)
///     .with_service_level(ServiceLevel::Express);
/// let (pickup, delivery) = s.stops();
/// assert_eq!(pickup.id(), 8);
/// assert_eq!(delivery.id(), 9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub branch_id: BranchId,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub weight: f64,
    pub volume: f64,
    pub service_level: ServiceLevel,
    /// Declared delivery window.
    pub time_window: Option<TimeWindow>,
    pub pickup_window: Option<TimeWindow>,
    /// Handling time at each end.
    pub service_minutes: f64,
}

impl Shipment {
    pub fn new(
        id: ShipmentId,
        branch_id: BranchId,
        origin: GeoPoint,
        destination: GeoPoint,
        weight: f64,
        volume: f64,
    ) -> Self {
        Self {
            id,
            branch_id,
            origin,
            destination,
            weight,
            volume,
            service_level: ServiceLevel::Standard,
            time_window: None,
            pickup_window: None,
            service_minutes: 0.0,
        }
    }

    pub fn with_service_level(mut self, level: ServiceLevel) -> Self {
        self.service_level = level;
        self
    }

    pub fn with_time_window(mut self, tw: TimeWindow) -> Self {
        self.time_window = Some(tw);
        self
    }

    pub fn with_pickup_window(mut self, tw: TimeWindow) -> Self {
        self.pickup_window = Some(tw);
        self
    }

    pub fn with_service_minutes(mut self, minutes: f64) -> Self {
        self.service_minutes = minutes;
        self
    }

    pub fn demand(&self) -> Demand {
        Demand::new(self.weight, self.volume)
    }

    /// Derives the pickup and delivery stops.
    pub fn stops(&self) -> (Stop, Stop) {
        let mut pickup = Stop::pickup(self.id, self.origin, self.demand())
            .with_service_minutes(self.service_minutes);
        if let Some(tw) = self.pickup_window {
            pickup = pickup.with_time_window(tw);
        }
        let mut delivery = Stop::delivery(self.id, self.destination, self.demand())
            .with_service_minutes(self.service_minutes);
        if let Some(tw) = self.time_window {
            delivery = delivery.with_time_window(tw);
        }
        (pickup, delivery)
    }
}
