//! Stops, demands, locations and time windows.

use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use super::{ShipmentId, StopId};
use crate::error::{DispatchError, DispatchResult};

const EARTH_RADIUS_KM: f64 = 6_371.0;
const DEMAND_EPSILON: f64 = 1e-9;

/// A WGS84 coordinate.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::GeoPoint;
///
/// let a = GeoPoint::new(0.0, 0.0);
/// let b = GeoPoint::new(0.0, 1.0);
/// assert!((a.distance_km(&b) - 111.19).abs() < 0.01);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Rejects non-finite or out-of-range coordinates.
    pub fn validate(&self) -> DispatchResult<()> {
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(DispatchError::malformed(format!(
                "coordinate ({}, {}) is not finite",
                self.lat, self.lon
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) || !(-180.0..=180.0).contains(&self.lon) {
            return Err(DispatchError::malformed(format!(
                "coordinate ({}, {}) is out of range",
                self.lat, self.lon
            )));
        }
        Ok(())
    }

    /// Great-circle (haversine) distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// Weight (kg) and volume (cbm) carried or requested.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Demand {
    pub weight: f64,
    pub volume: f64,
}

impl Demand {
    pub fn new(weight: f64, volume: f64) -> Self {
        Self { weight, volume }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns `true` if either dimension is above the matching capacity.
    pub fn exceeds(&self, capacity: &Demand) -> bool {
        self.weight > capacity.weight + DEMAND_EPSILON
            || self.volume > capacity.volume + DEMAND_EPSILON
    }

    /// Largest ratio of load to capacity across both dimensions.
    pub fn ratio_of(&self, capacity: &Demand) -> f64 {
        let w = if capacity.weight > 0.0 {
            self.weight / capacity.weight
        } else {
            0.0
        };
        let v = if capacity.volume > 0.0 {
            self.volume / capacity.volume
        } else {
            0.0
        };
        w.max(v)
    }

    pub(crate) fn validate(&self) -> DispatchResult<()> {
        if !self.weight.is_finite() || !self.volume.is_finite() {
            return Err(DispatchError::malformed("demand is not finite"));
        }
        if self.weight < 0.0 || self.volume < 0.0 {
            return Err(DispatchError::malformed(format!(
                "negative demand ({}, {})",
                self.weight, self.volume
            )));
        }
        Ok(())
    }
}

impl Add for Demand {
    type Output = Demand;

    fn add(self, rhs: Demand) -> Demand {
        Demand::new(self.weight + rhs.weight, self.volume + rhs.volume)
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Demand) {
        self.weight += rhs.weight;
        self.volume += rhs.volume;
    }
}

impl Sub for Demand {
    type Output = Demand;

    fn sub(self, rhs: Demand) -> Demand {
        Demand::new(self.weight - rhs.weight, self.volume - rhs.volume)
    }
}

impl SubAssign for Demand {
    fn sub_assign(&mut self, rhs: Demand) {
        self.weight -= rhs.weight;
        self.volume -= rhs.volume;
    }
}

/// A time window constraint, in minutes on the route clock.
///
/// The vehicle must arrive no later than `due` and may arrive as early as
/// `ready` (waiting is allowed if early).
///
/// # Examples
///
/// ```
/// use u_dispatch::models::TimeWindow;
///
/// let tw = TimeWindow::new(100.0, 200.0).unwrap();
/// assert!(tw.contains(150.0));
/// assert_eq!(tw.lateness(250.0), 50.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    ready: f64,
    due: f64,
}

impl TimeWindow {
    /// Returns `None` if `ready > due` or either value is non-finite.
    pub fn new(ready: f64, due: f64) -> Option<Self> {
        if !ready.is_finite() || !due.is_finite() || ready > due {
            return None;
        }
        Some(Self { ready, due })
    }

    pub fn ready(&self) -> f64 {
        self.ready
    }

    pub fn due(&self) -> f64 {
        self.due
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.ready && time <= self.due
    }

    /// Waiting time if arriving at the given time; zero once the window is open.
    pub fn waiting_time(&self, arrival: f64) -> f64 {
        if arrival < self.ready {
            self.ready - arrival
        } else {
            0.0
        }
    }

    /// Minutes past `due`, zero when on time.
    pub fn lateness(&self, arrival: f64) -> f64 {
        (arrival - self.due).max(0.0)
    }
}

/// Whether a stop loads or unloads goods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Pickup,
    Delivery,
}

/// A single pickup or delivery derived from a shipment.
///
/// Stop ids are derived from the shipment: `2·id` for the pickup and
/// `2·id + 1` for the delivery, so a pair can always be matched.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Demand, GeoPoint, Stop, StopKind};
///
/// let p = Stop::pickup(7, GeoPoint::new(52.0, 4.0), Demand::new(10.0, 0.5));
/// let d = Stop::delivery(7, GeoPoint::new(52.1, 4.1), Demand::new(10.0, 0.5));
/// assert_eq!(p.kind(), StopKind::Pickup);
/// assert_eq!(p.partner_id(), d.id());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    id: StopId,
    kind: StopKind,
    location: GeoPoint,
    demand: Demand,
    time_window: Option<TimeWindow>,
    service_minutes: f64,
    shipment_id: ShipmentId,
}

impl Stop {
    pub fn pickup(shipment_id: ShipmentId, location: GeoPoint, demand: Demand) -> Self {
        Self::new(shipment_id, StopKind::Pickup, location, demand)
    }

    pub fn delivery(shipment_id: ShipmentId, location: GeoPoint, demand: Demand) -> Self {
        Self::new(shipment_id, StopKind::Delivery, location, demand)
    }

    fn new(shipment_id: ShipmentId, kind: StopKind, location: GeoPoint, demand: Demand) -> Self {
        Self {
            id: stop_id_for(shipment_id, kind),
            kind,
            location,
            demand,
            time_window: None,
            service_minutes: 0.0,
            shipment_id,
        }
    }

    pub fn with_time_window(mut self, tw: TimeWindow) -> Self {
        self.time_window = Some(tw);
        self
    }

    pub fn with_service_minutes(mut self, minutes: f64) -> Self {
        self.service_minutes = minutes;
        self
    }

    /// Stop ID.
    pub fn id(&self) -> StopId {
        self.id
    }

    /// Pickup or delivery.
    pub fn kind(&self) -> StopKind {
        self.kind
    }

    pub fn is_pickup(&self) -> bool {
        self.kind == StopKind::Pickup
    }

    /// Stop location.
    pub fn location(&self) -> GeoPoint {
        self.location
    }

    /// Goods loaded (pickup) or unloaded (delivery) at this stop.
    pub fn demand(&self) -> Demand {
        self.demand
    }

    /// Time window, if any.
    pub fn time_window(&self) -> Option<&TimeWindow> {
        self.time_window.as_ref()
    }

    /// Minutes spent at the stop.
    pub fn service_minutes(&self) -> f64 {
        self.service_minutes
    }

    /// Shipment this stop belongs to.
    pub fn shipment_id(&self) -> ShipmentId {
        self.shipment_id
    }

    /// Id of the matching stop of the same shipment.
    pub fn partner_id(&self) -> StopId {
        match self.kind {
            StopKind::Pickup => self.id + 1,
            StopKind::Delivery => self.id - 1,
        }
    }

    pub(crate) fn validate(&self) -> DispatchResult<()> {
        if self.shipment_id > MAX_SHIPMENT_ID {
            return Err(DispatchError::malformed(format!(
                "shipment id {} exceeds {MAX_SHIPMENT_ID}",
                self.shipment_id
            )));
        }
        self.location
            .validate()
            .map_err(|e| DispatchError::malformed(format!("stop {}: {e}", self.id)))?;
        self.demand
            .validate()
            .map_err(|e| DispatchError::malformed(format!("stop {}: {e}", self.id)))?;
        if !self.service_minutes.is_finite() || self.service_minutes < 0.0 {
            return Err(DispatchError::malformed(format!(
                "stop {}: service time {} is invalid",
                self.id, self.service_minutes
            )));
        }
        if self.id != stop_id_for(self.shipment_id, self.kind) {
            return Err(DispatchError::malformed(format!(
                "stop {} does not match shipment {}",
                self.id, self.shipment_id
            )));
        }
        Ok(())
    }
}

/// Largest shipment id whose stop ids fit in a [`StopId`].
pub const MAX_SHIPMENT_ID: ShipmentId = ShipmentId::MAX / 2;

/// Stop id of the given leg of a shipment.
///
/// Ids above [`MAX_SHIPMENT_ID`] wrap; [`Stop`] validation rejects them.
pub fn stop_id_for(shipment_id: ShipmentId, kind: StopKind) -> StopId {
    let base = shipment_id.wrapping_mul(2);
    match kind {
        StopKind::Pickup => base,
        StopKind::Delivery => base.wrapping_add(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_window_invalid() {
        assert!(TimeWindow::new(20.0, 10.0).is_none());
        assert!(TimeWindow::new(f64::NAN, 10.0).is_none());
        assert!(TimeWindow::new(10.0, f64::INFINITY).is_none());
    }

    #[test]
    fn test_time_window_waiting_and_lateness() {
        let tw = TimeWindow::new(10.0, 20.0).expect("valid");
        assert!((tw.waiting_time(5.0) - 5.0).abs() < 1e-10);
        assert!(tw.waiting_time(15.0).abs() < 1e-10);
        assert_eq!(tw.lateness(20.0), 0.0);
        assert!((tw.lateness(23.5) - 3.5).abs() < 1e-10);
    }

    #[test]
    fn test_stop_ids_pair_up() {
        let loc = GeoPoint::new(1.0, 1.0);
        let p = Stop::pickup(5, loc, Demand::new(1.0, 0.0));
        let d = Stop::delivery(5, loc, Demand::new(1.0, 0.0));
        assert_eq!(p.id(), 10);
        assert_eq!(d.id(), 11);
        assert_eq!(p.partner_id(), 11);
        assert_eq!(d.partner_id(), 10);
        assert_eq!(d.shipment_id(), 5);
    }

    #[test]
    fn test_stop_validation() {
        let bad = Stop::pickup(1, GeoPoint::new(f64::NAN, 0.0), Demand::zero());
        assert!(matches!(bad.validate(), Err(DispatchError::MalformedInput(_))));

        let negative = Stop::pickup(1, GeoPoint::new(0.0, 0.0), Demand::new(-1.0, 0.0));
        assert!(matches!(
            negative.validate(),
            Err(DispatchError::MalformedInput(_))
        ));

        let out_of_range = Stop::pickup(1, GeoPoint::new(91.0, 0.0), Demand::zero());
        assert!(out_of_range.validate().is_err());

        let ok = Stop::delivery(1, GeoPoint::new(45.0, 7.0), Demand::new(3.0, 0.1));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_shipment_id_out_of_range() {
        let loc = GeoPoint::new(1.0, 1.0);
        let last = Stop::delivery(MAX_SHIPMENT_ID, loc, Demand::zero());
        assert_eq!(last.id(), StopId::MAX);
        assert!(last.validate().is_ok());

        let over = Stop::pickup(MAX_SHIPMENT_ID + 1, loc, Demand::zero());
        assert!(matches!(over.validate(), Err(DispatchError::MalformedInput(_))));
        let max = Stop::delivery(ShipmentId::MAX, loc, Demand::zero());
        assert!(max.validate().is_err());
    }

    #[test]
    fn test_demand_arithmetic() {
        let mut load = Demand::new(2.0, 0.5);
        load += Demand::new(3.0, 0.25);
        assert_eq!(load, Demand::new(5.0, 0.75));
        load -= Demand::new(5.0, 0.75);
        assert_eq!(load, Demand::zero());
        assert!(Demand::new(11.0, 0.0).exceeds(&Demand::new(10.0, 1.0)));
        assert!(!Demand::new(10.0, 1.0).exceeds(&Demand::new(10.0, 1.0)));
        assert!((Demand::new(5.0, 0.9).ratio_of(&Demand::new(10.0, 1.0)) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = GeoPoint::new(48.85, 2.35);
        let b = GeoPoint::new(51.51, -0.13);
        let d = a.distance_km(&b);
        assert!((d - b.distance_km(&a)).abs() < 1e-9);
        assert!(d > 330.0 && d < 350.0);
    }
}
