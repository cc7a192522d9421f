//! Planned routes.

use serde::{Deserialize, Serialize};

use super::{Demand, DriverId, GeoPoint, ShipmentId, Stop, StopId, VehicleId};
use crate::error::{DispatchError, DispatchResult};

/// A stop within a route, with its computed timing and load state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStop {
    pub stop: Stop,
    /// Arrival on the route clock, in minutes.
    pub eta: f64,
    /// Arrival + waiting + service.
    pub departure: f64,
    /// Load on board after this stop.
    pub load_after: Demand,
    /// Minutes past the stop's time window, zero when on time.
    pub lateness: f64,
}

/// Extra travel minutes on one edge of a route: from a stop (or the route
/// start when `from` is `None`) to a stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeDelay {
    pub from: Option<StopId>,
    pub to: StopId,
    pub extra_minutes: f64,
}

impl EdgeDelay {
    pub fn new(from: Option<StopId>, to: StopId, extra_minutes: f64) -> Self {
        Self {
            from,
            to,
            extra_minutes,
        }
    }

    pub fn same_edge(&self, other: &EdgeDelay) -> bool {
        self.from == other.from && self.to == other.to
    }

    /// Rejects negative or non-finite extra minutes.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.extra_minutes.is_finite() && self.extra_minutes >= 0.0 {
            Ok(())
        } else {
            Err(DispatchError::malformed(format!(
                "delay into stop {} has invalid extra minutes {}",
                self.to, self.extra_minutes
            )))
        }
    }
}

/// Degradations a caller should know about. None of them drops a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteWarning {
    TimeWindowViolated { stop_id: StopId, lateness: f64 },
    WorkingTimeExceeded { planned: f64, available: f64 },
    BudgetExhausted { strategy: String },
    ImprovementFallback { strategy: String, reason: String },
}

/// An ordered stop sequence assigned to one vehicle.
///
/// Built by [`RouteEvaluator`](crate::evaluation::RouteEvaluator); every
/// stop id appears once and each pickup precedes its delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub(crate) vehicle_id: VehicleId,
    pub(crate) driver_id: Option<DriverId>,
    pub(crate) stops: Vec<PlannedStop>,
    pub(crate) start_location: GeoPoint,
    pub(crate) end_location: Option<GeoPoint>,
    pub(crate) start_minute: f64,
    pub(crate) total_distance: f64,
    pub(crate) total_time: f64,
    pub(crate) total_cost: f64,
    pub(crate) objective: f64,
    pub(crate) feasible: bool,
    pub(crate) version: u64,
    pub(crate) warnings: Vec<RouteWarning>,
    pub(crate) edge_delays: Vec<EdgeDelay>,
}

impl Route {
    /// Vehicle ID.
    pub fn vehicle_id(&self) -> VehicleId {
        self.vehicle_id
    }

    /// Driver ID, if the route is assigned.
    pub fn driver_id(&self) -> Option<DriverId> {
        self.driver_id
    }

    /// Stops in visit order with timing.
    pub fn ordered_stops(&self) -> &[PlannedStop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Stop ids in visit order.
    pub fn stop_ids(&self) -> Vec<StopId> {
        self.stops.iter().map(|p| p.stop.id()).collect()
    }

    /// Stops in visit order, without timing.
    pub fn stops(&self) -> Vec<Stop> {
        self.stops.iter().map(|p| p.stop.clone()).collect()
    }

    /// Arrival minute of every stop.
    pub fn per_stop_eta(&self) -> Vec<(StopId, f64)> {
        self.stops.iter().map(|p| (p.stop.id(), p.eta)).collect()
    }

    /// Whether the route visits this stop.
    pub fn contains_stop(&self, id: StopId) -> bool {
        self.stops.iter().any(|p| p.stop.id() == id)
    }

    pub fn contains_shipment(&self, id: ShipmentId) -> bool {
        self.stops.iter().any(|p| p.stop.shipment_id() == id)
    }

    /// Distinct shipments in first-visit order.
    pub fn shipment_ids(&self) -> Vec<ShipmentId> {
        let mut ids: Vec<ShipmentId> = Vec::new();
        for p in &self.stops {
            if !ids.contains(&p.stop.shipment_id()) {
                ids.push(p.stop.shipment_id());
            }
        }
        ids
    }

    /// Where the route departs.
    pub fn start_location(&self) -> GeoPoint {
        self.start_location
    }

    /// Where the route closes, if it returns home.
    pub fn end_location(&self) -> Option<GeoPoint> {
        self.end_location
    }

    /// Route clock at departure.
    pub fn start_minute(&self) -> f64 {
        self.start_minute
    }

    /// Kilometres.
    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    /// Minutes from departure to the route end, including waiting and service.
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    /// Distance and time cost, without lateness.
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Cost plus the lateness penalty; what the optimizer minimizes.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Minutes late summed over stops.
    pub fn total_lateness(&self) -> f64 {
        self.stops.iter().map(|p| p.lateness).sum()
    }

    /// `false` when a time window or the working-time budget is violated.
    pub fn feasible(&self) -> bool {
        self.feasible
    }

    /// Registry version of this route.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Degradations found while building the route.
    pub fn warnings(&self) -> &[RouteWarning] {
        &self.warnings
    }

    /// Traffic delays the route was timed with.
    pub fn edge_delays(&self) -> &[EdgeDelay] {
        &self.edge_delays
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub(crate) fn push_warning(&mut self, warning: RouteWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Peak load over all prefixes, per dimension.
    pub fn peak_load(&self) -> Demand {
        let mut peak = self
            .stops
            .first()
            .map(|p| {
                if p.stop.is_pickup() {
                    p.load_after - p.stop.demand()
                } else {
                    p.load_after + p.stop.demand()
                }
            })
            .unwrap_or_default();
        for p in &self.stops {
            peak.weight = peak.weight.max(p.load_after.weight);
            peak.volume = peak.volume.max(p.load_after.volume);
        }
        peak
    }
}
