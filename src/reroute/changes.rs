//! Change sets applied to a live route.

use serde::{Deserialize, Serialize};

use crate::models::{stop_id_for, EdgeDelay, Route, Shipment, ShipmentId, StopId, StopKind};

const EPS: f64 = 1e-9;

/// Events to fold into a route.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{EdgeDelay, GeoPoint, Shipment};
/// use u_dispatch::reroute::ChangeSet;
///
/// let here = GeoPoint::new(0.0, 0.0);
/// let changes = ChangeSet::new()
///     .adding(Shipment::new(5, 1, here, here, 1.0, 0.0))
///     .removing(3)
///     .with_delay(EdgeDelay::new(None, 10, 15.0));
/// assert!(!changes.is_empty());
/// assert!(ChangeSet::new().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeSet {
    pub add_shipments: Vec<Shipment>,
    pub remove_shipments: Vec<ShipmentId>,
    /// Absolute extra minutes per edge; a later entry for the same edge
    /// replaces an earlier one.
    pub traffic_delays: Vec<EdgeDelay>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adding(mut self, shipment: Shipment) -> Self {
        self.add_shipments.push(shipment);
        self
    }

    pub fn removing(mut self, shipment_id: ShipmentId) -> Self {
        self.remove_shipments.push(shipment_id);
        self
    }

    pub fn with_delay(mut self, delay: EdgeDelay) -> Self {
        self.traffic_delays.push(delay);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add_shipments.is_empty()
            && self.remove_shipments.is_empty()
            && self.traffic_delays.is_empty()
    }

    /// The part of this change set `route` does not already reflect.
    ///
    /// Additions already on the route, removals already gone and delays
    /// already recorded drop out, as do delays on edges between stops the
    /// route will not contain.
    pub(crate) fn pending_against(&self, route: &Route) -> ChangeSet {
        let mut add_shipments: Vec<Shipment> = Vec::new();
        for s in &self.add_shipments {
            let duplicate = add_shipments.iter().any(|a| a.id == s.id);
            let removed = self.remove_shipments.contains(&s.id);
            if !duplicate && !removed && !route.contains_shipment(s.id) {
                add_shipments.push(s.clone());
            }
        }
        let mut remove_shipments: Vec<ShipmentId> = self
            .remove_shipments
            .iter()
            .copied()
            .filter(|&id| route.contains_shipment(id))
            .collect();
        remove_shipments.sort_unstable();
        remove_shipments.dedup();

        let will_contain = |id: StopId| {
            let kept = route
                .ordered_stops()
                .iter()
                .find(|p| p.stop.id() == id)
                .is_some_and(|p| !remove_shipments.contains(&p.stop.shipment_id()));
            let added = add_shipments.iter().any(|s| {
                id == stop_id_for(s.id, StopKind::Pickup) || id == stop_id_for(s.id, StopKind::Delivery)
            });
            kept || added
        };

        let mut traffic_delays: Vec<EdgeDelay> = Vec::new();
        for d in &self.traffic_delays {
            if let Some(prev) = traffic_delays.iter_mut().find(|p| p.same_edge(d)) {
                *prev = *d;
            } else {
                traffic_delays.push(*d);
            }
        }
        traffic_delays.retain(|d| {
            let known = will_contain(d.to) && d.from.is_none_or(will_contain);
            let recorded = route
                .edge_delays()
                .iter()
                .any(|r| r.same_edge(d) && (r.extra_minutes - d.extra_minutes).abs() <= EPS);
            known && !recorded
        });

        ChangeSet {
            add_shipments,
            remove_shipments,
            traffic_delays,
        }
    }
}

/// `current` with every edge in `updates` set to its new value.
pub(crate) fn merge_delays(current: &[EdgeDelay], updates: &[EdgeDelay]) -> Vec<EdgeDelay> {
    let mut merged: Vec<EdgeDelay> = current
        .iter()
        .filter(|c| !updates.iter().any(|u| u.same_edge(c)))
        .copied()
        .collect();
    merged.extend_from_slice(updates);
    merged
}
