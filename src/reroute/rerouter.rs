//! Incremental route repair.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::changes::{merge_delays, ChangeSet};
use super::registry::RouteRegistry;
use crate::config::RerouteConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::evaluation::validate_delays;
use crate::models::{Route, Stop, VehicleConstraints};
use crate::optimizer::{OptimizeOptions, RouteOptimizer};

/// Patches committed routes as shipments come and go and traffic shifts.
///
/// A patch keeps the existing order where it can: removals splice stops
/// out, additions go in by cheapest insertion and delays only re-time the
/// route. The route is re-solved from scratch when an addition costs more
/// than the disruption threshold (a fraction of the current objective) or
/// when a re-solve under new delays beats the current order by more than
/// that fraction.
#[derive(Debug)]
pub struct DynamicRerouter {
    optimizer: Arc<RouteOptimizer>,
    registry: Arc<RouteRegistry>,
    config: RerouteConfig,
}

impl DynamicRerouter {
    /// Fails with [`DispatchError::Config`] when `config` does not validate.
    pub fn new(
        optimizer: Arc<RouteOptimizer>,
        registry: Arc<RouteRegistry>,
        config: RerouteConfig,
    ) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            optimizer,
            registry,
            config,
        })
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Applies `changes` to `current_route` and commits the result.
    ///
    /// The registry must still hold `current_route`'s version for the
    /// vehicle, else `ConcurrentModification`. Delays with negative or
    /// non-finite minutes are `MalformedInput` and leave the registry
    /// untouched. A change set the route already reflects returns the route
    /// unchanged; anything else returns a route one version higher.
    #[instrument(skip_all, fields(
        vehicle_id = current_route.vehicle_id(),
        version = current_route.version(),
    ))]
    pub fn dynamic_reroute(
        &self,
        current_route: &Route,
        changes: &ChangeSet,
        constraints: &VehicleConstraints,
    ) -> DispatchResult<Route> {
        let vehicle_id = current_route.vehicle_id();
        if constraints.vehicle.id() != vehicle_id {
            return Err(DispatchError::malformed(format!(
                "route belongs to vehicle {vehicle_id}, constraints to vehicle {}",
                constraints.vehicle.id()
            )));
        }
        validate_delays(&changes.traffic_delays)?;
        let expected = current_route.version();
        self.registry.check_version(vehicle_id, expected)?;

        let pending = changes.pending_against(current_route);
        if pending.is_empty() {
            debug!("change set already applied");
            return Ok(current_route.clone());
        }

        let delays = merge_delays(current_route.edge_delays(), &pending.traffic_delays);
        let mut stops: Vec<Stop> = current_route
            .stops()
            .into_iter()
            .filter(|s| !pending.remove_shipments.contains(&s.shipment_id()))
            .collect();

        let budget = self.config.disruption_threshold * current_route.objective().abs();
        let mut resolve = false;
        let mut patchable = true;
        for shipment in &pending.add_shipments {
            let (pickup, delivery) = shipment.stops();
            match self.optimizer.insertion_cost_soft(
                &stops,
                &[pickup.clone(), delivery.clone()],
                constraints,
                &delays,
            )? {
                Some(quote) => {
                    debug!(shipment_id = shipment.id, marginal = quote.marginal_cost, "inserted");
                    if quote.marginal_cost > budget + 1e-9 {
                        resolve = true;
                    }
                    stops = quote.stops;
                }
                None => {
                    debug!(shipment_id = shipment.id, "no insertion keeps the current order feasible");
                    stops.push(pickup);
                    stops.push(delivery);
                    resolve = true;
                    patchable = false;
                }
            }
        }

        let patched = if patchable {
            Some(self.optimizer.evaluate(&stops, constraints, &delays)?)
        } else {
            None
        };
        let delay_only = pending.add_shipments.is_empty() && !pending.traffic_delays.is_empty();

        let route = match patched {
            Some(patched) if !resolve && !delay_only => patched,
            Some(patched) => {
                let options = OptimizeOptions::with_strategy(self.config.strategy)
                    .with_traffic(delays.clone());
                let solved = self.optimizer.optimize(&stops, constraints, &options)?.route;
                let keep_order = if delay_only {
                    solved.objective()
                        >= patched.objective() * (1.0 - self.config.disruption_threshold) - 1e-9
                } else {
                    solved.objective() >= patched.objective() - 1e-9
                };
                if keep_order {
                    debug!(patched = patched.objective(), solved = solved.objective(), "keeping patched order");
                    patched
                } else {
                    info!(patched = patched.objective(), solved = solved.objective(), "route re-solved");
                    solved
                }
            }
            None => {
                warn!("patch infeasible, re-solving");
                let options = OptimizeOptions::with_strategy(self.config.strategy)
                    .with_traffic(delays.clone());
                self.optimizer.optimize(&stops, constraints, &options)?.route
            }
        };

        let route = route.with_version(expected + 1);
        self.registry.compare_and_swap(expected, route.clone())?;
        info!(
            added = pending.add_shipments.len(),
            removed = pending.remove_shipments.len(),
            delays = pending.traffic_delays.len(),
            new_version = route.version(),
            objective = route.objective(),
            "route rerouted"
        );
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeDelay, GeoPoint, Shipment, Vehicle};

    fn at(lon: f64) -> GeoPoint {
        GeoPoint::new(0.0, lon)
    }

    fn constraints() -> VehicleConstraints {
        VehicleConstraints::for_vehicle(Vehicle::new(1, 50.0, 5.0, at(0.0), 600.0))
    }

    fn shipment(id: u64, from: f64, to: f64) -> Shipment {
        Shipment::new(id, 1, at(from), at(to), 5.0, 0.1)
    }

    fn setup() -> (DynamicRerouter, Route) {
        let optimizer = Arc::new(RouteOptimizer::default());
        let registry = Arc::new(RouteRegistry::new());
        let mut stops = Vec::new();
        for s in [shipment(1, 0.1, 0.2), shipment(2, 0.3, 0.4)] {
            let (p, d) = s.stops();
            stops.push(p);
            stops.push(d);
        }
        let route = optimizer.evaluate(&stops, &constraints(), &[]).expect("feasible");
        registry.publish(route.clone());
        (
            DynamicRerouter::new(optimizer, registry, RerouteConfig::default())
                .expect("valid config"),
            route,
        )
    }

    #[test]
    fn test_empty_change_set_is_identity() {
        let (rerouter, route) = setup();
        let out = rerouter
            .dynamic_reroute(&route, &ChangeSet::new(), &constraints())
            .expect("current version");
        assert_eq!(out, route);
    }

    #[test]
    fn test_removal_splices_and_bumps_version() {
        let (rerouter, route) = setup();
        let changes = ChangeSet::new().removing(1);
        let out = rerouter
            .dynamic_reroute(&route, &changes, &constraints())
            .expect("current version");
        assert_eq!(out.stop_ids(), vec![4, 5]);
        assert_eq!(out.version(), 1);
        assert!(out.total_distance() < route.total_distance());
        assert_eq!(rerouter.registry().version(1), Some(1));

        let again = rerouter
            .dynamic_reroute(&out, &changes, &constraints())
            .expect("current version");
        assert_eq!(again, out);
    }

    #[test]
    fn test_delay_retimes_without_reordering() {
        let (rerouter, route) = setup();
        let changes = ChangeSet::new().with_delay(EdgeDelay::new(Some(2), 3, 20.0));
        let out = rerouter
            .dynamic_reroute(&route, &changes, &constraints())
            .expect("current version");
        assert_eq!(out.stop_ids(), route.stop_ids());
        assert!((out.total_time() - route.total_time() - 20.0).abs() < 1e-6);
        assert_eq!(out.edge_delays(), &[EdgeDelay::new(Some(2), 3, 20.0)]);

        let again = rerouter
            .dynamic_reroute(&out, &changes, &constraints())
            .expect("current version");
        assert_eq!(again, out);
    }

    #[test]
    fn test_stale_version_rejected() {
        let (rerouter, route) = setup();
        rerouter
            .dynamic_reroute(&route, &ChangeSet::new().removing(2), &constraints())
            .expect("current version");
        let err = rerouter
            .dynamic_reroute(&route, &ChangeSet::new().removing(1), &constraints())
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::ConcurrentModification {
                vehicle_id: 1,
                expected: 0,
                actual: 1
            }
        );
    }

    #[test]
    fn test_addition_covers_new_shipment() {
        let (rerouter, route) = setup();
        let changes = ChangeSet::new().adding(shipment(3, 0.25, 0.35));
        let out = rerouter
            .dynamic_reroute(&route, &changes, &constraints())
            .expect("current version");
        assert_eq!(out.len(), 6);
        assert!(out.contains_shipment(3));
        let ids = out.stop_ids();
        let pos = |id| ids.iter().position(|&x| x == id).expect("present");
        assert!(pos(6) < pos(7));
        assert_eq!(out.version(), 1);
    }

    #[test]
    fn test_mismatched_vehicle_is_malformed() {
        let (rerouter, route) = setup();
        let other = VehicleConstraints::for_vehicle(Vehicle::new(9, 50.0, 5.0, at(0.0), 600.0));
        assert!(matches!(
            rerouter.dynamic_reroute(&route, &ChangeSet::new(), &other),
            Err(DispatchError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_invalid_delay_leaves_registry_untouched() {
        let (rerouter, route) = setup();
        for bad in [f64::NAN, -4.0] {
            let changes = ChangeSet::new()
                .removing(1)
                .with_delay(EdgeDelay::new(Some(2), 3, bad));
            assert!(matches!(
                rerouter.dynamic_reroute(&route, &changes, &constraints()),
                Err(DispatchError::MalformedInput(_))
            ));
        }
        assert_eq!(rerouter.registry().version(1), Some(0));
        assert_eq!(rerouter.registry().current(1), Some(route));
    }

    #[test]
    fn test_new_rejects_negative_threshold() {
        let config = RerouteConfig {
            disruption_threshold: -0.5,
            ..RerouteConfig::default()
        };
        let err = DynamicRerouter::new(
            Arc::new(RouteOptimizer::default()),
            Arc::new(RouteRegistry::new()),
            config,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }
}
