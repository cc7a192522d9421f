//! Property tests over random pickup/delivery instances.

use std::sync::Arc;

use proptest::prelude::*;

use u_dispatch::config::{AnnealingConfig, GeneticConfig, OptimizerConfig, RerouteConfig};
use u_dispatch::models::{
    Demand, EdgeDelay, GeoPoint, Route, Shipment, Stop, Vehicle, VehicleConstraints,
};
use u_dispatch::optimizer::{OptimizeOptions, RouteOptimizer, Strategy};
use u_dispatch::reroute::{ChangeSet, DynamicRerouter, RouteRegistry};

const CAPACITY: f64 = 10.0;

/// `(pickup lon, delivery lon, pickup lat, delivery lat, weight)` per shipment.
fn instance() -> impl proptest::strategy::Strategy<Value = Vec<(f64, f64, f64, f64, f64)>> {
    prop::collection::vec(
        (0.0f64..0.5, 0.0f64..0.5, 0.0f64..0.5, 0.0f64..0.5, 0.5f64..CAPACITY),
        1..7,
    )
}

fn stops_of(shipments: &[(f64, f64, f64, f64, f64)]) -> Vec<Stop> {
    shipments
        .iter()
        .enumerate()
        .flat_map(|(k, &(plon, dlon, plat, dlat, w))| {
            let id = k as u64 + 1;
            let d = Demand::new(w, 0.0);
            [
                Stop::pickup(id, GeoPoint::new(plat, plon), d),
                Stop::delivery(id, GeoPoint::new(dlat, dlon), d),
            ]
        })
        .collect()
}

/// Small search budgets so each case finishes quickly.
fn quick_optimizer() -> RouteOptimizer {
    RouteOptimizer::new(OptimizerConfig {
        genetic: GeneticConfig {
            population_size: 8,
            max_generations: 10,
            ..GeneticConfig::default()
        },
        annealing: AnnealingConfig {
            iterations: 500,
            ..AnnealingConfig::default()
        },
        ..OptimizerConfig::default()
    })
    .expect("valid config")
}

/// `(stop index, extra minutes, from the route start)` per delay.
fn delay_specs() -> impl proptest::strategy::Strategy<Value = Vec<(usize, f64, bool)>> {
    prop::collection::vec((0usize..14, 0.0f64..30.0, any::<bool>()), 0..4)
}

fn change_set(
    stops: &[Stop],
    adds: &[(f64, f64, f64, f64, f64)],
    removed: &[bool],
    delays: &[(usize, f64, bool)],
) -> ChangeSet {
    let first_new = stops.len() as u64 / 2 + 1;
    let mut changes = ChangeSet::new();
    for (k, &(plon, dlon, plat, dlat, w)) in adds.iter().enumerate() {
        let pickup = GeoPoint::new(plat, plon);
        let delivery = GeoPoint::new(dlat, dlon);
        changes = changes.adding(Shipment::new(first_new + k as u64, 1, pickup, delivery, w, 0.0));
    }
    for (k, _) in removed.iter().enumerate().filter(|(_, r)| **r) {
        changes = changes.removing(k as u64 + 1);
    }
    for &(i, minutes, from_start) in delays {
        let to = stops[i % stops.len()].id();
        let from = (!from_start).then(|| stops[(i + 1) % stops.len()].id());
        changes = changes.with_delay(EdgeDelay::new(from, to, minutes));
    }
    changes
}

fn constraints() -> VehicleConstraints {
    VehicleConstraints::for_vehicle(Vehicle::new(1, CAPACITY, 100.0, GeoPoint::new(0.0, 0.0), 5_000.0))
}

fn assert_valid(route: &Route, stops: &[Stop]) {
    let ids = route.stop_ids();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    let mut expected: Vec<u64> = stops.iter().map(Stop::id).collect();
    expected.sort_unstable();
    assert_eq!(sorted, expected, "every stop exactly once");

    for stop in stops.iter().filter(|s| s.is_pickup()) {
        let p = ids.iter().position(|&x| x == stop.id());
        let d = ids.iter().position(|&x| x == stop.partner_id());
        assert!(p < d, "pickup {} after its delivery", stop.id());
    }

    let mut load = 0.0;
    for planned in route.ordered_stops() {
        if planned.stop.is_pickup() {
            load += planned.stop.demand().weight;
        } else {
            load -= planned.stop.demand().weight;
        }
        assert!(load <= CAPACITY + 1e-9, "prefix load {load} over capacity");
        assert!((planned.load_after.weight - load).abs() < 1e-9);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_routes_respect_precedence_and_prefix_capacity(shipments in instance()) {
        let stops = stops_of(&shipments);
        let c = constraints();
        let optimizer = RouteOptimizer::default();
        for strategy in [Strategy::NearestNeighbor, Strategy::TwoOpt, Strategy::ThreeOpt] {
            let out = optimizer
                .optimize(&stops, &c, &OptimizeOptions::with_strategy(strategy))
                .expect("every stop fits the vehicle alone");
            assert_valid(&out.route, &stops);
        }
    }

    #[test]
    fn prop_two_opt_never_worse_than_construction(shipments in instance()) {
        let stops = stops_of(&shipments);
        let c = constraints();
        let optimizer = RouteOptimizer::default();
        let nn = optimizer
            .optimize(&stops, &c, &OptimizeOptions::with_strategy(Strategy::NearestNeighbor))
            .expect("feasible");
        let two = optimizer
            .optimize(&stops, &c, &OptimizeOptions::with_strategy(Strategy::TwoOpt))
            .expect("feasible");
        prop_assert!(two.route.objective() <= nn.route.objective() + 1e-9);
    }

    #[test]
    fn prop_insertion_keeps_route_valid(shipments in instance(), extra in 0.5f64..CAPACITY) {
        let stops = stops_of(&shipments);
        let c = constraints();
        let optimizer = RouteOptimizer::default();
        let base = optimizer
            .optimize(&stops, &c, &OptimizeOptions::with_strategy(Strategy::TwoOpt))
            .expect("feasible")
            .route;
        let id = shipments.len() as u64 + 1;
        let d = Demand::new(extra, 0.0);
        let pair = [
            Stop::pickup(id, GeoPoint::new(0.25, 0.25), d),
            Stop::delivery(id, GeoPoint::new(0.1, 0.4), d),
        ];
        let quote = optimizer
            .insertion_cost(&base.stops(), &pair, &c, &[])
            .expect("valid input")
            .expect("appending the pair at the end always fits");
        prop_assert!(quote.marginal_cost >= -1e-9);
        let mut all = stops.clone();
        all.extend_from_slice(&pair);
        let route = optimizer.evaluate(&quote.stops, &c, &[]).expect("feasible order");
        assert_valid(&route, &all);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_metaheuristics_never_worse_than_construction(shipments in instance()) {
        let stops = stops_of(&shipments);
        let c = constraints();
        let optimizer = quick_optimizer();
        let nn = optimizer
            .optimize(&stops, &c, &OptimizeOptions::with_strategy(Strategy::NearestNeighbor))
            .expect("feasible");
        for strategy in [Strategy::Genetic2Opt, Strategy::SimulatedAnnealing] {
            let out = optimizer
                .optimize(&stops, &c, &OptimizeOptions::with_strategy(strategy))
                .expect("feasible");
            assert_valid(&out.route, &stops);
            prop_assert!(
                out.route.objective() <= nn.route.objective() + 1e-9,
                "{} worse than nearest neighbor", strategy
            );
        }
    }

    #[test]
    fn prop_reroute_is_idempotent(
        shipments in instance(),
        adds in prop::collection::vec(
            (0.0f64..0.5, 0.0f64..0.5, 0.0f64..0.5, 0.0f64..0.5, 0.5f64..CAPACITY),
            0..3,
        ),
        removed in prop::collection::vec(any::<bool>(), 7),
        delays in delay_specs(),
    ) {
        let stops = stops_of(&shipments);
        let c = constraints();
        let optimizer = Arc::new(RouteOptimizer::default());
        let route = optimizer
            .optimize(&stops, &c, &OptimizeOptions::with_strategy(Strategy::TwoOpt))
            .expect("feasible")
            .route;
        let registry = Arc::new(RouteRegistry::new());
        registry.publish(route.clone());
        let config = RerouteConfig {
            strategy: Strategy::TwoOpt,
            ..RerouteConfig::default()
        };
        let rerouter = DynamicRerouter::new(optimizer, Arc::clone(&registry), config)
            .expect("valid config");

        let changes = change_set(&stops, &adds, &removed, &delays);
        let once = rerouter.dynamic_reroute(&route, &changes, &c).expect("current version");
        let twice = rerouter.dynamic_reroute(&once, &changes, &c).expect("current version");
        prop_assert_eq!(&twice, &once);
        prop_assert_eq!(registry.current(1), Some(once));
    }
}
