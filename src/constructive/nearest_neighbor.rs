//! Nearest-neighbor construction for pickup/delivery routes.
//!
//! Starting from the route start, always visit the nearest stop that is
//! currently eligible:
//!
//! - a delivery once its pickup has been visited (or immediately, if the
//!   goods are preloaded),
//! - a paired pickup if its demand fits on board,
//! - a terminal pickup (no matching delivery) once every paired pickup has
//!   been loaded and its demand fits.
//!
//! On validated input the walk never dead-ends: while paired work remains,
//! some delivery is always open or the vehicle is empty enough for the next
//! pickup; terminal pickups at the end fit by validation.
//!
//! # Complexity
//!
//! O(n²) where n = number of stops.

use crate::evaluation::RouteEvaluator;

/// Builds a sequence with the nearest-neighbor rule.
///
/// Returns `None` if no eligible stop remains before all are visited, which
/// only happens on input that [`validate_request`](crate::evaluation::validate_request)
/// rejects.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
/// use u_dispatch::evaluation::RouteEvaluator;
/// use u_dispatch::constructive::nearest_neighbor;
///
/// let at = |lon: f64| GeoPoint::new(0.0, lon);
/// let stops = vec![
///     Stop::delivery(1, at(0.3), Demand::new(5.0, 0.0)),
///     Stop::pickup(1, at(0.2), Demand::new(5.0, 0.0)),
/// ];
/// let c = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 1.0, at(0.0), 480.0));
/// let eval = RouteEvaluator::new(stops, c, &[], 10.0);
///
/// assert_eq!(nearest_neighbor(&eval), Some(vec![1, 0]));
/// ```
pub fn nearest_neighbor(eval: &RouteEvaluator) -> Option<Vec<usize>> {
    let n = eval.num_stops();
    let capacity = eval.capacity();
    let travel = eval.travel();

    let mut visited = vec![false; n];
    let mut sequence = Vec::with_capacity(n);
    let mut load = eval.initial_load();
    let mut current = travel.start_node();
    let mut paired_pickups_left = (0..n)
        .filter(|&i| eval.stop(i).is_pickup() && eval.partner(i).is_some())
        .count();

    while sequence.len() < n {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..n {
            if visited[i] {
                continue;
            }
            let stop = eval.stop(i);
            let eligible = if stop.is_pickup() {
                let fits = !(load + stop.demand()).exceeds(&capacity);
                fits && (eval.partner(i).is_some() || paired_pickups_left == 0)
            } else {
                eval.partner(i).is_none_or(|p| visited[p])
            };
            if !eligible {
                continue;
            }
            let d = travel.distance(current, travel.node(i));
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }

        let (next, _) = best?;
        let stop = eval.stop(next);
        if stop.is_pickup() {
            load += stop.demand();
            if eval.partner(next).is_some() {
                paired_pickups_left -= 1;
            }
        } else {
            load -= stop.demand();
        }
        visited[next] = true;
        sequence.push(next);
        current = travel.node(next);
    }

    Some(sequence)
}

/// A sequence that is capacity-feasible whenever any sequence is: preloaded
/// deliveries, then each pair back to back, then terminal pickups.
pub fn canonical_order(eval: &RouteEvaluator) -> Vec<usize> {
    let n = eval.num_stops();
    let mut sequence: Vec<usize> = (0..n)
        .filter(|&i| !eval.stop(i).is_pickup() && eval.partner(i).is_none())
        .collect();
    for i in 0..n {
        if eval.stop(i).is_pickup() {
            if let Some(d) = eval.partner(i) {
                sequence.push(i);
                sequence.push(d);
            }
        }
    }
    sequence.extend((0..n).filter(|&i| eval.is_terminal_pickup(i)));
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};

    fn at(lon_tenths: f64) -> GeoPoint {
        GeoPoint::new(0.0, lon_tenths / 10.0)
    }

    fn evaluator(stops: Vec<Stop>, capacity: f64) -> RouteEvaluator {
        let c = VehicleConstraints::for_vehicle(Vehicle::new(1, capacity, 100.0, at(0.0), 600.0));
        RouteEvaluator::new(stops, c, &[], 10.0)
    }

    fn w(x: f64) -> Demand {
        Demand::new(x, 0.0)
    }

    #[test]
    fn test_nn_empty() {
        let eval = evaluator(vec![], 10.0);
        assert_eq!(nearest_neighbor(&eval), Some(vec![]));
    }

    #[test]
    fn test_nn_chooses_nearest_eligible() {
        let stops = vec![
            Stop::pickup(1, at(5.0), w(1.0)),
            Stop::delivery(1, at(1.0), w(1.0)),
            Stop::pickup(2, at(2.0), w(1.0)),
            Stop::delivery(2, at(3.0), w(1.0)),
        ];
        let eval = evaluator(stops, 10.0);
        // delivery 1 is nearest but locked until its pickup at 5.0
        assert_eq!(nearest_neighbor(&eval), Some(vec![2, 3, 0, 1]));
    }

    #[test]
    fn test_nn_respects_capacity() {
        let stops = vec![
            Stop::pickup(1, at(1.0), w(6.0)),
            Stop::pickup(2, at(2.0), w(6.0)),
            Stop::delivery(1, at(3.0), w(6.0)),
            Stop::delivery(2, at(4.0), w(6.0)),
        ];
        let eval = evaluator(stops, 10.0);
        let seq = nearest_neighbor(&eval).expect("feasible");
        assert!(eval.is_feasible(&seq));
        assert_eq!(seq, vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_nn_defers_terminal_pickups() {
        let stops = vec![
            Stop::pickup(1, at(1.0), w(5.0)),
            Stop::pickup(2, at(2.0), w(8.0)),
            Stop::delivery(2, at(3.0), w(8.0)),
        ];
        let eval = evaluator(stops, 10.0);
        let seq = nearest_neighbor(&eval).expect("feasible");
        assert!(eval.is_feasible(&seq));
        assert_eq!(seq.last(), Some(&0));
    }

    #[test]
    fn test_canonical_order_is_feasible() {
        let stops = vec![
            Stop::pickup(1, at(1.0), w(9.0)),
            Stop::delivery(1, at(2.0), w(9.0)),
            Stop::delivery(2, at(3.0), w(10.0)),
            Stop::pickup(3, at(4.0), w(10.0)),
            Stop::pickup(4, at(4.0), w(9.0)),
            Stop::delivery(4, at(2.0), w(9.0)),
        ];
        let eval = evaluator(stops, 10.0);
        let seq = canonical_order(&eval);
        assert_eq!(seq, vec![2, 0, 1, 4, 5, 3]);
        assert!(eval.is_feasible(&seq));
    }
}
