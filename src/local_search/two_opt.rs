//! Precedence-safe 2-opt improvement.
//!
//! # Algorithm
//!
//! For every pair of positions (i, j), reverse the segment `[i..=j]` and
//! re-evaluate the whole sequence. Reversals that put a delivery before its
//! pickup, or overload some prefix, have no objective and are skipped.
//! Improving reversals are applied immediately (first-improvement) and the
//! scan repeats until a full pass finds nothing.
//!
//! Because each candidate is evaluated in full, time-dependent effects
//! (waiting, lateness, traffic delays) are priced exactly.
//!
//! # Complexity
//!
//! O(n³) per pass.
//!
//! # Reference
//!
//! Croes, G.A. (1958). "A method for solving traveling salesman problems",
//! *Operations Research* 6(6), 791-812.

use crate::evaluation::RouteEvaluator;
use crate::optimizer::Budget;

use super::Improvement;

/// Applies 2-opt to a feasible sequence.
///
/// Returns `None` if `sequence` itself is infeasible. The budget is polled
/// between passes over `i`; an exhausted budget returns the best sequence so
/// far with `converged == false`.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
/// use u_dispatch::evaluation::RouteEvaluator;
/// use u_dispatch::local_search::two_opt_improve;
/// use u_dispatch::optimizer::Budget;
///
/// let at = |lon: f64| GeoPoint::new(0.0, lon);
/// let d = Demand::new(1.0, 0.0);
/// // preloaded deliveries along a line
/// let stops = vec![
///     Stop::delivery(1, at(0.1), d),
///     Stop::delivery(2, at(0.2), d),
///     Stop::delivery(3, at(0.3), d),
/// ];
/// let c = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 1.0, at(0.0), 480.0))
///     .open_ended();
/// let eval = RouteEvaluator::new(stops, c, &[], 10.0);
///
/// let result = two_opt_improve(&eval, &[2, 1, 0], &Budget::unlimited()).unwrap();
/// assert_eq!(result.sequence, vec![0, 1, 2]);
/// assert!(result.converged);
/// ```
pub fn two_opt_improve(
    eval: &RouteEvaluator,
    sequence: &[usize],
    budget: &Budget,
) -> Option<Improvement> {
    let mut current = sequence.to_vec();
    let mut best = eval.objective(&current)?;
    let n = current.len();
    if n < 2 {
        return Some(Improvement::converged(current, best));
    }

    let mut candidate = current.clone();
    let mut improved = true;
    while improved {
        improved = false;
        for i in 0..n - 1 {
            if budget.exhausted() {
                return Some(Improvement::interrupted(current, best));
            }
            for j in i + 1..n {
                candidate.clone_from(&current);
                candidate[i..=j].reverse();
                if let Some(obj) = eval.objective(&candidate) {
                    if obj < best - 1e-9 {
                        std::mem::swap(&mut current, &mut candidate);
                        best = obj;
                        improved = true;
                    }
                }
            }
        }
    }

    Some(Improvement::converged(current, best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};

    fn at(lon_tenths: f64) -> GeoPoint {
        GeoPoint::new(0.0, lon_tenths / 10.0)
    }

    fn w(x: f64) -> Demand {
        Demand::new(x, 0.0)
    }

    fn open_evaluator(stops: Vec<Stop>, capacity: f64) -> RouteEvaluator {
        let c = VehicleConstraints::for_vehicle(Vehicle::new(1, capacity, 100.0, at(0.0), 600.0))
            .open_ended();
        RouteEvaluator::new(stops, c, &[], 10.0)
    }

    #[test]
    fn test_2opt_already_optimal() {
        let stops = vec![
            Stop::pickup(1, at(1.0), w(1.0)),
            Stop::delivery(1, at(2.0), w(1.0)),
        ];
        let eval = open_evaluator(stops, 10.0);
        let result = two_opt_improve(&eval, &[0, 1], &Budget::unlimited()).expect("feasible");
        assert_eq!(result.sequence, vec![0, 1]);
        assert!(result.converged);
    }

    #[test]
    fn test_2opt_keeps_precedence() {
        // reversing the pair would be shorter but puts the delivery first
        let stops = vec![
            Stop::pickup(1, at(3.0), w(1.0)),
            Stop::delivery(1, at(1.0), w(1.0)),
        ];
        let eval = open_evaluator(stops, 10.0);
        let result = two_opt_improve(&eval, &[0, 1], &Budget::unlimited()).expect("feasible");
        assert_eq!(result.sequence, vec![0, 1]);
    }

    #[test]
    fn test_2opt_does_not_worsen() {
        let stops = vec![
            Stop::pickup(1, at(5.0), w(3.0)),
            Stop::delivery(1, at(1.0), w(3.0)),
            Stop::pickup(2, at(2.0), w(4.0)),
            Stop::delivery(2, at(6.0), w(4.0)),
            Stop::pickup(3, at(4.0), w(5.0)),
            Stop::delivery(3, at(3.0), w(5.0)),
        ];
        let eval = open_evaluator(stops, 10.0);
        let initial = vec![0, 2, 1, 4, 3, 5];
        let before = eval.objective(&initial).expect("feasible");
        let result = two_opt_improve(&eval, &initial, &Budget::unlimited()).expect("feasible");
        assert!(eval.is_feasible(&result.sequence));
        assert!(result.objective <= before + 1e-9);
    }

    #[test]
    fn test_2opt_rejects_infeasible_input() {
        let stops = vec![
            Stop::pickup(1, at(1.0), w(1.0)),
            Stop::delivery(1, at(2.0), w(1.0)),
        ];
        let eval = open_evaluator(stops, 10.0);
        assert!(two_opt_improve(&eval, &[1, 0], &Budget::unlimited()).is_none());
    }

    #[test]
    fn test_2opt_exhausted_budget_returns_input() {
        let stops = vec![
            Stop::delivery(1, at(1.0), w(1.0)),
            Stop::delivery(2, at(2.0), w(1.0)),
            Stop::delivery(3, at(3.0), w(1.0)),
        ];
        let eval = open_evaluator(stops, 10.0);
        let budget = Budget::unlimited().with_time_limit(std::time::Duration::ZERO);
        let result = two_opt_improve(&eval, &[2, 1, 0], &budget).expect("feasible");
        assert_eq!(result.sequence, vec![2, 1, 0]);
        assert!(!result.converged);
    }
}
