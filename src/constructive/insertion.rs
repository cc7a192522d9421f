//! Cheapest insertion of a pickup/delivery pair into an existing sequence.
//!
//! Every pickup position `i` and every delivery position `j > i` is tried;
//! the feasible combination with the lowest objective wins. Ties keep the
//! earliest positions.
//!
//! # Complexity
//!
//! O(n³): O(n²) position pairs, each evaluated in O(n).

use crate::evaluation::RouteEvaluator;

/// Result of inserting into a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Insertion {
    pub sequence: Vec<usize>,
    pub objective: f64,
    pub elapsed_minutes: f64,
}

/// Inserts `first` (and `second` after it, when given) into `base` at the
/// cheapest feasible positions.
///
/// `base` plus the new indices must cover every stop of the evaluator.
/// Candidates taking longer than `max_minutes` are skipped. Returns `None`
/// when no feasible placement exists.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
/// use u_dispatch::evaluation::RouteEvaluator;
/// use u_dispatch::constructive::cheapest_insertion;
///
/// let at = |lon: f64| GeoPoint::new(0.0, lon);
/// let w = Demand::new(1.0, 0.0);
/// let stops = vec![
///     Stop::pickup(1, at(0.1), w),
///     Stop::delivery(1, at(0.4), w),
///     Stop::pickup(2, at(0.2), w),
///     Stop::delivery(2, at(0.3), w),
/// ];
/// let c = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 1.0, at(0.0), 480.0));
/// let eval = RouteEvaluator::new(stops, c, &[], 10.0);
///
/// let ins = cheapest_insertion(&eval, &[0, 1], 2, Some(3), None).unwrap();
/// assert_eq!(ins.sequence, vec![0, 2, 3, 1]);
/// ```
pub fn cheapest_insertion(
    eval: &RouteEvaluator,
    base: &[usize],
    first: usize,
    second: Option<usize>,
    max_minutes: Option<f64>,
) -> Option<Insertion> {
    let mut best: Option<Insertion> = None;
    let mut candidate = Vec::with_capacity(base.len() + 2);

    for i in 0..=base.len() {
        let delivery_positions: Vec<Option<usize>> = match second {
            Some(_) => (i..=base.len()).map(Some).collect(),
            None => vec![None],
        };
        for j in delivery_positions {
            candidate.clear();
            candidate.extend_from_slice(&base[..i]);
            candidate.push(first);
            match (j, second) {
                (Some(j), Some(s)) => {
                    candidate.extend_from_slice(&base[i..j]);
                    candidate.push(s);
                    candidate.extend_from_slice(&base[j..]);
                }
                _ => candidate.extend_from_slice(&base[i..]),
            }

            let Some((objective, elapsed)) = eval.score(&candidate) else {
                continue;
            };
            if max_minutes.is_some_and(|m| elapsed > m + 1e-9) {
                continue;
            }
            if best
                .as_ref()
                .is_none_or(|b| objective < b.objective - 1e-9)
            {
                best = Some(Insertion {
                    sequence: candidate.clone(),
                    objective,
                    elapsed_minutes: elapsed,
                });
            }
        }
    }

    best
}
