//! Precedence-safe 3-opt improvement.
//!
//! # Algorithm
//!
//! Cutting the sequence at positions `i < j < k` gives four segments
//! `A = [..i]`, `B = [i..j]`, `C = [j..k]`, `D = [k..]`. Besides the identity
//! there are 7 reconnections of B and C (reversals and the swap, including
//! the 2-opt moves as special cases). Each is evaluated in full; the best
//! improving pattern for the first improving triple is applied and the
//! search restarts.
//!
//! # Complexity
//!
//! O(n⁴) per pass.
//!
//! # Reference
//!
//! Lin, S. (1965). "Computer Solutions of the Traveling Salesman Problem",
//! *Bell System Technical Journal* 44(10), 2245-2269.

use crate::evaluation::RouteEvaluator;
use crate::optimizer::Budget;

use super::Improvement;

/// Reconnection of the middle segments B and C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    /// A - B - C' - D
    ReverseC,
    /// A - B' - C - D
    ReverseB,
    /// A - B' - C' - D
    ReverseBoth,
    /// A - C - B - D
    Swap,
    /// A - C - B' - D
    SwapReverseB,
    /// A - C' - B - D
    SwapReverseC,
    /// A - C' - B' - D
    SwapReverseBoth,
}

const PATTERNS: [Pattern; 7] = [
    Pattern::ReverseC,
    Pattern::ReverseB,
    Pattern::ReverseBoth,
    Pattern::Swap,
    Pattern::SwapReverseB,
    Pattern::SwapReverseC,
    Pattern::SwapReverseBoth,
];

/// Applies 3-opt to a feasible sequence.
///
/// Returns `None` if `sequence` itself is infeasible. Sequences shorter than
/// three stops pass through unchanged.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
/// use u_dispatch::evaluation::RouteEvaluator;
/// use u_dispatch::local_search::three_opt_improve;
/// use u_dispatch::optimizer::Budget;
///
/// let at = |lon: f64| GeoPoint::new(0.0, lon);
/// let d = Demand::new(1.0, 0.0);
/// let stops = vec![
///     Stop::delivery(1, at(0.1), d),
///     Stop::delivery(2, at(0.2), d),
///     Stop::delivery(3, at(0.3), d),
///     Stop::delivery(4, at(0.4), d),
/// ];
/// let c = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 1.0, at(0.0), 480.0))
///     .open_ended();
/// let eval = RouteEvaluator::new(stops, c, &[], 10.0);
///
/// let before = eval.objective(&[2, 3, 0, 1]).unwrap();
/// let result = three_opt_improve(&eval, &[2, 3, 0, 1], &Budget::unlimited()).unwrap();
/// assert!(result.objective < before);
/// assert!(eval.is_feasible(&result.sequence));
/// ```
pub fn three_opt_improve(
    eval: &RouteEvaluator,
    sequence: &[usize],
    budget: &Budget,
) -> Option<Improvement> {
    let mut current = sequence.to_vec();
    let mut best = eval.objective(&current)?;
    let n = current.len();
    if n < 3 {
        return Some(Improvement::converged(current, best));
    }

    let mut candidate = Vec::with_capacity(n);
    let mut improved = true;
    while improved {
        improved = false;
        'outer: for i in 0..n - 1 {
            if budget.exhausted() {
                return Some(Improvement::interrupted(current, best));
            }
            for j in i + 1..n {
                for k in j + 1..=n {
                    let mut found: Option<(Pattern, f64)> = None;
                    for pattern in PATTERNS {
                        reconnect(&current, i, j, k, pattern, &mut candidate);
                        let Some(obj) = eval.objective(&candidate) else {
                            continue;
                        };
                        let target = found.map_or(best, |(_, o)| o);
                        if obj < target - 1e-9 {
                            found = Some((pattern, obj));
                        }
                    }
                    if let Some((pattern, obj)) = found {
                        reconnect(&current, i, j, k, pattern, &mut candidate);
                        std::mem::swap(&mut current, &mut candidate);
                        best = obj;
                        improved = true;
                        break 'outer;
                    }
                }
            }
        }
    }

    Some(Improvement::converged(current, best))
}

fn reconnect(
    route: &[usize],
    i: usize,
    j: usize,
    k: usize,
    pattern: Pattern,
    out: &mut Vec<usize>,
) {
    let (a, b, c, d) = (&route[..i], &route[i..j], &route[j..k], &route[k..]);
    out.clear();
    out.extend_from_slice(a);
    match pattern {
        Pattern::ReverseC => {
            out.extend_from_slice(b);
            out.extend(c.iter().rev());
        }
        Pattern::ReverseB => {
            out.extend(b.iter().rev());
            out.extend_from_slice(c);
        }
        Pattern::ReverseBoth => {
            out.extend(b.iter().rev());
            out.extend(c.iter().rev());
        }
        Pattern::Swap => {
            out.extend_from_slice(c);
            out.extend_from_slice(b);
        }
        Pattern::SwapReverseB => {
            out.extend_from_slice(c);
            out.extend(b.iter().rev());
        }
        Pattern::SwapReverseC => {
            out.extend(c.iter().rev());
            out.extend_from_slice(b);
        }
        Pattern::SwapReverseBoth => {
            out.extend(c.iter().rev());
            out.extend(b.iter().rev());
        }
    }
    out.extend_from_slice(d);
}
