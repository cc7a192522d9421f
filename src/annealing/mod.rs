//! Simulated annealing over one vehicle's stop sequence.
//!
//! [`SaRunner`] drives the search. Each neighbor is a random segment
//! reversal, single-stop relocation or pickup/delivery pair relocation,
//! repaired back into precedence order. Capacity breaks are priced with
//! [`RouteEvaluator::penalized_objective`], so they are never accepted over a
//! feasible sequence at any useful temperature. Cooling is geometric, one
//! step per `iterations_per_temperature` neighbors. The best sequence seen
//! is returned.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};
use u_metaheur::sa::{CoolingSchedule, SaConfig, SaProblem, SaRunner};

use crate::config::AnnealingConfig;
use crate::evaluation::RouteEvaluator;
use crate::optimizer::Budget;

/// Cost evaluations between budget polls.
const POLL_EVERY: usize = 64;

/// Result of [`simulated_annealing`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnnealingOutcome {
    pub sequence: Vec<usize>,
    pub objective: f64,
    pub iterations: usize,
    /// The wall-clock budget ended the run before the iteration cap.
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy)]
enum Move {
    Reverse,
    Relocate,
    RelocatePair,
}

/// [`SaProblem`] over index sequences of one evaluator.
///
/// The runner only polls an `AtomicBool`, so cost evaluation also watches the
/// budget and raises `stop` once it is spent. `stop` is private to one run
/// and never touches the caller's cancel token.
struct SequenceAnnealing<'a> {
    eval: &'a RouteEvaluator,
    initial: &'a [usize],
    budget: Budget,
    stop: Arc<AtomicBool>,
    evaluations: AtomicUsize,
}

impl SaProblem for SequenceAnnealing<'_> {
    type Solution = Vec<usize>;

    fn initial_solution<R: Rng>(&self, _rng: &mut R) -> Vec<usize> {
        self.initial.to_vec()
    }

    fn cost(&self, solution: &Vec<usize>) -> f64 {
        let k = self.evaluations.fetch_add(1, Ordering::Relaxed);
        if k % POLL_EVERY == 0 && self.budget.exhausted() {
            self.stop.store(true, Ordering::Relaxed);
        }
        self.eval.penalized_objective(solution)
    }

    fn neighbor<R: Rng>(&self, solution: &Vec<usize>, rng: &mut R) -> Vec<usize> {
        let mv = match rng.random_range(0..3u8) {
            0 => Move::Reverse,
            1 => Move::Relocate,
            _ => Move::RelocatePair,
        };
        let mut out = Vec::with_capacity(solution.len());
        neighbor(self.eval, solution, mv, rng, &mut out);
        self.eval.repair_precedence(&mut out);
        out
    }
}

/// Anneals from a feasible `initial` sequence.
///
/// Returns `None` if `initial` is infeasible or the temperatures in `config`
/// cannot drive a run.
///
/// # Examples
///
/// ```
/// use u_dispatch::annealing::simulated_annealing;
/// use u_dispatch::config::AnnealingConfig;
/// use u_dispatch::evaluation::RouteEvaluator;
/// use u_dispatch::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
/// use u_dispatch::optimizer::Budget;
///
/// let at = |lon: f64| GeoPoint::new(0.0, lon);
/// let w = Demand::new(1.0, 0.0);
/// let stops = vec![
///     Stop::pickup(1, at(0.3), w),
///     Stop::delivery(1, at(0.1), w),
///     Stop::pickup(2, at(0.2), w),
///     Stop::delivery(2, at(0.4), w),
/// ];
/// let c = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 1.0, at(0.0), 480.0));
/// let eval = RouteEvaluator::new(stops, c, &[], 10.0);
///
/// let start = vec![0, 1, 2, 3];
/// let before = eval.objective(&start).unwrap();
/// let cfg = AnnealingConfig { iterations: 2_000, ..AnnealingConfig::default() };
/// let out = simulated_annealing(&eval, &start, &cfg, 42, &Budget::unlimited()).unwrap();
/// assert!(out.objective <= before);
/// ```
pub fn simulated_annealing(
    eval: &RouteEvaluator,
    initial: &[usize],
    config: &AnnealingConfig,
    seed: u64,
    budget: &Budget,
) -> Option<AnnealingOutcome> {
    let start_objective = eval.objective(initial)?;
    let budget = budget.narrowed(Duration::from_millis(config.time_budget_ms));

    if initial.len() < 2 || config.iterations == 0 || budget.exhausted() {
        let timed_out = budget.exhausted() && !budget.is_cancelled();
        debug!(timed_out, "annealing skipped");
        return Some(AnnealingOutcome {
            sequence: initial.to_vec(),
            objective: start_objective,
            iterations: 0,
            timed_out,
        });
    }

    let sa_config = SaConfig::default()
        .with_initial_temperature(config.initial_temperature)
        .with_min_temperature(config.minimum_temperature)
        .with_cooling(CoolingSchedule::Geometric {
            alpha: config.cooling_factor,
        })
        .with_iterations_per_temperature(config.iterations_per_temperature)
        .with_max_iterations(config.iterations)
        .with_seed(seed);
    if let Err(e) = sa_config.validate() {
        warn!(error = %e, "annealing rejected its configuration");
        return None;
    }

    let problem = SequenceAnnealing {
        eval,
        initial,
        budget: budget.clone(),
        stop: Arc::new(AtomicBool::new(false)),
        evaluations: AtomicUsize::new(0),
    };
    let result = SaRunner::run_with_cancel(&problem, &sa_config, Some(Arc::clone(&problem.stop)));

    let (sequence, objective) = match eval.objective(&result.best) {
        Some(obj) if obj <= start_objective => (result.best, obj),
        _ => (initial.to_vec(), start_objective),
    };
    let timed_out = result.cancelled && !budget.is_cancelled();

    debug!(
        iterations = result.iterations,
        accepted = result.accepted_moves,
        final_temperature = result.final_temperature,
        timed_out,
        start = start_objective,
        best = objective,
        "annealing finished"
    );

    Some(AnnealingOutcome {
        sequence,
        objective,
        iterations: result.iterations,
        timed_out,
    })
}

fn neighbor<R: Rng>(
    eval: &RouteEvaluator,
    current: &[usize],
    mv: Move,
    rng: &mut R,
    out: &mut Vec<usize>,
) {
    let n = current.len();
    out.clear();
    out.extend_from_slice(current);
    match mv {
        Move::Reverse => {
            let i = rng.random_range(0..n - 1);
            let j = rng.random_range(i + 1..n);
            out[i..=j].reverse();
        }
        Move::Relocate => {
            let from = rng.random_range(0..n);
            let stop = out.remove(from);
            let to = rng.random_range(0..n);
            out.insert(to, stop);
        }
        Move::RelocatePair => {
            let pos = rng.random_range(0..n);
            let first = current[pos];
            let Some(second) = eval.partner(first) else {
                let stop = out.remove(pos);
                let to = rng.random_range(0..n);
                out.insert(to, stop);
                return;
            };
            let (pickup, delivery) = if eval.stop(first).is_pickup() {
                (first, second)
            } else {
                (second, first)
            };
            out.retain(|&i| i != pickup && i != delivery);
            let i = rng.random_range(0..=out.len());
            out.insert(i, pickup);
            let j = rng.random_range(i + 1..=out.len());
            out.insert(j, delivery);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
    use crate::optimizer::CancelToken;
    use u_numflow::random::create_rng;

    fn evaluator() -> RouteEvaluator {
        let at = |lon_tenths: f64| GeoPoint::new(0.0, lon_tenths / 10.0);
        let w = |x: f64| Demand::new(x, 0.0);
        let stops = vec![
            Stop::pickup(1, at(6.0), w(3.0)),
            Stop::delivery(1, at(1.0), w(3.0)),
            Stop::pickup(2, at(2.0), w(3.0)),
            Stop::delivery(2, at(5.0), w(3.0)),
            Stop::pickup(3, at(3.0), w(3.0)),
            Stop::delivery(3, at(4.0), w(3.0)),
        ];
        let c = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 100.0, at(0.0), 600.0));
        RouteEvaluator::new(stops, c, &[], 10.0)
    }

    fn quick() -> AnnealingConfig {
        AnnealingConfig {
            iterations: 3_000,
            ..AnnealingConfig::default()
        }
    }

    #[test]
    fn test_annealing_never_worse_than_start() {
        let eval = evaluator();
        let start = vec![0, 1, 2, 3, 4, 5];
        let before = eval.objective(&start).expect("feasible");
        let out = simulated_annealing(&eval, &start, &quick(), 3, &Budget::unlimited())
            .expect("feasible start");
        assert!(eval.is_feasible(&out.sequence));
        assert!(out.objective <= before + 1e-9);
        assert!(out.objective < before, "a scrambled start should improve");
        assert_eq!(out.iterations, 3_000);
    }

    #[test]
    fn test_neighbors_keep_every_stop() {
        let eval = evaluator();
        let current = vec![0, 1, 2, 3, 4, 5];
        let mut rng = create_rng(11);
        let mut out = Vec::new();
        for mv in [Move::Reverse, Move::Relocate, Move::RelocatePair] {
            for _ in 0..50 {
                neighbor(&eval, &current, mv, &mut rng, &mut out);
                let mut sorted = out.clone();
                sorted.sort();
                assert_eq!(sorted, current);
            }
        }
    }

    #[test]
    fn test_pair_relocation_keeps_precedence() {
        let eval = evaluator();
        let current = vec![0, 1, 2, 3, 4, 5];
        let mut rng = create_rng(5);
        let mut out = Vec::new();
        for _ in 0..100 {
            neighbor(&eval, &current, Move::RelocatePair, &mut rng, &mut out);
            let pos = |x: usize| out.iter().position(|&i| i == x);
            assert!(pos(0) < pos(1));
            assert!(pos(2) < pos(3));
            assert!(pos(4) < pos(5));
        }
    }

    #[test]
    fn test_annealing_rejects_infeasible_start() {
        let eval = evaluator();
        assert!(simulated_annealing(&eval, &[1, 0, 2, 3, 4, 5], &quick(), 1, &Budget::unlimited())
            .is_none());
    }

    #[test]
    fn test_annealing_exhausted_budget_returns_start() {
        let eval = evaluator();
        let start = vec![0, 1, 2, 3, 4, 5];
        let budget = Budget::unlimited().with_time_limit(Duration::ZERO);
        let out = simulated_annealing(&eval, &start, &quick(), 3, &budget).expect("feasible");
        assert!(out.timed_out);
        assert_eq!(out.iterations, 0);
        assert_eq!(out.sequence, start);
    }

    #[test]
    fn test_annealing_cancelled_is_not_a_timeout() {
        let eval = evaluator();
        let start = vec![0, 1, 2, 3, 4, 5];
        let token = CancelToken::new();
        token.cancel();
        let budget = Budget::unlimited().with_cancel(token);
        let out = simulated_annealing(&eval, &start, &quick(), 3, &budget).expect("feasible");
        assert!(!out.timed_out);
        assert_eq!(out.sequence, start);
    }

    #[test]
    fn test_annealing_rejects_inverted_temperatures() {
        let eval = evaluator();
        let config = AnnealingConfig {
            initial_temperature: 0.001,
            ..quick()
        };
        let out = simulated_annealing(&eval, &[0, 1, 2, 3, 4, 5], &config, 3, &Budget::unlimited());
        assert!(out.is_none());
    }

    #[test]
    fn test_sequence_problem_stops_on_spent_budget() {
        let eval = evaluator();
        let start = vec![0, 1, 2, 3, 4, 5];
        let problem = SequenceAnnealing {
            eval: &eval,
            initial: &start,
            budget: Budget::unlimited().with_time_limit(Duration::ZERO),
            stop: Arc::new(AtomicBool::new(false)),
            evaluations: AtomicUsize::new(0),
        };
        assert_eq!(problem.cost(&start), eval.objective(&start).expect("feasible"));
        assert!(problem.stop.load(Ordering::Relaxed));

        let mut rng = create_rng(2);
        for _ in 0..50 {
            let next = problem.neighbor(&start, &mut rng);
            let pos = |x: usize| next.iter().position(|&i| i == x);
            assert!(pos(0) < pos(1) && pos(2) < pos(3) && pos(4) < pos(5));
        }
    }
}
