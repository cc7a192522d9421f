//! Budgeted genetic search over [`PickupDeliveryGaProblem`].
//!
//! Runs [`GaRunner`] with binary tournament selection and two elites. The
//! search budget maps onto the runner's time limit and its cancellation
//! flag, so a superseded request stops at the next generation boundary.

use std::time::Duration;

use tracing::{debug, warn};
use u_metaheur::ga::{GaConfig, GaRunner, Individual, Selection};

use crate::config::GeneticConfig;
use crate::evaluation::RouteEvaluator;
use crate::optimizer::Budget;

use super::problem::PickupDeliveryGaProblem;

const ELITES: f64 = 2.0;

/// Best sequence found by [`genetic_search`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneticOutcome {
    /// Best feasible sequence, `None` if the population never held one.
    pub best: Option<(Vec<usize>, f64)>,
    pub generations: usize,
    /// The wall-clock budget ended the run before the generation cap.
    pub timed_out: bool,
    /// The budget's cancel token stopped the run.
    pub cancelled: bool,
}

/// Runs the genetic search. `seeds` are placed in the initial population
/// (after precedence repair) ahead of random individuals.
pub fn genetic_search(
    eval: &RouteEvaluator,
    seeds: &[Vec<usize>],
    config: &GeneticConfig,
    seed: u64,
    budget: &Budget,
) -> GeneticOutcome {
    let problem = PickupDeliveryGaProblem::new(eval.clone())
        .with_local_search_rate(config.local_search_rate)
        .with_seeds(seeds.to_vec());
    let budget = budget.narrowed(Duration::from_millis(config.time_budget_ms));
    let limit_ms = budget
        .remaining()
        .map_or(config.time_budget_ms, |r| r.as_millis() as u64);

    if budget.exhausted() || limit_ms == 0 {
        let best = best_of(eval, problem.seeds().iter().map(Vec::as_slice));
        debug!(cancelled = budget.is_cancelled(), "genetic search skipped, budget spent");
        return GeneticOutcome {
            best,
            generations: 0,
            timed_out: !budget.is_cancelled(),
            cancelled: budget.is_cancelled(),
        };
    }

    let size = config.population_size.max(4);
    let ga_config = GaConfig::default()
        .with_population_size(size)
        .with_max_generations(config.max_generations)
        .with_selection(Selection::Tournament(2))
        .with_elite_ratio((ELITES + 0.5) / size as f64)
        .with_crossover_rate(1.0)
        .with_mutation_rate(config.mutation_rate)
        .with_stagnation_limit(0)
        .with_parallel(false)
        .with_seed(seed)
        .with_time_limit_ms(limit_ms);

    let result = match GaRunner::run_with_cancel(&problem, &ga_config, Some(budget.cancel_flag()))
    {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "genetic search rejected its configuration");
            return GeneticOutcome {
                best: None,
                generations: 0,
                timed_out: false,
                cancelled: false,
            };
        }
    };

    let best = best_of(
        eval,
        std::iter::once(result.best.order()).chain(problem.seeds().iter().map(Vec::as_slice)),
    );

    debug!(
        generations = result.generations,
        timed_out = result.timed_out,
        cancelled = result.cancelled,
        fitness = result.best.fitness(),
        best = best.as_ref().map(|(_, o)| *o),
        "genetic search finished"
    );

    GeneticOutcome {
        best,
        generations: result.generations,
        timed_out: result.timed_out,
        cancelled: result.cancelled,
    }
}

/// Cheapest feasible order among `orders`.
fn best_of<'a>(
    eval: &RouteEvaluator,
    orders: impl Iterator<Item = &'a [usize]>,
) -> Option<(Vec<usize>, f64)> {
    orders
        .filter_map(|order| Some((order.to_vec(), eval.objective(order)?)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
    use crate::optimizer::CancelToken;

    fn evaluator() -> RouteEvaluator {
        let at = |lon_tenths: f64| GeoPoint::new(0.0, lon_tenths / 10.0);
        let w = |x: f64| Demand::new(x, 0.0);
        let stops = vec![
            Stop::pickup(1, at(4.0), w(4.0)),
            Stop::delivery(1, at(1.0), w(4.0)),
            Stop::pickup(2, at(2.0), w(4.0)),
            Stop::delivery(2, at(5.0), w(4.0)),
            Stop::pickup(3, at(3.0), w(4.0)),
            Stop::delivery(3, at(6.0), w(4.0)),
        ];
        let c = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 100.0, at(0.0), 600.0));
        RouteEvaluator::new(stops, c, &[], 10.0)
    }

    fn small_config() -> GeneticConfig {
        GeneticConfig {
            population_size: 12,
            max_generations: 25,
            ..GeneticConfig::default()
        }
    }

    #[test]
    fn test_genetic_never_worse_than_seed() {
        let eval = evaluator();
        let seed = vec![0, 1, 2, 3, 4, 5];
        let seed_obj = eval.objective(&seed).expect("feasible");
        let outcome = genetic_search(&eval, &[seed], &small_config(), 42, &Budget::unlimited());
        let (best, obj) = outcome.best.expect("seed survives as elite");
        assert!(eval.is_feasible(&best));
        assert!(obj <= seed_obj + 1e-9);
        assert_eq!(outcome.generations, 25);
        assert!(!outcome.timed_out);
        assert!(!outcome.cancelled);
    }

    #[test]
    fn test_genetic_is_deterministic_for_seed() {
        let eval = evaluator();
        let seed = vec![0, 1, 2, 3, 4, 5];
        let a = genetic_search(&eval, &[seed.clone()], &small_config(), 9, &Budget::unlimited());
        let b = genetic_search(&eval, &[seed], &small_config(), 9, &Budget::unlimited());
        assert_eq!(a.best, b.best);
    }

    #[test]
    fn test_genetic_stops_on_exhausted_budget() {
        let eval = evaluator();
        let budget = Budget::unlimited().with_time_limit(Duration::ZERO);
        let seed = vec![0, 1, 2, 3, 4, 5];
        let outcome = genetic_search(&eval, &[seed], &small_config(), 1, &budget);
        assert!(outcome.timed_out);
        assert_eq!(outcome.generations, 0);
        assert!(outcome.best.is_some());
    }

    #[test]
    fn test_genetic_stops_when_cancelled() {
        let eval = evaluator();
        let token = CancelToken::new();
        token.cancel();
        let budget = Budget::unlimited().with_cancel(token);
        let seed = vec![0, 1, 2, 3, 4, 5];
        let outcome = genetic_search(&eval, &[seed.clone()], &small_config(), 1, &budget);
        assert!(outcome.cancelled);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.best.map(|(order, _)| order), Some(seed));
    }

    #[test]
    fn test_genetic_improves_shuffled_seed() {
        let eval = evaluator();
        // detour: pickup 1 sits far east of its delivery
        let seed = vec![4, 5, 2, 3, 0, 1];
        let seed_obj = eval.objective(&seed).expect("feasible");
        let config = GeneticConfig {
            population_size: 20,
            max_generations: 60,
            ..GeneticConfig::default()
        };
        let outcome = genetic_search(&eval, &[seed], &config, 5, &Budget::unlimited());
        let (_, obj) = outcome.best.expect("feasible best");
        assert!(obj <= seed_obj);
    }
}
