//! Single-vehicle route optimization.
//!
//! [`RouteOptimizer::optimize`] validates the request, builds a
//! nearest-neighbor construction and, depending on the [`Strategy`], improves
//! it with 2-opt, 3-opt, a genetic search polished by 2-opt, or simulated
//! annealing. The returned route's objective never exceeds the
//! construction's.

mod budget;
mod strategy;
mod supersede;

pub use budget::{Budget, CancelToken};
pub use strategy::{SolveStatus, Strategy};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::annealing::simulated_annealing;
use crate::config::OptimizerConfig;
use crate::constructive::{canonical_order, cheapest_insertion, nearest_neighbor};
use crate::error::{DispatchError, DispatchResult};
use crate::evaluation::{validate_delays, validate_request, RouteEvaluator};
use crate::ga::genetic_search;
use crate::local_search::{three_opt_improve, two_opt_improve};
use crate::models::{EdgeDelay, Route, RouteWarning, Stop, VehicleConstraints};

use supersede::SupersedeRegistry;

/// Per-request knobs for [`RouteOptimizer::optimize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizeOptions {
    pub strategy: Strategy,
    /// Apply `edge_delays` to travel times.
    pub use_traffic: bool,
    pub edge_delays: Vec<EdgeDelay>,
}

impl OptimizeOptions {
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_traffic(mut self, delays: Vec<EdgeDelay>) -> Self {
        self.use_traffic = true;
        self.edge_delays = delays;
        self
    }

    fn delays(&self) -> &[EdgeDelay] {
        if self.use_traffic {
            &self.edge_delays
        } else {
            &[]
        }
    }
}

/// Result of [`RouteOptimizer::optimize`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Optimized {
    pub route: Route,
    /// The concrete strategy that ran (`Auto` resolved).
    pub strategy: Strategy,
    pub status: SolveStatus,
}

/// Cheapest way to add stops to an existing sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertionQuote {
    /// Full stop order after insertion.
    pub stops: Vec<Stop>,
    /// Objective after insertion minus objective before.
    pub marginal_cost: f64,
    pub objective: f64,
    pub elapsed_minutes: f64,
}

/// Optimizes stop sequences for single vehicles.
///
/// Requests are independent and may run in parallel. A new request for a
/// vehicle cancels any request for the same vehicle still in flight; the
/// cancelled call returns [`DispatchError::Superseded`].
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
/// use u_dispatch::optimizer::{OptimizeOptions, RouteOptimizer, Strategy};
///
/// let at = |lon: f64| GeoPoint::new(0.0, lon);
/// let w = Demand::new(2.0, 0.1);
/// let stops = vec![
///     Stop::pickup(1, at(0.1), w),
///     Stop::delivery(1, at(0.3), w),
///     Stop::pickup(2, at(0.2), w),
///     Stop::delivery(2, at(0.4), w),
/// ];
/// let c = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 1.0, at(0.0), 480.0));
///
/// let optimizer = RouteOptimizer::default();
/// let out = optimizer
///     .optimize(&stops, &c, &OptimizeOptions::with_strategy(Strategy::TwoOpt))
///     .unwrap();
/// assert_eq!(out.route.len(), 4);
/// assert!(out.route.feasible());
/// ```
#[derive(Debug, Default)]
pub struct RouteOptimizer {
    config: OptimizerConfig,
    requests: SupersedeRegistry,
}

impl RouteOptimizer {
    /// Fails with [`DispatchError::Config`] when `config` does not validate.
    pub fn new(config: OptimizerConfig) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            requests: SupersedeRegistry::default(),
        })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Sequences `stops` for the vehicle in `constraints`.
    #[instrument(skip_all, fields(
        vehicle_id = constraints.vehicle.id(),
        stops = stops.len(),
        strategy = %options.strategy,
    ))]
    pub fn optimize(
        &self,
        stops: &[Stop],
        constraints: &VehicleConstraints,
        options: &OptimizeOptions,
    ) -> DispatchResult<Optimized> {
        validate_request(stops, constraints)?;
        validate_delays(options.delays())?;
        let vehicle_id = constraints.vehicle.id();
        let guard = self.requests.begin(vehicle_id);
        let budget = Budget::unlimited().with_cancel(guard.token().clone());

        let eval = self.evaluator(stops.to_vec(), constraints, options.delays());
        let construction = match nearest_neighbor(&eval) {
            Some(seq) => seq,
            None => {
                warn!("nearest neighbor dead-ended, using canonical order");
                canonical_order(&eval)
            }
        };
        let construction_obj = eval.objective(&construction).ok_or_else(|| {
            DispatchError::infeasible(
                stops.first().map_or(0, Stop::id),
                "no precedence- and capacity-feasible order was found",
            )
        })?;

        let strategy = options.strategy.resolve(stops.len(), &self.config);
        let (improved, status) = self.improve(&eval, &construction, strategy, &budget);

        if budget.is_cancelled() {
            warn!("request superseded, discarding result");
            return Err(DispatchError::Superseded { vehicle_id });
        }

        let (sequence, status) = settle(improved, status, construction, construction_obj);

        let mut route = eval.build_route(&sequence, 0);
        match status {
            SolveStatus::Timeout => {
                warn!(objective = route.objective(), "budget exhausted, returning best so far");
                route.push_warning(RouteWarning::BudgetExhausted {
                    strategy: strategy.to_string(),
                });
            }
            SolveStatus::FellBack => {
                warn!("improvement failed, returning construction");
                route.push_warning(RouteWarning::ImprovementFallback {
                    strategy: strategy.to_string(),
                    reason: "improvement produced no feasible sequence".to_string(),
                });
            }
            SolveStatus::Converged => {}
        }

        info!(
            %strategy,
            ?status,
            construction = construction_obj,
            objective = route.objective(),
            feasible = route.feasible(),
            "route optimized"
        );
        Ok(Optimized {
            route,
            strategy,
            status,
        })
    }

    /// Cheapest insertion of `new_stops` (a pickup/delivery pair, or a single
    /// stop) into `current`, kept in its given order.
    ///
    /// Only placements within the available working minutes are considered.
    /// Returns `Ok(None)` when no placement fits; input errors (over-capacity
    /// demand, duplicate ids) are returned as errors.
    pub fn insertion_cost(
        &self,
        current: &[Stop],
        new_stops: &[Stop],
        constraints: &VehicleConstraints,
        delays: &[EdgeDelay],
    ) -> DispatchResult<Option<InsertionQuote>> {
        self.quote(current, new_stops, constraints, delays, true)
    }

    /// As [`insertion_cost`](Self::insertion_cost) but treats working time as
    /// soft, so the cheapest placement wins even past the time limit.
    pub fn insertion_cost_soft(
        &self,
        current: &[Stop],
        new_stops: &[Stop],
        constraints: &VehicleConstraints,
        delays: &[EdgeDelay],
    ) -> DispatchResult<Option<InsertionQuote>> {
        self.quote(current, new_stops, constraints, delays, false)
    }

    /// Builds the route for a fixed stop order.
    ///
    /// Fails with `InfeasibleInput` if the order breaks precedence or
    /// capacity. Time-window and working-time violations only flag the route.
    pub fn evaluate(
        &self,
        stops_in_order: &[Stop],
        constraints: &VehicleConstraints,
        delays: &[EdgeDelay],
    ) -> DispatchResult<Route> {
        validate_request(stops_in_order, constraints)?;
        validate_delays(delays)?;
        let eval = self.evaluator(stops_in_order.to_vec(), constraints, delays);
        let sequence: Vec<usize> = (0..stops_in_order.len()).collect();
        if !eval.is_feasible(&sequence) {
            return Err(DispatchError::infeasible(
                stops_in_order.first().map_or(0, Stop::id),
                "order breaks pickup-before-delivery or vehicle capacity",
            ));
        }
        Ok(eval.build_route(&sequence, 0))
    }

    fn evaluator(
        &self,
        stops: Vec<Stop>,
        constraints: &VehicleConstraints,
        delays: &[EdgeDelay],
    ) -> RouteEvaluator {
        RouteEvaluator::new(
            stops,
            constraints.clone(),
            delays,
            self.config.lateness_penalty_per_minute,
        )
    }

    fn improve(
        &self,
        eval: &RouteEvaluator,
        construction: &[usize],
        strategy: Strategy,
        budget: &Budget,
    ) -> (Option<(Vec<usize>, f64)>, SolveStatus) {
        let status_of = |converged: bool| {
            if converged {
                SolveStatus::Converged
            } else {
                SolveStatus::Timeout
            }
        };
        match strategy {
            Strategy::NearestNeighbor | Strategy::Auto => {
                let obj = eval.objective(construction);
                (obj.map(|o| (construction.to_vec(), o)), SolveStatus::Converged)
            }
            Strategy::TwoOpt => match two_opt_improve(eval, construction, budget) {
                Some(imp) => (Some((imp.sequence, imp.objective)), status_of(imp.converged)),
                None => (None, SolveStatus::FellBack),
            },
            Strategy::ThreeOpt => match three_opt_improve(eval, construction, budget) {
                Some(imp) => (Some((imp.sequence, imp.objective)), status_of(imp.converged)),
                None => (None, SolveStatus::FellBack),
            },
            Strategy::Genetic2Opt => {
                let mut seeds = vec![construction.to_vec()];
                if let Some(polished) = two_opt_improve(eval, construction, budget) {
                    seeds.push(polished.sequence);
                }
                let cfg = &self.config.genetic;
                let outcome = genetic_search(eval, &seeds, cfg, self.config.seed, budget);
                let Some((best, obj)) = outcome.best else {
                    return (None, SolveStatus::FellBack);
                };
                debug!(generations = outcome.generations, obj, "polishing genetic best");
                match two_opt_improve(eval, &best, budget) {
                    Some(imp) => (
                        Some((imp.sequence, imp.objective)),
                        status_of(imp.converged && !outcome.timed_out),
                    ),
                    None => (Some((best, obj)), status_of(!outcome.timed_out)),
                }
            }
            Strategy::SimulatedAnnealing => {
                let cfg = &self.config.annealing;
                match simulated_annealing(eval, construction, cfg, self.config.seed, budget) {
                    Some(out) => (Some((out.sequence, out.objective)), status_of(!out.timed_out)),
                    None => (None, SolveStatus::FellBack),
                }
            }
        }
    }

    fn quote(
        &self,
        current: &[Stop],
        new_stops: &[Stop],
        constraints: &VehicleConstraints,
        delays: &[EdgeDelay],
        time_limited: bool,
    ) -> DispatchResult<Option<InsertionQuote>> {
        if new_stops.is_empty() || new_stops.len() > 2 {
            return Err(DispatchError::malformed(
                "insertion takes one stop or one pickup/delivery pair",
            ));
        }
        let mut all: Vec<Stop> = current.to_vec();
        all.extend_from_slice(new_stops);
        validate_request(&all, constraints)?;
        validate_delays(delays)?;

        let before = self.evaluator(current.to_vec(), constraints, delays);
        let base: Vec<usize> = (0..current.len()).collect();
        let before_obj = before.objective(&base).ok_or_else(|| {
            DispatchError::infeasible(
                current.first().map_or(0, Stop::id),
                "current order breaks pickup-before-delivery or vehicle capacity",
            )
        })?;

        let m = current.len();
        let (first, second) = match new_stops {
            [_] => (m, None),
            [a, _] if a.is_pickup() => (m, Some(m + 1)),
            _ => (m + 1, Some(m)),
        };
        let eval = self.evaluator(all, constraints, delays);
        let limit = time_limited.then_some(constraints.available_minutes);
        let Some(ins) = cheapest_insertion(&eval, &base, first, second, limit) else {
            debug!(vehicle_id = constraints.vehicle.id(), "no feasible insertion");
            return Ok(None);
        };
        Ok(Some(InsertionQuote {
            stops: ins.sequence.iter().map(|&i| eval.stop(i).clone()).collect(),
            marginal_cost: ins.objective - before_obj,
            objective: ins.objective,
            elapsed_minutes: ins.elapsed_minutes,
        }))
    }
}

/// Keeps the improved sequence unless it is worse than the construction.
///
/// A worse result still reports a spent budget as [`SolveStatus::Timeout`].
fn settle(
    improved: Option<(Vec<usize>, f64)>,
    status: SolveStatus,
    construction: Vec<usize>,
    construction_obj: f64,
) -> (Vec<usize>, SolveStatus) {
    match improved {
        Some((seq, obj)) if obj <= construction_obj + 1e-9 => (seq, status),
        Some(_) if status == SolveStatus::Timeout => (construction, SolveStatus::Timeout),
        Some(_) => (construction, SolveStatus::Converged),
        None => (construction, SolveStatus::FellBack),
    }
}
