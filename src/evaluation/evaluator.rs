//! Sequence evaluator that computes timing, load, cost and feasibility.
//!
//! A sequence is a permutation of indices into the evaluator's stop list.
//! Precedence and prefix capacity are hard constraints: a sequence breaking
//! either has no objective. Time windows and working time are soft: they
//! add lateness penalty and mark the built route infeasible.

use crate::distance::TravelModel;
use crate::models::{
    Demand, EdgeDelay, PlannedStop, Route, RouteWarning, Stop, VehicleConstraints,
};

/// Added to infeasible sequences' raw objective.
const INFEASIBLE_BASE: f64 = 1.0e9;
/// Per unit of prefix overload.
const OVERLOAD_WEIGHT: f64 = 1.0e6;

/// Per-stop timing produced by [`RouteEvaluator::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub eta: f64,
    pub departure: f64,
    pub load_after: Demand,
    pub lateness: f64,
}

/// Full evaluation of one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub distance: f64,
    pub time: f64,
    pub cost: f64,
    pub lateness: f64,
    pub objective: f64,
    /// Precedence and prefix capacity both hold.
    pub hard_feasible: bool,
    pub timeline: Vec<Timing>,
}

/// Evaluates stop sequences for one vehicle.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
/// use u_dispatch::evaluation::RouteEvaluator;
///
/// let here = GeoPoint::new(0.0, 0.0);
/// let stops = vec![
///     Stop::pickup(1, GeoPoint::new(0.0, 0.1), Demand::new(5.0, 0.0)),
///     Stop::delivery(1, GeoPoint::new(0.0, 0.2), Demand::new(5.0, 0.0)),
/// ];
/// let constraints = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 1.0, here, 480.0));
/// let eval = RouteEvaluator::new(stops, constraints, &[], 10.0);
///
/// assert!(eval.objective(&[0, 1]).is_some());
/// assert!(eval.objective(&[1, 0]).is_none()); // delivery before pickup
/// ```
#[derive(Debug, Clone)]
pub struct RouteEvaluator {
    stops: Vec<Stop>,
    constraints: VehicleConstraints,
    travel: TravelModel,
    delays: Vec<EdgeDelay>,
    partner: Vec<Option<usize>>,
    initial_load: Demand,
    lateness_penalty: f64,
}

impl RouteEvaluator {
    /// `delays` are applied to travel times and recorded on built routes.
    pub fn new(
        stops: Vec<Stop>,
        constraints: VehicleConstraints,
        delays: &[EdgeDelay],
        lateness_penalty: f64,
    ) -> Self {
        let travel = TravelModel::build(&stops, &constraints, delays);
        let partner: Vec<Option<usize>> = stops
            .iter()
            .map(|s| stops.iter().position(|o| o.id() == s.partner_id()))
            .collect();
        let initial_load = stops
            .iter()
            .zip(&partner)
            .filter(|(s, p)| !s.is_pickup() && p.is_none())
            .fold(Demand::zero(), |acc, (s, _)| acc + s.demand());
        let delays = delays
            .iter()
            .copied()
            .filter(|d| {
                let known = |id| stops.iter().any(|s| s.id() == id);
                known(d.to) && d.from.is_none_or(known)
            })
            .collect();
        Self {
            stops,
            constraints,
            travel,
            delays,
            partner,
            initial_load,
            lateness_penalty,
        }
    }

    pub fn num_stops(&self) -> usize {
        self.stops.len()
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn stop(&self, index: usize) -> &Stop {
        &self.stops[index]
    }

    pub fn constraints(&self) -> &VehicleConstraints {
        &self.constraints
    }

    pub fn travel(&self) -> &TravelModel {
        &self.travel
    }

    pub fn capacity(&self) -> Demand {
        self.constraints.vehicle.capacity()
    }

    /// Index of the matching stop of the same shipment, if present.
    pub fn partner(&self, index: usize) -> Option<usize> {
        self.partner[index]
    }

    /// Deliveries whose pickup is not in the set start on board.
    pub fn initial_load(&self) -> Demand {
        self.initial_load
    }

    /// A pickup whose delivery is not in the set stays on board to the end.
    pub fn is_terminal_pickup(&self, index: usize) -> bool {
        self.stops[index].is_pickup() && self.partner[index].is_none()
    }

    /// Precedence and prefix capacity; also requires a full permutation.
    pub fn is_feasible(&self, sequence: &[usize]) -> bool {
        self.hard_check(sequence).is_some()
    }

    /// Cost plus lateness penalty, or `None` when a hard constraint breaks.
    pub fn objective(&self, sequence: &[usize]) -> Option<f64> {
        self.score(sequence).map(|(objective, _)| objective)
    }

    /// `(objective, elapsed minutes)`, or `None` when a hard constraint breaks.
    pub fn score(&self, sequence: &[usize]) -> Option<(f64, f64)> {
        self.hard_check(sequence)?;
        let (distance, time, lateness) = self.walk(sequence, |_, _| {});
        Some((
            self.cost_of(distance, time) + self.lateness_penalty * lateness,
            time,
        ))
    }

    /// Total capacity excess summed over prefixes, for penalized search.
    pub fn overload(&self, sequence: &[usize]) -> f64 {
        let capacity = self.capacity();
        let excess = |load: &Demand| {
            (load.weight - capacity.weight).max(0.0) + (load.volume - capacity.volume).max(0.0)
        };
        let mut load = self.initial_load;
        let mut total = excess(&load);
        for &i in sequence {
            self.apply_demand(&mut load, i);
            total += excess(&load);
        }
        total
    }

    /// Objective when feasible; otherwise a penalty that grows with total
    /// prefix overload and always exceeds any feasible objective.
    pub fn penalized_objective(&self, sequence: &[usize]) -> f64 {
        if let Some(obj) = self.objective(sequence) {
            return obj;
        }
        let raw = self.evaluate(sequence).objective;
        INFEASIBLE_BASE + raw + OVERLOAD_WEIGHT * self.overload(sequence)
    }

    /// Swaps every delivery that precedes its own pickup with that pickup.
    ///
    /// Only the two entries of each broken pair move, so fixing one pair
    /// never breaks another.
    pub fn repair_precedence(&self, order: &mut [usize]) {
        let mut position = vec![0usize; order.len()];
        for (pos, &i) in order.iter().enumerate() {
            position[i] = pos;
        }
        for i in 0..order.len() {
            if self.stops[i].is_pickup() {
                continue;
            }
            if let Some(p) = self.partner[i] {
                let (di, pi) = (position[i], position[p]);
                if di < pi {
                    order.swap(di, pi);
                    position[i] = pi;
                    position[p] = di;
                }
            }
        }
    }

    /// Full timeline, cost and feasibility of a sequence.
    pub fn evaluate(&self, sequence: &[usize]) -> Evaluation {
        let hard_feasible = self.hard_check(sequence).is_some();
        let mut timeline = Vec::with_capacity(sequence.len());
        let mut load = self.initial_load;
        let (distance, time, lateness) = self.walk(sequence, |i, (eta, departure, late)| {
            self.apply_demand(&mut load, i);
            timeline.push(Timing {
                eta,
                departure,
                load_after: load,
                lateness: late,
            });
        });
        let cost = self.cost_of(distance, time);
        Evaluation {
            distance,
            time,
            cost,
            lateness,
            objective: cost + self.lateness_penalty * lateness,
            hard_feasible,
            timeline,
        }
    }

    /// Materializes a sequence as a [`Route`].
    pub fn build_route(&self, sequence: &[usize], version: u64) -> Route {
        let eval = self.evaluate(sequence);
        let mut warnings = Vec::new();
        let stops: Vec<PlannedStop> = sequence
            .iter()
            .zip(eval.timeline)
            .map(|(&i, t)| {
                if t.lateness > 0.0 {
                    warnings.push(RouteWarning::TimeWindowViolated {
                        stop_id: self.stops[i].id(),
                        lateness: t.lateness,
                    });
                }
                PlannedStop {
                    stop: self.stops[i].clone(),
                    eta: t.eta,
                    departure: t.departure,
                    load_after: t.load_after,
                    lateness: t.lateness,
                }
            })
            .collect();
        let over_time = eval.time > self.constraints.available_minutes + 1e-9;
        if over_time {
            warnings.push(RouteWarning::WorkingTimeExceeded {
                planned: eval.time,
                available: self.constraints.available_minutes,
            });
        }
        Route {
            vehicle_id: self.constraints.vehicle.id(),
            driver_id: self.constraints.driver_id,
            stops,
            start_location: self.constraints.start_location,
            end_location: self.constraints.end_location(),
            start_minute: self.constraints.start_minute,
            total_distance: eval.distance,
            total_time: eval.time,
            total_cost: eval.cost,
            objective: eval.objective,
            feasible: eval.hard_feasible && eval.lateness <= 0.0 && !over_time,
            version,
            warnings,
            edge_delays: self.delays.clone(),
        }
    }

    /// Sequence of this evaluator's indices matching stop ids in order.
    pub fn sequence_of(&self, ids: &[u64]) -> Option<Vec<usize>> {
        ids.iter()
            .map(|id| self.stops.iter().position(|s| s.id() == *id))
            .collect()
    }

    fn cost_of(&self, distance: f64, time: f64) -> f64 {
        let v = &self.constraints.vehicle;
        distance * v.cost_per_km() + time * v.cost_per_minute()
    }

    fn apply_demand(&self, load: &mut Demand, index: usize) {
        let stop = &self.stops[index];
        if stop.is_pickup() {
            *load += stop.demand();
        } else {
            *load -= stop.demand();
        }
    }

    fn hard_check(&self, sequence: &[usize]) -> Option<()> {
        let n = self.stops.len();
        if sequence.len() != n {
            return None;
        }
        let capacity = self.capacity();
        let mut visited = vec![false; n];
        let mut load = self.initial_load;
        if load.exceeds(&capacity) {
            return None;
        }
        for &i in sequence {
            if i >= n || visited[i] {
                return None;
            }
            if !self.stops[i].is_pickup() {
                if let Some(p) = self.partner[i] {
                    if !visited[p] {
                        return None;
                    }
                }
            }
            visited[i] = true;
            self.apply_demand(&mut load, i);
            if load.exceeds(&capacity) {
                return None;
            }
        }
        Some(())
    }

    /// Walks the timeline, calling `visit(index, (eta, departure, lateness))`
    /// per stop. Returns `(distance, elapsed minutes, total lateness)`.
    fn walk<F>(&self, sequence: &[usize], mut visit: F) -> (f64, f64, f64)
    where
        F: FnMut(usize, (f64, f64, f64)),
    {
        let start = self.constraints.start_minute;
        let mut clock = start;
        let mut distance = 0.0;
        let mut lateness = 0.0;
        let mut prev = self.travel.start_node();

        for &i in sequence {
            let node = self.travel.node(i);
            distance += self.travel.distance(prev, node);
            let arrival = clock + self.travel.travel_time(prev, node);
            let stop = &self.stops[i];
            let (service_start, late) = match stop.time_window() {
                Some(tw) => (arrival + tw.waiting_time(arrival), tw.lateness(arrival)),
                None => (arrival, 0.0),
            };
            let departure = service_start + stop.service_minutes();
            lateness += late;
            visit(i, (arrival, departure, late));
            clock = departure;
            prev = node;
        }

        let end = self.travel.end_node();
        distance += self.travel.distance(prev, end);
        clock += self.travel.travel_time(prev, end);
        (distance, clock - start, lateness)
    }
}
