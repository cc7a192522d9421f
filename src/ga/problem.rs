//! GA problem definition for pickup/delivery sequencing.
//!
//! Implements the [`GaProblem`](u_metaheur::ga::GaProblem) trait over
//! [`StopSequence`] chromosomes.
//!
//! # Operators
//!
//! - **Crossover**: Order crossover (OX), then precedence repair
//! - **Mutation**: Swap or invert with equal probability, then precedence
//!   repair, then (at `local_search_rate`) one sampled 2-opt step
//! - **Evaluation**: [`RouteEvaluator::penalized_objective`]
//! - **Initialization**: seed orders first, then random permutations

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use u_metaheur::ga::operators::{invert_mutation, order_crossover, swap_mutation};
use u_metaheur::ga::GaProblem;

use crate::evaluation::RouteEvaluator;

use super::chromosome::StopSequence;

/// GA problem for a single vehicle's pickup/delivery sequence.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};
/// use u_dispatch::evaluation::RouteEvaluator;
/// use u_dispatch::ga::PickupDeliveryGaProblem;
/// use u_metaheur::ga::GaProblem;
///
/// let at = |lon: f64| GeoPoint::new(0.0, lon);
/// let w = Demand::new(1.0, 0.0);
/// let stops = vec![Stop::pickup(1, at(0.1), w), Stop::delivery(1, at(0.2), w)];
/// let c = VehicleConstraints::for_vehicle(Vehicle::new(1, 10.0, 1.0, at(0.0), 480.0));
/// let problem = PickupDeliveryGaProblem::new(RouteEvaluator::new(stops, c, &[], 10.0));
///
/// let mut rng = u_numflow::random::create_rng(7);
/// let ind = problem.create_individual(&mut rng);
/// assert_eq!(ind.order(), &[0, 1]); // repaired into pickup-first order
/// ```
pub struct PickupDeliveryGaProblem {
    eval: RouteEvaluator,
    local_search_rate: f64,
    seeds: Vec<Vec<usize>>,
    next_seed: AtomicUsize,
}

impl PickupDeliveryGaProblem {
    pub fn new(eval: RouteEvaluator) -> Self {
        Self {
            eval,
            local_search_rate: 0.0,
            seeds: Vec::new(),
            next_seed: AtomicUsize::new(0),
        }
    }

    /// Orders handed out, repaired, by the first `create_individual` calls.
    /// Orders of the wrong length are dropped.
    pub fn with_seeds(mut self, seeds: Vec<Vec<usize>>) -> Self {
        let n = self.eval.num_stops();
        self.seeds = seeds
            .into_iter()
            .filter(|s| s.len() == n)
            .map(|mut s| {
                self.eval.repair_precedence(&mut s);
                s
            })
            .collect();
        self.next_seed.store(0, Ordering::Relaxed);
        self
    }

    /// Seed orders after repair.
    pub fn seeds(&self) -> &[Vec<usize>] {
        &self.seeds
    }

    /// Probability that a mutated child also gets a sampled 2-opt step.
    pub fn with_local_search_rate(mut self, rate: f64) -> Self {
        self.local_search_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn evaluator(&self) -> &RouteEvaluator {
        &self.eval
    }

    /// Tries up to `n` random reversals and keeps the first that improves.
    fn two_opt_step<R: Rng>(&self, order: &mut [usize], rng: &mut R) {
        let n = order.len();
        let Some(current) = self.eval.objective(order) else {
            return;
        };
        let mut candidate = order.to_vec();
        for _ in 0..n {
            let i = rng.random_range(0..n - 1);
            let j = rng.random_range(i + 1..n);
            candidate.copy_from_slice(order);
            candidate[i..=j].reverse();
            if self
                .eval
                .objective(&candidate)
                .is_some_and(|obj| obj < current - 1e-9)
            {
                order.copy_from_slice(&candidate);
                return;
            }
        }
    }
}

impl GaProblem for PickupDeliveryGaProblem {
    type Individual = StopSequence;

    fn create_individual<R: Rng>(&self, rng: &mut R) -> StopSequence {
        let k = self.next_seed.fetch_add(1, Ordering::Relaxed);
        if let Some(seed) = self.seeds.get(k) {
            return StopSequence::new(seed.clone());
        }
        let n = self.eval.num_stops();
        let mut perm: Vec<usize> = (0..n).collect();

        // Fisher-Yates shuffle
        for i in (1..perm.len()).rev() {
            let j = rng.random_range(0..=i);
            perm.swap(i, j);
        }

        self.eval.repair_precedence(&mut perm);
        StopSequence::new(perm)
    }

    fn evaluate(&self, individual: &StopSequence) -> f64 {
        self.eval.penalized_objective(individual.order())
    }

    fn crossover<R: Rng>(
        &self,
        parent1: &StopSequence,
        parent2: &StopSequence,
        rng: &mut R,
    ) -> Vec<StopSequence> {
        if parent1.len() < 2 {
            return vec![parent1.clone(), parent2.clone()];
        }
        let p1 = parent1.order().to_vec();
        let p2 = parent2.order().to_vec();
        let (mut c1, mut c2) = order_crossover(&p1, &p2, rng);
        self.eval.repair_precedence(&mut c1);
        self.eval.repair_precedence(&mut c2);
        vec![StopSequence::new(c1), StopSequence::new(c2)]
    }

    fn mutate<R: Rng>(&self, individual: &mut StopSequence, rng: &mut R) {
        if individual.len() < 2 {
            return;
        }
        if rng.random_range(0..2u64) == 0 {
            swap_mutation(individual.order_mut(), rng);
        } else {
            invert_mutation(individual.order_mut(), rng);
        }
        self.eval.repair_precedence(individual.order_mut());
        if rng.random::<f64>() < self.local_search_rate {
            self.two_opt_step(individual.order_mut(), rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demand, GeoPoint, Stop, Vehicle, VehicleConstraints};

    fn setup(capacity: f64) -> PickupDeliveryGaProblem {
        let at = |lon_tenths: f64| GeoPoint::new(0.0, lon_tenths / 10.0);
        let w = |x: f64| Demand::new(x, 0.0);
        let stops = vec![
            Stop::pickup(1, at(1.0), w(6.0)),
            Stop::delivery(1, at(2.0), w(6.0)),
            Stop::pickup(2, at(3.0), w(6.0)),
            Stop::delivery(2, at(4.0), w(6.0)),
            Stop::delivery(3, at(5.0), w(2.0)),
        ];
        let c = VehicleConstraints::for_vehicle(Vehicle::new(1, capacity, 100.0, at(0.0), 600.0));
        PickupDeliveryGaProblem::new(RouteEvaluator::new(stops, c, &[], 10.0))
            .with_local_search_rate(1.0)
    }

    fn is_permutation(order: &[usize], n: usize) -> bool {
        let mut sorted = order.to_vec();
        sorted.sort();
        sorted == (0..n).collect::<Vec<_>>()
    }

    fn precedence_holds(problem: &PickupDeliveryGaProblem, order: &[usize]) -> bool {
        let pos = |i: usize| order.iter().position(|&x| x == i);
        (0..order.len()).all(|i| {
            let eval = problem.evaluator();
            eval.stop(i).is_pickup()
                || eval.partner(i).is_none_or(|p| pos(p) < pos(i))
        })
    }

    #[test]
    fn test_repair_fixes_every_pair() {
        let problem = setup(20.0);
        let mut order = vec![3, 1, 4, 2, 0];
        problem.evaluator().repair_precedence(&mut order);
        assert!(is_permutation(&order, 5));
        assert!(precedence_holds(&problem, &order));
        assert_eq!(order, vec![2, 0, 4, 3, 1]);
    }

    #[test]
    fn test_create_individual_is_repaired() {
        let problem = setup(20.0);
        let mut rng = u_numflow::random::create_rng(42);
        for _ in 0..20 {
            let ind = problem.create_individual(&mut rng);
            assert!(is_permutation(ind.order(), 5));
            assert!(precedence_holds(&problem, ind.order()));
        }
    }

    #[test]
    fn test_seeds_come_first() {
        let problem = setup(20.0).with_seeds(vec![vec![1, 0, 3, 2, 4], vec![0, 1]]);
        assert_eq!(problem.seeds(), &[vec![0, 1, 2, 3, 4]]);
        let mut rng = u_numflow::random::create_rng(3);
        assert_eq!(problem.create_individual(&mut rng).order(), &[0, 1, 2, 3, 4]);
        let next = problem.create_individual(&mut rng);
        assert!(is_permutation(next.order(), 5));
        assert!(precedence_holds(&problem, next.order()));
    }

    #[test]
    fn test_evaluate_penalizes_overload() {
        let problem = setup(10.0);
        // both pickups on board together: 2 + 6 + 6 > 10
        let overloaded = StopSequence::new(vec![0, 2, 1, 3, 4]);
        let feasible = StopSequence::new(vec![4, 0, 1, 2, 3]);
        let bad = problem.evaluate(&overloaded);
        let good = problem.evaluate(&feasible);
        assert_eq!(Some(good), problem.evaluator().objective(feasible.order()));
        assert!(bad > 1.0e9);
    }

    #[test]
    fn test_crossover_and_mutation_preserve_genes() {
        let problem = setup(20.0);
        let mut rng = u_numflow::random::create_rng(7);
        let p1 = StopSequence::new(vec![0, 1, 2, 3, 4]);
        let p2 = StopSequence::new(vec![4, 2, 3, 0, 1]);
        for child in problem.crossover(&p1, &p2, &mut rng) {
            assert!(is_permutation(child.order(), 5));
            assert!(precedence_holds(&problem, child.order()));
        }
        let mut ind = p2.clone();
        for _ in 0..10 {
            problem.mutate(&mut ind, &mut rng);
            assert!(is_permutation(ind.order(), 5));
            assert!(precedence_holds(&problem, ind.order()));
        }
    }
}
