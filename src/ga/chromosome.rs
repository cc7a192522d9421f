//! Permutation chromosome over one vehicle's stops.
//!
//! Genes are indices into a [`RouteEvaluator`](crate::evaluation::RouteEvaluator)'s
//! stop list, so a chromosome decodes directly into a visiting order.

use u_metaheur::ga::Individual;

/// A visiting order of stop indices. Lower fitness is better.
///
/// # Examples
///
/// ```
/// use u_dispatch::ga::StopSequence;
/// use u_metaheur::ga::Individual;
///
/// let seq = StopSequence::new(vec![2, 0, 1]);
/// assert_eq!(seq.order(), &[2, 0, 1]);
/// assert_eq!(seq.fitness(), f64::INFINITY);
/// ```
#[derive(Debug, Clone)]
pub struct StopSequence {
    order: Vec<usize>,
    fitness: f64,
}

impl StopSequence {
    pub fn new(order: Vec<usize>) -> Self {
        Self {
            order,
            fitness: f64::INFINITY,
        }
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn order_mut(&mut self) -> &mut Vec<usize> {
        &mut self.order
    }

    pub fn into_order(self) -> Vec<usize> {
        self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Individual for StopSequence {
    type Fitness = f64;

    fn fitness(&self) -> f64 {
        self.fitness
    }

    fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_new() {
        let seq = StopSequence::new(vec![1, 0, 2]);
        assert_eq!(seq.len(), 3);
        assert!(!seq.is_empty());
        assert_eq!(seq.fitness(), f64::INFINITY);
    }

    #[test]
    fn test_sequence_set_fitness_survives_clone() {
        let mut seq = StopSequence::new(vec![0, 1]);
        seq.set_fitness(12.5);
        let cloned = seq.clone();
        assert_eq!(cloned.fitness(), 12.5);
        assert_eq!(cloned.into_order(), vec![0, 1]);
    }

    #[test]
    fn test_sequence_mutable_order() {
        let mut seq = StopSequence::new(vec![0, 1, 2]);
        seq.order_mut().swap(0, 2);
        assert_eq!(seq.order(), &[2, 1, 0]);
    }
}
