//! Local search operators for improving a single vehicle's stop sequence.
//!
//! - [`two_opt_improve`] — Segment reversal
//! - [`three_opt_improve`] — Three-cut reconnection
//!
//! Both operate on an evaluator's index sequences, accept only moves that
//! keep precedence and prefix capacity, and never return a sequence worse
//! than their input.

mod three_opt;
mod two_opt;

pub use three_opt::three_opt_improve;
pub use two_opt::two_opt_improve;

/// Outcome of a local search descent.
#[derive(Debug, Clone, PartialEq)]
pub struct Improvement {
    pub sequence: Vec<usize>,
    pub objective: f64,
    /// `false` when the budget ran out before a local optimum was reached.
    pub converged: bool,
}

impl Improvement {
    pub(crate) fn converged(sequence: Vec<usize>, objective: f64) -> Self {
        Self {
            sequence,
            objective,
            converged: true,
        }
    }

    pub(crate) fn interrupted(sequence: Vec<usize>, objective: f64) -> Self {
        Self {
            sequence,
            objective,
            converged: false,
        }
    }
}
