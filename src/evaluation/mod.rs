//! Route evaluation: feasibility, timing and cost of stop sequences.

mod evaluator;
mod validation;

pub use evaluator::{Evaluation, RouteEvaluator, Timing};
pub use validation::{validate_delays, validate_request};
