//! Genetic algorithm components for pickup/delivery sequencing.
//!
//! - [`StopSequence`] — Permutation chromosome over one vehicle's stops
//! - [`PickupDeliveryGaProblem`] — [`GaProblem`](u_metaheur::ga::GaProblem) implementation
//! - [`genetic_search`] — Budgeted run through `GaRunner`

mod chromosome;
mod problem;
mod search;

pub use chromosome::StopSequence;
pub use problem::PickupDeliveryGaProblem;
pub use search::{genetic_search, GeneticOutcome};
