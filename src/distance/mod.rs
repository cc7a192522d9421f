//! Distance and travel time matrices.
//!
//! Provides a dense matrix and the per-request travel model built on it.

mod matrix;
mod travel;

pub use matrix::DistanceMatrix;
pub use travel::TravelModel;
