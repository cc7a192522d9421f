//! Constructive heuristics for building and extending stop sequences.
//!
//! - [`nearest_neighbor`] — Precedence- and capacity-aware nearest neighbor, O(n²)
//! - [`canonical_order`] — Always-feasible fallback order, O(n)
//! - [`cheapest_insertion`] — Pickup/delivery pair insertion, O(n³)

mod insertion;
mod nearest_neighbor;

pub use insertion::{cheapest_insertion, Insertion};
pub use nearest_neighbor::{canonical_order, nearest_neighbor};
