//! Linehaul routing across the hub network.
//!
//! [`HubRouteGraph`] answers static path queries. [`HubRoutingService`]
//! wraps it with per-hub committed capacity, alternative hub selection and
//! load rebalancing.

mod graph;
mod service;

pub use graph::{HubRouteGraph, OptimizeFor, PathQuery, PathResult};
pub use service::{AlternativeHub, HubCapacity, HubRoutingService, HubTransfer, RebalanceReport};
