//! # u-dispatch
//!
//! Dispatch and route optimization engine: pickup/delivery route
//! sequencing for single vehicles, shipment-to-driver assignment, linehaul
//! paths across a capacity-limited hub network, and incremental rerouting
//! of live routes.
//!
//! ## Modules
//!
//! - [`models`] — Domain model types (Stop, Vehicle, Driver, Shipment, Route, HubNode, Lane)
//! - [`distance`] — Distance matrix and travel model with traffic overlay
//! - [`evaluation`] — Precedence, prefix capacity, timing and cost of stop sequences
//! - [`constructive`] — Nearest neighbor construction and cheapest pair insertion
//! - [`local_search`] — Precedence-safe 2-opt and 3-opt
//! - [`ga`] — Genetic algorithm over stop permutations
//! - [`annealing`] — Simulated annealing
//! - [`optimizer`] — Strategy selection, budgets and [`RouteOptimizer`](optimizer::RouteOptimizer)
//! - [`hub`] — Hub graph paths and committed hub capacity
//! - [`assignment`] — [`AssignmentEngine`](assignment::AssignmentEngine)
//! - [`reroute`] — [`DynamicRerouter`](reroute::DynamicRerouter) and the route registry
//! - [`ports`] — Store traits the engine reads through
//! - [`config`], [`error`] — Engine configuration and error taxonomy
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod annealing;
pub mod assignment;
pub mod config;
pub mod constructive;
pub mod distance;
pub mod error;
pub mod evaluation;
pub mod ga;
pub mod hub;
pub mod local_search;
pub mod models;
pub mod optimizer;
pub mod ports;
pub mod reroute;
