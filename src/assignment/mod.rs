//! Shipment-to-driver assignment.
//!
//! - [`AssignmentEngine`] — cheapest-insertion assignment, manual overrides,
//!   workload reporting and rebalancing, scan events
//! - [`leader_clusters`] — destination clustering used by bulk assignment

mod cluster;
mod engine;
mod ledger;

pub use cluster::leader_clusters;
pub use engine::{
    AssignmentEngine, AssignmentResult, DriverWorkload, ScanEvent, WorkloadMove,
    WorkloadRebalance,
};
