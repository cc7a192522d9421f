//! Domain model types for dispatch and routing.
//!
//! Stops with pickup/delivery semantics and two-dimensional demand, vehicles
//! and the constraints a request plans under, drivers and shipments as read
//! from the collaborator stores, planned routes, the hub network, and
//! assignment records.

mod assignment;
mod driver;
mod hub;
mod route;
mod shipment;
mod stop;
mod vehicle;

pub use assignment::{Assignment, AssignmentStatus};
pub use driver::Driver;
pub use hub::{HubNode, Lane, ServiceLevel, TransportMode};
pub use route::{EdgeDelay, PlannedStop, Route, RouteWarning};
pub use shipment::Shipment;
pub use stop::{stop_id_for, Demand, MAX_SHIPMENT_ID, GeoPoint, Stop, StopKind, TimeWindow};
pub use vehicle::{Vehicle, VehicleConstraints};

pub type StopId = u64;
pub type ShipmentId = u64;
pub type DriverId = u64;
pub type VehicleId = u64;
pub type HubId = u64;
pub type BranchId = u64;
