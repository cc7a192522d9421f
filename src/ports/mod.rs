//! Read ports onto the stores the engine does not own.
//!
//! Shipments, drivers, vehicles and the hub network live in external
//! systems. The engine only reads them through these traits; every call can
//! fail with [`DispatchError::Store`](crate::error::DispatchError::Store).

mod memory;

pub use memory::InMemoryStore;

use crate::error::DispatchResult;
use crate::models::{BranchId, Driver, DriverId, HubNode, Lane, Shipment, ShipmentId, Vehicle, VehicleId};

pub trait ShipmentStore: Send + Sync {
    /// `Ok(None)` when the shipment does not exist.
    fn shipment(&self, id: ShipmentId) -> DispatchResult<Option<Shipment>>;
}

pub trait DriverStore: Send + Sync {
    fn driver(&self, id: DriverId) -> DispatchResult<Option<Driver>>;

    /// All drivers of a branch, including inactive ones, in ascending id order.
    fn drivers_in_branch(&self, branch_id: BranchId) -> DispatchResult<Vec<Driver>>;

    fn vehicle(&self, id: VehicleId) -> DispatchResult<Option<Vehicle>>;
}

pub trait HubStore: Send + Sync {
    fn hubs(&self) -> DispatchResult<Vec<HubNode>>;

    fn lanes(&self) -> DispatchResult<Vec<Lane>>;
}
