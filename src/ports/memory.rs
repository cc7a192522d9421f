//! In-memory implementation of every store port.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{DriverStore, HubStore, ShipmentStore};
use crate::error::DispatchResult;
use crate::models::{
    BranchId, Driver, DriverId, HubId, HubNode, Lane, Shipment, ShipmentId, Vehicle, VehicleId,
};

/// Thread-safe store backed by ordered maps, for tests and embedding.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Driver, GeoPoint, Vehicle};
/// use u_dispatch::ports::{DriverStore, InMemoryStore};
///
/// let here = GeoPoint::new(0.0, 0.0);
/// let store = InMemoryStore::new();
/// store.put_vehicle(Vehicle::new(10, 500.0, 5.0, here, 480.0));
/// store.put_driver(Driver::new(1, 7, here, 480.0).with_vehicle(10));
///
/// assert_eq!(store.drivers_in_branch(7).unwrap().len(), 1);
/// assert!(store.vehicle(10).unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    shipments: RwLock<BTreeMap<ShipmentId, Shipment>>,
    drivers: RwLock<BTreeMap<DriverId, Driver>>,
    vehicles: RwLock<BTreeMap<VehicleId, Vehicle>>,
    hubs: RwLock<BTreeMap<HubId, HubNode>>,
    lanes: RwLock<Vec<Lane>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_shipment(&self, shipment: Shipment) {
        self.shipments.write().insert(shipment.id, shipment);
    }

    pub fn put_driver(&self, driver: Driver) {
        self.drivers.write().insert(driver.id, driver);
    }

    pub fn put_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.write().insert(vehicle.id(), vehicle);
    }

    pub fn put_hub(&self, hub: HubNode) {
        self.hubs.write().insert(hub.id, hub);
    }

    pub fn put_lane(&self, lane: Lane) {
        self.lanes.write().push(lane);
    }
}

impl ShipmentStore for InMemoryStore {
    fn shipment(&self, id: ShipmentId) -> DispatchResult<Option<Shipment>> {
        Ok(self.shipments.read().get(&id).cloned())
    }
}

impl DriverStore for InMemoryStore {
    fn driver(&self, id: DriverId) -> DispatchResult<Option<Driver>> {
        Ok(self.drivers.read().get(&id).cloned())
    }

    fn drivers_in_branch(&self, branch_id: BranchId) -> DispatchResult<Vec<Driver>> {
        Ok(self
            .drivers
            .read()
            .values()
            .filter(|d| d.branch_id == branch_id)
            .cloned()
            .collect())
    }

    fn vehicle(&self, id: VehicleId) -> DispatchResult<Option<Vehicle>> {
        Ok(self.vehicles.read().get(&id).cloned())
    }
}

impl HubStore for InMemoryStore {
    fn hubs(&self) -> DispatchResult<Vec<HubNode>> {
        Ok(self.hubs.read().values().cloned().collect())
    }

    fn lanes(&self) -> DispatchResult<Vec<Lane>> {
        Ok(self.lanes.read().clone())
    }
}
