//! Assignment records and their state machine.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{DispatchError, DispatchResult};
use crate::models::{Assignment, AssignmentStatus, DriverId, ShipmentId};

/// The one live assignment record per shipment.
///
/// A cancelled record may be replaced by a fresh assignment; any other
/// record blocks a second claim.
#[derive(Debug, Default)]
pub(crate) struct AssignmentLedger {
    records: RwLock<BTreeMap<ShipmentId, Assignment>>,
}

impl AssignmentLedger {
    pub(crate) fn get(&self, shipment_id: ShipmentId) -> Option<Assignment> {
        self.records.read().get(&shipment_id).cloned()
    }

    /// Fails with `AlreadyAssigned` if the shipment is held by a driver.
    pub(crate) fn ensure_claimable(&self, shipment_id: ShipmentId) -> DispatchResult<()> {
        match self.records.read().get(&shipment_id) {
            Some(a) if a.status.is_active() && a.status != AssignmentStatus::Unassigned => {
                Err(DispatchError::AlreadyAssigned {
                    shipment_id,
                    driver_id: a.driver_id,
                })
            }
            _ => Ok(()),
        }
    }

    /// Records `shipment_id` as assigned to `driver_id`.
    pub(crate) fn claim(
        &self,
        shipment_id: ShipmentId,
        driver_id: DriverId,
    ) -> DispatchResult<Assignment> {
        let mut records = self.records.write();
        if let Some(a) = records.get(&shipment_id) {
            if a.status.is_active() && a.status != AssignmentStatus::Unassigned {
                return Err(DispatchError::AlreadyAssigned {
                    shipment_id,
                    driver_id: a.driver_id,
                });
            }
        }
        let record = Assignment {
            shipment_id,
            driver_id: Some(driver_id),
            status: AssignmentStatus::Assigned,
            assigned_at: Some(Utc::now()),
        };
        records.insert(shipment_id, record.clone());
        Ok(record)
    }

    /// Moves an assigned shipment to another driver.
    pub(crate) fn reassign(
        &self,
        shipment_id: ShipmentId,
        from: DriverId,
        to: DriverId,
    ) -> DispatchResult<Assignment> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&shipment_id)
            .ok_or(DispatchError::UnknownShipment(shipment_id))?;
        if record.status != AssignmentStatus::Assigned || record.driver_id != Some(from) {
            return Err(DispatchError::InvalidTransition {
                shipment_id,
                from: record.status.to_string(),
                to: format!("assigned to driver {to}"),
            });
        }
        record.driver_id = Some(to);
        record.assigned_at = Some(Utc::now());
        Ok(record.clone())
    }

    /// Drops the record of a shipment `driver_id` holds in `assigned` state,
    /// so it reads as never placed. Returns whether a record was dropped.
    pub(crate) fn release(&self, shipment_id: ShipmentId, driver_id: DriverId) -> bool {
        let mut records = self.records.write();
        let held = records.get(&shipment_id).is_some_and(|a| {
            a.status == AssignmentStatus::Assigned && a.driver_id == Some(driver_id)
        });
        if held {
            records.remove(&shipment_id);
        }
        held
    }

    /// Applies one state machine step.
    pub(crate) fn transition(
        &self,
        shipment_id: ShipmentId,
        next: AssignmentStatus,
    ) -> DispatchResult<Assignment> {
        let mut records = self.records.write();
        let record = records
            .entry(shipment_id)
            .or_insert_with(|| Assignment::unassigned(shipment_id));
        if !record.status.can_transition_to(next) {
            return Err(DispatchError::InvalidTransition {
                shipment_id,
                from: record.status.to_string(),
                to: next.to_string(),
            });
        }
        record.status = next;
        Ok(record.clone())
    }
}
