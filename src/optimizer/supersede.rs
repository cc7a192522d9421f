//! Last-request-wins bookkeeping per vehicle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::models::VehicleId;

use super::CancelToken;

/// Tracks the in-flight optimization for each vehicle. Starting a new one
/// cancels the previous request's token.
#[derive(Debug, Default)]
pub(crate) struct SupersedeRegistry {
    in_flight: Mutex<HashMap<VehicleId, (u64, CancelToken)>>,
    next_ticket: AtomicU64,
}

impl SupersedeRegistry {
    pub(crate) fn begin(&self, vehicle_id: VehicleId) -> RequestGuard<'_> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let token = CancelToken::new();
        let previous = self
            .in_flight
            .lock()
            .insert(vehicle_id, (ticket, token.clone()));
        if let Some((old_ticket, old)) = previous {
            debug!(vehicle_id, old_ticket, ticket, "superseding in-flight request");
            old.cancel();
        }
        RequestGuard {
            registry: self,
            vehicle_id,
            ticket,
            token,
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// Holds a vehicle's slot until dropped.
pub(crate) struct RequestGuard<'a> {
    registry: &'a SupersedeRegistry,
    vehicle_id: VehicleId,
    ticket: u64,
    token: CancelToken,
}

impl RequestGuard<'_> {
    pub(crate) fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        let mut map = self.registry.in_flight.lock();
        if map.get(&self.vehicle_id).is_some_and(|(t, _)| *t == self.ticket) {
            map.remove(&self.vehicle_id);
        }
    }
}
