//! Committed routes per vehicle, with optimistic versions.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};
use crate::models::{Route, VehicleId};

/// The current route of every vehicle.
///
/// This is the committed state other components read and write. Writers
/// swap against the version they read; [`publish`](Self::publish) is for
/// seeding.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Mutex<HashMap<VehicleId, Route>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, vehicle_id: VehicleId) -> Option<Route> {
        self.routes.lock().get(&vehicle_id).cloned()
    }

    pub fn version(&self, vehicle_id: VehicleId) -> Option<u64> {
        self.routes.lock().get(&vehicle_id).map(Route::version)
    }

    pub fn publish(&self, route: Route) {
        debug!(vehicle_id = route.vehicle_id(), version = route.version(), "route published");
        self.routes.lock().insert(route.vehicle_id(), route);
    }

    /// Stores `route` if the vehicle's committed version is still
    /// `expected`. A vehicle with no committed route accepts any swap.
    pub fn compare_and_swap(&self, expected: u64, route: Route) -> DispatchResult<()> {
        let vehicle_id = route.vehicle_id();
        let mut routes = self.routes.lock();
        if let Some(actual) = routes.get(&vehicle_id).map(Route::version) {
            if actual != expected {
                return Err(DispatchError::ConcurrentModification {
                    vehicle_id,
                    expected,
                    actual,
                });
            }
        }
        routes.insert(vehicle_id, route);
        Ok(())
    }

    /// Swaps several vehicles at once.
    ///
    /// Each entry names the version the writer last saw, `None` for a
    /// vehicle it saw without a route. If every vehicle still matches,
    /// `on_commit` runs under the registry lock and, when it succeeds, every
    /// route is stored. Otherwise nothing is stored.
    pub fn compare_and_swap_all<T>(
        &self,
        swaps: Vec<(Option<u64>, Route)>,
        on_commit: impl FnOnce() -> DispatchResult<T>,
    ) -> DispatchResult<T> {
        let mut routes = self.routes.lock();
        for (expected, route) in &swaps {
            let vehicle_id = route.vehicle_id();
            let actual = routes.get(&vehicle_id).map(Route::version);
            if actual != *expected {
                return Err(DispatchError::ConcurrentModification {
                    vehicle_id,
                    expected: expected.unwrap_or(0),
                    actual: actual.unwrap_or(0),
                });
            }
        }
        let value = on_commit()?;
        for (_, route) in swaps {
            debug!(vehicle_id = route.vehicle_id(), version = route.version(), "route swapped");
            routes.insert(route.vehicle_id(), route);
        }
        Ok(value)
    }

    /// Fails with `ConcurrentModification` unless the vehicle is unknown or
    /// at `expected`.
    pub fn check_version(&self, vehicle_id: VehicleId, expected: u64) -> DispatchResult<()> {
        match self.version(vehicle_id) {
            Some(actual) if actual != expected => Err(DispatchError::ConcurrentModification {
                vehicle_id,
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }

    pub fn remove(&self, vehicle_id: VehicleId) -> Option<Route> {
        self.routes.lock().remove(&vehicle_id)
    }
}
