//! Input checks that run before any optimization work.

use std::collections::HashSet;

use crate::error::{DispatchError, DispatchResult};
use crate::models::{Demand, EdgeDelay, Stop, VehicleConstraints};

/// Rejects malformed input, then input no ordering can make capacity-feasible.
///
/// A feasible order exists exactly when every stop fits on its own, the
/// preloaded deliveries fit at departure, and the terminal pickups fit at
/// the end: deliver the preloaded goods first, then run each pair
/// back-to-back, then collect the terminal pickups.
pub fn validate_request(stops: &[Stop], constraints: &VehicleConstraints) -> DispatchResult<()> {
    validate_constraints(constraints)?;

    let mut seen = HashSet::with_capacity(stops.len());
    for stop in stops {
        stop.validate()?;
        if !seen.insert(stop.id()) {
            return Err(DispatchError::malformed(format!(
                "stop {} appears more than once",
                stop.id()
            )));
        }
    }

    let capacity = constraints.vehicle.capacity();
    let mut preloaded = Demand::zero();
    let mut terminal = Demand::zero();
    let mut preloaded_first = None;
    let mut terminal_first = None;

    for stop in stops {
        if stop.demand().exceeds(&capacity) {
            return Err(DispatchError::infeasible(
                stop.id(),
                format!(
                    "demand ({}, {}) exceeds vehicle capacity ({}, {})",
                    stop.demand().weight,
                    stop.demand().volume,
                    capacity.weight,
                    capacity.volume
                ),
            ));
        }
        match stops.iter().find(|o| o.id() == stop.partner_id()) {
            Some(partner) => {
                if partner.demand() != stop.demand() {
                    return Err(DispatchError::malformed(format!(
                        "pickup and delivery of shipment {} carry different demand",
                        stop.shipment_id()
                    )));
                }
            }
            None if stop.is_pickup() => {
                terminal += stop.demand();
                terminal_first.get_or_insert(stop.id());
            }
            None => {
                preloaded += stop.demand();
                preloaded_first.get_or_insert(stop.id());
            }
        }
    }

    if let Some(id) = preloaded_first.filter(|_| preloaded.exceeds(&capacity)) {
        return Err(DispatchError::infeasible(
            id,
            "preloaded deliveries exceed vehicle capacity at departure",
        ));
    }
    if let Some(id) = terminal_first.filter(|_| terminal.exceeds(&capacity)) {
        return Err(DispatchError::infeasible(
            id,
            "pickups without a delivery exceed vehicle capacity at the route end",
        ));
    }
    Ok(())
}

/// Rejects any delay with negative or non-finite extra minutes.
pub fn validate_delays(delays: &[EdgeDelay]) -> DispatchResult<()> {
    delays.iter().try_for_each(EdgeDelay::validate)
}

fn validate_constraints(constraints: &VehicleConstraints) -> DispatchResult<()> {
    constraints
        .start_location
        .validate()
        .map_err(|e| DispatchError::malformed(format!("route start: {e}")))?;
    constraints
        .vehicle
        .home_location()
        .validate()
        .map_err(|e| DispatchError::malformed(format!("vehicle home: {e}")))?;
    let capacity = constraints.vehicle.capacity();
    if !capacity.weight.is_finite()
        || !capacity.volume.is_finite()
        || capacity.weight < 0.0
        || capacity.volume < 0.0
    {
        return Err(DispatchError::malformed(format!(
            "vehicle {} has invalid capacity",
            constraints.vehicle.id()
        )));
    }
    let speed = constraints.vehicle.speed_kmh();
    if !speed.is_finite() || speed <= 0.0 {
        return Err(DispatchError::malformed(format!(
            "vehicle {} has non-positive speed",
            constraints.vehicle.id()
        )));
    }
    if !constraints.start_minute.is_finite() || !constraints.available_minutes.is_finite() {
        return Err(DispatchError::malformed("route clock is not finite"));
    }
    Ok(())
}
