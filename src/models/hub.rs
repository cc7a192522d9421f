//! Hub network types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{GeoPoint, HubId};
use crate::error::DispatchError;

/// Delivery tier constraining which lanes are eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceLevel {
    Express,
    Standard,
    Economy,
}

impl fmt::Display for ServiceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServiceLevel::Express => "express",
            ServiceLevel::Standard => "standard",
            ServiceLevel::Economy => "economy",
        })
    }
}

impl FromStr for ServiceLevel {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "express" => Ok(ServiceLevel::Express),
            "standard" => Ok(ServiceLevel::Standard),
            "economy" => Ok(ServiceLevel::Economy),
            other => Err(DispatchError::malformed(format!(
                "unknown service level '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Road,
    Rail,
    Air,
    Sea,
}

/// A hub with a daily throughput budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubNode {
    pub id: HubId,
    pub location: GeoPoint,
    pub daily_capacity: f64,
    pub committed_today: f64,
}

impl HubNode {
    pub fn new(id: HubId, location: GeoPoint, daily_capacity: f64) -> Self {
        Self {
            id,
            location,
            daily_capacity,
            committed_today: 0.0,
        }
    }

    pub fn with_committed(mut self, committed: f64) -> Self {
        self.committed_today = committed;
        self
    }

    /// Committed ÷ capacity. A hub with no capacity counts as full.
    pub fn utilization(&self) -> f64 {
        if self.daily_capacity > 0.0 {
            self.committed_today / self.daily_capacity
        } else {
            1.0
        }
    }

    pub fn spare(&self) -> f64 {
        (self.daily_capacity - self.committed_today).max(0.0)
    }
}

/// A directed, weighted edge between two hubs.
///
/// # Examples
///
/// ```
/// use u_dispatch::models::{Lane, ServiceLevel};
///
/// let lane = Lane::new(1, 2, ServiceLevel::Standard)
///     .with_distance(120.0)
///     .with_transit_time(150.0)
///     .with_costs(40.0, 0.05, 2.0);
/// assert!((lane.cost_for(100.0, 1.0) - 47.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub origin_hub_id: HubId,
    pub dest_hub_id: HubId,
    pub distance: f64,
    /// Minutes.
    pub transit_time: f64,
    pub base_cost: f64,
    pub cost_per_kg: f64,
    pub cost_per_cbm: f64,
    pub service_level: ServiceLevel,
    pub transport_mode: TransportMode,
    pub active: bool,
}

impl Lane {
    pub fn new(origin: HubId, dest: HubId, service_level: ServiceLevel) -> Self {
        Self {
            origin_hub_id: origin,
            dest_hub_id: dest,
            distance: 0.0,
            transit_time: 0.0,
            base_cost: 0.0,
            cost_per_kg: 0.0,
            cost_per_cbm: 0.0,
            service_level,
            transport_mode: TransportMode::Road,
            active: true,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_transit_time(mut self, minutes: f64) -> Self {
        self.transit_time = minutes;
        self
    }

    pub fn with_costs(mut self, base: f64, per_kg: f64, per_cbm: f64) -> Self {
        self.base_cost = base;
        self.cost_per_kg = per_kg;
        self.cost_per_cbm = per_cbm;
        self
    }

    pub fn with_mode(mut self, mode: TransportMode) -> Self {
        self.transport_mode = mode;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Monetary cost of moving the given consignment over this lane.
    pub fn cost_for(&self, weight: f64, volume: f64) -> f64 {
        self.base_cost + self.cost_per_kg * weight + self.cost_per_cbm * volume
    }
}
