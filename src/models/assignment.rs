//! Assignment records and their lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DriverId, ShipmentId};

/// Lifecycle of a shipment's assignment.
///
/// ```text
/// unassigned → assigned → in_route → completed
///      └──────────┴──→ cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Unassigned,
    Assigned,
    InRoute,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub fn can_transition_to(self, next: AssignmentStatus) -> bool {
        use AssignmentStatus::*;
        matches!(
            (self, next),
            (Unassigned, Assigned)
                | (Assigned, InRoute)
                | (InRoute, Completed)
                | (Unassigned, Cancelled)
                | (Assigned, Cancelled)
        )
    }

    /// Everything except `cancelled` counts against the one-per-shipment rule.
    pub fn is_active(self) -> bool {
        self != AssignmentStatus::Cancelled
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AssignmentStatus::Completed | AssignmentStatus::Cancelled)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssignmentStatus::Unassigned => "unassigned",
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InRoute => "in_route",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub shipment_id: ShipmentId,
    pub driver_id: Option<DriverId>,
    pub status: AssignmentStatus,
    pub assigned_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn unassigned(shipment_id: ShipmentId) -> Self {
        Self {
            shipment_id,
            driver_id: None,
            status: AssignmentStatus::Unassigned,
            assigned_at: None,
        }
    }
}
