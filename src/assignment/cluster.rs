//! Leader clustering of shipments by destination.
//!
//! # Algorithm
//!
//! Shipments are scanned in input order. Each one joins the first cluster
//! whose leader (its first member) lies within the radius of its
//! destination, or founds a new cluster. One pass, no centroid updates.
//!
//! # Complexity
//!
//! O(n·k) where k is the number of clusters formed.

use crate::models::{Shipment, ShipmentId};

/// Groups shipments whose destinations lie within `radius_km` of a
/// cluster leader. Clusters and their members keep input order.
///
/// # Examples
///
/// ```
/// use u_dispatch::assignment::leader_clusters;
/// use u_dispatch::models::{GeoPoint, Shipment};
///
/// let depot = GeoPoint::new(0.0, 0.0);
/// let to = |id, lon| Shipment::new(id, 1, depot, GeoPoint::new(0.0, lon), 1.0, 0.0);
/// let shipments = vec![to(1, 0.0), to(2, 1.0), to(3, 0.01)];
///
/// assert_eq!(leader_clusters(&shipments, 5.0), vec![vec![1, 3], vec![2]]);
/// ```
pub fn leader_clusters(shipments: &[Shipment], radius_km: f64) -> Vec<Vec<ShipmentId>> {
    let mut leaders: Vec<&Shipment> = Vec::new();
    let mut clusters: Vec<Vec<ShipmentId>> = Vec::new();
    for shipment in shipments {
        let home = leaders
            .iter()
            .position(|l| l.destination.distance_km(&shipment.destination) <= radius_km);
        match home {
            Some(k) => clusters[k].push(shipment.id),
            None => {
                leaders.push(shipment);
                clusters.push(vec![shipment.id]);
            }
        }
    }
    clusters
}
