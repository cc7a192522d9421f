//! Travel model for one routing request.
//!
//! Node layout: `0` is the route start, `1..=n` are the stops in input
//! order, `n + 1` is the route end. An open-ended route has zero-cost edges
//! into the end node.

use crate::models::{EdgeDelay, GeoPoint, Stop, StopId, VehicleConstraints};

use super::DistanceMatrix;

#[derive(Debug, Clone)]
pub struct TravelModel {
    distances: DistanceMatrix,
    times: DistanceMatrix,
    num_stops: usize,
}

impl TravelModel {
    /// Builds distances from coordinates and travel minutes from the vehicle
    /// speed, then adds the given edge delays.
    pub fn build(stops: &[Stop], constraints: &VehicleConstraints, delays: &[EdgeDelay]) -> Self {
        let n = stops.len();
        let mut points: Vec<GeoPoint> = Vec::with_capacity(n + 2);
        points.push(constraints.start_location);
        points.extend(stops.iter().map(|s| s.location()));
        let end = constraints.end_location();
        points.push(end.unwrap_or(constraints.start_location));

        let mut distances = DistanceMatrix::from_locations(&points);
        if end.is_none() {
            for i in 0..n + 2 {
                distances.set(i, n + 1, 0.0);
            }
        }

        let speed = constraints.vehicle.speed_kmh().max(f64::EPSILON);
        let mut times = distances.scaled(60.0 / speed);

        let node_of = |id: StopId| stops.iter().position(|s| s.id() == id).map(|i| i + 1);
        for delay in delays {
            let from = match delay.from {
                None => Some(0),
                Some(id) => node_of(id),
            };
            if let (Some(from), Some(to)) = (from, node_of(delay.to)) {
                times.add(from, to, delay.extra_minutes);
            }
        }

        Self {
            distances,
            times,
            num_stops: n,
        }
    }

    /// Kilometres between two nodes.
    pub fn distance(&self, from: usize, to: usize) -> f64 {
        self.distances.get(from, to)
    }

    /// Minutes between two nodes, including delays.
    pub fn travel_time(&self, from: usize, to: usize) -> f64 {
        self.times.get(from, to)
    }

    pub fn start_node(&self) -> usize {
        0
    }

    pub fn end_node(&self) -> usize {
        self.num_stops + 1
    }

    /// Matrix node of the stop at `index` in the input slice.
    pub fn node(&self, index: usize) -> usize {
        index + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Demand, Vehicle};

    fn constraints() -> VehicleConstraints {
        let home = GeoPoint::new(0.0, 0.0);
        VehicleConstraints::for_vehicle(Vehicle::new(1, 100.0, 10.0, home, 480.0))
    }

    fn stops() -> Vec<Stop> {
        vec![
            Stop::pickup(1, GeoPoint::new(0.0, 0.1), Demand::new(1.0, 0.0)),
            Stop::delivery(1, GeoPoint::new(0.0, 0.2), Demand::new(1.0, 0.0)),
        ]
    }

    #[test]
    fn test_closed_route_returns_home() {
        let tm = TravelModel::build(&stops(), &constraints(), &[]);
        assert_eq!(tm.end_node(), 3);
        assert!((tm.distance(2, 3) - tm.distance(0, 2)).abs() < 1e-9);
        // 40 km/h → 1.5 min per km
        assert!((tm.travel_time(0, 1) - tm.distance(0, 1) * 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_open_route_end_is_free() {
        let c = constraints().open_ended();
        let tm = TravelModel::build(&stops(), &c, &[]);
        assert_eq!(tm.distance(2, 3), 0.0);
        assert_eq!(tm.travel_time(1, 3), 0.0);
    }

    #[test]
    fn test_delays_apply_to_matching_edges() {
        let s = stops();
        let delays = [
            EdgeDelay::new(None, s[0].id(), 10.0),
            EdgeDelay::new(Some(s[0].id()), s[1].id(), 5.0),
            EdgeDelay::new(Some(999), s[1].id(), 50.0),
        ];
        let plain = TravelModel::build(&s, &constraints(), &[]);
        let delayed = TravelModel::build(&s, &constraints(), &delays);
        assert!((delayed.travel_time(0, 1) - plain.travel_time(0, 1) - 10.0).abs() < 1e-9);
        assert!((delayed.travel_time(1, 2) - plain.travel_time(1, 2) - 5.0).abs() < 1e-9);
        assert!((delayed.travel_time(2, 1) - plain.travel_time(2, 1)).abs() < 1e-9);
        assert_eq!(delayed.distance(1, 2), plain.distance(1, 2));
    }
}
