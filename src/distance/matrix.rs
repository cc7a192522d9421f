//! Dense distance matrix.

use crate::models::GeoPoint;

/// A dense n×n matrix stored in row-major order.
///
/// Used for both distances (km) and travel times (minutes).
///
/// # Examples
///
/// ```
/// use u_dispatch::models::GeoPoint;
/// use u_dispatch::distance::DistanceMatrix;
///
/// let points = [GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 1.0)];
/// let dm = DistanceMatrix::from_locations(&points);
/// assert!((dm.get(0, 1) - 111.19).abs() < 0.01);
/// assert_eq!(dm.size(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    data: Vec<f64>,
    size: usize,
}

impl DistanceMatrix {
    /// Creates a matrix of the given size, initialized to zero.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0.0; size * size],
            size,
        }
    }

    /// Great-circle distances between every pair of locations.
    pub fn from_locations(locations: &[GeoPoint]) -> Self {
        let n = locations.len();
        let mut dm = Self::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let d = locations[i].distance_km(&locations[j]);
                dm.set(i, j, d);
                dm.set(j, i, d);
            }
        }
        dm
    }

    /// Returns `None` if the data length doesn't match `size * size`.
    pub fn from_data(size: usize, data: Vec<f64>) -> Option<Self> {
        if data.len() != size * size {
            return None;
        }
        Some(Self { data, size })
    }

    /// # Panics
    ///
    /// Panics if either index is out of bounds.
    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.data[from * self.size + to]
    }

    pub fn set(&mut self, from: usize, to: usize, value: f64) {
        self.data[from * self.size + to] = value;
    }

    pub fn add(&mut self, from: usize, to: usize, value: f64) {
        self.data[from * self.size + to] += value;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Scales every entry; turns a distance matrix into a time matrix.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            data: self.data.iter().map(|d| d * factor).collect(),
            size: self.size,
        }
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        for i in 0..self.size {
            for j in (i + 1)..self.size {
                if (self.get(i, j) - self.get(j, i)).abs() > tol {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.1),
            GeoPoint::new(0.1, 0.0),
        ]
    }

    #[test]
    fn test_from_locations() {
        let dm = DistanceMatrix::from_locations(&sample_points());
        assert_eq!(dm.size(), 3);
        assert!((dm.get(0, 1) - 11.119).abs() < 0.01);
        assert!(dm.get(0, 0).abs() < 1e-10);
        assert!(dm.is_symmetric(1e-10));
    }

    #[test]
    fn test_from_data_invalid_size() {
        assert!(DistanceMatrix::from_data(2, vec![0.0, 1.0, 2.0]).is_none());
        let dm = DistanceMatrix::from_data(2, vec![0.0, 5.0, 5.0, 0.0]).expect("valid");
        assert_eq!(dm.get(1, 0), 5.0);
    }

    #[test]
    fn test_add_breaks_symmetry() {
        let mut dm = DistanceMatrix::from_locations(&sample_points());
        dm.add(0, 1, 3.0);
        assert!(!dm.is_symmetric(1e-10));
    }

    #[test]
    fn test_scaled() {
        let dm = DistanceMatrix::from_data(2, vec![0.0, 40.0, 40.0, 0.0]).expect("valid");
        let minutes = dm.scaled(60.0 / 40.0);
        assert!((minutes.get(0, 1) - 60.0).abs() < 1e-10);
    }
}
