use glam::DVec3;

/// Random-access point storage.
///
/// The storage itself always belongs to an external owner; clouds, octrees
/// and pickers only read from it. `Send + Sync` so parallel scans can share
/// one store across worker threads.
pub trait PointStore: Send + Sync {
    /// Total number of points.
    fn point_count(&self) -> usize;

    /// Coordinates of the point at `index`, which must be in
    /// `[0, point_count())`.
    fn point(&self, index: usize) -> DVec3;
}

/// In-memory store backed by a plain coordinate vector.
pub struct VecPointStore {
    points: Vec<DVec3>,
}

impl VecPointStore {
    pub fn new(points: Vec<DVec3>) -> Self {
        Self { points }
    }
}

impl PointStore for VecPointStore {
    fn point_count(&self) -> usize {
        self.points.len()
    }

    fn point(&self, index: usize) -> DVec3 {
        self.points[index]
    }
}

impl From<Vec<[f64; 3]>> for VecPointStore {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self::new(points.into_iter().map(DVec3::from).collect())
    }
}
