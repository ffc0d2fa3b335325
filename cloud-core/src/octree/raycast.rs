use std::cmp::Ordering;

use glam::DVec3;

use crate::octree::{Aabb, Node, Octree, OctreeError};
use crate::pointcloud::store::PointStore;

/// One candidate returned by a ray query: point index plus squared
/// distance to the ray origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointDescriptor {
    pub index: usize,
    pub square_dist: f64,
}

/// How many candidates a ray query keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayCastMode {
    /// Only the candidate closest to the ray origin.
    Nearest,
    /// Every candidate inside the tolerance, nearest first.
    All,
}

/// Lateral tolerance around the ray.
///
/// Perspective views pick inside a cone (the tolerance grows with the
/// distance along the ray); orthographic views pick inside a cylinder.
#[derive(Debug, Clone, Copy)]
pub enum RayTolerance {
    /// Cone half-angle, radians.
    Angle(f64),
    /// Cylinder radius, world units.
    Radius(f64),
}

impl RayTolerance {
    fn radius_at(self, along: f64) -> f64 {
        match self {
            RayTolerance::Angle(angle) => angle.tan() * along,
            RayTolerance::Radius(radius) => radius,
        }
    }
}

impl Octree {
    /// Collects the indexed points lying within `tolerance` of the ray
    /// `origin + t * direction`, `t >= 0`, ordered by squared distance to
    /// `origin`; `RayCastMode::Nearest` keeps only the first.
    ///
    /// Zero candidates is an empty result, not an error. A store whose
    /// count no longer matches the indexed count is one: the index is
    /// stale and the caller has to rebuild or fall back.
    pub fn ray_cast(
        &self,
        store: &dyn PointStore,
        origin: DVec3,
        direction: DVec3,
        tolerance: RayTolerance,
        mode: RayCastMode,
    ) -> Result<Vec<PointDescriptor>, OctreeError> {
        if store.point_count() != self.indexed_count {
            return Err(OctreeError::StaleIndex {
                indexed: self.indexed_count,
                actual: store.point_count(),
            });
        }
        let Some(direction) = direction.try_normalize() else {
            return Ok(Vec::new());
        };

        let mut hits = Vec::new();
        visit(
            &self.root,
            self.bounds,
            store,
            origin,
            direction,
            tolerance,
            &mut hits,
        );

        hits.sort_by(|a, b| {
            a.square_dist
                .partial_cmp(&b.square_dist)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        if mode == RayCastMode::Nearest {
            hits.truncate(1);
        }
        Ok(hits)
    }
}

fn visit(
    node: &Node,
    bounds: Aabb,
    store: &dyn PointStore,
    origin: DVec3,
    direction: DVec3,
    tolerance: RayTolerance,
    hits: &mut Vec<PointDescriptor>,
) {
    // conservative prune against the sphere around the node
    let to_center = bounds.center() - origin;
    let along = to_center.dot(direction);
    let node_radius = bounds.half_diagonal();
    if along + node_radius < 0.0 {
        return; // entirely behind the origin
    }
    let radial = (to_center.length_squared() - along * along).max(0.0).sqrt();
    let allowed = tolerance.radius_at((along + node_radius).max(0.0)) + node_radius;
    if radial > allowed {
        return;
    }

    match node {
        Node::Leaf(indices) => {
            for &index in indices {
                let offset = store.point(index as usize) - origin;
                let along = offset.dot(direction);
                if along < 0.0 {
                    continue;
                }
                let radial_sq = (offset.length_squared() - along * along).max(0.0);
                let limit = tolerance.radius_at(along);
                if radial_sq <= limit * limit {
                    hits.push(PointDescriptor {
                        index: index as usize,
                        square_dist: offset.length_squared(),
                    });
                }
            }
        }
        Node::Internal(children) => {
            for (i, child) in children.iter().enumerate() {
                visit(
                    child,
                    bounds.octant(i),
                    store,
                    origin,
                    direction,
                    tolerance,
                    hits,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointcloud::store::VecPointStore;

    fn line_store() -> VecPointStore {
        // points along x at z = 0, plus one off-axis distractor
        VecPointStore::from(vec![
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [5.0, 0.0, 0.0],
            [2.0, 3.0, 0.0],
        ])
    }

    #[test]
    fn nearest_mode_returns_the_closest_point() {
        let store = line_store();
        let octree = Octree::build(&store, None).unwrap();
        let hits = octree
            .ray_cast(
                &store,
                DVec3::ZERO,
                DVec3::X,
                RayTolerance::Radius(0.1),
                RayCastMode::Nearest,
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
        assert!((hits[0].square_dist - 1.0).abs() < 1e-12);
    }

    #[test]
    fn all_mode_orders_by_distance() {
        let store = line_store();
        let octree = Octree::build(&store, None).unwrap();
        let hits = octree
            .ray_cast(
                &store,
                DVec3::ZERO,
                DVec3::X,
                RayTolerance::Radius(0.1),
                RayCastMode::All,
            )
            .unwrap();
        let indices: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn angular_tolerance_widens_with_distance() {
        let store = VecPointStore::from(vec![[1.0, 0.3, 0.0], [10.0, 0.3, 0.0]]);
        let octree = Octree::build(&store, None).unwrap();
        // ~0.1 rad cone: 0.3 off-axis passes at x=10 but not at x=1
        let hits = octree
            .ray_cast(
                &store,
                DVec3::ZERO,
                DVec3::X,
                RayTolerance::Angle(0.1),
                RayCastMode::All,
            )
            .unwrap();
        let indices: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![1]);
    }

    #[test]
    fn miss_is_an_empty_result() {
        let store = line_store();
        let octree = Octree::build(&store, None).unwrap();
        let hits = octree
            .ray_cast(
                &store,
                DVec3::ZERO,
                DVec3::Z,
                RayTolerance::Radius(0.1),
                RayCastMode::Nearest,
            )
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn points_behind_the_origin_are_ignored() {
        let store = VecPointStore::from(vec![[-1.0, 0.0, 0.0], [3.0, 0.0, 0.0]]);
        let octree = Octree::build(&store, None).unwrap();
        let hits = octree
            .ray_cast(
                &store,
                DVec3::ZERO,
                DVec3::X,
                RayTolerance::Radius(0.5),
                RayCastMode::All,
            )
            .unwrap();
        let indices: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![1]);
    }

    #[test]
    fn repeated_queries_are_deterministic() {
        let store = line_store();
        let octree = Octree::build(&store, None).unwrap();
        let run = || {
            octree
                .ray_cast(
                    &store,
                    DVec3::ZERO,
                    DVec3::X,
                    RayTolerance::Radius(0.1),
                    RayCastMode::Nearest,
                )
                .unwrap()
        };
        let first = run();
        for _ in 0..10 {
            assert_eq!(run(), first);
        }
    }

    #[test]
    fn stale_store_is_a_query_failure() {
        let store = line_store();
        let octree = Octree::build(&store, None).unwrap();
        let shrunk = VecPointStore::from(vec![[1.0, 0.0, 0.0]]);
        assert!(matches!(
            octree.ray_cast(
                &shrunk,
                DVec3::ZERO,
                DVec3::X,
                RayTolerance::Radius(0.1),
                RayCastMode::Nearest,
            ),
            Err(OctreeError::StaleIndex { .. })
        ));
    }
}
