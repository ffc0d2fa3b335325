use glam::DVec3;
use thiserror::Error;

use crate::pointcloud::store::PointStore;
use crate::progress::ProgressCallback;

pub mod raycast;

/// Points a leaf holds before it splits.
const LEAF_CAPACITY: usize = 32;
/// Subdivision floor; leaves at this depth absorb any overflow.
const MAX_DEPTH: u32 = 10;
/// Build progress is reported once per this many inserted points.
const PROGRESS_CHUNK: usize = 4096;
/// Padding applied to degenerate (flat or single-point) extents.
const MIN_EXTENT: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum OctreeError {
    #[error("cannot build an octree over an empty point set")]
    EmptyCloud,
    #[error("octree build cancelled at {percent:.0}%")]
    Cancelled { percent: f32 },
    #[error("octree indexes {indexed} points but the store now holds {actual}")]
    StaleIndex { indexed: usize, actual: usize },
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_diagonal(&self) -> f64 {
        (self.max - self.min).length() * 0.5
    }

    /// Bounds of the child octant `i` (x selects bit 0, y bit 1, z bit 2).
    pub fn octant(&self, i: usize) -> Aabb {
        let center = self.center();
        Aabb {
            min: DVec3::new(
                if i & 1 == 0 { self.min.x } else { center.x },
                if i & 2 == 0 { self.min.y } else { center.y },
                if i & 4 == 0 { self.min.z } else { center.z },
            ),
            max: DVec3::new(
                if i & 1 == 0 { center.x } else { self.max.x },
                if i & 2 == 0 { center.y } else { self.max.y },
                if i & 4 == 0 { center.z } else { self.max.z },
            ),
        }
    }

    fn octant_of(&self, point: DVec3) -> usize {
        let center = self.center();
        (point.x >= center.x) as usize
            | (((point.y >= center.y) as usize) << 1)
            | (((point.z >= center.z) as usize) << 2)
    }

    /// Folds the bounding box of every point in `store`; `None` when empty.
    pub fn from_points(store: &dyn PointStore) -> Option<Aabb> {
        let count = store.point_count();
        if count == 0 {
            return None;
        }
        let mut min = DVec3::splat(f64::MAX);
        let mut max = DVec3::splat(f64::MIN);
        for index in 0..count {
            let point = store.point(index);
            min = min.min(point);
            max = max.max(point);
        }
        Some(Aabb { min, max })
    }
}

#[derive(Debug)]
enum Node {
    Leaf(Vec<u32>),
    Internal(Box<[Node; 8]>),
}

impl Node {
    fn empty_internal() -> Node {
        Node::Internal(Box::new([
            Node::Leaf(Vec::new()),
            Node::Leaf(Vec::new()),
            Node::Leaf(Vec::new()),
            Node::Leaf(Vec::new()),
            Node::Leaf(Vec::new()),
            Node::Leaf(Vec::new()),
            Node::Leaf(Vec::new()),
            Node::Leaf(Vec::new()),
        ]))
    }
}

/// Spatial index over the full point set of one store.
///
/// The octree holds indices only; coordinates are read back from the store
/// at query time, so the store handed to a query must be the one the index
/// was built over.
#[derive(Debug)]
pub struct Octree {
    bounds: Aabb,
    root: Node,
    indexed_count: usize,
}

impl Octree {
    /// Builds the index over every point in `store`.
    ///
    /// Reports percentage progress through `progress` and stops early when
    /// it requests cancellation; a cancelled or failed build returns an
    /// error and leaves nothing to attach.
    pub fn build(
        store: &dyn PointStore,
        mut progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<Octree, OctreeError> {
        let count = store.point_count();
        let mut bounds = Aabb::from_points(store).ok_or(OctreeError::EmptyCloud)?;

        // flat or single-point clouds still need a subdividable volume
        for axis in 0..3 {
            if bounds.max[axis] - bounds.min[axis] < MIN_EXTENT {
                bounds.min[axis] -= MIN_EXTENT;
                bounds.max[axis] += MIN_EXTENT;
            }
        }

        let mut root = Node::Leaf(Vec::new());
        for index in 0..count {
            if index % PROGRESS_CHUNK == 0 {
                if let Some(callback) = progress.as_deref_mut() {
                    let percent = index as f32 / count as f32 * 100.0;
                    callback.update(percent);
                    if callback.is_cancel_requested() {
                        return Err(OctreeError::Cancelled { percent });
                    }
                }
            }
            insert(&mut root, bounds, store, index as u32, 0);
        }
        if let Some(callback) = progress.as_deref_mut() {
            callback.update(100.0);
        }

        Ok(Octree {
            bounds,
            root,
            indexed_count: count,
        })
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Number of points the index was built over.
    pub fn point_count(&self) -> usize {
        self.indexed_count
    }
}

fn insert(node: &mut Node, bounds: Aabb, store: &dyn PointStore, index: u32, depth: u32) {
    match node {
        Node::Internal(children) => {
            let octant = bounds.octant_of(store.point(index as usize));
            insert(
                &mut children[octant],
                bounds.octant(octant),
                store,
                index,
                depth + 1,
            );
        }
        Node::Leaf(indices) => {
            if indices.len() < LEAF_CAPACITY || depth >= MAX_DEPTH {
                indices.push(index);
                return;
            }
            let resident = std::mem::take(indices);
            *node = Node::empty_internal();
            for resident_index in resident {
                insert(node, bounds, store, resident_index, depth);
            }
            insert(node, bounds, store, index, depth);
        }
    }
}
