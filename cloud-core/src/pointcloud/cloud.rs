use std::sync::Arc;

use glam::{DMat4, DVec3};
use thiserror::Error;

use crate::octree::{Aabb, Octree, OctreeError};
use crate::pointcloud::sensor::{aggregate_visibility, Sensor};
use crate::pointcloud::store::PointStore;
use crate::pointcloud::visibility::{Visibility, VisibilityTable};
use crate::progress::ProgressCallback;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("visibility table allocation failed: {0}")]
    Allocation(#[from] std::collections::TryReserveError),
    #[error("no visibility table instantiated")]
    NoVisibilityTable,
    #[error("visibility table holds {table_len} entries for {point_count} points")]
    StaleTable {
        table_len: usize,
        point_count: usize,
    },
    #[error("no visible point in the selection")]
    EmptySelection,
}

/// A point cloud: externally owned coordinates plus the annotations this
/// core maintains over them.
///
/// The cloud owns at most one octree and at most one visibility table,
/// both lazily created, and carries the shift/scale reference frame that
/// recovers original large-magnitude coordinates from the stored ones
/// (`global = local / scale - shift`).
pub struct PointCloud {
    store: Arc<dyn PointStore>,
    global_shift: DVec3,
    global_scale: f64,
    point_size: u8,
    visibility: Option<VisibilityTable>,
    octree: Option<Octree>,
    transform: Option<DMat4>,
}

impl PointCloud {
    pub fn new(store: Arc<dyn PointStore>) -> Self {
        Self {
            store,
            global_shift: DVec3::ZERO,
            global_scale: 1.0,
            point_size: 0,
            visibility: None,
            octree: None,
            transform: None,
        }
    }

    pub fn point_count(&self) -> usize {
        self.store.point_count()
    }

    pub fn point(&self, index: usize) -> DVec3 {
        self.store.point(index)
    }

    pub fn store(&self) -> &dyn PointStore {
        self.store.as_ref()
    }

    pub fn bounding_box(&self) -> Option<Aabb> {
        Aabb::from_points(self.store.as_ref())
    }

    pub fn global_shift(&self) -> DVec3 {
        self.global_shift
    }

    pub fn set_global_shift(&mut self, shift: DVec3) {
        self.global_shift = shift;
    }

    pub fn global_scale(&self) -> f64 {
        self.global_scale
    }

    pub fn set_global_scale(&mut self, scale: f64) {
        self.global_scale = scale;
    }

    /// Original-frame coordinates of a stored (shifted, scaled) point.
    pub fn to_global(&self, local: DVec3) -> DVec3 {
        local / self.global_scale - self.global_shift
    }

    /// Stored-frame coordinates of an original point.
    pub fn to_local(&self, global: DVec3) -> DVec3 {
        (global + self.global_shift) * self.global_scale
    }

    /// Point-rendering size in pixels; 0 means "use the global default".
    pub fn point_size(&self) -> u8 {
        self.point_size
    }

    pub fn set_point_size(&mut self, size: u8) {
        self.point_size = size;
    }

    /// Rigid transform of this cloud relative to the camera, if any.
    pub fn transform(&self) -> Option<DMat4> {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Option<DMat4>) {
        self.transform = transform;
    }

    /// Drops every annotation: visibility table and octree.
    pub fn clear(&mut self) {
        self.release_visibility();
        self.delete_octree();
    }

    /// Copies the reference frame, point size and rigid transform from
    /// another cloud.
    pub fn import_parameters_from(&mut self, other: &PointCloud) {
        self.global_shift = other.global_shift;
        self.global_scale = other.global_scale;
        self.point_size = other.point_size;
        self.transform = other.transform;
    }

    /// Ensures the visibility table exists, sized to the current point
    /// count with every point visible.
    ///
    /// On allocation failure the table is fully released before the error
    /// is reported, so no half-sized table survives.
    pub fn reset_visibility(&mut self) -> Result<(), CloudError> {
        let table = self.visibility.get_or_insert_with(VisibilityTable::new);
        if let Err(e) = table.resize_filled(self.store.point_count(), Visibility::Visible) {
            self.visibility = None;
            return Err(CloudError::Allocation(e));
        }
        Ok(())
    }

    /// Drops this cloud's handle on the table; the storage goes away with
    /// the last handle. Afterwards the table is absent, not just empty.
    pub fn release_visibility(&mut self) {
        self.visibility = None;
    }

    pub fn is_visibility_instantiated(&self) -> bool {
        self.visibility.as_ref().is_some_and(|t| t.is_allocated())
    }

    pub fn visibility(&self) -> Option<&VisibilityTable> {
        self.visibility.as_ref()
    }

    /// Handle to the table, creating an empty one when absent.
    pub fn visibility_or_create(&mut self) -> &VisibilityTable {
        self.visibility.get_or_insert_with(VisibilityTable::new)
    }

    /// Ascending indices of the currently visible points.
    ///
    /// An absent or wrongly sized table is an operational error, reported
    /// distinctly from a selection that is merely empty.
    pub fn visible_points(&self) -> Result<Vec<usize>, CloudError> {
        let point_count = self.store.point_count();
        let table = match &self.visibility {
            Some(table) if table.is_allocated() => table,
            _ => {
                log::warn!("visible points requested without a visibility table");
                return Err(CloudError::NoVisibilityTable);
            }
        };
        if table.len() != point_count {
            return Err(CloudError::StaleTable {
                table_len: table.len(),
                point_count,
            });
        }

        let indices = table.indices_matching(Visibility::Visible);
        if indices.is_empty() {
            log::warn!("no point in the visible selection");
            return Err(CloudError::EmptySelection);
        }
        Ok(indices)
    }

    /// Aggregate visibility of a 3D point under the given sensors.
    pub fn test_visibility(&self, point: DVec3, sensors: &[Box<dyn Sensor>]) -> Visibility {
        aggregate_visibility(point, sensors)
    }

    /// Rebuilds the octree from the current points, replacing any previous
    /// index. Nothing stays attached when the build fails or is cancelled.
    pub fn compute_octree(
        &mut self,
        progress: Option<&mut dyn ProgressCallback>,
    ) -> Result<&Octree, OctreeError> {
        self.octree = None;
        let octree = Octree::build(self.store.as_ref(), progress)?;
        Ok(self.octree.insert(octree))
    }

    pub fn octree(&self) -> Option<&Octree> {
        self.octree.as_ref()
    }

    pub fn delete_octree(&mut self) {
        self.octree = None;
    }
}
