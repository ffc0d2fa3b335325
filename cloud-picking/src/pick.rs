use std::cmp::Ordering;

use glam::{DVec2, DVec3};
use rayon::iter::{IntoParallelIterator as _, ParallelIterator as _};

use cloud_core::octree::raycast::{RayCastMode, RayTolerance};
use cloud_core::pointcloud::cloud::PointCloud;

use crate::camera::{CameraMatrices, ViewportState};

/// Empirical pixel-to-cone-angle conversion for perspective picks,
/// radians per pixel of pick width.
const PERSPECTIVE_ANGLE_PER_PIXEL: f64 = 0.002;

/// One screen-space pick: click position in window coordinates and the
/// pick rectangle size in pixels. Zero sizes are legal and degenerate to
/// an exact-pixel match.
#[derive(Debug, Clone, Copy)]
pub struct PickRequest {
    pub click: DVec2,
    pub pick_width: f64,
    pub pick_height: f64,
}

/// Index of the picked point and its squared distance to the unprojected
/// click position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickResult {
    pub index: usize,
    pub square_dist: f64,
}

/// Resolves a screen click to the nearest point of `cloud`.
///
/// The octree path is taken when the cloud carries an index, the display
/// provided its viewport state, and the pick region is square; anything
/// else — including a mechanical octree failure — goes through the
/// exhaustive brute-force scan. A clean octree miss is final. `None` means
/// "no point", a normal outcome.
pub fn pick(
    cloud: &PointCloud,
    camera: &CameraMatrices,
    viewport: Option<&ViewportState>,
    request: &PickRequest,
) -> Option<PickResult> {
    // both tiers measure distance to the click unprojected at near depth
    let origin = camera.unproject(request.click.extend(0.0))?;

    if let (Some(viewport), Some(octree)) = (viewport, cloud.octree()) {
        if request.pick_width == request.pick_height {
            if let Some(ray) = click_ray(cloud, camera, request.click, origin) {
                let tolerance = if viewport.perspective {
                    RayTolerance::Angle(PERSPECTIVE_ANGLE_PER_PIXEL * request.pick_width)
                } else {
                    RayTolerance::Radius(request.pick_width * viewport.pixel_size / 2.0)
                };
                match octree.ray_cast(
                    cloud.store(),
                    ray.0,
                    ray.1,
                    tolerance,
                    RayCastMode::Nearest,
                ) {
                    Ok(hits) => {
                        return hits.first().map(|hit| PickResult {
                            index: hit.index,
                            square_dist: hit.square_dist,
                        });
                    }
                    Err(err) => {
                        log::warn!(
                            "point picking: octree query failed ({err}); falling back to the slow scan"
                        );
                    }
                }
            }
        }
    }

    brute_force_pick(cloud, camera, request, origin)
}

/// Ray through the click, expressed in the cloud's local frame.
fn click_ray(
    cloud: &PointCloud,
    camera: &CameraMatrices,
    click: DVec2,
    origin: DVec3,
) -> Option<(DVec3, DVec3)> {
    let far = camera.unproject(click.extend(1.0))?;
    let direction = (far - origin).try_normalize()?;
    match cloud.transform() {
        Some(transform) => {
            let inverse = transform.inverse();
            if !inverse.is_finite() {
                return None;
            }
            let origin = inverse.transform_point3(origin);
            let direction = inverse.transform_vector3(direction).try_normalize()?;
            Some((origin, direction))
        }
        None => Some((origin, direction)),
    }
}

/// Exhaustive fallback: projects every point and keeps the in-rectangle
/// match closest to `origin`. Scans the whole cloud unconditionally; ties
/// break toward the lower index so the parallel reduction is
/// deterministic.
fn brute_force_pick(
    cloud: &PointCloud,
    camera: &CameraMatrices,
    request: &PickRequest,
    origin: DVec3,
) -> Option<PickResult> {
    let store = cloud.store();
    let transform = cloud.transform();
    let half_width = request.pick_width / 2.0;
    let half_height = request.pick_height / 2.0;
    let click = request.click;

    (0..store.point_count())
        .into_par_iter()
        .filter_map(|index| {
            let point = store.point(index);
            let displayed = match transform {
                Some(matrix) => matrix.transform_point3(point),
                None => point,
            };
            let window = camera.project(displayed)?;
            if (window.x - click.x).abs() > half_width
                || (window.y - click.y).abs() > half_height
            {
                return None;
            }
            Some(PickResult {
                index,
                square_dist: (point - origin).length_squared(),
            })
        })
        .min_by(|a, b| {
            a.square_dist
                .partial_cmp(&b.square_dist)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        })
}
