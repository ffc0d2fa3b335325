use glam::{DMat4, DVec3, DVec4};

/// Camera transform state for one viewport, as handed over by the display.
///
/// `viewport` is `[x, y, width, height]` in pixels, GL convention (origin
/// at the bottom-left). Depth values are in `[0, 1]` between the near and
/// far planes.
#[derive(Debug, Clone, Copy)]
pub struct CameraMatrices {
    pub modelview: DMat4,
    pub projection: DMat4,
    pub viewport: [i32; 4],
}

impl CameraMatrices {
    /// Window coordinates (x, y in pixels, z in `[0, 1]`) of a world-space
    /// point. `None` when the point projects behind the eye or to a
    /// degenerate clip position.
    pub fn project(&self, world: DVec3) -> Option<DVec3> {
        let clip = self.projection * self.modelview * world.extend(1.0);
        if clip.w.abs() < f64::MIN_POSITIVE {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        if !ndc.is_finite() {
            return None;
        }
        let [x, y, width, height] = self.viewport.map(f64::from);
        Some(DVec3::new(
            x + (ndc.x + 1.0) * 0.5 * width,
            y + (ndc.y + 1.0) * 0.5 * height,
            (ndc.z + 1.0) * 0.5,
        ))
    }

    /// Maps a window coordinate plus depth (0 = near plane, 1 = far plane)
    /// back to world space through the inverse combined transform. `None`
    /// when the transform cannot be inverted.
    pub fn unproject(&self, window: DVec3) -> Option<DVec3> {
        let [x, y, width, height] = self.viewport.map(f64::from);
        if width == 0.0 || height == 0.0 {
            return None;
        }
        let inverse = (self.projection * self.modelview).inverse();
        if !inverse.is_finite() {
            return None;
        }
        let ndc = DVec4::new(
            (window.x - x) / width * 2.0 - 1.0,
            (window.y - y) / height * 2.0 - 1.0,
            window.z * 2.0 - 1.0,
            1.0,
        );
        let world = inverse * ndc;
        if world.w.abs() < f64::MIN_POSITIVE {
            return None;
        }
        let world = world.truncate() / world.w;
        world.is_finite().then_some(world)
    }
}

/// Viewport parameters the picking engine needs beyond the raw matrices.
#[derive(Debug, Clone, Copy)]
pub struct ViewportState {
    /// Perspective projection (angular pick tolerance) rather than
    /// orthographic (linear radius).
    pub perspective: bool,
    /// World units covered by one pixel at the focal plane.
    pub pixel_size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ortho_camera() -> CameraMatrices {
        CameraMatrices {
            modelview: DMat4::IDENTITY,
            projection: DMat4::orthographic_rh_gl(0.0, 10.0, 0.0, 10.0, -10.0, 10.0),
            viewport: [0, 0, 100, 100],
        }
    }

    #[test]
    fn project_maps_world_to_pixels() {
        let camera = ortho_camera();
        let window = camera.project(DVec3::new(5.0, 5.0, 0.0)).unwrap();
        assert!((window.x - 50.0).abs() < 1e-9);
        assert!((window.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unproject_inverts_project() {
        let camera = CameraMatrices {
            modelview: DMat4::look_at_rh(
                DVec3::new(3.0, 4.0, 10.0),
                DVec3::ZERO,
                DVec3::Y,
            ),
            projection: DMat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0),
            viewport: [0, 0, 640, 480],
        };
        let world = DVec3::new(0.5, -0.25, 1.0);
        let window = camera.project(world).unwrap();
        let back = camera.unproject(window).unwrap();
        assert!((back - world).length() < 1e-6);
    }

    #[test]
    fn zero_viewport_cannot_unproject() {
        let mut camera = ortho_camera();
        camera.viewport = [0, 0, 0, 0];
        assert!(camera.unproject(DVec3::ZERO).is_none());
    }

    #[test]
    fn singular_projection_cannot_unproject() {
        let mut camera = ortho_camera();
        camera.projection = DMat4::ZERO;
        assert!(camera.unproject(DVec3::new(50.0, 50.0, 0.0)).is_none());
    }
}
