use glam::DVec3;

use crate::pointcloud::visibility::Visibility;

/// Anything able to judge the visibility of a 3D point from its own
/// vantage (depth sensor, scanner position, camera frustum, ...).
pub trait Sensor {
    fn check_visibility(&self, point: DVec3) -> Visibility;
}

/// Combines the verdicts of several sensors for one point.
///
/// Visibility is an OR across sensors: a single `Visible` verdict wins
/// immediately. When no sensor sees the point, the numerically smallest
/// (least restrictive) verdict is kept. With no sensors at all, nothing
/// votes against the point and it stays visible.
pub fn aggregate_visibility(point: DVec3, sensors: &[Box<dyn Sensor>]) -> Visibility {
    let mut best: Option<Visibility> = None;

    for sensor in sensors {
        let verdict = sensor.check_visibility(point);
        if verdict == Visibility::Visible {
            return Visibility::Visible;
        }
        best = Some(match best {
            Some(current) => current.min(verdict),
            None => verdict,
        });
    }

    best.unwrap_or(Visibility::Visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSensor(Visibility);

    impl Sensor for FixedSensor {
        fn check_visibility(&self, _point: DVec3) -> Visibility {
            self.0
        }
    }

    fn sensors(verdicts: &[Visibility]) -> Vec<Box<dyn Sensor>> {
        verdicts
            .iter()
            .map(|&v| Box::new(FixedSensor(v)) as Box<dyn Sensor>)
            .collect()
    }

    #[test]
    fn no_sensor_means_visible() {
        assert_eq!(
            aggregate_visibility(DVec3::ZERO, &[]),
            Visibility::Visible
        );
    }

    #[test]
    fn one_visible_verdict_wins() {
        let sensors = sensors(&[
            Visibility::Hidden,
            Visibility::Visible,
            Visibility::OutOfRange,
        ]);
        assert_eq!(
            aggregate_visibility(DVec3::ZERO, &sensors),
            Visibility::Visible
        );
    }

    #[test]
    fn smallest_verdict_wins_without_visible() {
        let sensors = sensors(&[
            Visibility::Hidden,
            Visibility::OutOfFov,
            Visibility::OutOfRange,
        ]);
        assert_eq!(
            aggregate_visibility(DVec3::ZERO, &sensors),
            Visibility::OutOfRange
        );
    }
}
