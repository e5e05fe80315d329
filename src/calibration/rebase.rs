//! Universal calibration transfer.
//!
//! The universal layout records where each tracker sat relative to the
//! play-space anchor, plus where the head was. To reuse it on another avatar
//! the whole layout is put back and re-faced: a single yaw about the stored
//! head position turns the stored head heading onto the current one. Height
//! and tilt are left alone.

use glam::{Quat, Vec3};
use rigcal_geom::{yaw_between, Pose};

use crate::error::LookupError;
use crate::host::BendWeights;
use crate::scene::{NodeId, Scene};
use crate::tracking::TrackerRegistry;

use super::store::PointMap;
use super::CalibrationPoint;

/// Points whose trackers are moved back into their stored layout.
const REBASED_POINTS: [CalibrationPoint; 8] = [
    CalibrationPoint::Hip,
    CalibrationPoint::LeftFoot,
    CalibrationPoint::RightFoot,
    CalibrationPoint::LeftElbow,
    CalibrationPoint::RightElbow,
    CalibrationPoint::LeftKnee,
    CalibrationPoint::RightKnee,
    CalibrationPoint::Chest,
];

/// Horizontal re-facing applied to the stored layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YawCorrection {
    /// Stored head position, the rotation pivot
    pub pivot: Vec3,
    /// Pure rotation about +Y
    pub rotation: Quat,
}

impl YawCorrection {
    pub fn axis_angle(&self) -> (Vec3, f32) {
        self.rotation.to_axis_angle()
    }

    pub fn apply(&self, pose: &Pose) -> Pose {
        pose.rotated_around(self.pivot, self.rotation)
    }
}

/// Result of moving one tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebasedPoint {
    pub point: CalibrationPoint,
    /// The tracker that was moved, if it was found
    pub tracker: Option<NodeId>,
    /// 1.0 if the tracker was found and moved, 0.0 otherwise
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebaseOutcome {
    pub correction: YawCorrection,
    pub points: Vec<RebasedPoint>,
}

impl RebaseOutcome {
    pub fn weight(&self, point: CalibrationPoint) -> f32 {
        self.points
            .iter()
            .find(|p| p.point == point)
            .map_or(0.0, |p| p.weight)
    }

    /// Confidence for each auxiliary solver goal.
    pub fn bend_weights(&self) -> BendWeights {
        BendWeights {
            left_elbow: self.weight(CalibrationPoint::LeftElbow),
            right_elbow: self.weight(CalibrationPoint::RightElbow),
            left_knee: self.weight(CalibrationPoint::LeftKnee),
            right_knee: self.weight(CalibrationPoint::RightKnee),
            chest: self.weight(CalibrationPoint::Chest),
        }
    }
}

/// Re-anchors a universal layout to the current head.
pub struct UniversalRebaser<'a> {
    universal: &'a PointMap,
}

impl<'a> UniversalRebaser<'a> {
    pub fn new(universal: &'a PointMap) -> Self {
        Self { universal }
    }

    /// Stored head pose in world space, given the anchor's world pose.
    pub fn stored_head(&self, anchor: &Pose) -> Option<Pose> {
        let head = self.universal.get(&CalibrationPoint::Head)?;
        Some(anchor.mul_pose(&Pose::new(head.position, head.rotation)))
    }

    /// Yaw carrying the stored head heading onto `current_head`'s heading.
    ///
    /// `None` without a stored head entry, or when either head looks
    /// straight up or down.
    pub fn correction(&self, anchor: &Pose, current_head: &Pose) -> Option<YawCorrection> {
        let stored = self.stored_head(anchor)?;
        let rotation = yaw_between(stored.forward(), current_head.forward())?;
        Some(YawCorrection {
            pivot: stored.position,
            rotation,
        })
    }

    /// Move the head tracker and every stored tracker into the re-faced layout.
    ///
    /// Trackers are expected to share the anchor as parent. A tracker that
    /// can't be found by serial is skipped with weight 0.
    pub fn apply(
        &self,
        scene: &mut Scene,
        registry: &TrackerRegistry<'_>,
        head_tracker: NodeId,
        anchor: NodeId,
    ) -> Result<RebaseOutcome, LookupError> {
        let anchor_pose = scene
            .world_pose(anchor)
            .ok_or(LookupError::MissingNode(anchor))?;
        let current_head = scene
            .world_pose(head_tracker)
            .ok_or(LookupError::MissingNode(head_tracker))?;

        let stored_head = self.stored_head(&anchor_pose).ok_or_else(|| {
            LookupError::TrackerNotFound {
                serial: "HEAD".to_string(),
            }
        })?;
        let correction = self
            .correction(&anchor_pose, &current_head)
            .unwrap_or(YawCorrection {
                pivot: stored_head.position,
                rotation: Quat::IDENTITY,
            });

        scene.set_world_pose(head_tracker, correction.apply(&stored_head));

        let (axis, angle) = correction.axis_angle();
        tracing::debug!(
            "Universal rebase: {:.1} deg about {:?}",
            angle.to_degrees(),
            axis
        );

        let points = REBASED_POINTS
            .iter()
            .map(|&point| {
                let tracker = self.universal.get(&point).and_then(|data| {
                    let tracker = registry.find_by_serial(&data.tracker_serial)?;
                    scene.set_local_pose(tracker, Pose::new(data.position, data.rotation));
                    scene.rotate_around(tracker, correction.pivot, correction.rotation);
                    Some(tracker)
                });
                RebasedPoint {
                    point,
                    tracker,
                    weight: if tracker.is_some() { 1.0 } else { 0.0 },
                }
            })
            .collect();

        Ok(RebaseOutcome { correction, points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationData;
    use crate::tracking::{TrackedDevice, TrackingSystem};
    use std::collections::HashMap;

    const EPS: f32 = 1e-4;

    fn universal_with_head(head: Pose) -> PointMap {
        let mut map = HashMap::new();
        map.insert(
            CalibrationPoint::Head,
            CalibrationData::new(head.position, head.rotation, "HEAD"),
        );
        map
    }

    #[test]
    fn test_correction_is_pure_yaw() {
        let stored_head = Pose::new(
            Vec3::new(0.0, 1.6, 0.0),
            Quat::from_rotation_y(0.2) * Quat::from_rotation_x(0.3),
        );
        let universal = universal_with_head(stored_head);
        let rebaser = UniversalRebaser::new(&universal);

        let current = Pose::new(
            Vec3::new(2.0, 1.4, -1.0),
            Quat::from_rotation_y(1.1) * Quat::from_rotation_x(-0.2),
        );
        let correction = rebaser.correction(&Pose::IDENTITY, &current).unwrap();
        let (axis, angle) = correction.axis_angle();

        assert!(axis.y.abs() > 1.0 - EPS, "axis {:?} is not vertical", axis);
        assert!((angle - 0.9).abs() < EPS, "angle {}", angle);
        assert!((correction.pivot - stored_head.position).length() < EPS);
    }

    #[test]
    fn test_correction_respects_anchor() {
        let universal = universal_with_head(Pose::from_position(Vec3::new(0.0, 1.6, 0.0)));
        let rebaser = UniversalRebaser::new(&universal);

        // Anchor turned 90 degrees: stored head now faces +X in world space.
        let anchor = Pose::new(Vec3::new(1.0, 0.0, 0.0), Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let current = Pose::IDENTITY;
        let correction = rebaser.correction(&anchor, &current).unwrap();

        let (_, angle) = correction.axis_angle();
        assert!((angle - std::f32::consts::FRAC_PI_2).abs() < EPS);
        assert!((correction.pivot - Vec3::new(1.0, 1.6, 0.0)).length() < EPS);
        let refaced = correction.rotation * anchor.rotation * Vec3::Z;
        assert!((refaced - Vec3::Z).length() < EPS);
    }

    #[test]
    fn test_no_head_entry() {
        let universal = PointMap::new();
        let rebaser = UniversalRebaser::new(&universal);
        assert!(rebaser.correction(&Pose::IDENTITY, &Pose::IDENTITY).is_none());
    }

    struct OneTracker {
        device: TrackedDevice,
    }

    impl TrackingSystem for OneTracker {
        fn devices(&self) -> Vec<TrackedDevice> {
            vec![self.device]
        }

        fn hand_controllers(&self) -> [Option<NodeId>; 2] {
            [None, None]
        }

        fn serial_number(&self, _index: u32) -> Result<String, String> {
            Ok("LHR-HIP".to_string())
        }
    }

    #[test]
    fn test_apply_moves_trackers_and_weights() {
        let mut scene = Scene::new();
        let anchor = scene.spawn("playspace", None, Pose::IDENTITY);
        let head = scene.spawn(
            "hmd",
            Some(anchor),
            Pose::new(Vec3::new(3.0, 1.7, 3.0), Quat::from_rotation_y(std::f32::consts::PI)),
        );
        let hip = scene.spawn("tracker", Some(anchor), Pose::from_position(Vec3::new(5.0, 0.0, 5.0)));
        let tracking = OneTracker {
            device: TrackedDevice { node: hip, index: Some(4) },
        };
        let registry = TrackerRegistry::new(&tracking);

        let mut universal = universal_with_head(Pose::from_position(Vec3::new(0.0, 1.6, 0.0)));
        universal.insert(
            CalibrationPoint::Hip,
            CalibrationData::new(Vec3::new(0.0, 1.0, 0.2), Quat::IDENTITY, "LHR-HIP"),
        );
        universal.insert(
            CalibrationPoint::LeftKnee,
            CalibrationData::new(Vec3::new(0.1, 0.5, 0.0), Quat::IDENTITY, "LHR-GONE"),
        );

        let outcome = UniversalRebaser::new(&universal)
            .apply(&mut scene, &registry, head, anchor)
            .unwrap();

        // Head restored to the stored spot, facing the current heading (-Z)
        let head_pose = scene.world_pose(head).unwrap();
        assert!((head_pose.position - Vec3::new(0.0, 1.6, 0.0)).length() < EPS);
        assert!((head_pose.forward() - Vec3::NEG_Z).length() < EPS);

        // Hip tracker swung half a turn around the head
        let hip_pos = scene.world_position(hip).unwrap();
        assert!((hip_pos - Vec3::new(0.0, 1.0, -0.2)).length() < EPS);

        assert_eq!(outcome.weight(CalibrationPoint::Hip), 1.0);
        assert_eq!(outcome.weight(CalibrationPoint::LeftKnee), 0.0);
        assert_eq!(outcome.weight(CalibrationPoint::Chest), 0.0);
        assert_eq!(outcome.bend_weights().left_knee, 0.0);
        assert_eq!(outcome.points.len(), 8);
    }
}
