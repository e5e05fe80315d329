//! Greedy tracker-to-bone assignment.
//!
//! Landmarks are processed in priority order and each takes the nearest
//! tracker still in the pool. There is no backtracking: a higher-priority
//! landmark keeps its tracker even if a later landmark would have fit it
//! more tightly, so core body points are never starved by limbs.

use glam::Vec3;

use crate::config::CalibrationConfig;
use crate::error::LookupError;
use crate::host::{Avatar, HumanBone};
use crate::scene::{NodeId, Scene};
use crate::tracking::TrackedDevice;

use super::CalibrationPoint;

/// A landmark to match: the bone to measure and the bone to use if the
/// skeleton lacks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkSpec {
    pub point: CalibrationPoint,
    pub bone: HumanBone,
    pub fallback: HumanBone,
}

impl LandmarkSpec {
    pub const fn new(point: CalibrationPoint, bone: HumanBone, fallback: HumanBone) -> Self {
        Self {
            point,
            bone,
            fallback,
        }
    }

    /// Priority-ordered landmarks for a capture pass.
    ///
    /// Hips, then feet, then the optional elbow, knee and chest goals.
    /// Hands are never matched.
    pub fn plan(config: &CalibrationConfig) -> Vec<LandmarkSpec> {
        use CalibrationPoint as P;
        use HumanBone as B;

        let (left_foot, right_foot) = if config.map_toes {
            (B::LeftToes, B::RightToes)
        } else {
            (B::LeftFoot, B::RightFoot)
        };

        let mut plan = vec![
            Self::new(P::Hip, B::Hips, B::Hips),
            Self::new(P::LeftFoot, left_foot, B::LeftFoot),
            Self::new(P::RightFoot, right_foot, B::RightFoot),
        ];

        if config.use_elbow_trackers {
            plan.push(Self::new(P::LeftElbow, B::LeftLowerArm, B::Hips));
            plan.push(Self::new(P::RightElbow, B::RightLowerArm, B::Hips));
        }
        if config.use_knee_trackers {
            plan.push(Self::new(P::LeftKnee, B::LeftLowerLeg, B::Hips));
            plan.push(Self::new(P::RightKnee, B::RightLowerLeg, B::Hips));
        }
        if config.use_chest_tracker {
            plan.push(Self::new(P::Chest, B::UpperChest, B::Chest));
        }

        plan
    }
}

/// A tracker still available for assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerCandidate {
    pub node: NodeId,
    pub index: u32,
    /// World position when the pool was built
    pub position: Vec3,
}

/// A landmark paired with its tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub point: CalibrationPoint,
    pub tracker: TrackerCandidate,
    /// The bone actually measured (primary or fallback)
    pub bone: NodeId,
}

/// Pool of unassigned trackers.
#[derive(Debug, Clone, Default)]
pub struct BoneTrackerMatcher {
    pool: Vec<TrackerCandidate>,
}

impl BoneTrackerMatcher {
    pub fn new(pool: Vec<TrackerCandidate>) -> Self {
        Self { pool }
    }

    /// Build the pool from live devices. Devices that are not tracking or
    /// have no scene node are left out.
    pub fn from_devices(devices: &[TrackedDevice], scene: &Scene) -> Self {
        let pool = devices
            .iter()
            .filter_map(|d| {
                let index = d.index?;
                let position = scene.world_position(d.node)?;
                Some(TrackerCandidate {
                    node: d.node,
                    index,
                    position,
                })
            })
            .collect();
        Self { pool }
    }

    pub fn remaining(&self) -> &[TrackerCandidate] {
        &self.pool
    }

    /// Remove and return the tracker nearest to `position`.
    ///
    /// Ties go to the tracker listed first. Trackers at a non-finite
    /// distance are never claimed.
    pub fn claim_nearest(&mut self, position: Vec3) -> Option<TrackerCandidate> {
        let mut best = None;
        let mut best_distance = f32::INFINITY;
        for (i, candidate) in self.pool.iter().enumerate() {
            let distance = candidate.position.distance(position);
            if distance < best_distance {
                best = Some(i);
                best_distance = distance;
            }
        }

        best.map(|i| self.pool.remove(i))
    }

    /// Match every landmark of `plan`, in order.
    ///
    /// Returns one entry per landmark. A missing bone or an exhausted pool
    /// leaves that landmark unmatched without affecting the others.
    pub fn assign(
        &mut self,
        plan: &[LandmarkSpec],
        avatar: &Avatar,
        scene: &Scene,
    ) -> Vec<Result<Assignment, LookupError>> {
        plan.iter()
            .map(|spec| {
                let bone = avatar
                    .bone(scene, spec.bone)
                    .or_else(|| avatar.bone(scene, spec.fallback))
                    .ok_or(LookupError::MissingBone { bone: spec.bone })?;
                let bone_position = scene
                    .world_position(bone)
                    .ok_or(LookupError::MissingNode(bone))?;

                let tracker = self.claim_nearest(bone_position).ok_or_else(|| {
                    tracing::info!("Null target for bone {}", spec.bone);
                    LookupError::NoTracker { point: spec.point }
                })?;

                tracing::debug!(
                    "Matched {} to tracker {} ({:.3} m)",
                    spec.point,
                    tracker.index,
                    tracker.position.distance(bone_position)
                );

                Ok(Assignment {
                    point: spec.point,
                    tracker,
                    bone,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcal_geom::Pose;

    struct Rig {
        scene: Scene,
        avatar: Avatar,
    }

    fn rig() -> Rig {
        let mut scene = Scene::new();
        let root = scene.spawn("avatar", None, Pose::IDENTITY);
        let hips = scene.spawn("hips", Some(root), Pose::from_position(Vec3::new(0.0, 1.0, 0.0)));
        let left_foot = scene.spawn("leftFoot", Some(root), Pose::from_position(Vec3::new(-0.1, 0.1, 0.0)));
        let right_foot = scene.spawn("rightFoot", Some(root), Pose::from_position(Vec3::new(0.1, 0.1, 0.0)));
        let avatar = Avatar::new("avtr_test", root)
            .with_bone(HumanBone::Hips, hips)
            .with_bone(HumanBone::LeftFoot, left_foot)
            .with_bone(HumanBone::RightFoot, right_foot);
        Rig { scene, avatar }
    }

    fn candidate(scene: &mut Scene, index: u32, position: Vec3) -> TrackerCandidate {
        let node = scene.spawn(format!("tracker{}", index), None, Pose::from_position(position));
        TrackerCandidate {
            node,
            index,
            position,
        }
    }

    fn feet_plan() -> Vec<LandmarkSpec> {
        LandmarkSpec::plan(&CalibrationConfig::default())
    }

    #[test]
    fn test_plan_order() {
        let mut config = CalibrationConfig::default();
        config.use_elbow_trackers = true;
        config.use_knee_trackers = true;
        config.use_chest_tracker = true;
        config.map_toes = true;

        let points: Vec<_> = LandmarkSpec::plan(&config).iter().map(|s| s.point).collect();
        use CalibrationPoint::*;
        assert_eq!(
            points,
            vec![Hip, LeftFoot, RightFoot, LeftElbow, RightElbow, LeftKnee, RightKnee, Chest]
        );
        assert_eq!(LandmarkSpec::plan(&config)[1].bone, HumanBone::LeftToes);
        assert_eq!(feet_plan().len(), 3);
    }

    #[test]
    fn test_claim_nearest_removes_from_pool() {
        let mut scene = Scene::new();
        let a = candidate(&mut scene, 1, Vec3::new(0.0, 0.0, 0.0));
        let b = candidate(&mut scene, 2, Vec3::new(1.0, 0.0, 0.0));
        let mut matcher = BoneTrackerMatcher::new(vec![a, b]);

        assert_eq!(matcher.claim_nearest(Vec3::new(0.9, 0.0, 0.0)), Some(b));
        assert_eq!(matcher.claim_nearest(Vec3::new(0.9, 0.0, 0.0)), Some(a));
        assert_eq!(matcher.claim_nearest(Vec3::ZERO), None);
    }

    #[test]
    fn test_nan_tracker_never_claimed() {
        let mut scene = Scene::new();
        let lost = candidate(&mut scene, 1, Vec3::new(f32::NAN, 0.0, 0.0));
        let good = candidate(&mut scene, 2, Vec3::new(0.0, 1.0, 0.0));
        let mut matcher = BoneTrackerMatcher::new(vec![lost, good]);

        let claimed = matcher.claim_nearest(Vec3::new(0.0, 1.0, 0.0)).unwrap();
        assert_eq!(claimed.index, 2);

        // Only the lost tracker is left, and it can't be claimed
        assert!(matcher.claim_nearest(Vec3::ZERO).is_none());
        assert_eq!(matcher.remaining().len(), 1);
    }

    #[test]
    fn test_higher_priority_never_starved() {
        let Rig { mut scene, avatar } = rig();
        // Both trackers sit closest to the right foot; priority still wins.
        let t1 = candidate(&mut scene, 1, Vec3::new(0.1, 0.5, 0.0));
        let t2 = candidate(&mut scene, 2, Vec3::new(0.1, 0.12, 0.0));
        let mut matcher = BoneTrackerMatcher::new(vec![t1, t2]);

        let result = matcher.assign(&feet_plan(), &avatar, &scene);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].as_ref().unwrap().point, CalibrationPoint::Hip);
        assert_eq!(result[0].as_ref().unwrap().tracker, t1);
        assert_eq!(result[1].as_ref().unwrap().point, CalibrationPoint::LeftFoot);
        assert_eq!(result[1].as_ref().unwrap().tracker, t2);
        assert_eq!(
            result[2],
            Err(LookupError::NoTracker {
                point: CalibrationPoint::RightFoot
            })
        );
    }

    #[test]
    fn test_greedy_is_deterministic() {
        let Rig { mut scene, avatar } = rig();
        let pool: Vec<_> = [
            Vec3::new(0.05, 0.95, 0.1),
            Vec3::new(-0.12, 0.08, 0.02),
            Vec3::new(0.11, 0.09, -0.03),
            Vec3::new(0.0, 0.1, 0.0),
        ]
        .iter()
        .enumerate()
        .map(|(i, &p)| candidate(&mut scene, i as u32, p))
        .collect();

        let first = BoneTrackerMatcher::new(pool.clone()).assign(&feet_plan(), &avatar, &scene);
        for _ in 0..10 {
            let again = BoneTrackerMatcher::new(pool.clone()).assign(&feet_plan(), &avatar, &scene);
            assert_eq!(first, again);
        }

        let indices: Vec<u32> = first.iter().map(|r| r.as_ref().unwrap().tracker.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_fallback_bone() {
        let Rig { mut scene, avatar } = rig();
        let t = candidate(&mut scene, 7, Vec3::new(-0.1, 0.0, 0.0));
        let mut matcher = BoneTrackerMatcher::new(vec![t]);

        // No toes on this skeleton: the left foot bone is measured instead.
        let spec = LandmarkSpec::new(CalibrationPoint::LeftFoot, HumanBone::LeftToes, HumanBone::LeftFoot);
        let result = matcher.assign(&[spec], &avatar, &scene);
        let assignment = result[0].as_ref().unwrap();
        assert_eq!(Some(assignment.bone), avatar.bone(&scene, HumanBone::LeftFoot));
    }

    #[test]
    fn test_missing_bone_keeps_tracker_in_pool() {
        let Rig { mut scene, avatar } = rig();
        let t = candidate(&mut scene, 3, Vec3::ZERO);
        let mut matcher = BoneTrackerMatcher::new(vec![t]);

        let spec = LandmarkSpec::new(CalibrationPoint::Chest, HumanBone::UpperChest, HumanBone::Chest);
        let result = matcher.assign(&[spec], &avatar, &scene);
        assert_eq!(
            result[0],
            Err(LookupError::MissingBone {
                bone: HumanBone::UpperChest
            })
        );
        assert_eq!(matcher.remaining().len(), 1);
    }

    #[test]
    fn test_from_devices_skips_untracked() {
        let mut scene = Scene::new();
        let a = scene.spawn("a", None, Pose::from_position(Vec3::X));
        let b = scene.spawn("b", None, Pose::IDENTITY);
        let devices = [
            TrackedDevice { node: a, index: Some(3) },
            TrackedDevice { node: b, index: None },
        ];
        let matcher = BoneTrackerMatcher::from_devices(&devices, &scene);
        assert_eq!(matcher.remaining().len(), 1);
        assert_eq!(matcher.remaining()[0].index, 3);
        assert_eq!(matcher.remaining()[0].position, Vec3::X);
    }
}
