//! IK target materialization.
//!
//! Turns stored per-avatar offsets into scene nodes the solver reads. Each
//! `apply` owns exactly one generation of target nodes; the previous
//! generation is destroyed first.

use rigcal_geom::Pose;

use crate::error::LookupError;
use crate::host::IkSolver;
use crate::scene::{NodeId, Scene};
use crate::tracking::TrackerRegistry;

use super::store::{CalibrationStore, PointMap};
use super::CalibrationPoint;

/// What happened to each stored point during an apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub bound: Vec<CalibrationPoint>,
    pub skipped: Vec<(CalibrationPoint, LookupError)>,
}

impl ApplyReport {
    pub fn is_bound(&self, point: CalibrationPoint) -> bool {
        self.bound.contains(&point)
    }
}

/// Owner of the ephemeral solver targets.
#[derive(Debug, Default)]
pub struct IkTargetBinder {
    targets: Vec<NodeId>,
}

impl IkTargetBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target nodes created by the last apply.
    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    /// Destroy every target node this binder owns and empty the solver
    /// slots that pointed at them.
    pub fn release(&mut self, scene: &mut Scene, solver: &mut IkSolver) {
        for target in self.targets.drain(..) {
            scene.destroy(target);
        }

        for slot in [
            &mut solver.pelvis_target,
            &mut solver.left_leg_target,
            &mut solver.right_leg_target,
            &mut solver.left_arm_target,
            &mut solver.right_arm_target,
            &mut solver.left_leg_bend_goal,
            &mut solver.right_leg_bend_goal,
            &mut solver.left_arm_bend_goal,
            &mut solver.right_arm_bend_goal,
            &mut solver.chest_goal,
        ] {
            *slot = None;
        }
    }

    /// Bind an avatar's stored calibration to the solver.
    ///
    /// Points whose tracker can't be found leave their solver slot empty;
    /// the rest of the calibration is still applied.
    pub fn apply(
        &mut self,
        avatar_id: &str,
        store: &CalibrationStore,
        scene: &mut Scene,
        registry: &TrackerRegistry<'_>,
        solver: &mut IkSolver,
    ) -> Result<ApplyReport, LookupError> {
        let data = store.saved(avatar_id).ok_or_else(|| LookupError::NoCalibration {
            avatar_id: avatar_id.to_string(),
        })?;

        self.release(scene, solver);

        let mut generation = Generation {
            data,
            scene,
            registry,
            targets: Vec::new(),
            report: ApplyReport::default(),
        };

        use CalibrationPoint as P;
        let pelvis = generation.tracker_target(P::Hip);
        let left_leg = generation.tracker_target(P::LeftFoot);
        let right_leg = generation.tracker_target(P::RightFoot);

        let left_arm = generation.hand_target(P::LeftHand, solver.left_hand_effector);
        let right_arm = generation.hand_target(P::RightHand, solver.right_hand_effector);

        let left_leg_bend = generation.tracker_target(P::LeftKnee);
        let right_leg_bend = generation.tracker_target(P::RightKnee);
        let left_arm_bend = generation.tracker_target(P::LeftElbow);
        let right_arm_bend = generation.tracker_target(P::RightElbow);
        let chest = generation.tracker_target(P::Chest);

        let Generation {
            targets, report, ..
        } = generation;
        self.targets = targets;

        solver.pelvis_target = pelvis;
        solver.left_leg_target = left_leg;
        solver.right_leg_target = right_leg;
        solver.left_arm_target = left_arm;
        solver.right_arm_target = right_arm;
        solver.left_leg_bend_goal = left_leg_bend;
        solver.right_leg_bend_goal = right_leg_bend;
        solver.left_arm_bend_goal = left_arm_bend;
        solver.right_arm_bend_goal = right_arm_bend;
        solver.chest_goal = chest;

        tracing::info!(
            "Applied stored calibration for {} ({} bound, {} skipped)",
            avatar_id,
            report.bound.len(),
            report.skipped.len()
        );

        Ok(report)
    }
}

/// Targets being built by one apply call.
struct Generation<'a, 's> {
    data: &'a PointMap,
    scene: &'s mut Scene,
    registry: &'a TrackerRegistry<'a>,
    targets: Vec<NodeId>,
    report: ApplyReport,
}

impl Generation<'_, '_> {
    /// Target parented to the tracker with the stored offset.
    fn tracker_target(&mut self, point: CalibrationPoint) -> Option<NodeId> {
        let data = self.data.get(&point)?;

        let tracker = match self.registry.find_tracker(&data.tracker_serial) {
            Ok(tracker) => tracker,
            Err(e) => {
                tracing::info!("Null target for tracker {}", data.tracker_serial);
                self.report.skipped.push((point, e));
                return None;
            }
        };

        tracing::info!(
            "Found tracker with serial {} for point {}",
            data.tracker_serial,
            point
        );

        let target = self.scene.spawn(
            format!("ik-target:{}:{}", point, data.tracker_serial),
            Some(tracker),
            Pose::new(data.position, data.rotation),
        );
        self.targets.push(target);
        self.report.bound.push(point);
        Some(target)
    }

    /// Orientation-only target under the solver's hand effector.
    fn hand_target(&mut self, point: CalibrationPoint, effector: Option<NodeId>) -> Option<NodeId> {
        let data = self.data.get(&point)?;

        let effector = match effector.filter(|&e| self.scene.contains(e)) {
            Some(e) => e,
            None => {
                let e = LookupError::MissingEffector { point };
                tracing::warn!("{}", e);
                self.report.skipped.push((point, e));
                return None;
            }
        };

        let target = self.scene.spawn(
            format!("ik-hand-target:{}", point),
            Some(effector),
            Pose::from_rotation(data.rotation),
        );
        self.targets.push(target);
        self.report.bound.push(point);
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationData;
    use crate::tracking::{TrackedDevice, TrackingSystem};
    use glam::{Quat, Vec3};

    struct Trackers {
        devices: Vec<TrackedDevice>,
    }

    impl TrackingSystem for Trackers {
        fn devices(&self) -> Vec<TrackedDevice> {
            self.devices.clone()
        }

        fn hand_controllers(&self) -> [Option<NodeId>; 2] {
            [None, None]
        }

        fn serial_number(&self, index: u32) -> Result<String, String> {
            Ok(format!("LHR-{}", index))
        }
    }

    struct Fixture {
        scene: Scene,
        tracking: Trackers,
        solver: IkSolver,
        store: CalibrationStore,
    }

    fn fixture() -> Fixture {
        let mut scene = Scene::new();
        let anchor = scene.spawn("playspace", None, Pose::IDENTITY);
        let devices = (1..=3)
            .map(|i| TrackedDevice {
                node: scene.spawn(
                    format!("tracker{}", i),
                    Some(anchor),
                    Pose::from_position(Vec3::new(i as f32, 0.0, 0.0)),
                ),
                index: Some(i),
            })
            .collect();

        let mut solver = IkSolver::default();
        solver.left_hand_effector = Some(scene.spawn("leftHandEffector", None, Pose::IDENTITY));
        solver.right_hand_effector = Some(scene.spawn("rightHandEffector", None, Pose::IDENTITY));

        let mut store = CalibrationStore::new();
        let offset = CalibrationData::new(Vec3::new(0.0, 0.1, 0.0), Quat::from_rotation_y(0.5), "LHR-1");
        store.save("avtr", CalibrationPoint::Hip, offset);
        store.save("avtr", CalibrationPoint::LeftFoot, CalibrationData::new(Vec3::ZERO, Quat::IDENTITY, "LHR-2"));
        store.save("avtr", CalibrationPoint::RightFoot, CalibrationData::new(Vec3::ZERO, Quat::IDENTITY, "LHR-3"));
        store.save(
            "avtr",
            CalibrationPoint::LeftHand,
            CalibrationData::new(Vec3::ZERO, Quat::from_rotation_x(0.3), "LeftHand"),
        );
        store.save(
            "avtr",
            CalibrationPoint::RightHand,
            CalibrationData::new(Vec3::ZERO, Quat::from_rotation_x(-0.3), "RightHand"),
        );

        Fixture {
            scene,
            tracking: Trackers { devices },
            solver,
            store,
        }
    }

    #[test]
    fn test_apply_binds_slots() {
        let mut f = fixture();
        let registry = TrackerRegistry::new(&f.tracking);
        let mut binder = IkTargetBinder::new();

        let report = binder
            .apply("avtr", &f.store, &mut f.scene, &registry, &mut f.solver)
            .unwrap();
        assert_eq!(report.bound.len(), 5);
        assert!(report.skipped.is_empty());
        assert_eq!(binder.targets().len(), 5);

        let pelvis = f.solver.pelvis_target.unwrap();
        assert_eq!(f.scene.parent(pelvis), Some(f.tracking.devices[0].node));
        let world = f.scene.world_position(pelvis).unwrap();
        assert!((world - Vec3::new(1.0, 0.1, 0.0)).length() < 1e-5);

        // Hands ride on the existing effectors with rotation only
        let left_arm = f.solver.left_arm_target.unwrap();
        assert_eq!(f.scene.parent(left_arm), f.solver.left_hand_effector);
        let local = f.scene.local_pose(left_arm).unwrap();
        assert_eq!(local.position, Vec3::ZERO);
        assert!(local.rotation.angle_between(Quat::from_rotation_x(0.3)) < 1e-5);
    }

    #[test]
    fn test_apply_twice_keeps_one_generation() {
        let mut f = fixture();
        let registry = TrackerRegistry::new(&f.tracking);
        let mut binder = IkTargetBinder::new();

        binder
            .apply("avtr", &f.store, &mut f.scene, &registry, &mut f.solver)
            .unwrap();
        let first: Vec<NodeId> = binder.targets().to_vec();
        let nodes_after_first = f.scene.len();

        binder
            .apply("avtr", &f.store, &mut f.scene, &registry, &mut f.solver)
            .unwrap();

        assert!(first.iter().all(|&t| !f.scene.contains(t)));
        assert!(binder.targets().iter().all(|&t| f.scene.contains(t)));
        assert_eq!(f.scene.len(), nodes_after_first);
    }

    #[test]
    fn test_missing_chest_leaves_slot_unset() {
        let mut f = fixture();
        let registry = TrackerRegistry::new(&f.tracking);
        let mut binder = IkTargetBinder::new();

        let report = binder
            .apply("avtr", &f.store, &mut f.scene, &registry, &mut f.solver)
            .unwrap();
        assert!(!report.is_bound(CalibrationPoint::Chest));
        assert!(f.solver.chest_goal.is_none());
        assert!(f.solver.pelvis_target.is_some());
        assert!(f.solver.left_leg_target.is_some());
        assert!(f.solver.right_leg_target.is_some());
    }

    #[test]
    fn test_unknown_serial_degrades() {
        let mut f = fixture();
        f.store.save(
            "avtr",
            CalibrationPoint::LeftKnee,
            CalibrationData::new(Vec3::ZERO, Quat::IDENTITY, "LHR-404"),
        );
        let registry = TrackerRegistry::new(&f.tracking);
        let mut binder = IkTargetBinder::new();

        let report = binder
            .apply("avtr", &f.store, &mut f.scene, &registry, &mut f.solver)
            .unwrap();
        assert!(f.solver.left_leg_bend_goal.is_none());
        assert!(f.solver.pelvis_target.is_some());
        assert_eq!(
            report.skipped,
            vec![(
                CalibrationPoint::LeftKnee,
                LookupError::TrackerNotFound {
                    serial: "LHR-404".to_string()
                }
            )]
        );
    }

    #[test]
    fn test_no_calibration_is_untouched() {
        let mut f = fixture();
        let registry = TrackerRegistry::new(&f.tracking);
        let mut binder = IkTargetBinder::new();
        binder
            .apply("avtr", &f.store, &mut f.scene, &registry, &mut f.solver)
            .unwrap();
        let existing = binder.targets().to_vec();

        let result = binder.apply("other", &f.store, &mut f.scene, &registry, &mut f.solver);
        assert!(matches!(result, Err(LookupError::NoCalibration { .. })));
        assert_eq!(binder.targets(), existing.as_slice());
    }

    #[test]
    fn test_release() {
        let mut f = fixture();
        let registry = TrackerRegistry::new(&f.tracking);
        let mut binder = IkTargetBinder::new();
        binder
            .apply("avtr", &f.store, &mut f.scene, &registry, &mut f.solver)
            .unwrap();
        let targets = binder.targets().to_vec();

        assert!(f.solver.pelvis_target.is_some());

        binder.release(&mut f.scene, &mut f.solver);
        assert!(binder.targets().is_empty());
        assert!(targets.iter().all(|&t| !f.scene.contains(t)));
        assert!(f.solver.pelvis_target.is_none());
        assert!(f.solver.left_arm_target.is_none());
        assert!(f.solver.chest_goal.is_none());
        // Effectors belong to the host and stay put
        assert!(f.solver.left_hand_effector.is_some());
    }
}
