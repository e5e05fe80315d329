//! Simulated tracking rig
//!
//! A headset, two hand controllers and up to eight body trackers standing in
//! a play space, plus a host that records what calibration asks of it. Used
//! by the demo binary and the integration tests.

use std::collections::{HashMap, HashSet};

use glam::{Quat, Vec3};
use rigcal_geom::Pose;

use crate::config::SimulationConfig;
use crate::host::{Avatar, Host, HostEnv, HumanBone, IkSolver};
use crate::scene::{NodeId, Scene};
use crate::tracking::{TrackedDevice, TrackingSystem};

/// Where body trackers are strapped for a user of height `h`, in the order
/// they are handed out.
fn tracker_spots(h: f32) -> [(&'static str, Vec3); 8] {
    [
        ("hip", Vec3::new(0.0, 0.53 * h, -0.06)),
        ("left-foot", Vec3::new(-0.1, 0.04 * h + 0.03, 0.03)),
        ("right-foot", Vec3::new(0.1, 0.04 * h + 0.03, 0.03)),
        ("left-knee", Vec3::new(-0.1, 0.29 * h, 0.05)),
        ("right-knee", Vec3::new(0.1, 0.29 * h, 0.05)),
        ("left-elbow", Vec3::new(-0.25 * h, 0.83 * h, -0.03)),
        ("right-elbow", Vec3::new(0.25 * h, 0.83 * h, -0.03)),
        ("chest", Vec3::new(0.0, 0.72 * h, 0.08)),
    ]
}

const HMD_INDEX: u32 = 0;
const FIRST_TRACKER_INDEX: u32 = 3;

/// Serial the simulated hardware reports for a device index.
pub fn serial_for(index: u32) -> String {
    format!("LHR-{:08X}", 0x5EED_0000u32 + index)
}

/// Tracking subsystem backed by the simulated devices.
#[derive(Debug, Clone, Default)]
pub struct SimTracking {
    devices: Vec<TrackedDevice>,
    controllers: [Option<NodeId>; 2],
    failing: HashSet<u32>,
}

impl TrackingSystem for SimTracking {
    fn devices(&self) -> Vec<TrackedDevice> {
        self.devices.clone()
    }

    fn hand_controllers(&self) -> [Option<NodeId>; 2] {
        self.controllers
    }

    fn serial_number(&self, index: u32) -> Result<String, String> {
        if self.failing.contains(&index) {
            return Err("TrackedProp_UnknownProperty".to_string());
        }
        Ok(serial_for(index))
    }
}

/// Host services for the simulated rig.
#[derive(Debug, Default)]
pub struct SimHost {
    tracking: Option<SimTracking>,
    triggers: [f32; 2],
    reference_poses: usize,
    trackers_visible: bool,
}

impl SimHost {
    /// Number of reference poses currently pushed
    pub fn reference_pose_depth(&self) -> usize {
        self.reference_poses
    }

    pub fn trackers_visible(&self) -> bool {
        self.trackers_visible
    }

    /// Drop the tracking subsystem entirely.
    pub fn disconnect_tracking(&mut self) {
        self.tracking = None;
    }
}

impl Host for SimHost {
    fn tracking(&self) -> Option<&dyn TrackingSystem> {
        self.tracking.as_ref().map(|t| t as &dyn TrackingSystem)
    }

    fn trigger_axes(&self) -> [f32; 2] {
        self.triggers
    }

    fn push_reference_pose(&mut self, muscles: &[f32]) {
        tracing::debug!("Reference pose pushed ({} muscles)", muscles.len());
        self.reference_poses += 1;
    }

    fn pop_reference_pose(&mut self) {
        self.reference_poses = self.reference_poses.saturating_sub(1);
    }

    fn set_tracker_visibility(&mut self, visible: bool) {
        self.trackers_visible = visible;
    }
}

/// Scene, solver and host for one simulated user.
pub struct SimulatedRig {
    pub scene: Scene,
    pub solver: IkSolver,
    pub host: SimHost,
    height: f32,
    anchor: NodeId,
    hmd: NodeId,
    controllers: [NodeId; 2],
    trackers: Vec<NodeId>,
    indices: HashMap<NodeId, u32>,
}

impl SimulatedRig {
    pub fn new(config: &SimulationConfig) -> Self {
        let h = config.avatar_height;
        let mut scene = Scene::new();
        let anchor = scene.spawn("playspace", None, Pose::IDENTITY);

        let hmd = scene.spawn("hmd", Some(anchor), Pose::from_position(Vec3::new(0.0, 0.94 * h, 0.05)));
        let head_effector = scene.spawn(
            "head-effector",
            Some(hmd),
            Pose::from_position(Vec3::new(0.0, -0.02 * h, -0.05)),
        );

        let controllers = [-1.0, 1.0].map(|side: f32| {
            scene.spawn(
                if side < 0.0 { "controller-left" } else { "controller-right" },
                Some(anchor),
                Pose::from_position(Vec3::new(side * 0.5 * h, 0.82 * h, 0.0)),
            )
        });
        let hand_effectors = controllers.map(|c| scene.spawn("hand-effector", Some(c), Pose::IDENTITY));

        let spots = tracker_spots(h);
        let count = config.tracker_count.min(spots.len());
        if count < config.tracker_count {
            tracing::warn!("Only {} tracker spots, ignoring the rest", spots.len());
        }
        let trackers: Vec<NodeId> = spots[..count]
            .iter()
            .map(|(name, position)| {
                scene.spawn(format!("tracker-{}", name), Some(anchor), Pose::from_position(*position))
            })
            .collect();

        let mut indices = HashMap::new();
        indices.insert(hmd, HMD_INDEX);
        indices.insert(controllers[0], 1);
        indices.insert(controllers[1], 2);
        for (i, &tracker) in trackers.iter().enumerate() {
            indices.insert(tracker, FIRST_TRACKER_INDEX + i as u32);
        }

        let devices = controllers
            .iter()
            .chain(trackers.iter())
            .map(|&node| TrackedDevice {
                node,
                index: indices.get(&node).copied(),
            })
            .collect();

        let host = SimHost {
            tracking: Some(SimTracking {
                devices,
                controllers: controllers.map(Some),
                failing: HashSet::new(),
            }),
            ..SimHost::default()
        };

        let solver = IkSolver {
            head_effector: Some(head_effector),
            left_hand_effector: Some(hand_effectors[0]),
            right_hand_effector: Some(hand_effectors[1]),
            ..IkSolver::default()
        };

        Self {
            scene,
            solver,
            host,
            height: h,
            anchor,
            hmd,
            controllers,
            trackers,
            indices,
        }
    }

    pub fn env(&mut self) -> HostEnv<'_> {
        HostEnv::new(&mut self.scene, &mut self.solver, &mut self.host)
    }

    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    pub fn hmd(&self) -> NodeId {
        self.hmd
    }

    pub fn controllers(&self) -> [NodeId; 2] {
        self.controllers
    }

    /// Body trackers in hand-out order: hip, feet, knees, elbows, chest.
    pub fn trackers(&self) -> &[NodeId] {
        &self.trackers
    }

    pub fn index_of(&self, node: NodeId) -> Option<u32> {
        self.indices.get(&node).copied()
    }

    pub fn set_triggers(&mut self, left: f32, right: f32) {
        self.host.triggers = [left.clamp(0.0, 1.0), right.clamp(0.0, 1.0)];
    }

    /// Turn the user in place: every device swings about the headset.
    pub fn turn_user(&mut self, yaw: f32) {
        let Some(pivot) = self.scene.world_position(self.hmd) else {
            return;
        };
        let rotation = Quat::from_rotation_y(yaw);
        for node in [self.hmd]
            .into_iter()
            .chain(self.controllers)
            .chain(self.trackers.iter().copied())
        {
            self.scene.rotate_around(node, pivot, rotation);
        }
    }

    /// Walk the user (and every device) by `offset`.
    pub fn move_user(&mut self, offset: Vec3) {
        for node in [self.hmd]
            .into_iter()
            .chain(self.controllers)
            .chain(self.trackers.iter().copied())
        {
            if let Some(position) = self.scene.world_position(node) {
                self.scene.set_world_position(node, position + offset);
            }
        }
    }

    /// Make serial queries for a device fail.
    pub fn fail_serial(&mut self, index: u32) {
        if let Some(tracking) = self.host.tracking.as_mut() {
            tracking.failing.insert(index);
        }
    }

    /// Mark a device as not tracking.
    pub fn set_untracked(&mut self, node: NodeId) {
        if let Some(tracking) = self.host.tracking.as_mut() {
            for device in tracking.devices.iter_mut().filter(|d| d.node == node) {
                device.index = None;
            }
        }
    }

    /// Build an avatar at the origin facing +Z, sized to the rig, with a
    /// mirror clone.
    pub fn spawn_avatar(&mut self, id: &str) -> Avatar {
        let h = self.height;
        let scene = &mut self.scene;
        let root = scene.spawn(format!("avatar:{}", id), None, Pose::IDENTITY);

        let mut bone = |name: HumanBone, parent: NodeId, world: Vec3| {
            let node = scene.spawn(name.as_str(), Some(parent), Pose::IDENTITY);
            scene.set_world_position(node, world);
            (name, node)
        };

        let (_, hips) = bone(HumanBone::Hips, root, Vec3::new(0.0, 0.53 * h, 0.0));
        let (_, chest) = bone(HumanBone::Chest, hips, Vec3::new(0.0, 0.65 * h, 0.0));
        let (_, upper_chest) = bone(HumanBone::UpperChest, chest, Vec3::new(0.0, 0.72 * h, 0.0));
        let head = bone(HumanBone::Head, upper_chest, Vec3::new(0.0, 0.92 * h, 0.0));

        let mut bones = vec![
            (HumanBone::Hips, hips),
            (HumanBone::Chest, chest),
            (HumanBone::UpperChest, upper_chest),
            head,
        ];

        for (side, lower_arm, hand, lower_leg, foot, toes) in [
            (
                -1.0f32,
                HumanBone::LeftLowerArm,
                HumanBone::LeftHand,
                HumanBone::LeftLowerLeg,
                HumanBone::LeftFoot,
                HumanBone::LeftToes,
            ),
            (
                1.0,
                HumanBone::RightLowerArm,
                HumanBone::RightHand,
                HumanBone::RightLowerLeg,
                HumanBone::RightFoot,
                HumanBone::RightToes,
            ),
        ] {
            let arm = bone(lower_arm, upper_chest, Vec3::new(side * 0.25 * h, 0.82 * h, 0.0));
            let wrist = bone(hand, arm.1, Vec3::new(side * 0.45 * h, 0.82 * h, 0.0));
            let leg = bone(lower_leg, hips, Vec3::new(side * 0.1, 0.28 * h, 0.0));
            let ankle = bone(foot, leg.1, Vec3::new(side * 0.1, 0.04 * h, 0.0));
            let ball = bone(toes, ankle.1, Vec3::new(side * 0.1, 0.01 * h, 0.1));
            bones.extend([arm, wrist, leg, ankle, ball]);
        }

        let mirror_root = scene.spawn(format!("mirror:{}", id), None, Pose::IDENTITY);
        let mirror_hips = scene.spawn("hips", Some(mirror_root), Pose::from_position(Vec3::new(0.0, 0.53 * h, 0.0)));

        bones
            .into_iter()
            .fold(Avatar::new(id, root), |avatar, (name, node)| avatar.with_bone(name, node))
            .with_mirror_hips(mirror_hips)
    }
}
