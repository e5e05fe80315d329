//! Capabilities consumed from the host application.
//!
//! The host owns rendering, animation, input and the IK solver. Calibration
//! only sees them through the types in this module.

use std::collections::HashMap;

use crate::scene::{NodeId, Scene};
use crate::tracking::TrackingSystem;

/// Humanoid bones the calibration reads from an avatar skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HumanBone {
    Hips,
    Chest,
    UpperChest,
    Head,
    LeftLowerArm,
    RightLowerArm,
    LeftHand,
    RightHand,
    LeftLowerLeg,
    RightLowerLeg,
    LeftFoot,
    RightFoot,
    LeftToes,
    RightToes,
}

impl HumanBone {
    /// VRM humanoid bone name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hips => "hips",
            Self::Chest => "chest",
            Self::UpperChest => "upperChest",
            Self::Head => "head",
            Self::LeftLowerArm => "leftLowerArm",
            Self::RightLowerArm => "rightLowerArm",
            Self::LeftHand => "leftHand",
            Self::RightHand => "rightHand",
            Self::LeftLowerLeg => "leftLowerLeg",
            Self::RightLowerLeg => "rightLowerLeg",
            Self::LeftFoot => "leftFoot",
            Self::RightFoot => "rightFoot",
            Self::LeftToes => "leftToes",
            Self::RightToes => "rightToes",
        }
    }
}

impl std::fmt::Display for HumanBone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An avatar instance living in the scene.
#[derive(Debug, Clone)]
pub struct Avatar {
    /// Stable avatar identifier (the key for per-avatar calibration)
    pub id: String,
    /// Avatar root node. The avatar exists while this node exists.
    pub root: NodeId,
    /// Bone name → scene node
    pub bones: HashMap<HumanBone, NodeId>,
    /// Hips of the mirror clone, kept in sync while calibrating
    pub mirror_hips: Option<NodeId>,
}

impl Avatar {
    pub fn new(id: impl Into<String>, root: NodeId) -> Self {
        Self {
            id: id.into(),
            root,
            bones: HashMap::new(),
            mirror_hips: None,
        }
    }

    pub fn with_bone(mut self, bone: HumanBone, node: NodeId) -> Self {
        self.bones.insert(bone, node);
        self
    }

    pub fn with_mirror_hips(mut self, node: NodeId) -> Self {
        self.mirror_hips = Some(node);
        self
    }

    pub fn exists(&self, scene: &Scene) -> bool {
        scene.contains(self.root)
    }

    /// Bone node, if the skeleton has it and it is still alive.
    pub fn bone(&self, scene: &Scene, bone: HumanBone) -> Option<NodeId> {
        self.bones
            .get(&bone)
            .copied()
            .filter(|&node| scene.contains(node))
    }
}

/// Per-limb weights for the auxiliary solver goals, 0.0 - 1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BendWeights {
    pub left_elbow: f32,
    pub right_elbow: f32,
    pub left_knee: f32,
    pub right_knee: f32,
    pub chest: f32,
}

/// Target slots of the host's full-body IK solver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IkSolver {
    /// Head effector target. Its parent node is the head tracking anchor.
    pub head_effector: Option<NodeId>,
    /// Existing hand effector targets that drive hand position
    pub left_hand_effector: Option<NodeId>,
    pub right_hand_effector: Option<NodeId>,

    pub pelvis_target: Option<NodeId>,
    pub left_leg_target: Option<NodeId>,
    pub right_leg_target: Option<NodeId>,
    pub left_arm_target: Option<NodeId>,
    pub right_arm_target: Option<NodeId>,
    pub left_leg_bend_goal: Option<NodeId>,
    pub right_leg_bend_goal: Option<NodeId>,
    pub left_arm_bend_goal: Option<NodeId>,
    pub right_arm_bend_goal: Option<NodeId>,
    pub chest_goal: Option<NodeId>,

    pub bend_weights: BendWeights,
}

/// Host services outside the scene graph.
pub trait Host {
    /// The tracking subsystem, or `None` if the host has none.
    fn tracking(&self) -> Option<&dyn TrackingSystem>;

    /// The two analog index-trigger axes for this frame, each 0.0 - 1.0.
    fn trigger_axes(&self) -> [f32; 2];

    /// Force the avatar into a reference pose described by muscle values.
    fn push_reference_pose(&mut self, muscles: &[f32]);

    /// Release the pose pushed by [`Host::push_reference_pose`].
    fn pop_reference_pose(&mut self);

    /// Show or hide tracker models.
    fn set_tracker_visibility(&mut self, visible: bool);
}

/// Everything a calibration step touches during one frame.
pub struct HostEnv<'a> {
    pub scene: &'a mut Scene,
    pub solver: &'a mut IkSolver,
    pub host: &'a mut dyn Host,
}

impl<'a> HostEnv<'a> {
    pub fn new(scene: &'a mut Scene, solver: &'a mut IkSolver, host: &'a mut dyn Host) -> Self {
        Self {
            scene,
            solver,
            host,
        }
    }
}
