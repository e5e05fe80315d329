//! Tracker-to-skeleton calibration
//!
//! Captures where each body tracker sits relative to the avatar's bones,
//! stores it per avatar and as an avatar-agnostic rig layout, and binds the
//! stored offsets to IK solver targets.

pub mod binder;
pub mod matcher;
pub mod rebase;
pub mod session;
pub mod store;

pub use binder::{ApplyReport, IkTargetBinder};
pub use matcher::{BoneTrackerMatcher, LandmarkSpec, TrackerCandidate};
pub use rebase::{RebaseOutcome, UniversalRebaser, YawCorrection};
pub use session::{CalibrationSession, SessionState};
pub use store::CalibrationStore;

use glam::{Quat, Vec3};

/// Skeleton landmarks that can be calibrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CalibrationPoint {
    Head,
    LeftHand,
    RightHand,
    Hip,
    LeftFoot,
    RightFoot,
    LeftKnee,
    RightKnee,
    LeftElbow,
    RightElbow,
    Chest,
}

impl CalibrationPoint {
    pub const ALL: [CalibrationPoint; 11] = [
        Self::Head,
        Self::LeftHand,
        Self::RightHand,
        Self::Hip,
        Self::LeftFoot,
        Self::RightFoot,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftElbow,
        Self::RightElbow,
        Self::Chest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "Head",
            Self::LeftHand => "LeftHand",
            Self::RightHand => "RightHand",
            Self::Hip => "Hip",
            Self::LeftFoot => "LeftFoot",
            Self::RightFoot => "RightFoot",
            Self::LeftKnee => "LeftKnee",
            Self::RightKnee => "RightKnee",
            Self::LeftElbow => "LeftElbow",
            Self::RightElbow => "RightElbow",
            Self::Chest => "Chest",
        }
    }

    /// Hands only refine orientation on top of the existing hand effectors.
    pub fn is_hand(&self) -> bool {
        matches!(self, Self::LeftHand | Self::RightHand)
    }

    /// Auxiliary goals that bias bending instead of pinning an end effector.
    pub fn is_bend_goal(&self) -> bool {
        matches!(
            self,
            Self::LeftKnee | Self::RightKnee | Self::LeftElbow | Self::RightElbow | Self::Chest
        )
    }
}

impl std::fmt::Display for CalibrationPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored offset.
///
/// What frame `position` and `rotation` are relative to depends on the map
/// holding the record: per-avatar records are relative to the matched
/// tracker, universal records are the tracker's pose relative to its
/// play-space anchor. Never reinterpret one as the other.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationData {
    pub position: Vec3,
    pub rotation: Quat,
    pub tracker_serial: String,
}

impl CalibrationData {
    pub fn new(position: Vec3, rotation: Quat, tracker_serial: impl Into<String>) -> Self {
        Self {
            position,
            rotation,
            tracker_serial: tracker_serial.into(),
        }
    }
}

/// Muscle values of the forced T-pose held during capture.
pub const REFERENCE_POSE: [f32; 95] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0, 0.6001086, 8.6213e-05, -0.0003308152,
    0.9999163, -9.559652e-06, 3.41413e-08, -3.415095e-06, -1.024528e-07, 0.6001086, 8.602679e-05, -0.0003311098,
    0.9999163, -9.510122e-06, 1.707468e-07, -2.732077e-06, 2.035554e-15, -2.748694e-07, 2.619475e-07, 0.401967,
    0.3005583, 0.04102772, 0.9998822, -0.04634236, 0.002522987, 0.0003842837, -2.369134e-07, -2.232262e-07,
    0.4019674, 0.3005582, 0.04103433, 0.9998825, -0.04634996, 0.00252335, 0.000383302, -1.52127,
    0.2634507, 0.4322457, 0.6443988, 0.6669409, -0.4663372, 0.8116828, 0.8116829, 0.6678119,
    -0.6186608, 0.8116842, 0.8116842, 0.6677991, -0.619225, 0.8116842, 0.811684, 0.6670032,
    -0.465875, 0.811684, 0.8116836, -1.520098, 0.2613016, 0.432256, 0.6444503, 0.6668426,
    -0.4670413, 0.8116828, 0.8116828, 0.6677986, -0.6192409, 0.8116841, 0.811684, 0.6677839,
    -0.6198869, 0.8116839, 0.8116838, 0.6668782, -0.4667901, 0.8116842, 0.811684,
];
