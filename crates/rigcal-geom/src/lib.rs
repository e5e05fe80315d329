//! Rigid frame transforms used by tracker calibration.
//!
//! Every stored calibration offset is built from two primitives,
//! [`local_position`] and [`local_rotation`]. What differs between calibration
//! records is only which frame is passed as the parent.

use glam::{Quat, Vec3};

/// Position and orientation of a frame, without scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation,
        }
    }

    /// Compose `self` (parent) with a child pose expressed in `self`'s space.
    pub fn mul_pose(&self, local: &Pose) -> Pose {
        Pose {
            position: self.transform_point(local.position),
            rotation: (self.rotation * local.rotation).normalize(),
        }
    }

    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose {
            position: -(rotation * self.position),
            rotation,
        }
    }

    /// Local point to world space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    /// World point to local space.
    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.position)
    }

    /// The frame's +Z axis in world space.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// Express `world` relative to this frame.
    pub fn relative(&self, world: &Pose) -> Pose {
        Pose {
            position: local_position(self, world.position),
            rotation: local_rotation(self, world.rotation),
        }
    }

    /// Rotate the pose around a world-space pivot.
    pub fn rotated_around(&self, pivot: Vec3, rotation: Quat) -> Pose {
        Pose {
            position: pivot + rotation * (self.position - pivot),
            rotation: (rotation * self.rotation).normalize(),
        }
    }
}

/// Inverse-transform a world point into `parent`'s local space.
pub fn local_position(parent: &Pose, child_world: Vec3) -> Vec3 {
    parent.inverse_transform_point(child_world)
}

/// Orientation of `child_world` relative to `parent`.
pub fn local_rotation(parent: &Pose, child_world: Quat) -> Quat {
    (parent.rotation.inverse() * child_world).normalize()
}

pub fn world_position(parent: &Pose, local: Vec3) -> Vec3 {
    parent.transform_point(local)
}

pub fn world_rotation(parent: &Pose, local: Quat) -> Quat {
    (parent.rotation * local).normalize()
}

/// Project `v` onto the horizontal (XZ) plane and normalize.
///
/// Returns `None` when `v` is (nearly) vertical.
pub fn horizontal(v: Vec3) -> Option<Vec3> {
    Vec3::new(v.x, 0.0, v.z).try_normalize()
}

/// Signed rotation about +Y carrying horizontal direction `from` onto `to`.
///
/// Both inputs are projected onto the horizontal plane first. The result is
/// always a pure yaw, even for opposite directions where a shortest-arc
/// rotation would be free to pick any perpendicular axis.
pub fn yaw_between(from: Vec3, to: Vec3) -> Option<Quat> {
    let from = horizontal(from)?;
    let to = horizontal(to)?;
    let angle = from.cross(to).y.atan2(from.dot(to));
    Some(Quat::from_rotation_y(angle))
}
