//! Transform hierarchy shared with the host.
//!
//! Trackers, skeleton bones and solver targets are all nodes in one arena.
//! World poses are resolved by walking the parent chain, the same forward
//! kinematics a renderer performs every frame.

use glam::{Quat, Vec3};
use rigcal_geom::Pose;
use std::collections::HashMap;

/// Handle to a node. Ids are never reused, so a stale handle of a destroyed
/// node stays invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: Pose,
}

/// Arena of named transform nodes.
#[derive(Debug, Default, Clone)]
pub struct Scene {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node under `parent` (or at the root) with the given local pose.
    ///
    /// A dangling parent handle creates a root node.
    pub fn spawn(&mut self, name: impl Into<String>, parent: Option<NodeId>, local: Pose) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let parent = parent.filter(|p| self.nodes.contains_key(p));
        if let Some(p) = parent {
            if let Some(node) = self.nodes.get_mut(&p) {
                node.children.push(id);
            }
        }

        self.nodes.insert(
            id,
            Node {
                name: name.into(),
                parent,
                children: Vec::new(),
                local,
            },
        );
        id
    }

    /// Remove a node and its whole subtree. Returns false if it was already gone.
    pub fn destroy(&mut self, id: NodeId) -> bool {
        let node = match self.nodes.remove(&id) {
            Some(n) => n,
            None => return false,
        };

        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|&c| c != id);
        }

        let mut stack = node.children;
        while let Some(child) = stack.pop() {
            if let Some(removed) = self.nodes.remove(&child) {
                stack.extend(removed.children);
            }
        }
        true
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn local_pose(&self, id: NodeId) -> Option<Pose> {
        self.nodes.get(&id).map(|n| n.local)
    }

    pub fn set_local_pose(&mut self, id: NodeId, local: Pose) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.local = local;
                true
            }
            None => false,
        }
    }

    /// World pose via the parent chain.
    pub fn world_pose(&self, id: NodeId) -> Option<Pose> {
        let mut node = self.nodes.get(&id)?;
        let mut world = node.local;
        while let Some(parent) = node.parent {
            node = self.nodes.get(&parent)?;
            world = node.local.mul_pose(&world);
        }
        Some(world)
    }

    /// World pose of the node's parent, or identity for root nodes.
    pub fn parent_world_pose(&self, id: NodeId) -> Option<Pose> {
        match self.nodes.get(&id)?.parent {
            Some(parent) => self.world_pose(parent),
            None => Some(Pose::IDENTITY),
        }
    }

    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        self.world_pose(id).map(|p| p.position)
    }

    pub fn world_rotation(&self, id: NodeId) -> Option<Quat> {
        self.world_pose(id).map(|p| p.rotation)
    }

    pub fn set_world_pose(&mut self, id: NodeId, world: Pose) -> bool {
        let parent = match self.parent_world_pose(id) {
            Some(p) => p,
            None => return false,
        };
        self.set_local_pose(id, parent.relative(&world))
    }

    pub fn set_world_position(&mut self, id: NodeId, position: Vec3) -> bool {
        match self.world_pose(id) {
            Some(world) => self.set_world_pose(id, Pose::new(position, world.rotation)),
            None => false,
        }
    }

    /// Rotate a node in world space around `pivot`.
    pub fn rotate_around(&mut self, id: NodeId, pivot: Vec3, rotation: Quat) -> bool {
        match self.world_pose(id) {
            Some(world) => self.set_world_pose(id, world.rotated_around(pivot, rotation)),
            None => false,
        }
    }
}
