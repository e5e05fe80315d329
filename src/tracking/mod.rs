//! Tracking hardware module
//!
//! Enumerates tracking devices and resolves their stable hardware serials.

pub mod registry;

pub use registry::TrackerRegistry;

use crate::scene::NodeId;

/// A tracked device as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedDevice {
    /// Scene node the host moves with this device's pose
    pub node: NodeId,
    /// Hardware index, `None` while the device is not tracking
    pub index: Option<u32>,
}

/// The host's tracking subsystem.
pub trait TrackingSystem {
    /// All devices with a scene node, in the host's order.
    fn devices(&self) -> Vec<TrackedDevice>;

    /// Nodes reserved for the left and right hand controllers.
    fn hand_controllers(&self) -> [Option<NodeId>; 2];

    /// Query the serial number property of a device.
    ///
    /// On failure returns the host's reason string.
    fn serial_number(&self, index: u32) -> Result<String, String>;
}
