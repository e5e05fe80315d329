//! Tracker enumeration and serial lookup

use crate::error::{LookupError, TrackingError};
use crate::host::Host;
use crate::scene::NodeId;

use super::{TrackedDevice, TrackingSystem};

/// View over the host's tracking subsystem, restricted to body trackers.
pub struct TrackerRegistry<'a> {
    system: &'a dyn TrackingSystem,
}

impl<'a> TrackerRegistry<'a> {
    pub fn new(system: &'a dyn TrackingSystem) -> Self {
        Self { system }
    }

    /// Find the host's tracking subsystem.
    ///
    /// This is the only fatal lookup: without it no calibration is possible.
    pub fn locate(host: &'a dyn Host) -> Result<Self, TrackingError> {
        host.tracking()
            .map(Self::new)
            .ok_or(TrackingError::SubsystemUnavailable)
    }

    /// Active devices in host order, excluding the hand controllers.
    pub fn list_trackers(&self) -> Vec<TrackedDevice> {
        let [left, right] = self.system.hand_controllers();
        self.system
            .devices()
            .into_iter()
            .filter(|d| Some(d.node) != left && Some(d.node) != right)
            .collect()
    }

    /// Serial number of a device.
    pub fn try_serial(&self, index: u32) -> Result<String, LookupError> {
        self.system
            .serial_number(index)
            .map_err(|reason| LookupError::Serial { index, reason })
    }

    /// Serial number of a device, logging a warning on failure.
    pub fn serial(&self, index: u32) -> Option<String> {
        match self.try_serial(index) {
            Ok(serial) => Some(serial),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }

    /// First tracker whose serial matches.
    pub fn find_by_serial(&self, serial: &str) -> Option<NodeId> {
        self.list_trackers()
            .into_iter()
            .find(|d| {
                d.index
                    .and_then(|index| self.serial(index))
                    .is_some_and(|s| s == serial)
            })
            .map(|d| d.node)
    }

    pub fn find_tracker(&self, serial: &str) -> Result<NodeId, LookupError> {
        self.find_by_serial(serial)
            .ok_or_else(|| LookupError::TrackerNotFound {
                serial: serial.to_string(),
            })
    }
}
