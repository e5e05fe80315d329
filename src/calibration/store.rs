//! In-memory calibration repository

use std::collections::HashMap;

use super::{CalibrationData, CalibrationPoint};

/// Calibration records for one avatar, or the universal rig layout.
pub type PointMap = HashMap<CalibrationPoint, CalibrationData>;

/// Per-avatar and universal calibration records.
///
/// Entries live until explicitly cleared. Size is bounded by the number of
/// distinct avatars seen in a session.
#[derive(Debug, Clone, Default)]
pub struct CalibrationStore {
    avatars: HashMap<String, PointMap>,
    universal: PointMap,
}

impl CalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a tracker-relative record for an avatar.
    pub fn save(&mut self, avatar_id: &str, point: CalibrationPoint, data: CalibrationData) {
        self.avatars
            .entry(avatar_id.to_string())
            .or_default()
            .insert(point, data);
    }

    pub fn has_saved(&self, avatar_id: &str) -> bool {
        self.avatars.contains_key(avatar_id)
    }

    pub fn saved(&self, avatar_id: &str) -> Option<&PointMap> {
        self.avatars.get(avatar_id)
    }

    pub fn avatar_count(&self) -> usize {
        self.avatars.len()
    }

    /// Insert or overwrite an anchor-relative record.
    pub fn save_universal(&mut self, point: CalibrationPoint, data: CalibrationData) {
        self.universal.insert(point, data);
    }

    pub fn universal(&self) -> &PointMap {
        &self.universal
    }

    /// Drop everything.
    pub fn clear_all(&mut self) {
        self.avatars.clear();
        self.universal.clear();
    }

    /// Drop all per-avatar records, keep the universal layout.
    pub fn clear_non_universal(&mut self) {
        self.avatars.clear();
    }

    /// Drop one avatar's records.
    ///
    /// The universal layout is reset too: it was seeded from some avatar's
    /// last capture and must not outlive an explicit reset.
    pub fn clear(&mut self, avatar_id: &str) {
        self.avatars.remove(avatar_id);
        self.universal.clear();
    }
}
