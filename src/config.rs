//! Configuration parsing and management for rigcal

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, RigcalError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub calibration: CalibrationConfig,
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RigcalError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, RigcalError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, RigcalError> {
        let paths = [
            PathBuf::from("rigcal.toml"),
            PathBuf::from("config/rigcal.toml"),
            dirs_path().join("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RigcalError> {
        let cal = &self.calibration;

        if cal.pose_hold_frames == 0 {
            return Err(invalid(
                "calibration.pose_hold_frames",
                "Pose hold must last at least one frame",
            ));
        }

        if cal.min_universal_points == 0 {
            return Err(invalid(
                "calibration.min_universal_points",
                "At least one universal point is required",
            ));
        }

        if !cal.freeze_threshold.is_finite() || !cal.confirm_threshold.is_finite() {
            return Err(invalid(
                "calibration.confirm_threshold",
                "Trigger thresholds must be finite",
            ));
        }

        // Two trigger axes, each 0.0 - 1.0
        if cal.confirm_threshold > 2.0 {
            return Err(invalid(
                "calibration.confirm_threshold",
                "Threshold must be at most 2.0 (both triggers fully pressed)",
            ));
        }

        if cal.freeze_threshold >= cal.confirm_threshold {
            return Err(invalid(
                "calibration.freeze_threshold",
                "Freeze threshold must be below the confirm threshold",
            ));
        }

        if self.simulation.frame_rate == 0 || self.simulation.frame_rate > MAX_FRAME_RATE {
            return Err(invalid(
                "simulation.frame_rate",
                "Frame rate must be between 1 and 1000",
            ));
        }

        Ok(())
    }
}

/// Highest simulated frame rate (Hz)
pub const MAX_FRAME_RATE: u32 = 1000;

fn invalid(field: &str, message: &str) -> RigcalError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// Calibration behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Replay a saved calibration for an avatar instead of capturing again
    pub store_per_avatar: bool,
    /// Reuse the universal rig layout on new avatars
    pub use_universal: bool,
    /// Hold the hips still while the triggers are half pressed
    pub half_freeze: bool,
    /// Move the hips with the head while capturing
    pub follow_head: bool,
    /// Match feet against the toe bones
    pub map_toes: bool,
    pub use_elbow_trackers: bool,
    pub use_knee_trackers: bool,
    pub use_chest_tracker: bool,
    /// Frames to wait in the reference pose before capture starts
    pub pose_hold_frames: u32,
    /// Universal points required before the layout is reused
    pub min_universal_points: usize,
    /// Combined trigger value that freezes the hips
    pub freeze_threshold: f32,
    /// Combined trigger value that confirms the capture
    pub confirm_threshold: f32,
    /// Hand target pitch bias in degrees
    pub hand_pitch_bias_deg: f32,
    /// Hand target yaw bias in degrees, added outward from 90
    pub hand_yaw_bias_deg: f32,
    /// Distance behind the elbow for the elbow bend goal (meters)
    pub elbow_goal_offset: f32,
    /// Distance in front of the knee for the knee bend goal (meters)
    pub knee_goal_offset: f32,
    /// Distance in front of the chest for the chest goal (meters)
    pub chest_goal_offset: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            store_per_avatar: true,
            use_universal: false,
            half_freeze: true,
            follow_head: true,
            map_toes: false,
            use_elbow_trackers: false,
            use_knee_trackers: false,
            use_chest_tracker: false,
            pose_hold_frames: 30,
            min_universal_points: 4,
            freeze_threshold: 0.75,
            confirm_threshold: 1.75,
            hand_pitch_bias_deg: 15.0,
            hand_yaw_bias_deg: 10.0,
            elbow_goal_offset: 0.1,
            knee_goal_offset: 0.1,
            chest_goal_offset: 0.5,
        }
    }
}

/// Simulated rig used by the demo binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Body trackers besides the headset and controllers
    pub tracker_count: usize,
    /// Simulated frames per second
    pub frame_rate: u32,
    /// Capture frames before the simulated user squeezes both triggers
    pub confirm_after_frames: u32,
    /// Avatar height in meters
    pub avatar_height: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tracker_count: 3,
            frame_rate: 90,
            confirm_after_frames: 45,
            avatar_height: 1.7,
        }
    }
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("rigcal");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/rigcal");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/rigcal");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("rigcal");
        }
    }

    PathBuf::from(".")
}
