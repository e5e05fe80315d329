//! Error types for rigcal

use thiserror::Error;

use crate::calibration::CalibrationPoint;
use crate::host::HumanBone;
use crate::scene::NodeId;

/// Main error type for rigcal
#[derive(Error, Debug)]
pub enum RigcalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Tracking-hardware errors
#[derive(Error, Debug)]
pub enum TrackingError {
    /// The host exposes no tracking subsystem. Nothing can be calibrated.
    #[error("Tracking subsystem not found, calibration is unavailable")]
    SubsystemUnavailable,
}

/// Per-point lookup failures. Always recoverable: the point is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("Can't get serial for tracker ID {index}: {reason}")]
    Serial { index: u32, reason: String },

    #[error("No tracker with serial {serial}")]
    TrackerNotFound { serial: String },

    #[error("Bone {bone} not found on avatar")]
    MissingBone { bone: HumanBone },

    #[error("Scene node {0:?} no longer exists")]
    MissingNode(NodeId),

    #[error("No tracker left for point {point}")]
    NoTracker { point: CalibrationPoint },

    #[error("Solver has no effector for {point}")]
    MissingEffector { point: CalibrationPoint },

    #[error("No play-space anchor above the trackers")]
    NoAnchor,

    #[error("No stored calibration for avatar {avatar_id}")]
    NoCalibration { avatar_id: String },
}

/// Whole-session failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Avatar {avatar_id} disappeared during calibration")]
    AvatarGone { avatar_id: String },

    #[error("Calibration already running for avatar {avatar_id}")]
    AlreadyRunning { avatar_id: String },
}

/// Result type alias for rigcal operations
pub type Result<T> = std::result::Result<T, RigcalError>;
