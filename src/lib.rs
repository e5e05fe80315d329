//! Rigcal - Full-body tracker calibration
//!
//! Maps physical motion trackers onto an avatar skeleton:
//! - Matches trackers to hips, feet and optional elbow/knee/chest landmarks
//! - Stores tracker-relative offsets per avatar, plus an avatar-agnostic rig layout
//! - Re-faces the rig layout for new avatars with a yaw-only correction
//! - Binds stored offsets to full-body IK solver targets
//!
//! The host drives everything by calling [`Calibrator::tick`] once per frame.

pub mod calibration;
pub mod calibrator;
pub mod config;
pub mod error;
pub mod host;
pub mod scene;
pub mod sim;
pub mod tracking;

pub use calibration::{CalibrationData, CalibrationPoint, SessionState};
pub use calibrator::Calibrator;
pub use config::Config;
pub use error::{Result, RigcalError};
pub use host::{Avatar, Host, HostEnv, HumanBone, IkSolver};
pub use scene::{NodeId, Scene};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
