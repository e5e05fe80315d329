//! Host-facing calibration entry points

use crate::calibration::{
    CalibrationData, CalibrationPoint, CalibrationSession, CalibrationStore, IkTargetBinder,
    SessionState,
};
use crate::config::CalibrationConfig;
use crate::error::{Result, SessionError, TrackingError};
use crate::host::{Avatar, Host, HostEnv};

/// Owns the calibration store, the solver targets and at most one running
/// session.
///
/// The host calls [`Calibrator::tick`] once per frame. Nothing here returns
/// an error to the host after construction: failures are logged.
pub struct Calibrator {
    config: CalibrationConfig,
    store: CalibrationStore,
    binder: IkTargetBinder,
    session: Option<CalibrationSession>,
}

impl Calibrator {
    /// Fails if the host has no tracking subsystem.
    pub fn new(config: CalibrationConfig, host: &dyn Host) -> Result<Self> {
        if host.tracking().is_none() {
            tracing::error!("{}", TrackingError::SubsystemUnavailable);
            return Err(TrackingError::SubsystemUnavailable.into());
        }

        Ok(Self {
            config,
            store: CalibrationStore::new(),
            binder: IkTargetBinder::new(),
            session: None,
        })
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Start calibrating `avatar`.
    ///
    /// A call for the avatar already being calibrated is ignored. A call for
    /// another avatar abandons the running session first.
    pub fn calibrate(&mut self, avatar: Avatar, env: &mut HostEnv<'_>) {
        if let Some(session) = self.session.as_mut().filter(|s| !s.is_finished()) {
            if session.avatar_id() == avatar.id {
                tracing::warn!(
                    "{}",
                    SessionError::AlreadyRunning {
                        avatar_id: avatar.id
                    }
                );
                return;
            }
            session.abandon(env);
        }

        let mut session = CalibrationSession::new(avatar, self.config.clone());
        if let Err(e) = session.start(&mut self.store, &mut self.binder, env) {
            tracing::error!("Calibration of {} failed: {}", session.avatar_id(), e);
        }
        self.session = Some(session);
    }

    /// Advance the running session by one frame.
    pub fn tick(&mut self, env: &mut HostEnv<'_>) -> Option<&SessionState> {
        let session = self.session.as_mut()?;
        if !session.is_finished() {
            if let Err(e) = session.tick(&mut self.store, &mut self.binder, env) {
                tracing::error!("Calibration of {} failed: {}", session.avatar_id(), e);
            }
        }
        Some(session.state())
    }

    /// State of the most recent session.
    pub fn state(&self) -> Option<&SessionState> {
        self.session.as_ref().map(|s| s.state())
    }

    pub fn is_busy(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.is_finished())
    }

    pub fn has_saved_calibration(&self, avatar_id: &str) -> bool {
        self.store.has_saved(avatar_id)
    }

    pub fn save(&mut self, avatar_id: &str, point: CalibrationPoint, data: CalibrationData) {
        self.store.save(avatar_id, point, data);
    }

    /// Drop every stored calibration, universal included.
    pub fn clear(&mut self) {
        self.store.clear_all();
    }

    pub fn clear_non_universal(&mut self) {
        self.store.clear_non_universal();
    }

    /// Drop one avatar's calibration and the universal layout.
    pub fn clear_avatar(&mut self, avatar_id: &str) {
        self.store.clear(avatar_id);
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    /// Destroy the solver targets created by the last apply and clear the
    /// solver slots that used them.
    pub fn release_targets(&mut self, env: &mut HostEnv<'_>) {
        self.binder.release(env.scene, env.solver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::error::RigcalError;
    use crate::sim::SimulatedRig;
    use glam::{Quat, Vec3};

    fn rig() -> SimulatedRig {
        SimulatedRig::new(&SimulationConfig::default())
    }

    #[test]
    fn test_missing_tracking_is_fatal() {
        let mut rig = rig();
        rig.host.disconnect_tracking();
        let result = Calibrator::new(CalibrationConfig::default(), &rig.host);
        assert!(matches!(
            result,
            Err(RigcalError::Tracking(TrackingError::SubsystemUnavailable))
        ));
    }

    #[test]
    fn test_duplicate_calibrate_is_ignored() {
        let mut rig = rig();
        let avatar = rig.spawn_avatar("alice");
        let mut calibrator = Calibrator::new(CalibrationConfig::default(), &rig.host).unwrap();

        calibrator.calibrate(avatar.clone(), &mut rig.env());
        calibrator.tick(&mut rig.env());
        calibrator.calibrate(avatar, &mut rig.env());

        assert_eq!(rig.host.reference_pose_depth(), 1);
        assert!(matches!(
            calibrator.state(),
            Some(SessionState::PoseHoldWait { remaining: 29 })
        ));
    }

    #[test]
    fn test_other_avatar_replaces_session() {
        let mut rig = rig();
        let alice = rig.spawn_avatar("alice");
        let bob = rig.spawn_avatar("bob");
        let mut calibrator = Calibrator::new(CalibrationConfig::default(), &rig.host).unwrap();

        calibrator.calibrate(alice, &mut rig.env());
        calibrator.calibrate(bob, &mut rig.env());

        // Old pose released, new one pushed
        assert_eq!(rig.host.reference_pose_depth(), 1);
        assert!(calibrator.is_busy());
        assert!(!calibrator.has_saved_calibration("alice"));
    }

    #[test]
    fn test_replay_when_saved() {
        let mut rig = rig();
        let avatar = rig.spawn_avatar("alice");
        let mut calibrator = Calibrator::new(CalibrationConfig::default(), &rig.host).unwrap();
        let serial = crate::sim::serial_for(rig.index_of(rig.trackers()[0]).unwrap());
        calibrator.save(
            "alice",
            CalibrationPoint::Hip,
            CalibrationData::new(Vec3::new(0.0, 0.0, 0.06), Quat::IDENTITY, serial),
        );

        calibrator.calibrate(avatar, &mut rig.env());

        assert!(matches!(calibrator.state(), Some(SessionState::Applied(_))));
        assert_eq!(rig.host.reference_pose_depth(), 0);
        assert!(rig.solver.pelvis_target.is_some());
    }

    #[test]
    fn test_release_targets_empties_solver_slots() {
        let mut rig = rig();
        let avatar = rig.spawn_avatar("alice");
        let mut calibrator = Calibrator::new(CalibrationConfig::default(), &rig.host).unwrap();

        calibrator.calibrate(avatar, &mut rig.env());
        while matches!(calibrator.state(), Some(SessionState::PoseHoldWait { .. })) {
            calibrator.tick(&mut rig.env());
        }
        rig.set_triggers(1.0, 1.0);
        calibrator.tick(&mut rig.env());
        calibrator.tick(&mut rig.env());
        assert!(matches!(calibrator.state(), Some(SessionState::Applied(_))));

        let pelvis = rig.solver.pelvis_target.unwrap();
        let left_arm = rig.solver.left_arm_target.unwrap();
        calibrator.release_targets(&mut rig.env());

        assert!(!rig.scene.contains(pelvis));
        assert!(!rig.scene.contains(left_arm));
        assert_eq!(rig.solver.pelvis_target, None);
        assert_eq!(rig.solver.left_leg_target, None);
        assert_eq!(rig.solver.right_leg_target, None);
        assert_eq!(rig.solver.left_arm_target, None);
        assert_eq!(rig.solver.right_arm_target, None);
        assert!(rig.solver.head_effector.is_some());
        assert!(calibrator.has_saved_calibration("alice"));
    }

    #[test]
    fn test_clear_variants() {
        let rig = rig();
        let mut calibrator = Calibrator::new(CalibrationConfig::default(), &rig.host).unwrap();
        let data = CalibrationData::new(Vec3::ZERO, Quat::IDENTITY, "x");
        calibrator.save("a", CalibrationPoint::Hip, data.clone());
        calibrator.save("b", CalibrationPoint::Hip, data);

        calibrator.clear_avatar("a");
        assert!(!calibrator.has_saved_calibration("a"));
        assert!(calibrator.has_saved_calibration("b"));

        calibrator.clear();
        assert!(!calibrator.has_saved_calibration("b"));
    }
}
