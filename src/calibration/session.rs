//! Interactive calibration state machine.
//!
//! A session is driven by the host calling [`CalibrationSession::tick`] once
//! per frame boundary:
//!
//! ```text
//! Idle ──start──▶ PoseHoldWait ──N ticks──▶ Capturing ──confirm──▶ Finalizing ──tick──▶ Applied
//!   │                   │                       │                      │
//!   └─saved─▶ Applied   └──── avatar gone ──────┴──────────────────────┴──▶ AbortedEarly
//! ```
//!
//! Every tick first checks that the avatar still exists. That poll is the
//! only cancellation mechanism.

use glam::{EulerRot, Quat, Vec3};
use rigcal_geom::Pose;

use crate::config::CalibrationConfig;
use crate::error::{LookupError, Result, SessionError};
use crate::host::{Avatar, HostEnv, HumanBone};
use crate::scene::{NodeId, Scene};
use crate::tracking::TrackerRegistry;

use super::binder::{ApplyReport, IkTargetBinder};
use super::matcher::{Assignment, BoneTrackerMatcher, LandmarkSpec};
use super::rebase::{RebaseOutcome, UniversalRebaser};
use super::store::CalibrationStore;
use super::{CalibrationData, CalibrationPoint, REFERENCE_POSE};

/// Serial recorded for the synthetic universal head entry.
pub const HEAD_SERIAL: &str = "HEAD";

/// Per-frame capture bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureState {
    /// Hip position restored while the freeze input is held
    pub hold_hip: Vec3,
    /// Universal transfer fired this session
    pub uses_universal: bool,
    /// Universal transfer was attempted and failed; not retried
    pub universal_failed: bool,
    /// Capture frames elapsed
    pub frames: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    /// Reference pose forced, waiting for the user and trackers to settle
    PoseHoldWait { remaining: u32 },
    Capturing(CaptureState),
    /// Capture written to the store, waiting one frame for the pose to settle
    Finalizing { uses_universal: bool },
    Applied(ApplyReport),
    AbortedEarly,
    Failed { reason: String },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::PoseHoldWait { .. } => "pose_hold_wait",
            Self::Capturing(_) => "capturing",
            Self::Finalizing { .. } => "finalizing",
            Self::Applied(_) => "applied",
            Self::AbortedEarly => "aborted_early",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Applied(_) | Self::AbortedEarly | Self::Failed { .. }
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One calibration run for one avatar.
pub struct CalibrationSession {
    avatar: Avatar,
    config: CalibrationConfig,
    state: SessionState,
    pose_pushed: bool,
    trackers_visible: bool,
}

impl CalibrationSession {
    pub fn new(avatar: Avatar, config: CalibrationConfig) -> Self {
        Self {
            avatar,
            config,
            state: SessionState::Idle,
            pose_pushed: false,
            trackers_visible: false,
        }
    }

    pub fn avatar_id(&self) -> &str {
        &self.avatar.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Leave `Idle`: replay a saved calibration, or force the reference pose
    /// and start waiting.
    pub fn start(
        &mut self,
        store: &mut CalibrationStore,
        binder: &mut IkTargetBinder,
        env: &mut HostEnv<'_>,
    ) -> Result<&SessionState> {
        if self.state != SessionState::Idle {
            return Ok(&self.state);
        }

        if !self.avatar.exists(env.scene) {
            self.abort(env);
            return Ok(&self.state);
        }

        if self.config.store_per_avatar && store.has_saved(&self.avatar.id) {
            tracing::info!("Replaying saved calibration for {}", self.avatar.id);
            let result = self.apply(store, binder, env);
            return self.settle(result.map(SessionState::Applied), env);
        }

        env.host.push_reference_pose(&REFERENCE_POSE);
        self.pose_pushed = true;
        self.state = SessionState::PoseHoldWait {
            remaining: self.config.pose_hold_frames.max(1),
        };
        tracing::info!(
            "Calibration started for {}, holding pose for {} frames",
            self.avatar.id,
            self.config.pose_hold_frames
        );
        Ok(&self.state)
    }

    /// Advance by one frame boundary.
    pub fn tick(
        &mut self,
        store: &mut CalibrationStore,
        binder: &mut IkTargetBinder,
        env: &mut HostEnv<'_>,
    ) -> Result<&SessionState> {
        if self.state == SessionState::Idle || self.is_finished() {
            return Ok(&self.state);
        }

        if !self.avatar.exists(env.scene) {
            self.abort(env);
            return Ok(&self.state);
        }

        let state = std::mem::replace(&mut self.state, SessionState::Idle);
        let previous = state.name();
        let next = match state {
            SessionState::PoseHoldWait { remaining } if remaining > 1 => {
                Ok(SessionState::PoseHoldWait {
                    remaining: remaining - 1,
                })
            }
            SessionState::PoseHoldWait { .. } => Ok(self.begin_capture(env)),
            SessionState::Capturing(mut capture) => {
                if self.capture_frame(&mut capture, store, env) {
                    self.end_capture(capture.uses_universal, store, env)
                } else {
                    Ok(SessionState::Capturing(capture))
                }
            }
            SessionState::Finalizing { .. } => {
                self.apply(store, binder, env).map(SessionState::Applied)
            }
            other => Ok(other),
        };

        if let Ok(next) = &next {
            if next.name() != previous {
                tracing::debug!("Calibration {}: {} -> {}", self.avatar.id, previous, next);
            }
        }

        self.settle(next, env)
    }

    /// Stop without writing anything further, releasing host state.
    pub fn abandon(&mut self, env: &mut HostEnv<'_>) {
        if !self.is_finished() {
            tracing::info!("Abandoning calibration for {}", self.avatar.id);
            self.release_host(env);
            self.state = SessionState::AbortedEarly;
        }
    }

    fn settle(
        &mut self,
        next: Result<SessionState>,
        env: &mut HostEnv<'_>,
    ) -> Result<&SessionState> {
        match next {
            Ok(state) => {
                self.state = state;
                Ok(&self.state)
            }
            Err(e) => {
                self.release_host(env);
                self.state = SessionState::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    fn abort(&mut self, env: &mut HostEnv<'_>) {
        tracing::info!(
            "{}",
            SessionError::AvatarGone {
                avatar_id: self.avatar.id.clone()
            }
        );
        self.release_host(env);
        self.state = SessionState::AbortedEarly;
    }

    fn release_host(&mut self, env: &mut HostEnv<'_>) {
        if self.trackers_visible {
            env.host.set_tracker_visibility(false);
            self.trackers_visible = false;
        }
        if self.pose_pushed {
            env.host.pop_reference_pose();
            self.pose_pushed = false;
        }
    }

    fn begin_capture(&mut self, env: &mut HostEnv<'_>) -> SessionState {
        env.host.set_tracker_visibility(true);
        self.trackers_visible = true;

        let hold_hip = self
            .avatar
            .bone(env.scene, HumanBone::Hips)
            .and_then(|hips| env.scene.world_position(hips))
            .unwrap_or(Vec3::ZERO);

        SessionState::Capturing(CaptureState {
            hold_hip,
            uses_universal: false,
            universal_failed: false,
            frames: 0,
        })
    }

    /// One capture cycle. Returns true when capture should end.
    fn capture_frame(
        &self,
        capture: &mut CaptureState,
        store: &CalibrationStore,
        env: &mut HostEnv<'_>,
    ) -> bool {
        capture.frames += 1;
        let [trigger1, trigger2] = env.host.trigger_axes();
        let combined = trigger1 + trigger2;
        let config = &self.config;

        if config.use_universal
            && !capture.universal_failed
            && store.universal().len() >= config.min_universal_points
        {
            match self.transfer_universal(store, env) {
                Ok(outcome) => {
                    env.solver.bend_weights = outcome.bend_weights();
                    capture.uses_universal = true;
                }
                Err(e) => {
                    tracing::warn!(
                        "Universal calibration transfer failed, capturing manually: {}",
                        e
                    );
                    capture.universal_failed = true;
                }
            }
        }

        if let Some(hips) = self.avatar.bone(env.scene, HumanBone::Hips) {
            if config.half_freeze && combined > config.freeze_threshold {
                self.move_hips(env.scene, hips, capture.hold_hip);
            } else if config.follow_head {
                if let (Some(delta), Some(position)) =
                    (self.head_delta(env), env.scene.world_position(hips))
                {
                    let position = position + delta;
                    self.move_hips(env.scene, hips, position);
                    capture.hold_hip = position;
                }
            }
        }

        combined > config.confirm_threshold || capture.uses_universal
    }

    fn move_hips(&self, scene: &mut Scene, hips: NodeId, position: Vec3) {
        scene.set_world_position(hips, position);
        if let Some(mirror) = self.avatar.mirror_hips {
            scene.set_world_position(mirror, position);
        }
    }

    /// How far the head effector is from the avatar's head bone.
    fn head_delta(&self, env: &HostEnv<'_>) -> Option<Vec3> {
        let effector = env.scene.world_position(env.solver.head_effector?)?;
        let head = self.avatar.bone(env.scene, HumanBone::Head)?;
        Some(effector - env.scene.world_position(head)?)
    }

    fn transfer_universal(
        &self,
        store: &CalibrationStore,
        env: &mut HostEnv<'_>,
    ) -> Result<RebaseOutcome> {
        let registry = TrackerRegistry::locate(&*env.host)?;
        let head_tracker = head_tracker(env)?;
        let anchor = registry
            .list_trackers()
            .iter()
            .find_map(|d| env.scene.parent(d.node))
            .ok_or(LookupError::NoAnchor)?;

        let outcome =
            UniversalRebaser::new(store.universal()).apply(env.scene, &registry, head_tracker, anchor)?;
        tracing::info!("Reused universal calibration for {}", self.avatar.id);
        Ok(outcome)
    }

    fn end_capture(
        &mut self,
        uses_universal: bool,
        store: &mut CalibrationStore,
        env: &mut HostEnv<'_>,
    ) -> Result<SessionState> {
        if self.trackers_visible {
            env.host.set_tracker_visibility(false);
            self.trackers_visible = false;
        }

        self.finalize(uses_universal, store, env)?;

        if self.pose_pushed {
            env.host.pop_reference_pose();
            self.pose_pushed = false;
        }

        Ok(SessionState::Finalizing { uses_universal })
    }

    /// Match trackers once and write both coordinate contracts to the store.
    fn finalize(
        &self,
        uses_universal: bool,
        store: &mut CalibrationStore,
        env: &mut HostEnv<'_>,
    ) -> Result<()> {
        let registry = TrackerRegistry::locate(&*env.host)?;
        let trackers = registry.list_trackers();
        let mut matcher = BoneTrackerMatcher::from_devices(&trackers, env.scene);
        let plan = LandmarkSpec::plan(&self.config);
        let forward = self.avatar_forward(env.scene);

        let mut hip_tracker = None;
        for result in matcher.assign(&plan, &self.avatar, env.scene) {
            let assignment = match result {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!("{}", e);
                    continue;
                }
            };

            if assignment.point == CalibrationPoint::Hip {
                hip_tracker = Some(assignment.tracker.node);
            }

            if let Err(e) =
                self.store_tracked(&assignment, forward, uses_universal, &registry, store, env.scene)
            {
                tracing::warn!("Skipping {}: {}", assignment.point, e);
            }
        }

        let left_yaw = 90.0 + self.config.hand_yaw_bias_deg;
        for (point, bone, yaw) in [
            (CalibrationPoint::LeftHand, HumanBone::LeftHand, left_yaw),
            (CalibrationPoint::RightHand, HumanBone::RightHand, -left_yaw),
        ] {
            match self.hand_record(env.scene, point, bone, yaw) {
                Ok(record) => store.save(&self.avatar.id, point, record),
                Err(e) => tracing::warn!("Skipping {}: {}", point, e),
            }
        }

        if !uses_universal {
            match self.head_record(hip_tracker, env) {
                Ok(record) => store.save_universal(CalibrationPoint::Head, record),
                Err(e) => tracing::warn!("No universal head entry: {}", e),
            }
        }

        tracing::info!(
            "Captured calibration for {}{}",
            self.avatar.id,
            if uses_universal { " (universal)" } else { "" }
        );
        Ok(())
    }

    fn store_tracked(
        &self,
        assignment: &Assignment,
        forward: Vec3,
        uses_universal: bool,
        registry: &TrackerRegistry<'_>,
        store: &mut CalibrationStore,
        scene: &Scene,
    ) -> std::result::Result<(), LookupError> {
        let point = assignment.point;
        let tracker = assignment.tracker.node;
        let serial = registry.try_serial(assignment.tracker.index)?;
        let tracker_pose = scene
            .world_pose(tracker)
            .ok_or(LookupError::MissingNode(tracker))?;
        let bone_pose = scene
            .world_pose(assignment.bone)
            .ok_or(LookupError::MissingNode(assignment.bone))?;

        let record = if point.is_bend_goal() {
            let goal = bone_pose.position + forward * self.goal_offset(point);
            CalibrationData::new(
                rigcal_geom::local_position(&tracker_pose, goal),
                Quat::IDENTITY,
                serial.clone(),
            )
        } else {
            let local = tracker_pose.relative(&bone_pose);
            CalibrationData::new(local.position, local.rotation, serial.clone())
        };
        store.save(&self.avatar.id, point, record);

        // Feeding transferred poses back in would drift the layout.
        if !uses_universal {
            let anchor = scene
                .parent_world_pose(tracker)
                .ok_or(LookupError::MissingNode(tracker))?;
            let local = anchor.relative(&tracker_pose);
            store.save_universal(point, CalibrationData::new(local.position, local.rotation, serial));
        }

        Ok(())
    }

    fn goal_offset(&self, point: CalibrationPoint) -> f32 {
        match point {
            CalibrationPoint::LeftElbow | CalibrationPoint::RightElbow => {
                -self.config.elbow_goal_offset
            }
            CalibrationPoint::LeftKnee | CalibrationPoint::RightKnee => self.config.knee_goal_offset,
            CalibrationPoint::Chest => self.config.chest_goal_offset,
            _ => 0.0,
        }
    }

    /// Horizontal facing of the avatar, from the lower legs.
    fn avatar_forward(&self, scene: &Scene) -> Vec3 {
        let leg = |bone| {
            self.avatar
                .bone(scene, bone)
                .and_then(|node| scene.world_position(node))
        };
        if let (Some(left), Some(right)) = (leg(HumanBone::LeftLowerLeg), leg(HumanBone::RightLowerLeg)) {
            if let Some(forward) = (right - left).cross(Vec3::Y).try_normalize() {
                return forward;
            }
        }

        scene
            .world_pose(self.avatar.root)
            .and_then(|root| rigcal_geom::horizontal(root.forward()))
            .unwrap_or(Vec3::Z)
    }

    /// Orientation-only hand refinement relative to the avatar root.
    fn hand_record(
        &self,
        scene: &Scene,
        point: CalibrationPoint,
        bone: HumanBone,
        yaw_deg: f32,
    ) -> std::result::Result<CalibrationData, LookupError> {
        let hand = self
            .avatar
            .bone(scene, bone)
            .ok_or(LookupError::MissingBone { bone })?;
        let hand_rotation = scene
            .world_rotation(hand)
            .ok_or(LookupError::MissingNode(hand))?;
        let body_rotation = scene
            .world_rotation(self.avatar.root)
            .ok_or(LookupError::MissingNode(self.avatar.root))?;

        let bias = Quat::from_euler(
            EulerRot::YXZ,
            yaw_deg.to_radians(),
            self.config.hand_pitch_bias_deg.to_radians(),
            0.0,
        );
        let rotation = (bias * body_rotation.inverse() * hand_rotation).normalize();

        Ok(CalibrationData::new(Vec3::ZERO, rotation, point.as_str()))
    }

    /// Head tracker relative to the hip tracker's anchor.
    fn head_record(
        &self,
        hip_tracker: Option<NodeId>,
        env: &HostEnv<'_>,
    ) -> std::result::Result<CalibrationData, LookupError> {
        let hip_tracker = hip_tracker.ok_or(LookupError::NoTracker {
            point: CalibrationPoint::Hip,
        })?;
        let anchor = env
            .scene
            .parent_world_pose(hip_tracker)
            .ok_or(LookupError::MissingNode(hip_tracker))?;
        let head_tracker = head_tracker(env)?;
        let head = env
            .scene
            .world_pose(head_tracker)
            .ok_or(LookupError::MissingNode(head_tracker))?;

        let local: Pose = anchor.relative(&head);
        Ok(CalibrationData::new(local.position, local.rotation, HEAD_SERIAL))
    }

    fn apply(
        &self,
        store: &CalibrationStore,
        binder: &mut IkTargetBinder,
        env: &mut HostEnv<'_>,
    ) -> Result<ApplyReport> {
        let registry = TrackerRegistry::locate(&*env.host)?;
        let report = binder.apply(&self.avatar.id, store, env.scene, &registry, env.solver)?;
        for (point, e) in &report.skipped {
            tracing::warn!("{} left unbound: {}", point, e);
        }
        Ok(report)
    }
}

/// The head tracking anchor: the parent of the solver's head effector.
fn head_tracker(env: &HostEnv<'_>) -> std::result::Result<NodeId, LookupError> {
    let effector = env.solver.head_effector.ok_or(LookupError::MissingEffector {
        point: CalibrationPoint::Head,
    })?;
    env.scene
        .parent(effector)
        .ok_or(LookupError::MissingNode(effector))
}
