//! Layered moves shipped with the engine.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{LayeredMove, LayeredMoveBase, MoveGenerationContext};
use crate::blackboard::{MoverBlackboard, keys};
use crate::default_data::MoverDefaultSyncState;
use crate::net::MoverType;
use crate::proposed_move::{MoveMixMode, ProposedMove};

fn current_sync_state<'a>(ctx: &MoveGenerationContext<'a>) -> Option<&'a MoverDefaultSyncState> {
    ctx.start_state
        .sync_state
        .sync_state_collection
        .find::<MoverDefaultSyncState>()
}

// ---------------------------------------------------------------------------
// LinearVelocityMove
// ---------------------------------------------------------------------------

/// Applies a constant velocity, optionally fading its magnitude over the
/// duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearVelocityMove {
    pub base: LayeredMoveBase,
    /// Velocity at the start of the move.
    pub velocity: Vec3,
    /// Magnitude multiplier reached at the end of a timed move.
    pub end_magnitude_scale: f32,
    /// `velocity` is expressed in the mover's local frame.
    pub local_space: bool,
}

impl Default for LinearVelocityMove {
    fn default() -> Self {
        Self {
            base: LayeredMoveBase::default(),
            velocity: Vec3::ZERO,
            end_magnitude_scale: 1.0,
            local_space: false,
        }
    }
}

impl MoverType for LinearVelocityMove {
    const TAG: &'static str = "LinearVelocityMove";
}

impl LayeredMove for LinearVelocityMove {
    fn base(&self) -> &LayeredMoveBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayeredMoveBase {
        &mut self.base
    }

    fn generate_move(
        &mut self,
        ctx: &MoveGenerationContext<'_>,
        _blackboard: &mut MoverBlackboard,
    ) -> Option<ProposedMove> {
        let scale = if self.base.duration_ms > 0.0 {
            let elapsed_ms = self.base.elapsed_ms(ctx.time_step.base_sim_time_ms);
            let progress = (elapsed_ms / self.base.duration_ms).clamp(0.0, 1.0);
            1.0 + (self.end_magnitude_scale - 1.0) * progress
        } else {
            1.0
        };

        let mut velocity = self.velocity * scale;
        if self.local_space
            && let Some(sync) = current_sync_state(ctx)
        {
            velocity = sync.orientation * velocity;
        }
        Some(ProposedMove::from_velocity(velocity, self.base.mix_mode))
    }
}

// ---------------------------------------------------------------------------
// JumpImpulseMove
// ---------------------------------------------------------------------------

/// One-tick upward impulse that keeps horizontal velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpImpulseMove {
    pub base: LayeredMoveBase,
    /// Vertical speed after the jump.
    pub upwards_speed: f32,
    /// Mode to enter once airborne.
    pub airborne_mode: Option<String>,
}

impl Default for JumpImpulseMove {
    fn default() -> Self {
        Self {
            base: LayeredMoveBase::new(MoveMixMode::OverrideVelocity, 0.0),
            upwards_speed: 5.0,
            airborne_mode: None,
        }
    }
}

impl MoverType for JumpImpulseMove {
    const TAG: &'static str = "JumpImpulseMove";
}

impl LayeredMove for JumpImpulseMove {
    fn base(&self) -> &LayeredMoveBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayeredMoveBase {
        &mut self.base
    }

    fn generate_move(
        &mut self,
        ctx: &MoveGenerationContext<'_>,
        blackboard: &mut MoverBlackboard,
    ) -> Option<ProposedMove> {
        let up = ctx.environment.up_direction;
        let (horizontal, location) = match current_sync_state(ctx) {
            Some(sync) => (sync.horizontal_velocity(up), sync.location),
            None => (Vec3::ZERO, Vec3::ZERO),
        };
        blackboard.set(keys::JUMP_START_LOCATION, location);

        let mut proposal =
            ProposedMove::from_velocity(horizontal + up * self.upwards_speed, self.base.mix_mode);
        proposal.preferred_mode.clone_from(&self.airborne_mode);
        Some(proposal)
    }
}

// ---------------------------------------------------------------------------
// LaunchMove
// ---------------------------------------------------------------------------

/// Launches the mover with a fixed velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchMove {
    pub base: LayeredMoveBase,
    pub launch_velocity: Vec3,
    /// Mode forced on the tick the launch happens.
    pub force_movement_mode: Option<String>,
}

impl Default for LaunchMove {
    fn default() -> Self {
        Self {
            base: LayeredMoveBase::new(MoveMixMode::AdditiveVelocity, 0.0),
            launch_velocity: Vec3::ZERO,
            force_movement_mode: None,
        }
    }
}

impl MoverType for LaunchMove {
    const TAG: &'static str = "LaunchMove";
}

impl LayeredMove for LaunchMove {
    fn base(&self) -> &LayeredMoveBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayeredMoveBase {
        &mut self.base
    }

    fn generate_move(
        &mut self,
        _ctx: &MoveGenerationContext<'_>,
        _blackboard: &mut MoverBlackboard,
    ) -> Option<ProposedMove> {
        let mut proposal = ProposedMove::from_velocity(self.launch_velocity, self.base.mix_mode);
        proposal.preferred_mode.clone_from(&self.force_movement_mode);
        Some(proposal)
    }
}

// ---------------------------------------------------------------------------
// MoveToMove
// ---------------------------------------------------------------------------

/// Moves to `target_location` so that it is reached when the duration ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveToMove {
    pub base: LayeredMoveBase,
    pub target_location: Vec3,
}

impl Default for MoveToMove {
    fn default() -> Self {
        Self {
            base: LayeredMoveBase::new(MoveMixMode::OverrideVelocity, 1000.0),
            target_location: Vec3::ZERO,
        }
    }
}

impl MoverType for MoveToMove {
    const TAG: &'static str = "MoveToMove";
}

impl LayeredMove for MoveToMove {
    fn base(&self) -> &LayeredMoveBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayeredMoveBase {
        &mut self.base
    }

    fn generate_move(
        &mut self,
        ctx: &MoveGenerationContext<'_>,
        _blackboard: &mut MoverBlackboard,
    ) -> Option<ProposedMove> {
        let sync = current_sync_state(ctx)?;
        let step_ms = ctx.time_step.step_ms;
        if step_ms <= 0.0 {
            return None;
        }

        let remaining_ms = if self.base.duration_ms > 0.0 {
            (self.base.duration_ms - self.base.elapsed_ms(ctx.time_step.base_sim_time_ms))
                .max(step_ms)
        } else {
            step_ms
        };
        let velocity = (self.target_location - sync.location) / (remaining_ms / 1000.0);
        Some(ProposedMove::from_velocity(velocity, self.base.mix_mode))
    }
}

// ---------------------------------------------------------------------------
// AnimRootMotionMove
// ---------------------------------------------------------------------------

/// Converts animation root motion into velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimRootMotionMove {
    pub base: LayeredMoveBase,
    /// Animation asset the root motion is read from.
    pub asset: String,
    /// Animation time at which the move started.
    pub start_anim_time_ms: f32,
    pub play_rate: f32,
}

impl Default for AnimRootMotionMove {
    fn default() -> Self {
        Self {
            base: LayeredMoveBase::new(MoveMixMode::OverrideVelocity, -1.0),
            asset: String::new(),
            start_anim_time_ms: 0.0,
            play_rate: 1.0,
        }
    }
}

impl MoverType for AnimRootMotionMove {
    const TAG: &'static str = "AnimRootMotionMove";
}

impl LayeredMove for AnimRootMotionMove {
    fn base(&self) -> &LayeredMoveBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayeredMoveBase {
        &mut self.base
    }

    fn generate_move(
        &mut self,
        ctx: &MoveGenerationContext<'_>,
        _blackboard: &mut MoverBlackboard,
    ) -> Option<ProposedMove> {
        let source = ctx.environment.root_motion.as_ref()?;
        let step_ms = ctx.time_step.step_ms;
        if step_ms <= 0.0 {
            return None;
        }

        let elapsed_ms = self.base.elapsed_ms(ctx.time_step.base_sim_time_ms);
        let anim_start = self.start_anim_time_ms + elapsed_ms * self.play_rate;
        let anim_end = anim_start + step_ms * self.play_rate;
        let delta = source.extract_root_motion(&self.asset, anim_start, anim_end);

        let orientation = current_sync_state(ctx)
            .map(|s| s.orientation)
            .unwrap_or(Quat::IDENTITY);
        let step_secs = step_ms / 1000.0;
        let mut proposal = ProposedMove::from_velocity(
            orientation * delta.translation / step_secs,
            self.base.mix_mode,
        );
        proposal.angular_velocity = delta.rotation.to_scaled_axis() / step_secs;
        trace!(asset = %self.asset, anim_start, anim_end, "root motion sampled");
        Some(proposal)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::environment::{MovementEnvironment, RootMotionDelta, RootMotionSource};
    use crate::types::{MoverTickStartData, MoverTimeStep};

    fn start_at(location: Vec3, velocity: Vec3) -> MoverTickStartData {
        let mut start = MoverTickStartData::default();
        start.sync_state.sync_state_collection.add(MoverDefaultSyncState {
            location,
            velocity,
            ..Default::default()
        });
        start
    }

    fn step_at(base_sim_time_ms: f64) -> MoverTimeStep {
        MoverTimeStep {
            server_frame: 0,
            base_sim_time_ms,
            step_ms: 100.0,
            is_resimulating: false,
        }
    }

    #[test]
    fn test_linear_velocity_fades() {
        let mut fade = LinearVelocityMove {
            base: LayeredMoveBase {
                duration_ms: 1000.0,
                start_sim_time_ms: 0.0,
                ..Default::default()
            },
            velocity: Vec3::new(10.0, 0.0, 0.0),
            end_magnitude_scale: 0.0,
            local_space: false,
        };
        let start = MoverTickStartData::default();
        let env = MovementEnvironment::default();
        let ts = step_at(500.0);
        let ctx = MoveGenerationContext {
            time_step: &ts,
            start_state: &start,
            environment: &env,
        };
        let proposal = fade.generate_move(&ctx, &mut MoverBlackboard::new()).unwrap();
        assert!((proposal.linear_velocity.x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_jump_keeps_horizontal_velocity() {
        let mut jump = JumpImpulseMove {
            airborne_mode: Some("Falling".into()),
            ..Default::default()
        };
        let start = start_at(Vec3::ZERO, Vec3::new(3.0, 0.0, -2.0));
        let env = MovementEnvironment::default();
        let ts = step_at(0.0);
        let ctx = MoveGenerationContext {
            time_step: &ts,
            start_state: &start,
            environment: &env,
        };
        let mut bb = MoverBlackboard::new();
        let proposal = jump.generate_move(&ctx, &mut bb).unwrap();
        assert_eq!(proposal.linear_velocity, Vec3::new(3.0, 0.0, 5.0));
        assert_eq!(proposal.preferred_mode.as_deref(), Some("Falling"));
        assert!(bb.contains(keys::JUMP_START_LOCATION));
    }

    #[test]
    fn test_move_to_reaches_target_at_end() {
        let mut move_to = MoveToMove {
            base: LayeredMoveBase {
                duration_ms: 1000.0,
                start_sim_time_ms: 0.0,
                ..MoveToMove::default().base
            },
            target_location: Vec3::new(10.0, 0.0, 0.0),
        };
        let start = start_at(Vec3::new(5.0, 0.0, 0.0), Vec3::ZERO);
        let env = MovementEnvironment::default();
        let ts = step_at(500.0);
        let ctx = MoveGenerationContext {
            time_step: &ts,
            start_state: &start,
            environment: &env,
        };
        let proposal = move_to.generate_move(&ctx, &mut MoverBlackboard::new()).unwrap();
        // 5 units left over 500ms.
        assert!((proposal.linear_velocity.x - 10.0).abs() < 1e-4);
    }

    struct Forward;

    impl RootMotionSource for Forward {
        fn extract_root_motion(&self, _asset: &str, start_ms: f32, end_ms: f32) -> RootMotionDelta {
            RootMotionDelta {
                translation: Vec3::X * (end_ms - start_ms) / 1000.0,
                rotation: Quat::IDENTITY,
            }
        }
    }

    #[test]
    fn test_root_motion_becomes_world_velocity() {
        let mut anim = AnimRootMotionMove {
            asset: "vault".into(),
            ..Default::default()
        };
        anim.base.start_sim_time_ms = 0.0;

        let mut start = MoverTickStartData::default();
        start.sync_state.sync_state_collection.add(MoverDefaultSyncState {
            orientation: Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            ..Default::default()
        });
        let env = MovementEnvironment {
            root_motion: Some(Arc::new(Forward)),
            ..Default::default()
        };
        let ts = step_at(0.0);
        let ctx = MoveGenerationContext {
            time_step: &ts,
            start_state: &start,
            environment: &env,
        };
        let proposal = anim.generate_move(&ctx, &mut MoverBlackboard::new()).unwrap();
        assert!(proposal.linear_velocity.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_root_motion_without_source_contributes_nothing() {
        let mut anim = AnimRootMotionMove::default();
        let start = MoverTickStartData::default();
        let env = MovementEnvironment::default();
        let ts = step_at(0.0);
        let ctx = MoveGenerationContext {
            time_step: &ts,
            start_state: &start,
            environment: &env,
        };
        assert!(anim.generate_move(&ctx, &mut MoverBlackboard::new()).is_none());
    }
}
