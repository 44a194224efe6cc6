//! Unit tests for the layered move queue.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::*;
use crate::layered_move::builtin::LinearVelocityMove;
use crate::layered_move::{FinishVelocitySettings, LayeredMoveBase, MoveGenerationContext};
use crate::net::MoverType;
use crate::proposed_move::{MoveMixMode, ProposedMove};
use crate::registry::MoverTypeRegistry;

/// Move that counts its lifecycle callbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CountingMove {
    base: LayeredMoveBase,
    velocity: Vec3,
    starts: u32,
    ends: u32,
}

impl MoverType for CountingMove {
    const TAG: &'static str = "CountingMove";
}

impl LayeredMove for CountingMove {
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
        Some(ProposedMove::from_velocity(self.velocity, self.base.mix_mode))
    }

    fn on_start(&mut self, _environment: &MovementEnvironment, _blackboard: &mut MoverBlackboard) {
        self.starts += 1;
    }

    fn on_end(
        &mut self,
        _environment: &MovementEnvironment,
        blackboard: &mut MoverBlackboard,
        _current_sim_time_ms: f64,
    ) {
        self.ends += 1;
        let ended = blackboard.try_get::<u32>("counted_ends").unwrap_or(0);
        blackboard.set("counted_ends", ended + 1);
    }
}

fn counting(mix_mode: MoveMixMode, duration_ms: f32) -> CountingMove {
    CountingMove {
        base: LayeredMoveBase::new(mix_mode, duration_ms),
        ..Default::default()
    }
}

fn with_set_velocity(mut mv: CountingMove, velocity: Vec3) -> CountingMove {
    mv.base.finish_velocity = FinishVelocitySettings {
        mode: FinishVelocityMode::SetVelocity,
        set_velocity: velocity,
        clamp_velocity: 0.0,
    };
    mv
}

fn with_clamp(mut mv: CountingMove, clamp: f32) -> CountingMove {
    mv.base.finish_velocity = FinishVelocitySettings {
        mode: FinishVelocityMode::ClampVelocity,
        set_velocity: Vec3::ZERO,
        clamp_velocity: clamp,
    };
    mv
}

fn bytes_of(group: &LayeredMoveGroup) -> Vec<u8> {
    let mut writer = NetWriter::new();
    group.net_serialize(&mut writer, u8::MAX).unwrap();
    writer.into_bytes()
}

fn ends_seen(blackboard: &MoverBlackboard) -> u32 {
    blackboard.try_get::<u32>("counted_ends").unwrap_or(0)
}

#[test]
fn test_timed_override_lifecycle() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut group = LayeredMoveGroup::new();
    group.queue_move(Box::new(with_set_velocity(
        counting(MoveMixMode::OverrideVelocity, 500.0),
        Vec3::new(0.0, 0.0, 7.0),
    )));

    group.flush_move_arrays(&env, &mut bb, 1000.0);
    assert_eq!(group.active_moves().len(), 1);
    assert!(group.queued_moves().is_empty());
    let active = group.active_moves()[0].downcast_ref::<CountingMove>().unwrap();
    assert_eq!(active.base.start_sim_time_ms, 1000.0);
    assert_eq!(active.starts, 1);

    group.flush_move_arrays(&env, &mut bb, 1400.0);
    assert_eq!(group.active_moves().len(), 1);
    assert!(!group.has_residual_velocity());

    group.flush_move_arrays(&env, &mut bb, 1600.0);
    assert!(group.active_moves().is_empty());
    assert_eq!(ends_seen(&bb), 1);
    assert!(group.has_residual_velocity());
    assert_eq!(
        group.apply_residual_velocity(Vec3::new(3.0, 0.0, 0.0)),
        Vec3::new(0.0, 0.0, 7.0)
    );

    // The residual belongs to the flush that produced it.
    group.flush_move_arrays(&env, &mut bb, 1616.0);
    assert!(!group.has_residual_velocity());
    assert_eq!(ends_seen(&bb), 1);
}

#[test]
fn test_flush_is_idempotent_without_changes() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut group = LayeredMoveGroup::new();
    group.queue_move(Box::new(counting(MoveMixMode::AdditiveVelocity, -1.0)));
    group.queue_move(Box::new(counting(MoveMixMode::OverrideVelocity, 1000.0)));
    group.flush_move_arrays(&env, &mut bb, 0.0);

    let before = bytes_of(&group);
    group.flush_move_arrays(&env, &mut bb, 10.0);
    assert_eq!(bytes_of(&group), before);
}

#[test]
fn test_one_shot_queued_this_tick_does_not_finish_in_same_flush() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut group = LayeredMoveGroup::new();
    group.queue_move(Box::new(with_set_velocity(
        counting(MoveMixMode::OverrideVelocity, 0.0),
        Vec3::X,
    )));

    group.flush_move_arrays(&env, &mut bb, 100.0);
    assert_eq!(group.active_moves().len(), 1);
    assert!(!group.has_residual_velocity());
    assert_eq!(ends_seen(&bb), 0);

    group.flush_move_arrays(&env, &mut bb, 116.0);
    assert!(group.active_moves().is_empty());
    assert!(group.has_residual_velocity());
    assert_eq!(ends_seen(&bb), 1);
}

#[test]
fn test_manual_move_runs_until_cancelled() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut group = LayeredMoveGroup::new();
    group.queue_move(Box::new(counting(MoveMixMode::AdditiveVelocity, -1.0)));
    group.flush_move_arrays(&env, &mut bb, 0.0);
    group.flush_move_arrays(&env, &mut bb, 1e9);
    assert_eq!(group.active_moves().len(), 1);

    assert_eq!(group.cancel_moves_by_tag(CountingMove::TAG), 1);
    assert_eq!(group.active_moves().len(), 1);
    group.flush_move_arrays(&env, &mut bb, 1e9 + 16.0);
    assert!(group.active_moves().is_empty());
    assert_eq!(ends_seen(&bb), 1);
}

#[test]
fn test_conflicting_residual_overrides_last_wins() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut group = LayeredMoveGroup::new();
    group.queue_move(Box::new(with_set_velocity(
        counting(MoveMixMode::OverrideVelocity, 100.0),
        Vec3::X,
    )));
    group.queue_move(Box::new(with_set_velocity(
        counting(MoveMixMode::OverrideAll, 100.0),
        Vec3::Y,
    )));
    group.flush_move_arrays(&env, &mut bb, 0.0);
    group.flush_move_arrays(&env, &mut bb, 100.0);

    assert_eq!(group.apply_residual_velocity(Vec3::ZERO), Vec3::Y);
}

#[test]
fn test_additive_residuals_accumulate() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut group = LayeredMoveGroup::new();
    for _ in 0..2 {
        group.queue_move(Box::new(with_set_velocity(
            counting(MoveMixMode::AdditiveVelocity, 50.0),
            Vec3::X,
        )));
    }
    group.flush_move_arrays(&env, &mut bb, 0.0);
    group.flush_move_arrays(&env, &mut bb, 50.0);
    assert_eq!(
        group.apply_residual_velocity(Vec3::new(1.0, 0.0, 0.0)),
        Vec3::new(3.0, 0.0, 0.0)
    );
}

#[test]
fn test_additive_clamps_keep_tightest() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut group = LayeredMoveGroup::new();
    group.queue_move(Box::new(with_clamp(counting(MoveMixMode::AdditiveVelocity, 10.0), 5.0)));
    group.queue_move(Box::new(with_clamp(counting(MoveMixMode::AdditiveVelocity, 10.0), 2.0)));
    group.queue_move(Box::new(with_clamp(counting(MoveMixMode::AdditiveVelocity, 10.0), 8.0)));
    group.flush_move_arrays(&env, &mut bb, 0.0);
    group.flush_move_arrays(&env, &mut bb, 10.0);

    let clamped = group.apply_residual_velocity(Vec3::new(10.0, 0.0, 0.0));
    assert!((clamped.length() - 2.0).abs() < 1e-5);
}

#[test]
fn test_nan_duration_is_dropped() {
    let mut group = LayeredMoveGroup::new();
    group.queue_move(Box::new(counting(MoveMixMode::AdditiveVelocity, f32::NAN)));
    assert!(group.is_empty());
}

#[test]
fn test_serialization_budget_prefers_active() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut group = LayeredMoveGroup::new();
    group.queue_move(Box::new(counting(MoveMixMode::AdditiveVelocity, -1.0)));
    group.queue_move(Box::new(counting(MoveMixMode::AdditiveVelocity, -1.0)));
    group.flush_move_arrays(&env, &mut bb, 0.0);
    group.queue_move(Box::new(counting(MoveMixMode::OverrideAll, -1.0)));

    let mut writer = NetWriter::new();
    group.net_serialize(&mut writer, 2).unwrap();
    let bytes = writer.into_bytes();

    let mut registry = MoverTypeRegistry::with_defaults();
    registry.register_layered_move::<CountingMove>().unwrap();
    let mut received = LayeredMoveGroup::new();
    received
        .net_deserialize(&mut NetReader::new(&bytes), &registry.layered_moves)
        .unwrap();
    assert_eq!(received.active_moves().len(), 2);
    assert!(received.queued_moves().is_empty());
}

#[test]
fn test_deserialize_reuses_and_replaces() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut sent = LayeredMoveGroup::new();
    let mut linear = LinearVelocityMove::default();
    linear.velocity = Vec3::new(4.0, 0.0, 0.0);
    sent.queue_move(Box::new(linear));
    sent.flush_move_arrays(&env, &mut bb, 0.0);
    sent.queue_move(Box::new(counting(MoveMixMode::AdditiveVelocity, 10.0)));

    let mut registry = MoverTypeRegistry::with_defaults();
    registry.register_layered_move::<CountingMove>().unwrap();

    let mut received = LayeredMoveGroup::new();
    received.queue_move(Box::new(counting(MoveMixMode::OverrideAll, 1.0)));
    received
        .net_deserialize(&mut NetReader::new(&bytes_of(&sent)), &registry.layered_moves)
        .unwrap();

    assert_eq!(bytes_of(&received), bytes_of(&sent));
    let active = received.active_moves()[0]
        .downcast_ref::<LinearVelocityMove>()
        .unwrap();
    assert_eq!(active.velocity.x, 4.0);
}

#[test]
fn test_foreign_tag_is_protocol_violation() {
    let registry = MoverTypeRegistry::with_defaults();
    let mut writer = NetWriter::new();
    writer.write_count(1).unwrap();
    writer.write_tag("MoverDefaultSyncState").unwrap();
    let bytes = writer.into_bytes();

    let mut reader = NetReader::new(&bytes);
    let mut group = LayeredMoveGroup::new();
    let result = group.net_deserialize(&mut reader, &registry.layered_moves);
    assert!(matches!(
        result,
        Err(NetSerializeError::ProtocolViolation {
            expected_base: "LayeredMove",
            ..
        })
    ));
    assert!(reader.has_error());
}

#[test]
fn test_failed_deserialize_keeps_local_moves() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut local = LayeredMoveGroup::new();
    let mut linear = LinearVelocityMove::default();
    linear.velocity = Vec3::new(4.0, 0.0, 0.0);
    local.queue_move(Box::new(linear));
    local.flush_move_arrays(&env, &mut bb, 0.0);
    local.queue_move(Box::new(counting(MoveMixMode::AdditiveVelocity, 10.0)));

    // A valid active list followed by a queued list with a foreign tag.
    let mut incoming = LinearVelocityMove::default();
    incoming.velocity = Vec3::new(9.0, 0.0, 0.0);
    let active: Vec<Box<dyn LayeredMove>> = vec![Box::new(incoming)];
    let mut writer = NetWriter::new();
    net::write_payload_array(&mut writer, &active).unwrap();
    writer.write_count(1).unwrap();
    writer.write_tag("MoverDefaultSyncState").unwrap();
    let bytes = writer.into_bytes();

    let registry = MoverTypeRegistry::with_defaults();
    let result = local.net_deserialize(&mut NetReader::new(&bytes), &registry.layered_moves);
    assert!(matches!(
        result,
        Err(NetSerializeError::ProtocolViolation { .. })
    ));

    let kept = local.active_moves()[0]
        .downcast_ref::<LinearVelocityMove>()
        .unwrap();
    assert_eq!(kept.velocity.x, 4.0);
    assert_eq!(local.queued_moves().len(), 1);
}

#[test]
fn test_clone_from_copies_in_place() {
    let env = MovementEnvironment::default();
    let mut bb = MoverBlackboard::new();
    let mut source = LayeredMoveGroup::new();
    let mut moving = counting(MoveMixMode::AdditiveVelocity, -1.0);
    moving.velocity = Vec3::X;
    source.queue_move(Box::new(moving));
    source.flush_move_arrays(&env, &mut bb, 0.0);

    let mut target = source.clone();
    let mut faster = source.clone();
    faster.active[0].downcast_mut::<CountingMove>().unwrap().velocity = Vec3::splat(9.0);
    target.clone_from(&faster);
    assert_eq!(
        target.active_moves()[0]
            .downcast_ref::<CountingMove>()
            .unwrap()
            .velocity,
        Vec3::splat(9.0)
    );
    // Source untouched by either copy.
    assert_eq!(
        source.active_moves()[0]
            .downcast_ref::<CountingMove>()
            .unwrap()
            .velocity,
        Vec3::X
    );
}
