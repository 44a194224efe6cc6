//! Proposed moves and the rules for combining them.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// How a proposed move combines with the other contributions of a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveMixMode {
    /// Velocities are added to the other contributions.
    #[default]
    AdditiveVelocity,
    /// Linear and angular velocity replace the other contributions.
    OverrideVelocity,
    /// The whole move replaces the other contributions.
    OverrideAll,
    /// Like `OverrideAll`, but the vertical velocity of the other
    /// contributions is kept.
    OverrideAllExceptVerticalVelocity,
}

impl MoveMixMode {
    /// Returns `true` for every mode that replaces rather than adds.
    pub fn is_override(self) -> bool {
        !matches!(self, MoveMixMode::AdditiveVelocity)
    }
}

/// One contribution to the motion of a tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposedMove {
    /// Direction the mover intends to travel, if it expresses one.
    pub direction_intent: Option<Vec3>,
    /// Linear velocity in units per second.
    pub linear_velocity: Vec3,
    /// Angular velocity as a scaled axis, radians per second.
    pub angular_velocity: Vec3,
    /// Combination rule.
    pub mix_mode: MoveMixMode,
    /// Mode this move asks to switch to. Honoured immediately.
    pub preferred_mode: Option<String>,
}

impl ProposedMove {
    /// A pure velocity contribution.
    pub fn from_velocity(linear_velocity: Vec3, mix_mode: MoveMixMode) -> Self {
        Self {
            linear_velocity,
            mix_mode,
            ..Default::default()
        }
    }

    /// Folds the composed layered contribution into the move produced by the
    /// active mode.
    pub fn apply_layered(&mut self, layered: &ProposedMove, up: Vec3) {
        match layered.mix_mode {
            MoveMixMode::AdditiveVelocity => {
                self.linear_velocity += layered.linear_velocity;
                self.angular_velocity += layered.angular_velocity;
            }
            MoveMixMode::OverrideVelocity => {
                self.linear_velocity = layered.linear_velocity;
                self.angular_velocity = layered.angular_velocity;
            }
            MoveMixMode::OverrideAll => {
                self.direction_intent = layered.direction_intent;
                self.linear_velocity = layered.linear_velocity;
                self.angular_velocity = layered.angular_velocity;
            }
            MoveMixMode::OverrideAllExceptVerticalVelocity => {
                let vertical = up * self.linear_velocity.dot(up);
                let horizontal = layered.linear_velocity - up * layered.linear_velocity.dot(up);
                self.direction_intent = layered.direction_intent;
                self.linear_velocity = horizontal + vertical;
                self.angular_velocity = layered.angular_velocity;
            }
        }
        if layered.preferred_mode.is_some() {
            self.preferred_mode.clone_from(&layered.preferred_mode);
        }
    }
}

// ---------------------------------------------------------------------------
// LayeredMoveMixer
// ---------------------------------------------------------------------------

struct RankedMove {
    proposal: ProposedMove,
    priority: u8,
    start_sim_time_ms: f64,
}

/// Combines the proposals of every active layered move into one.
///
/// The winning override is the one with the highest priority; ties go to
/// the move that started last. Additive proposals are summed on top of it,
/// except those with a lower priority than the winning override, which are
/// masked.
#[derive(Default)]
pub struct LayeredMoveMixer {
    winning_override: Option<RankedMove>,
    additive: Vec<RankedMove>,
}

impl LayeredMoveMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the proposal of one active move.
    pub fn mix(&mut self, proposal: ProposedMove, priority: u8, start_sim_time_ms: f64) {
        let ranked = RankedMove {
            proposal,
            priority,
            start_sim_time_ms,
        };
        if !ranked.proposal.mix_mode.is_override() {
            self.additive.push(ranked);
            return;
        }
        let beats_current = match &self.winning_override {
            None => true,
            Some(current) => {
                ranked.priority > current.priority
                    || (ranked.priority == current.priority
                        && ranked.start_sim_time_ms >= current.start_sim_time_ms)
            }
        };
        if beats_current {
            self.winning_override = Some(ranked);
        }
    }

    /// Returns the combined proposal, or `None` if nothing was mixed.
    pub fn finish(self, up: Vec3) -> Option<ProposedMove> {
        let masking_priority = self.winning_override.as_ref().map(|o| o.priority);
        let mut combined = match self.winning_override {
            Some(winner) => winner.proposal,
            None if self.additive.is_empty() => return None,
            None => ProposedMove::default(),
        };

        for ranked in self.additive {
            if masking_priority.is_some_and(|p| ranked.priority < p) {
                continue;
            }
            combined.linear_velocity += ranked.proposal.linear_velocity;
            combined.angular_velocity += ranked.proposal.angular_velocity;
            if combined.direction_intent.is_none() {
                combined.direction_intent = ranked.proposal.direction_intent;
            }
            if combined.preferred_mode.is_none() {
                combined.preferred_mode = ranked.proposal.preferred_mode;
            }
        }

        if combined.mix_mode == MoveMixMode::OverrideAllExceptVerticalVelocity {
            // Vertical velocity comes from the mode, so drop ours.
            combined.linear_velocity -= up * combined.linear_velocity.dot(up);
        }
        Some(combined)
    }
}
