//! Movement modifiers shipped with the engine.

use serde::{Deserialize, Serialize};

use super::{MovementModifier, MovementModifierBase};
use crate::net::MoverType;
use crate::proposed_move::ProposedMove;

/// Scales the linear velocity of the composed move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedScaleModifier {
    pub base: MovementModifierBase,
    pub scale: f32,
}

impl Default for SpeedScaleModifier {
    fn default() -> Self {
        Self {
            base: MovementModifierBase::default(),
            scale: 1.0,
        }
    }
}

impl MoverType for SpeedScaleModifier {
    const TAG: &'static str = "SpeedScaleModifier";
}

impl MovementModifier for SpeedScaleModifier {
    fn base(&self) -> &MovementModifierBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MovementModifierBase {
        &mut self.base
    }

    fn modify_proposed_move(&self, proposed: &mut ProposedMove) {
        proposed.linear_velocity *= self.scale;
    }
}

/// Substitutes `to_mode` whenever `from_mode` would become active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeRemapModifier {
    pub base: MovementModifierBase,
    pub from_mode: String,
    pub to_mode: String,
}

impl MoverType for ModeRemapModifier {
    const TAG: &'static str = "ModeRemapModifier";
}

impl MovementModifier for ModeRemapModifier {
    fn base(&self) -> &MovementModifierBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MovementModifierBase {
        &mut self.base
    }

    // Two remaps of different modes can be active together.
    fn matches(&self, other: &dyn MovementModifier) -> bool {
        other
            .downcast_ref::<ModeRemapModifier>()
            .is_some_and(|o| o.from_mode == self.from_mode)
    }

    fn remap_mode(&self, mode_name: &str) -> Option<&str> {
        (mode_name == self.from_mode).then_some(self.to_mode.as_str())
    }
}
