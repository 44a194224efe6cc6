//! Capabilities the simulation consumes from the host world.
//!
//! Collision and animation live outside the simulation. Modes and moves
//! reach them only through the traits here, so a host plugs in its physics
//! and animation backends by handing a [`MovementEnvironment`] to the
//! component.

use std::fmt;
use std::sync::Arc;

use glam::{Quat, Vec3};

/// Result of probing for a floor below the mover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorCheckResult {
    /// Something was hit within the probe distance.
    pub blocking_hit: bool,
    /// The hit surface can be stood on.
    pub walkable: bool,
    /// Surface normal at the hit point.
    pub normal: Vec3,
    /// Distance from the mover's base to the surface along the probe.
    pub floor_distance: f32,
}

impl FloorCheckResult {
    /// A probe that hit nothing.
    pub fn miss() -> Self {
        Self {
            blocking_hit: false,
            walkable: false,
            normal: Vec3::ZERO,
            floor_distance: f32::MAX,
        }
    }

    /// Returns `true` if the mover can stand on this result.
    pub fn is_walkable_floor(&self) -> bool {
        self.blocking_hit && self.walkable
    }
}

/// Probes the world for a floor.
pub trait FloorQuery: Send + Sync {
    /// Probes from `location` against `up` for at most `max_distance`.
    fn find_floor(&self, location: Vec3, up: Vec3, max_distance: f32) -> FloorCheckResult;
}

/// A local-space transform delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootMotionDelta {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for RootMotionDelta {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Extracts root motion from whatever animation the host is playing.
pub trait RootMotionSource: Send + Sync {
    /// Delta accumulated between `start_ms` and `end_ms` of the montage or
    /// asset identified by `asset`.
    fn extract_root_motion(&self, asset: &str, start_ms: f32, end_ms: f32) -> RootMotionDelta;
}

/// A flat, infinitely large walkable floor at a fixed height along `Z`.
///
/// Useful for standalone drivers and tests.
#[derive(Debug, Clone, Copy)]
pub struct FlatFloor {
    pub height: f32,
}

impl FloorQuery for FlatFloor {
    fn find_floor(&self, location: Vec3, up: Vec3, max_distance: f32) -> FloorCheckResult {
        // Negative distances mean the mover has sunk into the floor.
        let distance = (location - Vec3::Z * self.height).dot(up);
        if distance > max_distance {
            return FloorCheckResult::miss();
        }
        FloorCheckResult {
            blocking_hit: true,
            walkable: true,
            normal: up,
            floor_distance: distance,
        }
    }
}

/// Everything the simulation may ask of the host world.
#[derive(Clone)]
pub struct MovementEnvironment {
    /// Floor probe. `None` means the mover never finds a floor.
    pub floor_query: Option<Arc<dyn FloorQuery>>,
    /// Root-motion provider for animation-driven moves.
    pub root_motion: Option<Arc<dyn RootMotionSource>>,
    /// World up direction.
    pub up_direction: Vec3,
}

impl Default for MovementEnvironment {
    fn default() -> Self {
        Self {
            floor_query: None,
            root_motion: None,
            up_direction: Vec3::Z,
        }
    }
}

impl fmt::Debug for MovementEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MovementEnvironment")
            .field("floor_query", &self.floor_query.is_some())
            .field("root_motion", &self.root_motion.is_some())
            .field("up_direction", &self.up_direction)
            .finish()
    }
}

impl MovementEnvironment {
    /// Probes for a floor, treating a missing capability as a miss.
    pub fn find_floor(&self, location: Vec3, max_distance: f32) -> FloorCheckResult {
        match &self.floor_query {
            Some(query) => query.find_floor(location, self.up_direction, max_distance),
            None => FloorCheckResult::miss(),
        }
    }
}
