//! Standalone driver for the mover simulation.
//!
//! Runs movers at a fixed step, decoupled from wall-clock frame rate, and
//! plays a scripted gameplay scenario against them.

pub mod driver;
pub mod scenario;
