//! The R-Type-style simulation: entities, weapons, wave spawning, and
//! collision resolution behind the single [`RTypeInstance`], the workspace's
//! only [`server_core::game_trait::GameInstance`] implementation.

pub mod collisions;
pub mod entities;
pub mod instance;
pub mod wave;
pub mod weapons;

pub use instance::RTypeInstance;
