//! Core server runtime: session and room registries, the game-instance
//! actor plumbing, capability-record repositories, and the `Services`
//! record that binds them together. Genre-specific simulation lives in the
//! `game-rtype` crate; transport and process bootstrap live in
//! `relay-server`.

pub mod config;
pub mod error;
pub mod game_trait;
pub mod instance;
pub mod password;
pub mod repository;
pub mod room;
pub mod services;
pub mod session;
pub mod token;

pub use error::ServerError;
pub use services::Services;
