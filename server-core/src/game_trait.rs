//! The game-instance contract (C4) and the actor that gives each instance
//! its serial execution context.
//!
//! This generalizes the reference's `BackEndArchitecture` trait: instead of
//! an event-driven RPC handler that drains an ad hoc command list on demand,
//! [`GameInstance`] is tick-driven — the datagram server's fixed-tick
//! scheduler (C7) is the only caller of [`GameInstance::tick`], and player
//! actions are buffered as [`GameCommand`]s applied at the start of the next
//! tick, per §4.4 step 2 ("latest input wins per slot per tick"). The
//! concrete simulation (entities, weapons, collisions) lives in the
//! `game-rtype` crate; this module only fixes the shape every instance must
//! present to C5/C7.

use std::time::Duration;

use protocol::datagram::{ChargeReleasePayload, PlayerInputPayload};
use protocol::game::{GameEvent, SnapshotPayload};

/// A buffered player action, applied at the top of the next tick.
#[derive(Debug, Clone)]
pub enum GameCommand {
    Input(PlayerInputPayload),
    ChargeRelease(ChargeReleasePayload),
    PauseVote(bool),
    /// Toggles the caller's force pod attach state (§4.4 step 4), applied
    /// only if the player is still alive.
    ForceToggle,
    /// Admin-issued god-mode push (§4.2's `godModeChanged` callback):
    /// propagates a session's hidden flag into the live player entity.
    SetGodMode(bool),
}

/// Everything a tick produces: the event deltas since the previous tick and
/// a full snapshot. C7 broadcasts both; persistence consumers only care
/// about the terminal score fields carried inside `snapshot`.
pub struct TickOutput {
    pub events: Vec<GameEvent>,
    pub snapshot: SnapshotPayload,
    pub paused: bool,
}

/// Implemented once per game genre. A `game-rtype::RTypeInstance` is the
/// only implementation this workspace ships, but the trait exists so C5/C7
/// never need to know the concrete simulation type.
pub trait GameInstance: Send {
    /// Registers a newly bound player; `game_speed_percent` is captured once
    /// per §4.4 ("applied once at player-join time") and never re-read.
    fn player_join(&mut self, player_id: u8, game_speed_percent: u16);

    /// Removes a player. Returns the number of occupants remaining —C5 uses
    /// a return of zero as the signal to tear the instance down.
    fn player_leave(&mut self, player_id: u8) -> usize;

    fn handle_command(&mut self, player_id: u8, command: GameCommand);

    /// Runs exactly one tick pipeline (§4.4 steps 1-5), skipped internally
    /// while paused except for step 1 (timeout expiry always runs).
    fn tick(&mut self, dt: Duration) -> TickOutput;
}
