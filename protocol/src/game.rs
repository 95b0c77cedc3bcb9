//! Snapshot and event payloads broadcast over the UDP gameplay channel
//! (§3, §4.4). These are variable-length (a snapshot lists every live
//! entity) so they ride on postcard inside the fixed datagram header rather
//! than getting a hand-rolled `WIRE_SIZE`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum WeaponKind {
    Standard = 0,
    Spread = 1,
    Laser = 2,
    Missile = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub player_id: u8,
    pub pos_x: f32,
    pub pos_y: f32,
    pub hp: u8,
    pub alive: bool,
    pub current_weapon: WeaponKind,
    pub weapon_level: u8,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissileSnapshot {
    pub id: u32,
    pub owner: u8,
    pub pos_x: f32,
    pub pos_y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemySnapshot {
    pub id: u32,
    pub kind: u8,
    pub pos_x: f32,
    pub pos_y: f32,
    pub hp: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerUpSnapshot {
    pub id: u32,
    pub kind: u8,
    pub pos_x: f32,
    pub pos_y: f32,
}

/// One datagram describing the current state of all entities in a game
/// instance, sent once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub tick: u64,
    pub players: Vec<PlayerSnapshot>,
    pub missiles: Vec<MissileSnapshot>,
    pub enemies: Vec<EnemySnapshot>,
    pub power_ups: Vec<PowerUpSnapshot>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlayerJoinEvent {
    pub player_id: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlayerLeaveEvent {
    pub player_id: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlayerDamagedEvent {
    pub player_id: u8,
    pub damage: u8,
    pub remaining_hp: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlayerDiedEvent {
    pub player_id: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MissileSpawnedEvent {
    pub id: u32,
    pub owner: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MissileDestroyedEvent {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnemyDestroyedEvent {
    pub id: u32,
    pub killed_by: u8,
    pub reward: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerUpSpawnedEvent {
    pub id: u32,
    pub kind: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerUpCollectedEvent {
    pub id: u32,
    pub player_id: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PowerUpExpiredEvent {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaveCannonFiredEvent {
    pub player_id: u8,
    pub charge_level: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForceStateUpdateEvent {
    pub player_id: u8,
    pub attached: bool,
}

/// Pause state as broadcast to the whole room: `(isPaused, voters, total)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PauseStateSync {
    pub is_paused: bool,
    pub voters: u8,
    pub total: u8,
}

/// Every per-tick event a game instance can emit, bundled so the broadcast
/// loop can serialize a `Vec<GameEvent>` instead of juggling one datagram
/// per event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GameEvent {
    PlayerJoin(PlayerJoinEvent),
    PlayerLeave(PlayerLeaveEvent),
    PlayerDamaged(PlayerDamagedEvent),
    PlayerDied(PlayerDiedEvent),
    MissileSpawned(MissileSpawnedEvent),
    MissileDestroyed(MissileDestroyedEvent),
    EnemyDestroyed(EnemyDestroyedEvent),
    PowerUpSpawned(PowerUpSpawnedEvent),
    PowerUpCollected(PowerUpCollectedEvent),
    PowerUpExpired(PowerUpExpiredEvent),
    WaveCannonFired(WaveCannonFiredEvent),
    ForceStateUpdate(ForceStateUpdateEvent),
    PauseStateSync(PauseStateSync),
}
