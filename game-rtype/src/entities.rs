//! Entity records owned by a single [`crate::instance::RTypeInstance`].
//! Positions are floats in an abstract playfield (the core never imposes
//! rendering units); only rates — cooldowns, spawn timers, velocities — are
//! scaled by `game_speed_percent` per §3 invariant (v).

use protocol::game::WeaponKind;

pub const MAX_PLAYERS: usize = 6;
pub const STARTING_HP: u8 = 5;
pub const WEAPON_COUNT: usize = 4;
pub const MAX_WEAPON_LEVEL: u8 = 3;
pub const WAVE_CANNON_MIN_CHARGE_SECS: f32 = 0.35;
pub const PLAYER_INACTIVITY_TIMEOUT_SECS: f32 = 30.0;

fn weapon_index(weapon: WeaponKind) -> usize {
    weapon as u8 as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerUpKind {
    HealthPack,
    WeaponUpgrade(WeaponKind),
    ForcePod,
    BitDevice,
    Shield,
    ScoreBonus,
}

impl PowerUpKind {
    /// Stable wire discriminant for [`protocol::game::PowerUpSnapshot::kind`].
    pub fn wire_kind(&self) -> u8 {
        match self {
            PowerUpKind::HealthPack => 0,
            PowerUpKind::WeaponUpgrade(WeaponKind::Standard) => 10,
            PowerUpKind::WeaponUpgrade(WeaponKind::Spread) => 11,
            PowerUpKind::WeaponUpgrade(WeaponKind::Laser) => 12,
            PowerUpKind::WeaponUpgrade(WeaponKind::Missile) => 13,
            PowerUpKind::ForcePod => 20,
            PowerUpKind::Shield => 21,
            PowerUpKind::ScoreBonus => 22,
            PowerUpKind::BitDevice => 23,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnemyKind {
    Drifter,
    Bydo,
    Walled,
    Satellite,
}

impl EnemyKind {
    pub fn wire_kind(&self) -> u8 {
        match self {
            EnemyKind::Drifter => 0,
            EnemyKind::Bydo => 1,
            EnemyKind::Walled => 2,
            EnemyKind::Satellite => 3,
        }
    }

    pub fn base_hp(&self) -> u16 {
        match self {
            EnemyKind::Drifter => 10,
            EnemyKind::Bydo => 20,
            EnemyKind::Walled => 40,
            EnemyKind::Satellite => 15,
        }
    }

    pub fn reward(&self) -> u32 {
        match self {
            EnemyKind::Drifter => 50,
            EnemyKind::Bydo => 100,
            EnemyKind::Walled => 150,
            EnemyKind::Satellite => 75,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreAggregate {
    pub score: u64,
    pub kills: u32,
    pub deaths: u32,
    pub kills_per_weapon: [u32; WEAPON_COUNT],
    pub boss_kills: u32,
    pub best_combo_x10: u32,
    pub kill_streak: u32,
    pub wave_streak: u32,
    pub perfect_waves: u32,
    pub damage_dealt: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForcePodState {
    pub attached: bool,
    pub charge_level: f32,
}

impl Default for ForcePodState {
    fn default() -> Self {
        ForcePodState { attached: false, charge_level: 0.0 }
    }
}

/// Unlike the force pod, a bit device is never detached once picked up: it
/// orbits the player continuously and fires on its own cooldown rather than
/// absorbing hits (§GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitDeviceState {
    pub attached: bool,
    pub orbit_angle: f32,
    pub fire_cooldown: f32,
}

impl Default for BitDeviceState {
    fn default() -> Self {
        BitDeviceState { attached: false, orbit_angle: 0.0, fire_cooldown: 0.0 }
    }
}

pub const BIT_DEVICE_ORBIT_RADIUS: f32 = 28.0;
pub const BIT_DEVICE_ORBIT_RATE_RADS: f32 = std::f32::consts::PI;
pub const BIT_DEVICE_FIRE_INTERVAL_SECS: f32 = 1.5;
pub const BIT_DEVICE_CONTACT_RADIUS: f32 = 20.0;
pub const BIT_DEVICE_CONTACT_DAMAGE: u16 = 1;

pub struct Player {
    pub player_id: u8,
    pub email: String,
    pub pos_x: f32,
    pub pos_y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub hp: u8,
    pub alive: bool,
    pub ship_skin: u8,
    pub current_weapon: WeaponKind,
    pub weapon_levels: [u8; WEAPON_COUNT],
    pub shoot_cooldown: f32,
    pub charge_timer: Option<f32>,
    pub force_pod: ForcePodState,
    pub bit_device: BitDeviceState,
    pub score: ScoreAggregate,
    pub wants_pause: bool,
    pub god_mode: bool,
    pub last_activity_secs: f32,
    pub last_input_seq: u32,
}

impl Player {
    pub fn new(player_id: u8, email: String, ship_skin: u8) -> Self {
        Player {
            player_id,
            email,
            pos_x: 0.0,
            pos_y: (player_id as f32) * 40.0,
            vel_x: 0.0,
            vel_y: 0.0,
            hp: STARTING_HP,
            alive: true,
            ship_skin,
            current_weapon: WeaponKind::Standard,
            weapon_levels: [0; WEAPON_COUNT],
            shoot_cooldown: 0.0,
            charge_timer: None,
            force_pod: ForcePodState::default(),
            bit_device: BitDeviceState::default(),
            score: ScoreAggregate::default(),
            wants_pause: false,
            god_mode: false,
            last_activity_secs: 0.0,
            last_input_seq: 0,
        }
    }

    pub fn current_weapon_level(&self) -> u8 {
        self.weapon_levels[weapon_index(self.current_weapon)]
    }

    /// Upgrading one weapon must never change another (§4.4): only the
    /// index for `weapon` is touched.
    pub fn upgrade_weapon(&mut self, weapon: WeaponKind) {
        let level = &mut self.weapon_levels[weapon_index(weapon)];
        *level = (*level + 1).min(MAX_WEAPON_LEVEL);
    }

    pub fn apply_damage(&mut self, damage: u8) -> bool {
        if self.god_mode || !self.alive {
            return false;
        }
        self.hp = self.hp.saturating_sub(damage);
        if self.hp == 0 {
            self.alive = false;
        }
        true
    }
}

pub struct Missile {
    pub id: u32,
    pub owner: u8,
    pub pos_x: f32,
    pub pos_y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub weapon: WeaponKind,
    pub damage: u8,
    pub homing_target: Option<u32>,
}

pub struct Enemy {
    pub id: u32,
    pub kind: EnemyKind,
    pub pos_x: f32,
    pub pos_y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub hp: u16,
}

pub struct Boss {
    pub id: u32,
    pub pos_x: f32,
    pub pos_y: f32,
    pub hp: u32,
    pub max_hp: u32,
    pub phase: u8,
}

pub struct PowerUp {
    pub id: u32,
    pub kind: PowerUpKind,
    pub pos_x: f32,
    pub pos_y: f32,
    pub lifetime_secs: f32,
}

pub struct WaveCannonProjectile {
    pub id: u32,
    pub owner: u8,
    pub pos_x: f32,
    pub pos_y: f32,
    pub charge_level: u8,
    pub width: f32,
    pub damage: u16,
}
