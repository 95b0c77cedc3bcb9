//! Weapon firing rules (§4.4 "Weapons", "Wave cannon").
//!
//! Cooldowns and the wave-cannon minimum charge are rates, so callers scale
//! the inputs by `game_speed_percent / 100` before calling into here — this
//! module only knows about already-scaled seconds.

use protocol::game::WeaponKind;

use crate::entities::{Missile, WaveCannonProjectile, WAVE_CANNON_MIN_CHARGE_SECS};

/// Base cooldown in seconds at weapon level 0; each level shaves 15% off,
/// floored at 40% of the base to keep level-3 weapons finite-rate.
fn base_cooldown_secs(weapon: WeaponKind) -> f32 {
    match weapon {
        WeaponKind::Standard => 0.25,
        WeaponKind::Spread => 0.4,
        WeaponKind::Laser => 0.5,
        WeaponKind::Missile => 0.6,
    }
}

pub fn cooldown_for_level(weapon: WeaponKind, level: u8) -> f32 {
    let reduction = 1.0 - 0.15 * level as f32;
    base_cooldown_secs(weapon) * reduction.max(0.4)
}

fn base_damage(weapon: WeaponKind) -> u8 {
    match weapon {
        WeaponKind::Standard => 1,
        WeaponKind::Spread => 1,
        WeaponKind::Laser => 2,
        WeaponKind::Missile => 3,
    }
}

pub fn damage_for_level(weapon: WeaponKind, level: u8) -> u8 {
    base_damage(weapon) + level
}

/// Number of simultaneous missiles a single shot spawns; only `Spread`
/// fans out, and its fan-out count grows with level.
pub fn shots_per_trigger(weapon: WeaponKind, level: u8) -> u8 {
    match weapon {
        WeaponKind::Spread => 1 + level,
        _ => 1,
    }
}

/// Builds the missile set for one trigger pull. `next_id` is called once
/// per spawned missile so the caller's id counter advances monotonically.
pub fn fire(
    weapon: WeaponKind,
    level: u8,
    owner: u8,
    pos_x: f32,
    pos_y: f32,
    mut next_id: impl FnMut() -> u32,
) -> Vec<Missile> {
    let damage = damage_for_level(weapon, level);
    let count = shots_per_trigger(weapon, level);
    let speed = match weapon {
        WeaponKind::Laser => 900.0,
        WeaponKind::Missile => 300.0,
        _ => 500.0,
    };
    (0..count)
        .map(|i| {
            let spread_angle = (i as f32 - (count as f32 - 1.0) / 2.0) * 0.12;
            Missile {
                id: next_id(),
                owner,
                pos_x,
                pos_y,
                vel_x: speed * spread_angle.cos(),
                vel_y: speed * spread_angle.sin(),
                weapon,
                damage,
                homing_target: None,
            }
        })
        .collect()
}

/// Releasing below minimum charge yields no spawn (§4.4).
pub fn release_wave_cannon(
    owner: u8,
    pos_x: f32,
    pos_y: f32,
    charge_secs: f32,
    next_id: impl FnOnce() -> u32,
) -> Option<WaveCannonProjectile> {
    if charge_secs < WAVE_CANNON_MIN_CHARGE_SECS {
        return None;
    }
    let charge_level = (charge_secs / WAVE_CANNON_MIN_CHARGE_SECS).min(8.0) as u8;
    Some(WaveCannonProjectile {
        id: next_id(),
        owner,
        pos_x,
        pos_y,
        charge_level,
        width: 20.0 + charge_level as f32 * 10.0,
        damage: 5 + charge_level as u16 * 5,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_shrinks_with_level_but_never_below_the_floor() {
        let l0 = cooldown_for_level(WeaponKind::Standard, 0);
        let l3 = cooldown_for_level(WeaponKind::Standard, 3);
        assert!(l3 < l0);
        assert!(l3 >= base_cooldown_secs(WeaponKind::Standard) * 0.4 - 1e-6);
    }

    #[test]
    fn spread_fans_out_with_level() {
        assert_eq!(shots_per_trigger(WeaponKind::Spread, 0), 1);
        assert_eq!(shots_per_trigger(WeaponKind::Spread, 3), 4);
        assert_eq!(shots_per_trigger(WeaponKind::Laser, 3), 1);
    }

    #[test]
    fn charge_below_minimum_spawns_nothing() {
        assert!(release_wave_cannon(0, 0.0, 0.0, 0.1, || 1).is_none());
        assert!(release_wave_cannon(0, 0.0, 0.0, 0.35, || 1).is_some());
    }
}
