//! Collision resolution in the fixed order mandated by §4.4 step 3:
//! missile↔enemy, missile↔boss, enemy↔player, power-up↔player,
//! force/bit↔enemy. Each pass only removes/mutates entities it owns and
//! appends to the shared `events` list so callers never need a second pass
//! to find out what happened this tick.

use protocol::game::{EnemyDestroyedEvent, GameEvent, MissileDestroyedEvent, PlayerDamagedEvent, PlayerDiedEvent, PowerUpCollectedEvent};

use crate::entities::{Boss, Enemy, Missile, Player, PowerUp};

const HIT_RADIUS: f32 = 16.0;
const ENEMY_CONTACT_DAMAGE: u8 = 1;
const FORCE_BITE_RADIUS: f32 = 24.0;
const FORCE_BITE_DAMAGE: u16 = 1;

fn within(ax: f32, ay: f32, bx: f32, by: f32, radius: f32) -> bool {
    let dx = ax - bx;
    let dy = ay - by;
    dx * dx + dy * dy <= radius * radius
}

pub fn resolve(
    players: &mut [Player],
    missiles: &mut Vec<Missile>,
    enemies: &mut Vec<Enemy>,
    boss: &mut Option<Boss>,
    power_ups: &mut Vec<PowerUp>,
    events: &mut Vec<GameEvent>,
) {
    missile_vs_enemy(missiles, enemies, players, events);
    missile_vs_boss(missiles, boss, players, events);
    enemy_vs_player(enemies, players, events);
    power_up_vs_player(power_ups, players, events);
    force_vs_enemy(players, enemies, events);
}

fn missile_vs_enemy(missiles: &mut Vec<Missile>, enemies: &mut Vec<Enemy>, players: &mut [Player], events: &mut Vec<GameEvent>) {
    let mut destroyed_missiles = Vec::new();
    let mut destroyed_enemies = Vec::new();

    for missile in missiles.iter() {
        for enemy in enemies.iter_mut() {
            if destroyed_missiles.contains(&missile.id) || destroyed_enemies.contains(&enemy.id) {
                continue;
            }
            if within(missile.pos_x, missile.pos_y, enemy.pos_x, enemy.pos_y, HIT_RADIUS) {
                destroyed_missiles.push(missile.id);
                enemy.hp = enemy.hp.saturating_sub(missile.damage as u16);
                if let Some(player) = players.iter_mut().find(|p| p.player_id == missile.owner) {
                    player.score.damage_dealt += missile.damage as u64;
                }
                if enemy.hp == 0 {
                    destroyed_enemies.push(enemy.id);
                    if let Some(player) = players.iter_mut().find(|p| p.player_id == missile.owner) {
                        player.score.kills += 1;
                        player.score.kill_streak += 1;
                        let weapon_idx = missile.weapon as u8 as usize;
                        player.score.kills_per_weapon[weapon_idx] += 1;
                        player.score.score += enemy.kind.reward() as u64;
                    }
                    events.push(GameEvent::EnemyDestroyed(EnemyDestroyedEvent { id: enemy.id, killed_by: missile.owner, reward: enemy.kind.reward() }));
                }
            }
        }
    }

    for id in &destroyed_missiles {
        events.push(GameEvent::MissileDestroyed(MissileDestroyedEvent { id: *id }));
    }
    missiles.retain(|m| !destroyed_missiles.contains(&m.id));
    enemies.retain(|e| !destroyed_enemies.contains(&e.id));
}

fn missile_vs_boss(missiles: &mut Vec<Missile>, boss: &mut Option<Boss>, players: &mut [Player], events: &mut Vec<GameEvent>) {
    let Some(active_boss) = boss.as_mut() else { return };
    let mut destroyed_missiles = Vec::new();

    for missile in missiles.iter() {
        if within(missile.pos_x, missile.pos_y, active_boss.pos_x, active_boss.pos_y, HIT_RADIUS * 2.0) {
            destroyed_missiles.push(missile.id);
            active_boss.hp = active_boss.hp.saturating_sub(missile.damage as u32);
            if let Some(player) = players.iter_mut().find(|p| p.player_id == missile.owner) {
                player.score.damage_dealt += missile.damage as u64;
            }
        }
    }
    for id in &destroyed_missiles {
        events.push(GameEvent::MissileDestroyed(MissileDestroyedEvent { id: *id }));
    }
    missiles.retain(|m| !destroyed_missiles.contains(&m.id));

    if active_boss.hp == 0 {
        let boss_id = active_boss.id;
        let killed_by = missiles.first().map(|m| m.owner).unwrap_or(0);
        for player in players.iter_mut() {
            player.score.boss_kills += 1;
        }
        events.push(GameEvent::EnemyDestroyed(EnemyDestroyedEvent { id: boss_id, killed_by, reward: 1000 }));
        *boss = None;
    }
}

fn enemy_vs_player(enemies: &[Enemy], players: &mut [Player], events: &mut Vec<GameEvent>) {
    for enemy in enemies {
        for player in players.iter_mut() {
            if !player.alive {
                continue;
            }
            if within(enemy.pos_x, enemy.pos_y, player.pos_x, player.pos_y, HIT_RADIUS) && player.apply_damage(ENEMY_CONTACT_DAMAGE) {
                player.score.kill_streak = 0;
                events.push(GameEvent::PlayerDamaged(PlayerDamagedEvent { player_id: player.player_id, damage: ENEMY_CONTACT_DAMAGE, remaining_hp: player.hp }));
                if !player.alive {
                    player.score.deaths += 1;
                    events.push(GameEvent::PlayerDied(PlayerDiedEvent { player_id: player.player_id }));
                }
            }
        }
    }
}

fn power_up_vs_player(power_ups: &mut Vec<PowerUp>, players: &mut [Player], events: &mut Vec<GameEvent>) {
    let mut collected = Vec::new();
    for power_up in power_ups.iter() {
        for player in players.iter_mut() {
            if !player.alive || collected.contains(&power_up.id) {
                continue;
            }
            if within(power_up.pos_x, power_up.pos_y, player.pos_x, player.pos_y, HIT_RADIUS) {
                collected.push(power_up.id);
                apply_power_up(player, power_up.kind);
                events.push(GameEvent::PowerUpCollected(PowerUpCollectedEvent { id: power_up.id, player_id: player.player_id }));
            }
        }
    }
    power_ups.retain(|p| !collected.contains(&p.id));
}

fn apply_power_up(player: &mut Player, kind: crate::entities::PowerUpKind) {
    use crate::entities::PowerUpKind;
    match kind {
        PowerUpKind::HealthPack => player.hp = (player.hp + 2).min(crate::entities::STARTING_HP),
        PowerUpKind::WeaponUpgrade(weapon) => player.upgrade_weapon(weapon),
        PowerUpKind::ForcePod => player.force_pod.attached = true,
        PowerUpKind::BitDevice => player.bit_device.attached = true,
        PowerUpKind::Shield => player.god_mode = true,
        PowerUpKind::ScoreBonus => player.score.score += 100,
    }
}

/// Force pods and bit devices both bite whatever enemy strays into their
/// radius; a force pod has to be riding the ship for contact, a bit device
/// is always in range of its own orbit.
fn force_vs_enemy(players: &[Player], enemies: &mut Vec<Enemy>, events: &mut Vec<GameEvent>) {
    let mut destroyed = Vec::new();
    for player in players {
        if player.force_pod.attached {
            bite_enemies(player.player_id, player.pos_x, player.pos_y, FORCE_BITE_RADIUS, FORCE_BITE_DAMAGE, enemies, &mut destroyed, events);
        }
        if player.bit_device.attached {
            let (bit_x, bit_y) = bit_device_position(player);
            bite_enemies(
                player.player_id,
                bit_x,
                bit_y,
                crate::entities::BIT_DEVICE_CONTACT_RADIUS,
                crate::entities::BIT_DEVICE_CONTACT_DAMAGE,
                enemies,
                &mut destroyed,
                events,
            );
        }
    }
    enemies.retain(|e| !destroyed.contains(&e.id));
}

/// Where a player's bit device currently is, orbiting at a fixed radius
/// around the ship.
pub fn bit_device_position(player: &Player) -> (f32, f32) {
    let (sin, cos) = player.bit_device.orbit_angle.sin_cos();
    (player.pos_x + cos * crate::entities::BIT_DEVICE_ORBIT_RADIUS, player.pos_y + sin * crate::entities::BIT_DEVICE_ORBIT_RADIUS)
}

fn bite_enemies(owner: u8, x: f32, y: f32, radius: f32, damage: u16, enemies: &mut [Enemy], destroyed: &mut Vec<u32>, events: &mut Vec<GameEvent>) {
    for enemy in enemies.iter_mut() {
        if destroyed.contains(&enemy.id) {
            continue;
        }
        if within(x, y, enemy.pos_x, enemy.pos_y, radius) {
            enemy.hp = enemy.hp.saturating_sub(damage);
            if enemy.hp == 0 {
                destroyed.push(enemy.id);
                events.push(GameEvent::EnemyDestroyed(EnemyDestroyedEvent { id: enemy.id, killed_by: owner, reward: enemy.kind.reward() }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::game::WeaponKind;

    fn player_at(id: u8, x: f32, y: f32) -> Player {
        let mut p = Player::new(id, format!("p{id}@example.com"), 0);
        p.pos_x = x;
        p.pos_y = y;
        p
    }

    #[test]
    fn missile_destroys_low_hp_enemy_and_credits_owner() {
        let mut players = vec![player_at(0, 0.0, 0.0)];
        let mut missiles = vec![Missile { id: 1, owner: 0, pos_x: 100.0, pos_y: 0.0, vel_x: 0.0, vel_y: 0.0, weapon: WeaponKind::Standard, damage: 99, homing_target: None }];
        let mut enemies = vec![Enemy { id: 1, kind: crate::entities::EnemyKind::Drifter, pos_x: 100.0, pos_y: 0.0, vel_x: 0.0, vel_y: 0.0, hp: 10 }];
        let mut boss = None;
        let mut power_ups = Vec::new();
        let mut events = Vec::new();
        resolve(&mut players, &mut missiles, &mut enemies, &mut boss, &mut power_ups, &mut events);
        assert!(enemies.is_empty());
        assert!(missiles.is_empty());
        assert_eq!(players[0].score.kills, 1);
        assert!(matches!(events[0], GameEvent::EnemyDestroyed(_)));
        assert!(events.iter().any(|e| matches!(e, GameEvent::MissileDestroyed(m) if m.id == 1)));
    }

    #[test]
    fn weapon_upgrade_power_up_is_independent_per_weapon() {
        let mut players = vec![player_at(0, 10.0, 10.0)];
        let mut power_ups = vec![PowerUp { id: 1, kind: crate::entities::PowerUpKind::WeaponUpgrade(WeaponKind::Spread), pos_x: 10.0, pos_y: 10.0, lifetime_secs: 5.0 }];
        let mut missiles = Vec::new();
        let mut enemies = Vec::new();
        let mut boss = None;
        let mut events = Vec::new();
        resolve(&mut players, &mut missiles, &mut enemies, &mut boss, &mut power_ups, &mut events);
        assert_eq!(players[0].weapon_levels[WeaponKind::Spread as u8 as usize], 1);
        assert_eq!(players[0].weapon_levels[WeaponKind::Standard as u8 as usize], 0);
    }

    #[test]
    fn bit_device_power_up_attaches_without_affecting_force_pod() {
        let mut players = vec![player_at(0, 10.0, 10.0)];
        let mut power_ups = vec![PowerUp { id: 1, kind: crate::entities::PowerUpKind::BitDevice, pos_x: 10.0, pos_y: 10.0, lifetime_secs: 5.0 }];
        let mut missiles = Vec::new();
        let mut enemies = Vec::new();
        let mut boss = None;
        let mut events = Vec::new();
        resolve(&mut players, &mut missiles, &mut enemies, &mut boss, &mut power_ups, &mut events);
        assert!(players[0].bit_device.attached);
        assert!(!players[0].force_pod.attached);
    }

    #[test]
    fn attached_bit_device_bites_enemies_in_orbit_range() {
        let mut players = vec![player_at(0, 0.0, 0.0)];
        players[0].bit_device.attached = true;
        players[0].bit_device.orbit_angle = 0.0;
        let (bit_x, bit_y) = bit_device_position(&players[0]);
        let mut enemies = vec![Enemy { id: 1, kind: crate::entities::EnemyKind::Drifter, pos_x: bit_x, pos_y: bit_y, vel_x: 0.0, vel_y: 0.0, hp: 1 }];
        let mut missiles = Vec::new();
        let mut boss = None;
        let mut power_ups = Vec::new();
        let mut events = Vec::new();
        resolve(&mut players, &mut missiles, &mut enemies, &mut boss, &mut power_ups, &mut events);
        assert!(enemies.is_empty());
        assert!(events.iter().any(|e| matches!(e, GameEvent::EnemyDestroyed(ev) if ev.killed_by == 0)));
    }

    #[test]
    fn enemy_contact_damages_and_eventually_kills_player() {
        let mut players = vec![player_at(0, 0.0, 0.0)];
        players[0].hp = 1;
        let mut enemies = vec![Enemy { id: 1, kind: crate::entities::EnemyKind::Drifter, pos_x: 0.0, pos_y: 0.0, vel_x: 0.0, vel_y: 0.0, hp: 10 }];
        let mut missiles = Vec::new();
        let mut boss = None;
        let mut power_ups = Vec::new();
        let mut events = Vec::new();
        resolve(&mut players, &mut missiles, &mut enemies, &mut boss, &mut power_ups, &mut events);
        assert!(!players[0].alive);
        assert!(events.iter().any(|e| matches!(e, GameEvent::PlayerDied(_))));
    }
}
