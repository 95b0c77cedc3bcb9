//! `RTypeInstance`: the concrete per-room authoritative simulation. The
//! only implementation of [`server_core::game_trait::GameInstance`] this
//! workspace ships; C5 holds it behind an actor so `tick` and the command
//! handlers never run concurrently with each other.

use std::time::Duration;

use protocol::datagram::input_bits;
use protocol::game::{
    EnemySnapshot, ForceStateUpdateEvent, GameEvent, MissileSnapshot, PauseStateSync, PlayerJoinEvent, PlayerLeaveEvent,
    PlayerSnapshot, PowerUpSnapshot, SnapshotPayload, WaveCannonFiredEvent, WeaponKind,
};
use server_core::game_trait::{GameCommand, GameInstance, TickOutput};

use crate::collisions;
use crate::entities::{Enemy, MAX_PLAYERS, Missile, PLAYER_INACTIVITY_TIMEOUT_SECS, Player, PowerUp, PowerUpKind};
use crate::wave::WaveController;
use crate::weapons;

const POWER_UP_SPAWN_INTERVAL_SECS: f32 = 8.0;
const POWER_UP_LIFETIME_SECS: f32 = 12.0;

pub struct RTypeInstance {
    players: Vec<Player>,
    missiles: Vec<Missile>,
    enemies: Vec<Enemy>,
    boss: Option<crate::entities::Boss>,
    power_ups: Vec<PowerUp>,
    wave: WaveController,
    next_entity_id: u32,
    tick_count: u64,
    game_speed_percent: u16,
    power_up_spawn_timer: f32,
    pending_inputs: [Option<protocol::datagram::PlayerInputPayload>; MAX_PLAYERS],
    pending_charges: [Option<f32>; MAX_PLAYERS],
    pending_events: Vec<GameEvent>,
}

impl Default for RTypeInstance {
    fn default() -> Self {
        RTypeInstance {
            players: Vec::new(),
            missiles: Vec::new(),
            enemies: Vec::new(),
            boss: None,
            power_ups: Vec::new(),
            wave: WaveController::new(),
            next_entity_id: 1,
            tick_count: 0,
            game_speed_percent: 100,
            power_up_spawn_timer: 0.0,
            pending_inputs: Default::default(),
            pending_charges: Default::default(),
            pending_events: Vec::new(),
        }
    }
}

impl RTypeInstance {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    fn speed_scale(&self) -> f32 {
        self.game_speed_percent as f32 / 100.0
    }

    fn occupant_count(&self) -> usize {
        self.players.len()
    }

    /// Pause engages iff all occupied slots vote pause; releases as soon as
    /// any vote clears (§4.4 "Pause").
    fn is_paused(&self) -> bool {
        self.occupant_count() > 0 && self.players.iter().all(|p| p.wants_pause)
    }

    fn pause_sync(&self) -> PauseStateSync {
        PauseStateSync {
            is_paused: self.is_paused(),
            voters: self.players.iter().filter(|p| p.wants_pause).count() as u8,
            total: self.occupant_count() as u8,
        }
    }

    fn expire_timed_out_players(&mut self, dt_secs: f32) {
        let mut removed = Vec::new();
        for player in self.players.iter_mut() {
            player.last_activity_secs += dt_secs;
            if player.last_activity_secs > PLAYER_INACTIVITY_TIMEOUT_SECS {
                removed.push(player.player_id);
            }
        }
        for player_id in removed {
            self.remove_player(player_id);
            self.pending_events.push(GameEvent::PlayerLeave(PlayerLeaveEvent { player_id }));
        }
    }

    fn remove_player(&mut self, player_id: u8) {
        self.players.retain(|p| p.player_id != player_id);
        self.pending_inputs[player_id as usize % MAX_PLAYERS] = None;
        self.pending_charges[player_id as usize % MAX_PLAYERS] = None;
    }

    fn apply_buffered_inputs(&mut self, dt_secs: f32) {
        let speed = self.speed_scale();
        let slots: Vec<u8> = self.players.iter().map(|p| p.player_id).collect();
        for player_id in slots {
            let Some(input) = self.pending_inputs[player_id as usize % MAX_PLAYERS].take() else { continue };
            let Some(player) = self.players.iter_mut().find(|p| p.player_id == player_id) else { continue };
            if input.seq < player.last_input_seq {
                continue;
            }
            player.last_input_seq = input.seq;
            player.last_activity_secs = 0.0;

            let mut vx = 0.0;
            let mut vy = 0.0;
            if input.keys & input_bits::UP != 0 {
                vy -= 1.0;
            }
            if input.keys & input_bits::DOWN != 0 {
                vy += 1.0;
            }
            if input.keys & input_bits::LEFT != 0 {
                vx -= 1.0;
            }
            if input.keys & input_bits::RIGHT != 0 {
                vx += 1.0;
            }
            player.vel_x = vx * 200.0;
            player.vel_y = vy * 200.0;
            player.pos_x += player.vel_x * dt_secs;
            player.pos_y += player.vel_y * dt_secs;

            if player.shoot_cooldown > 0.0 {
                player.shoot_cooldown -= dt_secs * speed;
            }
            if input.keys & input_bits::SHOOT != 0 && player.shoot_cooldown <= 0.0 && player.alive {
                let weapon = player.current_weapon;
                let level = player.current_weapon_level();
                let pos = (player.pos_x, player.pos_y);
                let new_missiles = weapons::fire(weapon, level, player_id, pos.0, pos.1, || 0);
                player.shoot_cooldown = weapons::cooldown_for_level(weapon, level) / speed.max(0.01);
                for mut missile in new_missiles {
                    missile.id = self.next_id();
                    self.pending_events.push(GameEvent::MissileSpawned(protocol::game::MissileSpawnedEvent { id: missile.id, owner: player_id }));
                    self.missiles.push(missile);
                }
            }
        }
    }

    fn apply_buffered_charges(&mut self) {
        let slots: Vec<u8> = self.players.iter().map(|p| p.player_id).collect();
        for player_id in slots {
            let Some(charge_secs) = self.pending_charges[player_id as usize % MAX_PLAYERS].take() else { continue };
            let Some(player) = self.players.iter().find(|p| p.player_id == player_id) else { continue };
            let pos = (player.pos_x, player.pos_y);
            if let Some(projectile) = weapons::release_wave_cannon(player_id, pos.0, pos.1, charge_secs, || 0) {
                let id = self.next_id();
                self.pending_events.push(GameEvent::WaveCannonFired(WaveCannonFiredEvent { player_id, charge_level: projectile.charge_level }));
                // Wave-cannon shots are resolved as a single high-damage
                // missile against the standard missile-vs-enemy/boss pass.
                self.missiles.push(Missile {
                    id,
                    owner: player_id,
                    pos_x: projectile.pos_x,
                    pos_y: projectile.pos_y,
                    vel_x: 600.0,
                    vel_y: 0.0,
                    weapon: WeaponKind::Missile,
                    damage: projectile.damage.min(255) as u8,
                    homing_target: None,
                });
            }
        }
    }

    /// Orbits every attached bit device and, independently of its owner's
    /// weapon, fires a standard missile on its own cooldown (§GLOSSARY: "the
    /// latter orbits and fires").
    fn advance_bit_devices(&mut self, dt_secs: f32, speed: f32) {
        let mut firing = Vec::new();
        for player in self.players.iter_mut() {
            if !player.bit_device.attached {
                continue;
            }
            player.bit_device.orbit_angle = (player.bit_device.orbit_angle + crate::entities::BIT_DEVICE_ORBIT_RATE_RADS * dt_secs * speed) % std::f32::consts::TAU;
            if !player.alive {
                continue;
            }
            player.bit_device.fire_cooldown -= dt_secs * speed;
            if player.bit_device.fire_cooldown <= 0.0 {
                player.bit_device.fire_cooldown = crate::entities::BIT_DEVICE_FIRE_INTERVAL_SECS;
                firing.push(player.player_id);
            }
        }
        for player_id in firing {
            let Some(player) = self.players.iter().find(|p| p.player_id == player_id) else { continue };
            let (pos_x, pos_y) = collisions::bit_device_position(player);
            let id = self.next_id();
            self.pending_events.push(GameEvent::MissileSpawned(protocol::game::MissileSpawnedEvent { id, owner: player_id }));
            self.missiles.push(Missile { id, owner: player_id, pos_x, pos_y, vel_x: 500.0, vel_y: 0.0, weapon: WeaponKind::Standard, damage: 1, homing_target: None });
        }
    }

    fn advance_world(&mut self, dt_secs: f32) {
        let speed = self.speed_scale();
        self.advance_bit_devices(dt_secs, speed);
        for missile in self.missiles.iter_mut() {
            missile.pos_x += missile.vel_x * dt_secs;
            missile.pos_y += missile.vel_y * dt_secs;
        }
        self.missiles.retain(|m| m.pos_x > -50.0 && m.pos_x < 2000.0);

        for enemy in self.enemies.iter_mut() {
            enemy.pos_x += enemy.vel_x * dt_secs * speed;
            enemy.pos_y += enemy.vel_y * dt_secs * speed;
        }
        self.enemies.retain(|e| e.pos_x > -50.0);

        let (spawned_enemies, spawned_boss) = self.wave.tick(dt_secs * speed, || 0, || 0);
        for mut enemy in spawned_enemies {
            enemy.id = self.next_id();
            self.enemies.push(enemy);
        }
        if let Some(mut boss) = spawned_boss {
            boss.id = self.next_id();
            self.boss = Some(boss);
        }
        if self.wave.wave_cleared(self.enemies.len(), self.boss.is_some()) {
            self.wave.start_next_wave();
            for player in self.players.iter_mut() {
                player.score.wave_streak += 1;
            }
        }

        self.power_up_spawn_timer += dt_secs * speed;
        if self.power_up_spawn_timer >= POWER_UP_SPAWN_INTERVAL_SECS && !self.players.is_empty() {
            self.power_up_spawn_timer = 0.0;
            let id = self.next_id();
            let kind = match id % 6 {
                0 => PowerUpKind::HealthPack,
                1 => PowerUpKind::WeaponUpgrade(WeaponKind::Spread),
                2 => PowerUpKind::ForcePod,
                3 => PowerUpKind::BitDevice,
                4 => PowerUpKind::Shield,
                _ => PowerUpKind::ScoreBonus,
            };
            self.pending_events.push(GameEvent::PowerUpSpawned(protocol::game::PowerUpSpawnedEvent { id, kind: kind.wire_kind() }));
            self.power_ups.push(PowerUp { id, kind, pos_x: 800.0, pos_y: 100.0, lifetime_secs: POWER_UP_LIFETIME_SECS });
        }
        for power_up in self.power_ups.iter_mut() {
            power_up.lifetime_secs -= dt_secs * speed;
        }
        let mut expired = Vec::new();
        self.power_ups.retain(|p| {
            if p.lifetime_secs <= 0.0 {
                expired.push(p.id);
                false
            } else {
                true
            }
        });
        for id in expired {
            self.pending_events.push(GameEvent::PowerUpExpired(protocol::game::PowerUpExpiredEvent { id }));
        }
    }

    fn build_snapshot(&self) -> SnapshotPayload {
        SnapshotPayload {
            tick: self.tick_count,
            players: self
                .players
                .iter()
                .map(|p| PlayerSnapshot {
                    player_id: p.player_id,
                    pos_x: p.pos_x,
                    pos_y: p.pos_y,
                    hp: p.hp,
                    alive: p.alive,
                    current_weapon: p.current_weapon,
                    weapon_level: p.current_weapon_level(),
                    score: p.score.score.min(u32::MAX as u64) as u32,
                })
                .collect(),
            missiles: self.missiles.iter().map(|m| MissileSnapshot { id: m.id, owner: m.owner, pos_x: m.pos_x, pos_y: m.pos_y }).collect(),
            enemies: self.enemies.iter().map(|e| EnemySnapshot { id: e.id, kind: e.kind.wire_kind(), pos_x: e.pos_x, pos_y: e.pos_y, hp: e.hp }).collect(),
            power_ups: self.power_ups.iter().map(|p| PowerUpSnapshot { id: p.id, kind: p.kind.wire_kind(), pos_x: p.pos_x, pos_y: p.pos_y }).collect(),
        }
    }
}

impl GameInstance for RTypeInstance {
    fn player_join(&mut self, player_id: u8, game_speed_percent: u16) {
        self.game_speed_percent = game_speed_percent;
        if self.players.iter().any(|p| p.player_id == player_id) {
            return;
        }
        self.players.push(Player::new(player_id, String::new(), 0));
        self.pending_events.push(GameEvent::PlayerJoin(PlayerJoinEvent { player_id }));
        if self.wave.wave_number == 0 {
            self.wave.start_next_wave();
        }
    }

    fn player_leave(&mut self, player_id: u8) -> usize {
        self.remove_player(player_id);
        self.pending_events.push(GameEvent::PlayerLeave(PlayerLeaveEvent { player_id }));
        self.players.len()
    }

    fn handle_command(&mut self, player_id: u8, command: GameCommand) {
        let slot = player_id as usize % MAX_PLAYERS;
        match command {
            GameCommand::Input(input) => {
                let replace = match &self.pending_inputs[slot] {
                    Some(existing) => input.seq >= existing.seq,
                    None => true,
                };
                if replace {
                    self.pending_inputs[slot] = Some(input);
                }
            }
            GameCommand::ChargeRelease(release) => {
                self.pending_charges[slot] = Some(release.charge_millis as f32 / 1000.0);
            }
            GameCommand::PauseVote(wants_pause) => {
                let was_paused = self.is_paused();
                if let Some(player) = self.players.iter_mut().find(|p| p.player_id == player_id) {
                    player.wants_pause = wants_pause;
                }
                if was_paused != self.is_paused() {
                    self.pending_events.push(GameEvent::PauseStateSync(self.pause_sync()));
                }
            }
            GameCommand::ForceToggle => {
                let Some(player) = self.players.iter_mut().find(|p| p.player_id == player_id) else { return };
                if !player.alive {
                    return;
                }
                player.force_pod.attached = !player.force_pod.attached;
                self.pending_events.push(GameEvent::ForceStateUpdate(ForceStateUpdateEvent { player_id, attached: player.force_pod.attached }));
            }
            GameCommand::SetGodMode(enabled) => {
                if let Some(player) = self.players.iter_mut().find(|p| p.player_id == player_id) {
                    player.god_mode = enabled;
                }
            }
        }
    }

    fn tick(&mut self, dt: Duration) -> TickOutput {
        self.tick_count += 1;
        let dt_secs = dt.as_secs_f32();

        self.expire_timed_out_players(dt_secs);

        let paused = self.is_paused();
        if !paused {
            self.apply_buffered_inputs(dt_secs);
            self.apply_buffered_charges();
            self.advance_world(dt_secs);
            collisions::resolve(&mut self.players, &mut self.missiles, &mut self.enemies, &mut self.boss, &mut self.power_ups, &mut self.pending_events);
        }

        let snapshot = self.build_snapshot();
        let events = std::mem::take(&mut self.pending_events);
        TickOutput { events, snapshot, paused }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::datagram::PlayerInputPayload;

    #[test]
    fn join_spawns_player_with_starting_hp() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        let output = instance.tick(Duration::from_millis(50));
        assert_eq!(output.snapshot.players.len(), 1);
        assert_eq!(output.snapshot.players[0].hp, crate::entities::STARTING_HP);
        assert_eq!(output.snapshot.players[0].weapon_level, 0);
    }

    #[test]
    fn weapon_level_independence_across_switches() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        instance.players[0].upgrade_weapon(WeaponKind::Standard);
        instance.players[0].upgrade_weapon(WeaponKind::Standard);
        instance.players[0].upgrade_weapon(WeaponKind::Standard);
        instance.players[0].current_weapon = WeaponKind::Spread;
        assert_eq!(instance.players[0].current_weapon_level(), 0);
        instance.players[0].current_weapon = WeaponKind::Standard;
        assert_eq!(instance.players[0].current_weapon_level(), 3);
    }

    #[test]
    fn pause_requires_all_occupants_and_releases_on_any_clear() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        instance.player_join(1, 100);
        instance.player_join(2, 100);
        instance.handle_command(0, GameCommand::PauseVote(true));
        assert!(!instance.is_paused());
        instance.handle_command(1, GameCommand::PauseVote(true));
        assert!(!instance.is_paused());
        instance.handle_command(2, GameCommand::PauseVote(true));
        assert!(instance.is_paused());
        instance.handle_command(1, GameCommand::PauseVote(false));
        assert!(!instance.is_paused());
    }

    #[test]
    fn latest_input_sequence_wins_within_a_tick() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        instance.handle_command(0, GameCommand::Input(PlayerInputPayload { keys: 0, seq: 5 }));
        instance.handle_command(0, GameCommand::Input(PlayerInputPayload { keys: input_bits::RIGHT, seq: 3 }));
        assert_eq!(instance.pending_inputs[0].unwrap().seq, 5);
    }

    #[test]
    fn force_toggle_flips_attach_state_and_emits_event() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        instance.handle_command(0, GameCommand::ForceToggle);
        assert!(instance.players[0].force_pod.attached);
        let events = std::mem::take(&mut instance.pending_events);
        assert!(events.iter().any(|e| matches!(e, GameEvent::ForceStateUpdate(u) if u.player_id == 0 && u.attached)));

        instance.handle_command(0, GameCommand::ForceToggle);
        assert!(!instance.players[0].force_pod.attached);
    }

    #[test]
    fn force_toggle_is_ignored_for_a_dead_player() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        instance.players[0].alive = false;
        instance.handle_command(0, GameCommand::ForceToggle);
        assert!(!instance.players[0].force_pod.attached);
    }

    #[test]
    fn bit_device_orbit_advances_only_while_attached() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        instance.tick(Duration::from_millis(500));
        assert_eq!(instance.players[0].bit_device.orbit_angle, 0.0);

        instance.players[0].bit_device.attached = true;
        instance.tick(Duration::from_millis(500));
        assert!(instance.players[0].bit_device.orbit_angle > 0.0);
    }

    #[test]
    fn attached_bit_device_fires_on_its_own_cooldown() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        instance.players[0].bit_device.attached = true;
        let output = instance.tick(Duration::from_millis(50));
        assert_eq!(output.snapshot.missiles.len(), 1);
        assert!(output.events.iter().any(|e| matches!(e, GameEvent::MissileSpawned(m) if m.owner == 0)));
    }

    #[test]
    fn set_god_mode_command_flips_invincibility() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        instance.handle_command(0, GameCommand::SetGodMode(true));
        assert!(instance.players[0].god_mode);
        assert!(!instance.players[0].apply_damage(1));
        instance.handle_command(0, GameCommand::SetGodMode(false));
        assert!(instance.players[0].apply_damage(1));
    }

    #[test]
    fn timeout_removes_inactive_player() {
        let mut instance = RTypeInstance::new();
        instance.player_join(0, 100);
        for _ in 0..10 {
            instance.tick(Duration::from_secs(5));
        }
        let output = instance.tick(Duration::from_millis(50));
        assert!(output.snapshot.players.is_empty());
    }
}
