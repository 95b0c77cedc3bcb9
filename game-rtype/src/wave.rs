//! Wave spawn scheduling (§4.4 "Advance ... wave spawning, boss ...").
//!
//! A wave is a fixed number of enemies trickled in at a fixed interval;
//! every 5th wave additionally spawns a boss once the trickle is spent.
//! Spawn cadence is a rate and is scaled by `game_speed_percent`.

use crate::entities::{Boss, Enemy, EnemyKind};

pub const BOSS_WAVE_INTERVAL: u32 = 5;
const SPAWN_INTERVAL_SECS: f32 = 1.2;

pub struct WaveController {
    pub wave_number: u32,
    pub elapsed_secs: f32,
    enemies_remaining_to_spawn: u32,
    boss_spawned_this_wave: bool,
}

impl Default for WaveController {
    fn default() -> Self {
        WaveController { wave_number: 0, elapsed_secs: 0.0, enemies_remaining_to_spawn: 0, boss_spawned_this_wave: false }
    }
}

impl WaveController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_boss_wave(&self) -> bool {
        self.wave_number > 0 && self.wave_number % BOSS_WAVE_INTERVAL == 0
    }

    fn enemy_count_for_wave(&self) -> u32 {
        4 + self.wave_number * 2
    }

    pub fn start_next_wave(&mut self) {
        self.wave_number += 1;
        self.elapsed_secs = 0.0;
        self.enemies_remaining_to_spawn = self.enemy_count_for_wave();
        self.boss_spawned_this_wave = false;
    }

    pub fn wave_cleared(&self, live_enemy_count: usize, boss_alive: bool) -> bool {
        self.enemies_remaining_to_spawn == 0 && live_enemy_count == 0 && !boss_alive
    }

    /// Advances the spawn clock by `dt` and returns any enemies that should
    /// be spawned this tick, plus a boss if this is a boss wave and the
    /// trickle has just run dry.
    pub fn tick(&mut self, dt: f32, mut next_enemy_id: impl FnMut() -> u32, mut next_boss_id: impl FnMut() -> u32) -> (Vec<Enemy>, Option<Boss>) {
        self.elapsed_secs += dt;
        let mut spawned = Vec::new();

        while self.enemies_remaining_to_spawn > 0 && self.elapsed_secs >= SPAWN_INTERVAL_SECS {
            self.elapsed_secs -= SPAWN_INTERVAL_SECS;
            self.enemies_remaining_to_spawn -= 1;
            let kind = match self.enemies_remaining_to_spawn % 4 {
                0 => EnemyKind::Drifter,
                1 => EnemyKind::Bydo,
                2 => EnemyKind::Walled,
                _ => EnemyKind::Satellite,
            };
            spawned.push(Enemy {
                id: next_enemy_id(),
                kind,
                pos_x: 800.0,
                pos_y: (self.enemies_remaining_to_spawn as f32 * 37.0) % 400.0,
                vel_x: -60.0,
                vel_y: 0.0,
                hp: kind.base_hp(),
            });
        }

        let boss = if self.is_boss_wave() && self.enemies_remaining_to_spawn == 0 && !self.boss_spawned_this_wave {
            self.boss_spawned_this_wave = true;
            Some(Boss { id: next_boss_id(), pos_x: 850.0, pos_y: 200.0, hp: 500 + self.wave_number * 50, max_hp: 500 + self.wave_number * 50, phase: 0 })
        } else {
            None
        };

        (spawned, boss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boss_spawns_only_on_fifth_wave() {
        let mut controller = WaveController::new();
        for _ in 0..4 {
            controller.start_next_wave();
        }
        assert!(!controller.is_boss_wave());
        controller.start_next_wave();
        assert!(controller.is_boss_wave());
    }

    #[test]
    fn trickle_drains_to_zero_then_stops_spawning() {
        let mut controller = WaveController::new();
        controller.start_next_wave();
        let mut id = 0u32;
        let mut boss_id = 0u32;
        let mut total_spawned = 0;
        for _ in 0..200 {
            let (enemies, _) = controller.tick(0.1, || { id += 1; id }, || { boss_id += 1; boss_id });
            total_spawned += enemies.len();
        }
        assert_eq!(total_spawned as u32, 6);
    }
}
