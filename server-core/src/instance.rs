//! Instance manager (C5) and the per-instance actor that gives a
//! [`GameInstance`] its serial execution context.
//!
//! Per the Design Notes (§9) the reference's strand (a dedicated
//! single-thread `io_context` per room) is realized here as a
//! single-consumer `tokio::sync::mpsc` channel drained by one spawned task.
//! All work for an instance funnels through that one task, so the
//! `GameInstance` implementation never needs its own synchronization —
//! exactly the guarantee the strand gave the reference, without pinning an
//! OS thread per room.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::game_trait::{GameCommand, GameInstance, TickOutput};

enum InstanceMessage {
    Join { player_id: u8, game_speed_percent: u16 },
    Leave { player_id: u8, reply: oneshot::Sender<usize> },
    Command { player_id: u8, command: GameCommand },
    Tick { dt: Duration, reply: oneshot::Sender<TickOutput> },
}

/// A cheap, cloneable reference to a running instance's actor mailbox.
#[derive(Clone)]
pub struct InstanceHandle {
    sender: mpsc::UnboundedSender<InstanceMessage>,
}

impl InstanceHandle {
    pub fn join(&self, player_id: u8, game_speed_percent: u16) {
        let _ = self.sender.send(InstanceMessage::Join { player_id, game_speed_percent });
    }

    /// Awaits the actor's reply so the caller can act on the resulting
    /// occupant count (e.g. ask C5 to dispose of the instance) without
    /// racing a concurrent join.
    pub async fn leave(&self, player_id: u8) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(InstanceMessage::Leave { player_id, reply: tx }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub fn send_command(&self, player_id: u8, command: GameCommand) {
        let _ = self.sender.send(InstanceMessage::Command { player_id, command });
    }

    pub async fn tick(&self, dt: Duration) -> Option<TickOutput> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(InstanceMessage::Tick { dt, reply: tx }).ok()?;
        rx.await.ok()
    }
}

/// Spawns the actor task owning `instance` and returns a handle to it. The
/// task exits once every `InstanceHandle` clone is dropped — the channel
/// closes, `recv` returns `None`, and the loop (and the boxed instance with
/// it) is dropped without anyone else observing a half-torn-down instance.
pub fn spawn_instance_actor(mut instance: Box<dyn GameInstance>) -> InstanceHandle {
    let (sender, mut receiver) = mpsc::unbounded_channel::<InstanceMessage>();
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            match message {
                InstanceMessage::Join { player_id, game_speed_percent } => {
                    instance.player_join(player_id, game_speed_percent);
                }
                InstanceMessage::Leave { player_id, reply } => {
                    let remaining = instance.player_leave(player_id);
                    let _ = reply.send(remaining);
                }
                InstanceMessage::Command { player_id, command } => {
                    instance.handle_command(player_id, command);
                }
                InstanceMessage::Tick { dt, reply } => {
                    let output = instance.tick(dt);
                    let _ = reply.send(output);
                }
            }
        }
    });
    InstanceHandle { sender }
}

/// C5: a code→instance map guarded by a single lock. `get_or_create` is the
/// only way an instance comes into existence; `remove` is the only way one
/// leaves, matching §4.5 exactly.
#[derive(Default)]
pub struct InstanceManager {
    instances: Mutex<HashMap<String, InstanceHandle>>,
}

impl InstanceManager {
    pub fn new() -> Self {
        InstanceManager { instances: Mutex::new(HashMap::new()) }
    }

    /// Lazily constructs an instance via `factory` on first join for this
    /// room code. `factory` is only invoked while holding the lock, so two
    /// concurrent first-joiners can never spawn two actors for one code.
    pub fn get_or_create(&self, code: &str, factory: impl FnOnce() -> Box<dyn GameInstance>) -> InstanceHandle {
        let mut instances = self.instances.lock().unwrap();
        instances
            .entry(code.to_string())
            .or_insert_with(|| spawn_instance_actor(factory()))
            .clone()
    }

    pub fn get_instance(&self, code: &str) -> Option<InstanceHandle> {
        self.instances.lock().unwrap().get(code).cloned()
    }

    pub fn remove(&self, code: &str) {
        self.instances.lock().unwrap().remove(code);
    }

    pub fn active_room_codes(&self) -> Vec<String> {
        self.instances.lock().unwrap().keys().cloned().collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::game::SnapshotPayload;

    struct StubInstance {
        occupants: usize,
    }

    impl GameInstance for StubInstance {
        fn player_join(&mut self, _player_id: u8, _game_speed_percent: u16) {
            self.occupants += 1;
        }

        fn player_leave(&mut self, _player_id: u8) -> usize {
            self.occupants = self.occupants.saturating_sub(1);
            self.occupants
        }

        fn handle_command(&mut self, _player_id: u8, _command: GameCommand) {}

        fn tick(&mut self, _dt: Duration) -> TickOutput {
            TickOutput {
                events: Vec::new(),
                snapshot: SnapshotPayload { tick: 0, players: Vec::new(), missiles: Vec::new(), enemies: Vec::new(), power_ups: Vec::new() },
                paused: false,
            }
        }
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_for_the_same_code() {
        let manager = InstanceManager::new();
        let a = manager.get_or_create("ABCDEF", || Box::new(StubInstance { occupants: 0 }));
        let b = manager.get_or_create("ABCDEF", || Box::new(StubInstance { occupants: 0 }));
        a.join(1, 100);
        assert_eq!(b.leave(1).await, 0);
        assert_eq!(manager.instance_count(), 1);
    }

    #[tokio::test]
    async fn remove_drops_the_actor() {
        let manager = InstanceManager::new();
        manager.get_or_create("ABCDEF", || Box::new(StubInstance { occupants: 0 }));
        manager.remove("ABCDEF");
        assert!(manager.get_instance("ABCDEF").is_none());
    }

    #[tokio::test]
    async fn tick_round_trips_through_the_actor() {
        let manager = InstanceManager::new();
        let handle = manager.get_or_create("ABCDEF", || Box::new(StubInstance { occupants: 0 }));
        let output = handle.tick(Duration::from_millis(50)).await.unwrap();
        assert_eq!(output.snapshot.tick, 0);
    }
}
