//! Datagram-channel server (C7, §4.4/§4.5/§4.7): UDP join/auth, per-packet
//! command dispatch into the owning instance actor, the fixed-tick broadcast
//! scheduler, and the auto-save and inactivity-watchdog timers that depend
//! on session and instance state rather than any one client's packets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use protocol::datagram::{
    self, ChargeReleasePayload, DatagramMessageType, JoinGameAckPayload, JoinGameNackPayload, JoinGameNackReason,
    JoinGamePayload, PauseRequestPayload, PlayerInputPayload, encode_datagram, encode_datagram_payload, parse_datagram,
};
use protocol::game::SnapshotPayload;
use server_core::game_trait::GameCommand;
use server_core::repository::LeaderboardEntry;
use server_core::token::Token;
use server_core::Services;
use tokio::net::UdpSocket;

/// §4.4: the authoritative simulation advances in fixed 50ms steps
/// regardless of how often clients send input.
const TICK_INTERVAL: Duration = Duration::from_millis(50);
/// §4.7: the auto-save sweep period for live session stats.
const AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(1);
/// §4.2: how often the watchdog sweeps for pending/inactive sessions.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

pub async fn run(socket: UdpSocket, services: Arc<Services>) {
    let socket = Arc::new(socket);

    tokio::spawn(tick_scheduler(socket.clone(), services.clone()));
    tokio::spawn(auto_save_loop(services.clone()));
    tokio::spawn(watchdog_loop(socket.clone(), services.clone()));

    let sequence = AtomicU16::new(0);
    let mut buf = [0u8; datagram::MAX_DATAGRAM_SIZE];
    loop {
        let (n, endpoint) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%err, "udp recv failed");
                continue;
            }
        };
        let Ok(frame) = parse_datagram(&buf[..n]) else { continue };
        let Some(message_type) = DatagramMessageType::from_u16(frame.header.message_type) else { continue };
        handle_datagram(message_type, &frame.payload, endpoint, &socket, &services, &sequence).await;
    }
}

async fn send_to(socket: &UdpSocket, endpoint: SocketAddr, message_type: DatagramMessageType, sequence: &AtomicU16, payload: &[u8]) {
    let seq = sequence.fetch_add(1, Ordering::Relaxed);
    let frame = encode_datagram(message_type, seq, now_millis(), payload);
    if let Err(err) = socket.send_to(&frame, endpoint).await {
        tracing::debug!(%err, %endpoint, "udp send failed");
    }
}

async fn handle_datagram(
    message_type: DatagramMessageType,
    payload: &[u8],
    endpoint: SocketAddr,
    socket: &UdpSocket,
    services: &Arc<Services>,
    sequence: &AtomicU16,
) {
    use DatagramMessageType::*;

    if message_type != JoinGame {
        services.sessions.update_activity(endpoint);
    }

    match message_type {
        HeartBeat => {}

        JoinGame => handle_join_game(payload, endpoint, socket, services, sequence).await,

        PlayerInput => {
            let Some(input) = PlayerInputPayload::from_bytes(payload, payload.len()) else { return };
            dispatch_command(endpoint, services, GameCommand::Input(input)).await;
        }

        ChargeRelease => {
            let Some(release) = ChargeReleasePayload::from_bytes(payload, payload.len()) else { return };
            dispatch_command(endpoint, services, GameCommand::ChargeRelease(release)).await;
        }

        PauseRequest => {
            let Some(request) = PauseRequestPayload::from_bytes(payload, payload.len()) else { return };
            dispatch_command(endpoint, services, GameCommand::PauseVote(request.wants_pause)).await;
        }

        // Shooting is carried entirely by `PlayerInput`'s SHOOT bit; charge
        // start is a purely client-side visual cue. Both are acknowledged
        // on the wire but need no instance-side action.
        ShootMissile | ChargeStart => {}

        ForceToggle => {
            dispatch_command(endpoint, services, GameCommand::ForceToggle).await;
        }

        JoinGameAck | JoinGameNack | Snapshot | PlayerJoin | PlayerLeave | PlayerDamaged | PlayerDied
        | MissileSpawned | MissileDestroyed | EnemyDestroyed | PowerUpSpawned | PowerUpCollected | PowerUpExpired
        | WaveCannonFired | ForceStateUpdate | PauseStateSync => {
            // Server-to-client message types; never legitimately inbound.
        }
    }
}

async fn handle_join_game(payload: &[u8], endpoint: SocketAddr, socket: &UdpSocket, services: &Arc<Services>, sequence: &AtomicU16) {
    let Some(join) = JoinGamePayload::from_bytes(payload, payload.len()) else { return };
    let token = Token(join.token);

    let Some(bound) = services.sessions.validate_and_bind_udp(&token, endpoint) else {
        let nack = JoinGameNackPayload { reason: JoinGameNackReason::InvalidToken };
        send_to(socket, endpoint, DatagramMessageType::JoinGameNack, sequence, &nack.to_bytes()).await;
        return;
    };

    let requested_code = String::from_utf8_lossy(&join.room_code).to_string();
    let Some(assigned_code) = services.rooms.room_code_for(&bound.email) else {
        let nack = JoinGameNackPayload { reason: JoinGameNackReason::RoomNotFound };
        send_to(socket, endpoint, DatagramMessageType::JoinGameNack, sequence, &nack.to_bytes()).await;
        return;
    };
    if assigned_code != requested_code {
        let nack = JoinGameNackPayload { reason: JoinGameNackReason::RoomNotFound };
        send_to(socket, endpoint, DatagramMessageType::JoinGameNack, sequence, &nack.to_bytes()).await;
        return;
    }

    let Some(player_id) = services.rooms.slot_index_for(&bound.email) else {
        let nack = JoinGameNackPayload { reason: JoinGameNackReason::RoomNotFound };
        send_to(socket, endpoint, DatagramMessageType::JoinGameNack, sequence, &nack.to_bytes()).await;
        return;
    };

    services.sessions.assign_player_id(endpoint, player_id);
    services.rooms.mark_in_game(&assigned_code);

    let game_speed_percent = services.rooms.game_speed_percent(&assigned_code).unwrap_or(100);
    let code_for_factory = assigned_code.clone();
    let handle = services.instances.get_or_create(&assigned_code, move || {
        tracing::info!(room_code = %code_for_factory, "spawning game instance");
        Box::new(game_rtype::RTypeInstance::new())
    });
    handle.join(player_id, game_speed_percent);

    let ack = JoinGameAckPayload { player_id };
    send_to(socket, endpoint, DatagramMessageType::JoinGameAck, sequence, &ack.to_bytes()).await;
}

async fn dispatch_command(endpoint: SocketAddr, services: &Arc<Services>, command: GameCommand) {
    let Some(player_id) = services.sessions.get_player_id_by_endpoint(endpoint) else { return };
    let Some(room_code) = services.sessions.get_room_code_by_endpoint(endpoint) else { return };
    let Some(handle) = services.instances.get_instance(&room_code) else { return };
    handle.send_command(player_id, command);
}

/// One fixed-rate loop ticks every active instance and fans its snapshot and
/// events out to every endpoint bound to that room — the single place that
/// owns the `events`+`snapshot` broadcast per §4.4.
async fn tick_scheduler(socket: Arc<UdpSocket>, services: Arc<Services>) {
    let sequence = AtomicU16::new(0);
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        interval.tick().await;
        for code in services.instances.active_room_codes() {
            let Some(handle) = services.instances.get_instance(&code) else { continue };
            let Some(output) = handle.tick(TICK_INTERVAL).await else { continue };
            broadcast_tick(&socket, &services, &code, output.snapshot, &sequence).await;
        }
    }
}

async fn broadcast_tick(socket: &UdpSocket, services: &Arc<Services>, code: &str, snapshot: SnapshotPayload, sequence: &AtomicU16) {
    let endpoints = services.sessions.endpoints_for_room(code);
    if endpoints.is_empty() {
        return;
    }
    let Ok(body) = encode_datagram_payload(&snapshot) else { return };
    for endpoint in endpoints {
        send_to(socket, endpoint, DatagramMessageType::Snapshot, sequence, &body).await;
    }
}

/// §4.7: every second, persists each live instance's current per-player
/// score into the leaderboard's live-session row. Kill/death/combo columns
/// stay at their last value here — [`SnapshotPayload`] only carries the
/// aggregate score a client needs to render, not the full per-kill ledger —
/// so those fields get their first real value at `finalize_session` once a
/// richer summary event lands.
async fn auto_save_loop(services: Arc<Services>) {
    let mut interval = tokio::time::interval(AUTO_SAVE_INTERVAL);
    loop {
        interval.tick().await;
        for code in services.instances.active_room_codes() {
            let Some(handle) = services.instances.get_instance(&code) else { continue };
            let Some(output) = handle.tick(Duration::ZERO).await else { continue };
            for player in output.snapshot.players {
                let Some(email) = email_for_player(&services, &code, player.player_id) else { continue };
                let entry = LeaderboardEntry {
                    email,
                    display_name: String::new(),
                    score: player.score as u64,
                    kills: 0,
                    deaths: 0,
                    best_combo: 0,
                    updated_at: now_millis(),
                };
                let leaderboard = services.leaderboard.clone();
                tokio::spawn(async move {
                    let _ = leaderboard.upsert_session(entry).await;
                });
            }
        }
    }
}

fn email_for_player(services: &Arc<Services>, code: &str, player_id: u8) -> Option<String> {
    services
        .sessions
        .all_sessions()
        .into_iter()
        .find(|s| s.room_code.as_deref() == Some(code) && s.player_id == Some(player_id))
        .map(|s| s.email)
}

/// Sweeps expired sessions and tells the owning instance to drop the player,
/// tearing the instance down once it is empty. This is the only path that
/// removes a player from a game instance without an explicit kick.
async fn watchdog_loop(_socket: Arc<UdpSocket>, services: Arc<Services>) {
    let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
    loop {
        interval.tick().await;
        for expired in services.sessions.cleanup_expired_sessions() {
            let (Some(code), Some(player_id)) = (expired.room_code, expired.player_id) else { continue };
            services.rooms.leave_room(&expired.email);
            let Some(handle) = services.instances.get_instance(&code) else { continue };
            if handle.leave(player_id).await == 0 {
                services.instances.remove(&code);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_constants_match_the_documented_cadence() {
        assert_eq!(TICK_INTERVAL, Duration::from_millis(50));
        assert_eq!(AUTO_SAVE_INTERVAL, Duration::from_secs(1));
    }
}
