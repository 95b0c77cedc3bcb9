//! Admin JSON-RPC server (C9, §4.9 **[EXPANSION]**): a localhost-only
//! line-delimited JSON channel for the remote CLI described in §6. Each
//! connection is independent and stateless — every request carries its own
//! `token`, checked in constant time against [`Config::admin_token`] before
//! any command runs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use server_core::game_trait::GameCommand;
use server_core::session::HiddenFlag;
use server_core::Services;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Deserialize)]
struct RpcRequest {
    cmd: String,
    #[serde(default)]
    args: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RpcResponse {
    fn ok(output: Vec<String>) -> Self {
        RpcResponse { success: true, output, error: None }
    }

    fn err(message: impl Into<String>) -> Self {
        RpcResponse { success: false, output: Vec::new(), error: Some(message.into()) }
    }
}

pub async fn run(listener: TcpListener, services: Arc<Services>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let services = services.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(socket, services).await {
                        tracing::debug!(%peer, %err, "admin connection closed");
                    }
                });
            }
            Err(err) => tracing::warn!(%err, "failed to accept admin connection"),
        }
    }
}

async fn handle_connection(socket: TcpStream, services: Arc<Services>) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => handle_request(&services, request),
            Err(err) => RpcResponse::err(format!("malformed request: {err}")),
        };
        let mut body = serde_json::to_vec(&response).unwrap_or_default();
        body.push(b'\n');
        write_half.write_all(&body).await?;
    }
    Ok(())
}

fn handle_request(services: &Arc<Services>, request: RpcRequest) -> RpcResponse {
    if !tokens_match(request.token.as_bytes(), services.config.admin_token.as_bytes()) {
        tracing::warn!(cmd = %request.cmd, "admin request rejected: bad token");
        return RpcResponse::err("unauthorized");
    }
    dispatch(services, &request.cmd, request.args.trim())
}

/// Byte-length- and value-independent: every byte pair is compared, and the
/// loop never exits early on the first mismatch.
fn tokens_match(given: &[u8], expected: &[u8]) -> bool {
    let mut diff = (given.len() != expected.len()) as u8;
    for i in 0..given.len().max(expected.len()) {
        let a = given.get(i).copied().unwrap_or(0);
        let b = expected.get(i).copied().unwrap_or(0);
        diff |= a ^ b;
    }
    diff == 0
}

fn dispatch(services: &Arc<Services>, cmd: &str, args: &str) -> RpcResponse {
    match cmd {
        "status" => cmd_status(services),
        "rooms" => cmd_rooms(services),
        "sessions" => cmd_sessions(services),
        "kick" => cmd_kick(services, args),
        "ban" => cmd_ban(services, args),
        "unban" => cmd_unban(services, args),
        "godmode" => cmd_godmode(services, args),
        "quit" | "exit" => RpcResponse::err("quit/exit must be issued from the local console"),
        "zoom" | "interact" | "net" => RpcResponse::err(format!("'{cmd}' is interactive-only and has no remote equivalent")),
        other => RpcResponse::err(format!("unknown command '{other}'")),
    }
}

fn cmd_status(services: &Arc<Services>) -> RpcResponse {
    RpcResponse::ok(vec![
        format!("sessions: {}", services.sessions.session_count()),
        format!("rooms: {}", services.rooms.room_count()),
        format!("instances: {}", services.instances.instance_count()),
    ])
}

fn cmd_rooms(services: &Arc<Services>) -> RpcResponse {
    let output = services
        .rooms
        .get_public_rooms()
        .into_iter()
        .map(|r| format!("{} \"{}\" {}/{}", r.code, r.name, r.occupied, r.max_players))
        .collect();
    RpcResponse::ok(output)
}

fn cmd_sessions(services: &Arc<Services>) -> RpcResponse {
    let output = services
        .sessions
        .all_sessions()
        .into_iter()
        .map(|s| format!("{} room={} player_id={}", s.email, s.room_code.as_deref().unwrap_or("-"), s.player_id.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())))
        .collect();
    RpcResponse::ok(output)
}

fn cmd_kick(services: &Arc<Services>, email: &str) -> RpcResponse {
    if email.is_empty() {
        return RpcResponse::err("usage: kick <email>");
    }
    services.rooms.leave_room(email);
    services.sessions.remove_session(email);
    RpcResponse::ok(vec![format!("kicked {email}")])
}

/// As §8 scenario 5: banning tears down the live session and endpoint
/// binding immediately. The owning game instance only notices once the
/// player's next datagram goes unbound, or on the inactivity watchdog.
fn cmd_ban(services: &Arc<Services>, email: &str) -> RpcResponse {
    if email.is_empty() {
        return RpcResponse::err("usage: ban <email>");
    }
    services.rooms.leave_room(email);
    services.sessions.ban_user(email);
    RpcResponse::ok(vec![format!("banned {email}")])
}

fn cmd_unban(services: &Arc<Services>, email: &str) -> RpcResponse {
    if email.is_empty() {
        return RpcResponse::err("usage: unban <email>");
    }
    services.sessions.unban_user(email);
    RpcResponse::ok(vec![format!("unbanned {email}")])
}

/// Sets the session's persisted hidden flag and, if the target is currently
/// bound to a running instance, pushes it live via the same
/// `GameCommand` path a player's own actions take (§4.2's `godModeChanged`).
fn cmd_godmode(services: &Arc<Services>, args: &str) -> RpcResponse {
    let mut parts = args.split_whitespace();
    let (Some(email), Some(state)) = (parts.next(), parts.next()) else {
        return RpcResponse::err("usage: godmode <email> <on|off>");
    };
    let enabled = match state {
        "on" => true,
        "off" => false,
        other => return RpcResponse::err(format!("expected 'on' or 'off', got '{other}'")),
    };
    if !services.sessions.set_hidden_flag(email, HiddenFlag::GodMode, enabled) {
        return RpcResponse::err(format!("no live session for {email}"));
    }

    if let Some(session) = services.sessions.get_session_by_email(email) {
        if let (Some(room_code), Some(player_id)) = (session.room_code, session.player_id) {
            if let Some(instance) = services.instances.get_instance(&room_code) {
                instance.send_command(player_id, GameCommand::SetGodMode(enabled));
            }
        }
    }

    RpcResponse::ok(vec![format!("godmode {email} {}", if enabled { "on" } else { "off" })])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_match_requires_exact_equality() {
        assert!(tokens_match(b"secret", b"secret"));
        assert!(!tokens_match(b"secret", b"secre"));
        assert!(!tokens_match(b"secret", b"wrong!"));
        assert!(!tokens_match(b"", b"secret"));
        assert!(tokens_match(b"", b""));
    }

    #[test]
    fn quit_and_exit_are_refused_remotely() {
        assert!(matches!(dispatch_kind("quit"), Kind::Err));
        assert!(matches!(dispatch_kind("exit"), Kind::Err));
    }

    #[test]
    fn interactive_only_commands_explain_themselves() {
        for cmd in ["zoom", "interact", "net"] {
            let response = dispatch_kind(cmd);
            assert!(matches!(response, Kind::Err));
        }
    }

    #[test]
    fn godmode_requires_an_on_or_off_argument() {
        let config = server_core::config::Config::from_env();
        let services = server_core::Services::new_in_memory(config);
        assert!(matches!(dispatch(&services, "godmode", "alice@example.com"), RpcResponse { success: false, .. }));
        assert!(matches!(dispatch(&services, "godmode", "alice@example.com sideways"), RpcResponse { success: false, .. }));
    }

    #[test]
    fn godmode_sets_the_session_hidden_flag() {
        let config = server_core::config::Config::from_env();
        let services = server_core::Services::new_in_memory(config);
        services.sessions.create_session("alice@example.com", "alice").unwrap();
        let response = dispatch(&services, "godmode", "alice@example.com on");
        assert!(response.success);
        assert!(services.sessions.has_hidden_flag("alice@example.com", HiddenFlag::GodMode));

        let response = dispatch(&services, "godmode", "alice@example.com off");
        assert!(response.success);
        assert!(!services.sessions.has_hidden_flag("alice@example.com", HiddenFlag::GodMode));
    }

    #[test]
    fn godmode_reports_unknown_sessions() {
        let config = server_core::config::Config::from_env();
        let services = server_core::Services::new_in_memory(config);
        assert!(!dispatch(&services, "godmode", "ghost@example.com on").success);
    }

    enum Kind {
        Ok,
        Err,
    }

    fn dispatch_kind(cmd: &str) -> Kind {
        let config = server_core::config::Config::from_env();
        let services = server_core::Services::new_in_memory(config);
        match dispatch(&services, cmd, "") {
            RpcResponse { success: true, .. } => Kind::Ok,
            RpcResponse { success: false, .. } => Kind::Err,
        }
    }
}
