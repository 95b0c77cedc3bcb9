//! Stream-channel server (C6, §4.6): the TCP accept loop serving auth,
//! lobby, chat, and settings. Every connection owns one [`StreamFrameDecoder`]
//! fed from repeated reads, and one [`PushEvent`] receiver fed by
//! [`RoomRegistry`] broadcasts — `tokio::select!` interleaves the two so a
//! lobby update from another player's action can reach the wire without
//! waiting for this connection's own next read.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use protocol::auth::{AuthErrorCode, AuthResponse, LoginPayload, RegisterPayload};
use protocol::lobby::{
    BrowsePublicRoomsResponse, ChatMessagePayload, CreateRoomPayload, JoinRoomByCodePayload,
    KickPlayerPayload, PlayerKickedNotification, PublicRoomSummary as WirePublicRoomSummary, RoomNackReason, RoomUpdate,
    SaveUserSettingsPayload, SendChatMessagePayload, SetReadyPayload, SetRoomConfigPayload, SlotView,
};
use protocol::stream::{decode_stream_payload, encode_stream_frame, StreamFrameDecoder, StreamMessageType};
use server_core::password::{validate_email, validate_password, validate_username, PasswordHash};
use server_core::repository::{UserRecord, UserSettingsRecord};
use server_core::room::{PushEvent, RoomSnapshot};
use server_core::{ServerError, Services};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// §4.6: a stream connection that sends nothing (not even a `Heartbeat`)
/// for this long is dropped. Distinct from [`server_core::session::INACTIVITY_TIMEOUT`],
/// which governs the UDP-bound session, not the TCP socket.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Default)]
struct ConnectionState {
    email: Option<String>,
    display_name: Option<String>,
}

pub async fn run(listener: TcpListener, services: Arc<Services>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let services = services.clone();
                tokio::spawn(async move {
                    tracing::debug!(%peer, "stream connection accepted");
                    if let Err(err) = handle_connection(socket, services).await {
                        tracing::debug!(%peer, %err, "stream connection closed");
                    }
                });
            }
            Err(err) => tracing::warn!(%err, "failed to accept stream connection"),
        }
    }
}

async fn handle_connection(socket: TcpStream, services: Arc<Services>) -> Result<(), ServerError> {
    let _ = socket.set_nodelay(true);
    let (mut read_half, mut write_half) = socket.into_split();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<PushEvent>();
    let mut decoder = StreamFrameDecoder::new();
    let mut buf = [0u8; 4096];
    let mut state = ConnectionState::default();

    loop {
        tokio::select! {
            read_result = tokio::time::timeout(STREAM_IDLE_TIMEOUT, read_half.read(&mut buf)) => {
                let n = match read_result {
                    Err(_) => {
                        tracing::debug!("stream connection idle timeout");
                        break;
                    }
                    Ok(Err(_)) | Ok(Ok(0)) => break,
                    Ok(Ok(n)) => n,
                };
                decoder.feed(&buf[..n]);
                loop {
                    match decoder.try_parse_frame() {
                        Ok(Some(frame)) => {
                            let message_type = StreamMessageType::from_u16(frame.header.message_type);
                            if let Some(message_type) = message_type {
                                if let Err(err) = dispatch(message_type, &frame.payload, &services, &mut state, &push_tx, &mut write_half).await {
                                    tracing::debug!(%err, ?message_type, "stream dispatch failed");
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(_) => return Err(ServerError::Transport("malformed stream frame")),
                    }
                }
            }
            Some(event) = push_rx.recv() => {
                send_push_event(&mut write_half, event).await?;
            }
        }
    }

    if let Some(email) = state.email.take() {
        services.rooms.unregister_push_channel(&email);
    }
    Ok(())
}

async fn write_frame(write_half: &mut OwnedWriteHalf, frame: BytesMut) -> Result<(), ServerError> {
    write_half.write_all(&frame).await.map_err(|_| ServerError::Transport("stream write failed"))
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn wire_room_update(snapshot: RoomSnapshot) -> RoomUpdate {
    RoomUpdate {
        code: snapshot.code,
        name: snapshot.name,
        max_players: snapshot.max_players,
        slots: snapshot
            .slots
            .into_iter()
            .map(|s| SlotView { occupied: s.occupied, display_name: s.display_name, ready: s.ready, host: s.host, ship_skin: s.ship_skin })
            .collect(),
    }
}

async fn send_push_event(write_half: &mut OwnedWriteHalf, event: PushEvent) -> Result<(), ServerError> {
    let frame = match event {
        PushEvent::RoomUpdate(snapshot) => encode_stream_frame(StreamMessageType::RoomUpdate, true, &wire_room_update(snapshot)),
        PushEvent::PlayerKicked { reason } => encode_stream_frame(StreamMessageType::PlayerKickedNotification, true, &PlayerKickedNotification { reason }),
        PushEvent::GameStarting { .. } => encode_stream_frame(StreamMessageType::GameStarting, true, &()),
        PushEvent::ChatMessage { display_name, text, sent_at_millis } => {
            encode_stream_frame(StreamMessageType::ChatMessagePayload, true, &ChatMessagePayload { display_name, text, sent_at_millis })
        }
        PushEvent::RoomClosed => encode_stream_frame(StreamMessageType::RoomNack, true, &RoomNackReason::RoomNotFound),
    }
    .map_err(|_| ServerError::Transport("failed to encode push event"))?;
    write_frame(write_half, frame).await
}

fn room_nack_reason(err: &ServerError) -> RoomNackReason {
    match err {
        ServerError::Conflict("already in a room") => RoomNackReason::AlreadyInRoom,
        ServerError::Conflict("room is full") => RoomNackReason::RoomFull,
        ServerError::Conflict("cannot kick self") => RoomNackReason::CannotKickSelf,
        ServerError::Conflict("room cannot start yet") => RoomNackReason::CannotStart,
        ServerError::Conflict("room is not accepting joins") => RoomNackReason::RoomNotWaiting,
        ServerError::Authorization(_) => RoomNackReason::NotHost,
        ServerError::Validation("room not found") => RoomNackReason::RoomNotFound,
        ServerError::Validation("target is not in the room") => RoomNackReason::TargetNotInRoom,
        ServerError::Validation("no public rooms available") => RoomNackReason::NoPublicRoomsAvailable,
        _ => RoomNackReason::RoomNotFound,
    }
}

async fn reply_room_result(write_half: &mut OwnedWriteHalf, result: Result<RoomSnapshot, ServerError>) -> Result<(), ServerError> {
    match result {
        Ok(snapshot) => {
            let frame = encode_stream_frame(StreamMessageType::RoomAck, true, &wire_room_update(snapshot))
                .map_err(|_| ServerError::Transport("failed to encode room ack"))?;
            write_frame(write_half, frame).await
        }
        Err(err) => {
            let frame = encode_stream_frame(StreamMessageType::RoomNack, true, &room_nack_reason(&err))
                .map_err(|_| ServerError::Transport("failed to encode room nack"))?;
            write_frame(write_half, frame).await
        }
    }
}

async fn reply_ack_or_nack(write_half: &mut OwnedWriteHalf, result: Result<(), ServerError>) -> Result<(), ServerError> {
    match result {
        Ok(()) => {
            let frame = encode_stream_frame(StreamMessageType::RoomAck, true, &())
                .map_err(|_| ServerError::Transport("failed to encode room ack"))?;
            write_frame(write_half, frame).await
        }
        Err(err) => {
            let frame = encode_stream_frame(StreamMessageType::RoomNack, true, &room_nack_reason(&err))
                .map_err(|_| ServerError::Transport("failed to encode room nack"))?;
            write_frame(write_half, frame).await
        }
    }
}

async fn dispatch(
    message_type: StreamMessageType,
    payload: &[u8],
    services: &Arc<Services>,
    state: &mut ConnectionState,
    push_tx: &mpsc::UnboundedSender<PushEvent>,
    write_half: &mut OwnedWriteHalf,
) -> Result<(), ServerError> {
    use StreamMessageType::*;

    match message_type {
        Heartbeat => Ok(()),

        Login => {
            let login: LoginPayload = decode_stream_payload(payload).map_err(|_| ServerError::Transport("malformed login payload"))?;
            handle_login(services, state, push_tx, write_half, login).await
        }

        Register => {
            let register: RegisterPayload = decode_stream_payload(payload).map_err(|_| ServerError::Transport("malformed register payload"))?;
            handle_register(services, state, push_tx, write_half, register).await
        }

        CreateRoom if state.email.is_some() => {
            let req: CreateRoomPayload = decode_stream_payload(payload).map_err(|_| ServerError::Transport("malformed payload"))?;
            let email = state.email.clone().unwrap();
            let display_name = state.display_name.clone().unwrap_or_default();
            let result = services.rooms.create_room(&email, &display_name, &req.name, req.max_players, req.private);
            if let Ok(snapshot) = &result {
                services.sessions.set_room_code(&email, Some(snapshot.code.clone()));
            }
            reply_room_result(write_half, result).await
        }

        JoinRoomByCode if state.email.is_some() => {
            let req: JoinRoomByCodePayload = decode_stream_payload(payload).map_err(|_| ServerError::Transport("malformed payload"))?;
            let email = state.email.clone().unwrap();
            let display_name = state.display_name.clone().unwrap_or_default();
            let result = services.rooms.join_room_by_code(&email, &display_name, &req.room_code);
            if let Ok(snapshot) = &result {
                services.sessions.set_room_code(&email, Some(snapshot.code.clone()));
            }
            reply_room_result(write_half, result).await
        }

        QuickJoin if state.email.is_some() => {
            let email = state.email.clone().unwrap();
            let display_name = state.display_name.clone().unwrap_or_default();
            let result = services.rooms.quick_join(&email, &display_name);
            if let Ok(snapshot) = &result {
                services.sessions.set_room_code(&email, Some(snapshot.code.clone()));
            }
            reply_room_result(write_half, result).await
        }

        LeaveRoom if state.email.is_some() => {
            let email = state.email.clone().unwrap();
            services.rooms.leave_room(&email);
            services.sessions.set_room_code(&email, None);
            reply_ack_or_nack(write_half, Ok(())).await
        }

        SetReady if state.email.is_some() => {
            let req: SetReadyPayload = decode_stream_payload(payload).map_err(|_| ServerError::Transport("malformed payload"))?;
            let email = state.email.clone().unwrap();
            let result = services.rooms.set_ready(&email, req.ready);
            reply_ack_or_nack(write_half, result).await
        }

        StartGame if state.email.is_some() => {
            let email = state.email.clone().unwrap();
            let code = services.rooms.room_code_for(&email);
            let result = services.rooms.try_start_game(&email);
            if result.is_ok() {
                if let Some(code) = code {
                    services.rooms.mark_in_game(&code);
                }
            }
            reply_ack_or_nack(write_half, result).await
        }

        KickPlayer if state.email.is_some() => {
            let req: KickPlayerPayload = decode_stream_payload(payload).map_err(|_| ServerError::Transport("malformed payload"))?;
            let email = state.email.clone().unwrap();
            let result = services.rooms.kick_player(&email, &req.target_email);
            if result.is_ok() {
                services.sessions.set_room_code(&req.target_email, None);
            }
            reply_ack_or_nack(write_half, result).await
        }

        SetRoomConfig if state.email.is_some() => {
            let req: SetRoomConfigPayload = decode_stream_payload(payload).map_err(|_| ServerError::Transport("malformed payload"))?;
            let email = state.email.clone().unwrap();
            let result = services.rooms.set_room_config(&email, req.game_speed_percent, req.private);
            reply_ack_or_nack(write_half, result).await
        }

        BrowsePublicRooms if state.email.is_some() => {
            let rooms = services.rooms.get_public_rooms();
            let response = BrowsePublicRoomsResponse {
                rooms: rooms.into_iter().map(|r| WirePublicRoomSummary { code: r.code, name: r.name, occupied: r.occupied, max_players: r.max_players }).collect(),
            };
            let frame = encode_stream_frame(StreamMessageType::RoomAck, true, &response).map_err(|_| ServerError::Transport("failed to encode room browse response"))?;
            write_frame(write_half, frame).await
        }

        SendChatMessage if state.email.is_some() => {
            let req: SendChatMessagePayload = decode_stream_payload(payload).map_err(|_| ServerError::Transport("malformed payload"))?;
            let email = state.email.clone().unwrap();
            let code = services.rooms.room_code_for(&email);
            let result = services.rooms.send_chat_message(&email, &req.text);
            if let (Ok((display_name, sent_at_millis)), Some(code)) = (&result, code) {
                let chat_repo = services.chat.clone();
                let record = server_core::repository::ChatMessageRecord {
                    room_code: code,
                    display_name: display_name.clone(),
                    text: req.text.clone(),
                    sent_at: *sent_at_millis,
                };
                tokio::spawn(async move {
                    let _ = chat_repo.append(record).await;
                });
            }
            reply_ack_or_nack(write_half, result.map(|_| ())).await
        }

        ChatHistoryResponse if state.email.is_some() => {
            let email = state.email.clone().unwrap();
            let code = services.rooms.room_code_for(&email).ok_or(ServerError::Validation("not in a room"))?;
            let history = services.rooms.chat_history(&code);
            let response = protocol::lobby::ChatHistoryResponse {
                messages: history.into_iter().map(|e| protocol::lobby::ChatMessagePayload { display_name: e.display_name, text: e.text, sent_at_millis: e.sent_at_millis }).collect(),
            };
            let frame = encode_stream_frame(StreamMessageType::ChatHistoryResponse, true, &response).map_err(|_| ServerError::Transport("failed to encode chat history"))?;
            write_frame(write_half, frame).await
        }

        GetUserSettings if state.email.is_some() => {
            let email = state.email.clone().unwrap();
            let record = services.user_settings.get(&email).await?;
            let settings_json = record.map(|r| r.payload.to_string()).unwrap_or_else(|| "{}".to_string());
            let frame = encode_stream_frame(StreamMessageType::UserSettingsPayload, true, &protocol::lobby::UserSettingsPayload { settings_json })
                .map_err(|_| ServerError::Transport("failed to encode user settings"))?;
            write_frame(write_half, frame).await
        }

        SaveUserSettings if state.email.is_some() => {
            let req: SaveUserSettingsPayload = decode_stream_payload(payload).map_err(|_| ServerError::Transport("malformed payload"))?;
            let email = state.email.clone().unwrap();
            let payload_json: serde_json::Value = serde_json::from_str(&req.settings_json).unwrap_or(serde_json::Value::Null);
            services.user_settings.save(UserSettingsRecord { email, payload: payload_json }).await?;
            reply_ack_or_nack(write_half, Ok(())).await
        }

        _ => {
            tracing::debug!(?message_type, "ignoring frame on unauthenticated or unexpected channel state");
            Ok(())
        }
    }
}

async fn handle_login(
    services: &Arc<Services>,
    state: &mut ConnectionState,
    push_tx: &mpsc::UnboundedSender<PushEvent>,
    write_half: &mut OwnedWriteHalf,
    login: LoginPayload,
) -> Result<(), ServerError> {
    let response = async {
        let user = services.users.find_by_username(&login.username).await.ok().flatten();
        let Some(user) = user else { return AuthResponse::Failure { error_code: AuthErrorCode::InvalidCredentials } };
        if !user.password_hash.verify(&login.password) {
            return AuthResponse::Failure { error_code: AuthErrorCode::InvalidCredentials };
        }
        if services.sessions.is_banned(&user.email) {
            return AuthResponse::Failure { error_code: AuthErrorCode::InvalidCredentials };
        }
        match services.sessions.create_session(&user.email, &user.username) {
            Some(created) => {
                services.rooms.register_push_channel(&user.email, push_tx.clone());
                state.email = Some(user.email.clone());
                state.display_name = Some(user.username.clone());
                let mut token = [0u8; 32];
                token.copy_from_slice(created.token.as_bytes());
                AuthResponse::Success { token, display_name: created.display_name }
            }
            None => AuthResponse::Failure { error_code: AuthErrorCode::AlreadyConnected },
        }
    }
    .await;

    let frame = encode_stream_frame(StreamMessageType::AuthAck, state.email.is_some(), &response)
        .map_err(|_| ServerError::Transport("failed to encode auth ack"))?;
    write_frame(write_half, frame).await
}

/// Registration that succeeds logs the new account in immediately — the
/// client does not have to turn around and send a second `Login` frame.
async fn handle_register(
    services: &Arc<Services>,
    state: &mut ConnectionState,
    push_tx: &mpsc::UnboundedSender<PushEvent>,
    write_half: &mut OwnedWriteHalf,
    register: RegisterPayload,
) -> Result<(), ServerError> {
    let response = async {
        if !validate_username(&register.username) {
            return AuthResponse::Failure { error_code: AuthErrorCode::InvalidUsername };
        }
        if !validate_email(&register.email) {
            return AuthResponse::Failure { error_code: AuthErrorCode::InvalidEmail };
        }
        if !validate_password(&register.password) {
            return AuthResponse::Failure { error_code: AuthErrorCode::InvalidPassword };
        }
        if services.users.find_by_email(&register.email).await.ok().flatten().is_some() {
            return AuthResponse::Failure { error_code: AuthErrorCode::EmailExists };
        }
        let record = UserRecord {
            email: register.email.clone(),
            password_hash: PasswordHash::new(&register.password),
            username: register.username.clone(),
            created_at: now_millis(),
        };
        if services.users.insert(record).await.is_err() {
            return AuthResponse::Failure { error_code: AuthErrorCode::ServerError };
        }
        match services.sessions.create_session(&register.email, &register.username) {
            Some(created) => {
                services.rooms.register_push_channel(&register.email, push_tx.clone());
                state.email = Some(register.email.clone());
                state.display_name = Some(register.username.clone());
                let mut token = [0u8; 32];
                token.copy_from_slice(created.token.as_bytes());
                AuthResponse::Success { token, display_name: created.display_name }
            }
            None => AuthResponse::Failure { error_code: AuthErrorCode::ServerError },
        }
    }
    .await;

    let frame = encode_stream_frame(StreamMessageType::AuthAck, state.email.is_some(), &response)
        .map_err(|_| ServerError::Transport("failed to encode auth ack"))?;
    write_frame(write_half, frame).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use server_core::config::Config;

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (server_side, (client_side, _)) = tokio::join!(TcpStream::connect(addr), async { listener.accept().await.unwrap() });
        (client_side, server_side.unwrap())
    }

    /// An account's username and email are stored as distinct fields
    /// (§4.6/§8 scenario 1: `Login("alice_user", ...)` against the stored
    /// identity `alice@example.com`) — login must resolve by username, not
    /// by email.
    #[tokio::test]
    async fn login_resolves_the_account_by_username_not_email() {
        let services = Services::new_in_memory(Config::from_env());
        services
            .users
            .insert(UserRecord {
                email: "alice@example.com".to_string(),
                password_hash: PasswordHash::new("secret123"),
                username: "alice_user".to_string(),
                created_at: 0,
            })
            .await
            .unwrap();

        let (server_side, mut client_side) = loopback_pair().await;
        let (_server_read, mut server_write) = server_side.into_split();
        let mut state = ConnectionState::default();
        let (push_tx, _push_rx) = mpsc::unbounded_channel();

        handle_login(
            &services,
            &mut state,
            &push_tx,
            &mut server_write,
            LoginPayload { username: "alice_user".to_string(), password: "secret123".to_string() },
        )
        .await
        .unwrap();

        assert_eq!(state.email.as_deref(), Some("alice@example.com"));

        let mut raw = [0u8; 256];
        let n = client_side.read(&mut raw).await.unwrap();
        let mut decoder = StreamFrameDecoder::new();
        decoder.feed(&raw[..n]);
        let frame = decoder.try_parse_frame().unwrap().expect("a whole auth ack frame arrived");
        let response: AuthResponse = decode_stream_payload(&frame.payload).unwrap();
        assert!(matches!(response, AuthResponse::Success { .. }));
    }
}
