//! Voice relay (C8, §4.8): a second UDP socket, independent of the
//! gameplay channel, that only learns "this endpoint belongs to this
//! room" and fans opaque audio frames out to every other endpoint in that
//! room. It never decodes or re-encodes [`VoiceFramePayload::opaque_audio`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, BytesMut};
use protocol::datagram::{self, DatagramHeader, DatagramMessageType, encode_datagram, parse_datagram};
use protocol::voice::{VoiceJoinAckPayload, VoiceJoinPayload, VoiceMutePayload};
use server_core::Services;
use server_core::token::Token;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

/// A voice frame's payload is opaque audio, never postcard — §4.8 forbids
/// inspecting it, so it rides the datagram body raw rather than through
/// `encode_datagram_payload`.
const MAX_VOICE_PAYLOAD: usize = 1200;

/// A message-type discriminant private to this channel: it never has to
/// agree with [`DatagramMessageType`] because the voice socket is a
/// separate port with its own tiny protocol (join, mute, opaque frame).
const VOICE_FRAME_TYPE: u16 = 50;

fn encode_raw_datagram(message_type: u16, sequence: u16, timestamp: u64, payload: &[u8]) -> BytesMut {
    let header = DatagramHeader { message_type, sequence, timestamp };
    let mut out = BytesMut::with_capacity(DatagramHeader::WIRE_SIZE + payload.len());
    out.put_slice(&header.to_bytes());
    out.put_slice(payload);
    out
}

#[derive(Default)]
struct VoiceRooms {
    /// room code -> (endpoint -> player id), for routing and mute checks.
    rooms: HashMap<String, HashMap<SocketAddr, u8>>,
    muted: HashMap<(String, u8), bool>,
}

pub async fn run(socket: UdpSocket, services: Arc<Services>) {
    let socket = Arc::new(socket);
    let state = Arc::new(Mutex::new(VoiceRooms::default()));
    let sequence = AtomicU16::new(0);

    let mut buf = [0u8; datagram::MAX_DATAGRAM_SIZE];
    loop {
        let (n, endpoint) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%err, "voice udp recv failed");
                continue;
            }
        };
        let Ok(frame) = parse_datagram(&buf[..n]) else { continue };
        let Some(message_type) = DatagramMessageType::from_u16(frame.header.message_type) else { continue };

        match message_type {
            DatagramMessageType::JoinGame => {
                handle_voice_join(&frame.payload, endpoint, &socket, &services, &state, &sequence).await;
            }
            DatagramMessageType::PauseRequest => {
                // Reused here as the mute toggle: payload is a `VoiceMutePayload`.
                handle_mute(&frame.payload, endpoint, &state).await;
            }
            DatagramMessageType::HeartBeat => {}
            _ => {
                relay_voice_frame(&frame.payload[..frame.payload.len().min(MAX_VOICE_PAYLOAD)], endpoint, &socket, &state, &sequence).await;
            }
        }
    }
}

async fn handle_voice_join(
    payload: &[u8],
    endpoint: SocketAddr,
    socket: &UdpSocket,
    services: &Arc<Services>,
    state: &Arc<Mutex<VoiceRooms>>,
    sequence: &AtomicU16,
) {
    let Ok(join) = postcard::from_bytes::<VoiceJoinPayload>(payload) else { return };
    let token = Token(join.token);

    // Voice is read-only with respect to session state: a token just has to
    // be live, not yet UDP-bound for gameplay, per the resolved Open
    // Question in the Design Notes.
    if !services.sessions.is_token_valid(&token) {
        return;
    }
    let room_code = String::from_utf8_lossy(&join.room_code).to_string();
    let Some(email) = email_for_token(services, &token) else { return };
    let Some(player_id) = services.rooms.slot_index_for(&email) else { return };

    state.lock().await.rooms.entry(room_code).or_default().insert(endpoint, player_id);

    let ack = VoiceJoinAckPayload { player_id };
    let Ok(body) = postcard::to_allocvec(&ack) else { return };
    let seq = sequence.fetch_add(1, Ordering::Relaxed);
    let frame = encode_datagram(DatagramMessageType::JoinGameAck, seq, now_millis(), &body);
    let _ = socket.send_to(&frame, endpoint).await;
}

fn email_for_token(services: &Arc<Services>, token: &Token) -> Option<String> {
    services.sessions.all_sessions().into_iter().find(|s| s.token == *token).map(|s| s.email)
}

async fn handle_mute(payload: &[u8], endpoint: SocketAddr, state: &Arc<Mutex<VoiceRooms>>) {
    let Ok(mute) = postcard::from_bytes::<VoiceMutePayload>(payload) else { return };
    let mut rooms = state.lock().await;
    let Some(room_code) = rooms.rooms.iter().find(|(_, members)| members.contains_key(&endpoint)).map(|(code, _)| code.clone()) else { return };
    rooms.muted.insert((room_code, mute.player_id), mute.muted);
}

async fn relay_voice_frame(audio: &[u8], from: SocketAddr, socket: &UdpSocket, state: &Arc<Mutex<VoiceRooms>>, sequence: &AtomicU16) {
    let targets = {
        let rooms = state.lock().await;
        let Some((room_code, members)) = rooms.rooms.iter().find(|(_, members)| members.contains_key(&from)) else { return };
        let sender_id = members[&from];
        members
            .iter()
            .filter(|(endpoint, player_id)| **endpoint != from && !rooms.muted.get(&(room_code.clone(), **player_id)).copied().unwrap_or(false) && **player_id != sender_id)
            .map(|(endpoint, _)| *endpoint)
            .collect::<Vec<_>>()
    };
    if targets.is_empty() {
        return;
    }
    for endpoint in targets {
        let seq = sequence.fetch_add(1, Ordering::Relaxed);
        let frame = encode_raw_datagram(VOICE_FRAME_TYPE, seq, now_millis(), audio);
        let _ = socket.send_to(&frame, endpoint).await;
    }
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
