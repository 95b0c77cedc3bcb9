//! Fixed-header framing for the UDP gameplay channel.
//!
//! Frame layout (big-endian): `[u16 type][u16 sequence][u64 timestamp][payload]`.
//! There is no fragmentation: a datagram that does not fit the receive
//! buffer is dropped whole, never reassembled. Small, hot-path payloads
//! (input, join, heartbeats) get hand-rolled fixed-width encodings so the
//! per-tick cost stays a handful of byte copies; larger, infrequent payloads
//! (snapshots, spawn/death events) ride on postcard like the stream channel.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;

pub const DATAGRAM_HEADER_SIZE: usize = 12;

/// Datagrams larger than this are dropped before parsing is attempted.
pub const MAX_DATAGRAM_SIZE: usize = 1400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DatagramMessageType {
    HeartBeat = 0,
    JoinGame = 1,
    JoinGameAck = 2,
    JoinGameNack = 3,
    PlayerInput = 10,
    ShootMissile = 11,
    ChargeStart = 12,
    ChargeRelease = 13,
    ForceToggle = 14,
    PauseRequest = 15,
    Snapshot = 20,
    PlayerJoin = 21,
    PlayerLeave = 22,
    PlayerDamaged = 23,
    PlayerDied = 24,
    MissileSpawned = 25,
    MissileDestroyed = 26,
    EnemyDestroyed = 27,
    PowerUpSpawned = 28,
    PowerUpCollected = 29,
    PowerUpExpired = 30,
    WaveCannonFired = 31,
    ForceStateUpdate = 32,
    PauseStateSync = 33,
}

impl DatagramMessageType {
    pub fn from_u16(raw: u16) -> Option<Self> {
        use DatagramMessageType::*;
        Some(match raw {
            0 => HeartBeat,
            1 => JoinGame,
            2 => JoinGameAck,
            3 => JoinGameNack,
            10 => PlayerInput,
            11 => ShootMissile,
            12 => ChargeStart,
            13 => ChargeRelease,
            14 => ForceToggle,
            15 => PauseRequest,
            20 => Snapshot,
            21 => PlayerJoin,
            22 => PlayerLeave,
            23 => PlayerDamaged,
            24 => PlayerDied,
            25 => MissileSpawned,
            26 => MissileDestroyed,
            27 => EnemyDestroyed,
            28 => PowerUpSpawned,
            29 => PowerUpCollected,
            30 => PowerUpExpired,
            31 => WaveCannonFired,
            32 => ForceStateUpdate,
            33 => PauseStateSync,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub message_type: u16,
    pub sequence: u16,
    pub timestamp: u64,
}

impl DatagramHeader {
    pub const WIRE_SIZE: usize = DATAGRAM_HEADER_SIZE;

    pub fn to_bytes(&self) -> [u8; DATAGRAM_HEADER_SIZE] {
        let mut buf = [0u8; DATAGRAM_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.message_type.to_be_bytes());
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..12].copy_from_slice(&self.timestamp.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < DATAGRAM_HEADER_SIZE {
            return None;
        }
        Some(DatagramHeader {
            message_type: u16::from_be_bytes([buf[0], buf[1]]),
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u64::from_be_bytes(buf[4..12].try_into().unwrap()),
        })
    }
}

/// A parsed datagram: header plus the remaining payload bytes.
pub struct DatagramFrame {
    pub header: DatagramHeader,
    pub payload: Bytes,
}

/// Parses one datagram. `ShortFrame` if it is smaller than the header
/// (wait is meaningless for UDP — the caller just drops it); `MalformedFrame`
/// never occurs here since any trailing bytes are a valid (if unknown to the
/// caller) payload — unknown `message_type` values are the caller's concern.
pub fn parse_datagram(raw: &[u8]) -> Result<DatagramFrame, CodecError> {
    if raw.len() > MAX_DATAGRAM_SIZE {
        return Err(CodecError::malformed("datagram exceeds maximum size"));
    }
    let header = DatagramHeader::from_bytes(raw).ok_or(CodecError::short("datagram shorter than header"))?;
    Ok(DatagramFrame { header, payload: Bytes::copy_from_slice(&raw[DATAGRAM_HEADER_SIZE..]) })
}

pub fn encode_datagram(message_type: DatagramMessageType, sequence: u16, timestamp: u64, payload: &[u8]) -> BytesMut {
    let header = DatagramHeader { message_type: message_type as u16, sequence, timestamp };
    let mut out = BytesMut::with_capacity(DATAGRAM_HEADER_SIZE + payload.len());
    out.put_slice(&header.to_bytes());
    out.put_slice(payload);
    out
}

/// Bit flags carried in [`PlayerInputPayload::keys`].
pub mod input_bits {
    pub const UP: u16 = 1 << 0;
    pub const DOWN: u16 = 1 << 1;
    pub const LEFT: u16 = 1 << 2;
    pub const RIGHT: u16 = 1 << 3;
    pub const SHOOT: u16 = 1 << 4;
}

/// Token length in bytes, also used as the `WIRE_SIZE` of the raw token field.
pub const TOKEN_LEN: usize = 32;
pub const ROOM_CODE_LEN: usize = 6;

/// `JoinGame(token, roomCode, shipSkin)` — UDP auth (C→S).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGamePayload {
    pub token: [u8; TOKEN_LEN],
    pub room_code: [u8; ROOM_CODE_LEN],
    pub ship_skin: u8,
}

impl JoinGamePayload {
    pub const WIRE_SIZE: usize = TOKEN_LEN + ROOM_CODE_LEN + 1;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[..TOKEN_LEN].copy_from_slice(&self.token);
        buf[TOKEN_LEN..TOKEN_LEN + ROOM_CODE_LEN].copy_from_slice(&self.room_code);
        buf[TOKEN_LEN + ROOM_CODE_LEN] = self.ship_skin;
        buf
    }

    pub fn from_bytes(buf: &[u8], len: usize) -> Option<Self> {
        if len < Self::WIRE_SIZE || buf.len() < Self::WIRE_SIZE {
            return None;
        }
        let mut token = [0u8; TOKEN_LEN];
        token.copy_from_slice(&buf[..TOKEN_LEN]);
        let mut room_code = [0u8; ROOM_CODE_LEN];
        room_code.copy_from_slice(&buf[TOKEN_LEN..TOKEN_LEN + ROOM_CODE_LEN]);
        Some(JoinGamePayload { token, room_code, ship_skin: buf[TOKEN_LEN + ROOM_CODE_LEN] })
    }
}

/// `PlayerInput(keys, seq)` — the latest client intent for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerInputPayload {
    pub keys: u16,
    pub seq: u32,
}

impl PlayerInputPayload {
    pub const WIRE_SIZE: usize = 6;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..2].copy_from_slice(&self.keys.to_be_bytes());
        buf[2..6].copy_from_slice(&self.seq.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8], len: usize) -> Option<Self> {
        if len < Self::WIRE_SIZE || buf.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(PlayerInputPayload {
            keys: u16::from_be_bytes([buf[0], buf[1]]),
            seq: u32::from_be_bytes(buf[2..6].try_into().unwrap()),
        })
    }
}

/// `ChargeRelease(chargeMillis)` — wave-cannon release, charge duration in ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeReleasePayload {
    pub charge_millis: u16,
}

impl ChargeReleasePayload {
    pub const WIRE_SIZE: usize = 2;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        self.charge_millis.to_be_bytes()
    }

    pub fn from_bytes(buf: &[u8], len: usize) -> Option<Self> {
        if len < Self::WIRE_SIZE || buf.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(ChargeReleasePayload { charge_millis: u16::from_be_bytes([buf[0], buf[1]]) })
    }
}

/// `PauseRequest(wantsPause)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseRequestPayload {
    pub wants_pause: bool,
}

impl PauseRequestPayload {
    pub const WIRE_SIZE: usize = 1;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        [self.wants_pause as u8]
    }

    pub fn from_bytes(buf: &[u8], len: usize) -> Option<Self> {
        if len < Self::WIRE_SIZE || buf.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(PauseRequestPayload { wants_pause: buf[0] != 0 })
    }
}

/// `JoinGameAck(playerId)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinGameAckPayload {
    pub player_id: u8,
}

impl JoinGameAckPayload {
    pub const WIRE_SIZE: usize = 1;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        [self.player_id]
    }

    pub fn from_bytes(buf: &[u8], len: usize) -> Option<Self> {
        if len < Self::WIRE_SIZE || buf.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(JoinGameAckPayload { player_id: buf[0] })
    }
}

/// Reasons a `JoinGame` request is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JoinGameNackReason {
    InvalidToken = 0,
    RoomNotFound = 1,
    RoomFull = 2,
    AlreadyBound = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinGameNackPayload {
    pub reason: JoinGameNackReason,
}

impl JoinGameNackPayload {
    pub const WIRE_SIZE: usize = 1;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        [self.reason as u8]
    }

    pub fn from_bytes(buf: &[u8], len: usize) -> Option<Self> {
        if len < Self::WIRE_SIZE || buf.len() < Self::WIRE_SIZE {
            return None;
        }
        let reason = match buf[0] {
            0 => JoinGameNackReason::InvalidToken,
            1 => JoinGameNackReason::RoomNotFound,
            2 => JoinGameNackReason::RoomFull,
            3 => JoinGameNackReason::AlreadyBound,
            _ => return None,
        };
        Some(JoinGameNackPayload { reason })
    }
}

/// Encodes a variable-length datagram payload with postcard (snapshots,
/// spawn/death events — anything carrying a `Vec<_>`).
pub fn encode_datagram_payload<T: serde::Serialize>(payload: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(payload).map_err(|_| CodecError::malformed("failed to encode datagram payload"))
}

pub fn decode_datagram_payload<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(payload).map_err(|_| CodecError::malformed("failed to decode datagram payload"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = DatagramHeader { message_type: 20, sequence: 7, timestamp: 123456789 };
        assert_eq!(DatagramHeader::from_bytes(&header.to_bytes()), Some(header));
    }

    #[test]
    fn player_input_round_trips() {
        let payload = PlayerInputPayload { keys: input_bits::UP | input_bits::SHOOT, seq: 99 };
        let bytes = payload.to_bytes();
        assert_eq!(PlayerInputPayload::from_bytes(&bytes, bytes.len()), Some(payload));
    }

    #[test]
    fn join_game_round_trips() {
        let payload = JoinGamePayload { token: [7u8; TOKEN_LEN], room_code: *b"ABCDEF", ship_skin: 2 };
        let bytes = payload.to_bytes();
        assert_eq!(JoinGamePayload::from_bytes(&bytes, bytes.len()), Some(payload));
    }

    #[test]
    fn short_buffers_fail_cleanly() {
        assert_eq!(PlayerInputPayload::from_bytes(&[0u8; 2], 2), None);
        assert!(parse_datagram(&[0u8; 3]).is_err());
    }

    #[test]
    fn oversized_datagram_rejected() {
        let raw = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        assert!(parse_datagram(&raw).is_err());
    }
}
