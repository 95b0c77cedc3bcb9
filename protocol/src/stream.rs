//! Length-prefixed framing for the TCP auth/lobby/chat channel.
//!
//! Frame layout (big-endian): `[u16 type][u8 authenticated][u32 payload_size][payload]`.
//! `payload_size` excludes the header. [`StreamFrameDecoder`] accumulates bytes
//! across reads and yields exactly one frame at a time, shifting its internal
//! buffer afterwards — the same accumulate-then-shift idiom the datagram side
//! does not need because UDP hands us one whole packet per `recv_from`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// Size of the fixed stream header in bytes.
pub const STREAM_HEADER_SIZE: usize = 7;

/// Maximum payload a single stream frame may carry. Larger frames are a
/// protocol violation, not a short-frame condition.
pub const MAX_STREAM_PAYLOAD: usize = 4096;

/// Message-type discriminants for the stream channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StreamMessageType {
    Heartbeat = 0,
    Login = 1,
    Register = 2,
    AuthAck = 3,
    CreateRoom = 10,
    JoinRoomByCode = 11,
    LeaveRoom = 12,
    SetReady = 13,
    StartGame = 14,
    KickPlayer = 15,
    SetRoomConfig = 16,
    BrowsePublicRooms = 17,
    QuickJoin = 18,
    RoomAck = 19,
    RoomNack = 20,
    RoomUpdate = 21,
    GameStarting = 22,
    PlayerKickedNotification = 23,
    SendChatMessage = 30,
    ChatMessagePayload = 31,
    ChatHistoryResponse = 32,
    GetUserSettings = 40,
    SaveUserSettings = 41,
    UserSettingsPayload = 42,
}

impl StreamMessageType {
    pub fn from_u16(raw: u16) -> Option<Self> {
        use StreamMessageType::*;
        Some(match raw {
            0 => Heartbeat,
            1 => Login,
            2 => Register,
            3 => AuthAck,
            10 => CreateRoom,
            11 => JoinRoomByCode,
            12 => LeaveRoom,
            13 => SetReady,
            14 => StartGame,
            15 => KickPlayer,
            16 => SetRoomConfig,
            17 => BrowsePublicRooms,
            18 => QuickJoin,
            19 => RoomAck,
            20 => RoomNack,
            21 => RoomUpdate,
            22 => GameStarting,
            23 => PlayerKickedNotification,
            30 => SendChatMessage,
            31 => ChatMessagePayload,
            32 => ChatHistoryResponse,
            40 => GetUserSettings,
            41 => SaveUserSettings,
            42 => UserSettingsPayload,
            _ => return None,
        })
    }
}

/// The fixed part of a stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub message_type: u16,
    pub authenticated: bool,
    pub payload_size: u32,
}

impl StreamHeader {
    pub const WIRE_SIZE: usize = STREAM_HEADER_SIZE;

    pub fn to_bytes(&self) -> [u8; STREAM_HEADER_SIZE] {
        let mut buf = [0u8; STREAM_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.message_type.to_be_bytes());
        buf[2] = self.authenticated as u8;
        buf[3..7].copy_from_slice(&self.payload_size.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < STREAM_HEADER_SIZE {
            return None;
        }
        let message_type = u16::from_be_bytes([buf[0], buf[1]]);
        let authenticated = buf[2] != 0;
        let payload_size = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);
        Some(StreamHeader { message_type, authenticated, payload_size })
    }
}

/// A fully decoded stream frame: header plus the raw payload bytes. Callers
/// dispatch on `header.message_type` and hand `payload` to the matching
/// payload type's `from_bytes`.
pub struct StreamFrame {
    pub header: StreamHeader,
    pub payload: Bytes,
}

/// Accumulates bytes from repeated TCP reads and yields whole frames.
///
/// Usage: push every byte slice read from the socket with [`Self::feed`],
/// then drain as many frames as are ready with [`Self::try_parse_frame`].
#[derive(Default)]
pub struct StreamFrameDecoder {
    buffer: BytesMut,
}

impl StreamFrameDecoder {
    pub fn new() -> Self {
        StreamFrameDecoder { buffer: BytesMut::new() }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Tries to pull one complete frame out of the buffer. Returns `Ok(None)`
    /// on `ShortFrame` (wait for more bytes), `Err` on `MalformedFrame` (the
    /// caller should close the connection).
    pub fn try_parse_frame(&mut self) -> Result<Option<StreamFrame>, CodecError> {
        if self.buffer.len() < STREAM_HEADER_SIZE {
            return Ok(None);
        }
        let header = StreamHeader::from_bytes(&self.buffer)
            .ok_or(CodecError::malformed("inconsistent stream header"))?;

        if header.payload_size as usize > MAX_STREAM_PAYLOAD {
            return Err(CodecError::malformed("payload exceeds maximum stream frame size"));
        }

        let total = STREAM_HEADER_SIZE + header.payload_size as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let mut frame_bytes = self.buffer.split_to(total);
        frame_bytes.advance(STREAM_HEADER_SIZE);
        Ok(Some(StreamFrame { header, payload: frame_bytes.freeze() }))
    }
}

/// Serializes a payload with postcard and wraps it in a stream frame.
pub fn encode_stream_frame<T: serde::Serialize>(
    message_type: StreamMessageType,
    authenticated: bool,
    payload: &T,
) -> Result<BytesMut, CodecError> {
    let body = postcard::to_allocvec(payload).map_err(|_| CodecError::malformed("failed to encode payload"))?;
    if body.len() > MAX_STREAM_PAYLOAD {
        return Err(CodecError::malformed("encoded payload exceeds maximum stream frame size"));
    }
    let header = StreamHeader {
        message_type: message_type as u16,
        authenticated,
        payload_size: body.len() as u32,
    };
    let mut out = BytesMut::with_capacity(STREAM_HEADER_SIZE + body.len());
    out.put_slice(&header.to_bytes());
    out.put_slice(&body);
    Ok(out)
}

/// Decodes a postcard-encoded payload from a frame's body.
pub fn decode_stream_payload<T: serde::de::DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(payload).map_err(|_| CodecError::malformed("failed to decode payload"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = StreamHeader { message_type: 42, authenticated: true, payload_size: 17 };
        assert_eq!(StreamHeader::from_bytes(&header.to_bytes()), Some(header));
    }

    #[test]
    fn decoder_waits_for_full_frame() {
        let mut decoder = StreamFrameDecoder::new();
        let header = StreamHeader { message_type: 1, authenticated: false, payload_size: 4 };
        decoder.feed(&header.to_bytes());
        assert!(decoder.try_parse_frame().unwrap().is_none());
        decoder.feed(b"ab");
        assert!(decoder.try_parse_frame().unwrap().is_none());
        decoder.feed(b"cd");
        let frame = decoder.try_parse_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"abcd");
        assert!(decoder.try_parse_frame().unwrap().is_none());
    }

    #[test]
    fn decoder_rejects_oversized_payload() {
        let mut decoder = StreamFrameDecoder::new();
        let header = StreamHeader {
            message_type: 1,
            authenticated: false,
            payload_size: (MAX_STREAM_PAYLOAD + 1) as u32,
        };
        decoder.feed(&header.to_bytes());
        assert!(decoder.try_parse_frame().is_err());
    }

    #[test]
    fn decoder_handles_two_frames_in_one_feed() {
        let mut decoder = StreamFrameDecoder::new();
        let header = StreamHeader { message_type: 1, authenticated: false, payload_size: 1 };
        let mut bytes = header.to_bytes().to_vec();
        bytes.push(b'x');
        bytes.extend_from_slice(&header.to_bytes());
        bytes.push(b'y');
        decoder.feed(&bytes);
        let first = decoder.try_parse_frame().unwrap().unwrap();
        assert_eq!(&first.payload[..], b"x");
        let second = decoder.try_parse_frame().unwrap().unwrap();
        assert_eq!(&second.payload[..], b"y");
    }
}
