//! Voice relay payloads (C8, §4.8). The relay never inspects
//! [`VoiceFramePayload::opaque_audio`]; it only re-stamps the header and
//! forwards the bytes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceJoinPayload {
    pub token: [u8; 32],
    pub room_code: [u8; 6],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoiceJoinAckPayload {
    pub player_id: u8,
}

#[derive(Debug, Clone)]
pub struct VoiceFramePayload {
    pub opaque_audio: bytes::Bytes,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoiceMutePayload {
    pub player_id: u8,
    pub muted: bool,
}
