//! Payloads for the stream channel's auth protocol (§4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Distinct error codes surfaced on a failed `Login`/`Register`. Banned
/// users receive `InvalidCredentials` — the ban itself is never disclosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthErrorCode {
    InvalidCredentials,
    UsernameExists,
    EmailExists,
    InvalidUsername,
    InvalidEmail,
    InvalidPassword,
    AlreadyConnected,
    DomainError,
    ServerError,
}

/// `AuthAck` — success carries the session token for the UDP channel;
/// failure carries one of [`AuthErrorCode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthResponse {
    Success { token: [u8; 32], display_name: String },
    Failure { error_code: AuthErrorCode },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{decode_stream_payload, encode_stream_frame, StreamMessageType};

    #[test]
    fn auth_response_round_trips_through_a_stream_frame() {
        let response = AuthResponse::Success { token: [9u8; 32], display_name: "alice".into() };
        let frame = encode_stream_frame(StreamMessageType::AuthAck, false, &response).unwrap();
        let mut decoder = crate::stream::StreamFrameDecoder::new();
        decoder.feed(&frame);
        let parsed = decoder.try_parse_frame().unwrap().unwrap();
        let decoded: AuthResponse = decode_stream_payload(&parsed.payload).unwrap();
        match decoded {
            AuthResponse::Success { token, display_name } => {
                assert_eq!(token, [9u8; 32]);
                assert_eq!(display_name, "alice");
            }
            AuthResponse::Failure { .. } => panic!("expected success"),
        }
    }
}
