//! Payloads for the stream channel's lobby, chat, and settings protocol
//! (§4.3, §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomPayload {
    pub name: String,
    pub max_players: u8,
    pub private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomByCodePayload {
    pub room_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetReadyPayload {
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KickPlayerPayload {
    pub target_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRoomConfigPayload {
    pub game_speed_percent: u16,
    pub private: bool,
}

/// Reasons a lobby mutation is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomNackReason {
    AlreadyInRoom,
    RoomNotFound,
    RoomFull,
    RoomNotWaiting,
    NotHost,
    CannotStart,
    TargetNotInRoom,
    CannotKickSelf,
    NoPublicRoomsAvailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotView {
    pub occupied: bool,
    pub display_name: String,
    pub ready: bool,
    pub host: bool,
    pub ship_skin: u8,
}

/// Broadcast to every occupant after any room mutation commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomUpdate {
    pub code: String,
    pub name: String,
    pub max_players: u8,
    pub slots: Vec<SlotView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicRoomSummary {
    pub code: String,
    pub name: String,
    pub occupied: u8,
    pub max_players: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowsePublicRoomsResponse {
    pub rooms: Vec<PublicRoomSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerKickedNotification {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendChatMessagePayload {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    pub display_name: String,
    pub text: String,
    pub sent_at_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<ChatMessagePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveUserSettingsPayload {
    pub settings_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettingsPayload {
    pub settings_json: String,
}
