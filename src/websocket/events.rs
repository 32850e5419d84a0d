use serde::{Deserialize, Serialize};

use crate::db::ChatMessage;

/// Frames accepted from clients, e.g.
/// `{"type":"message","payload":{"roomId":"lobby","text":"hi"}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String },
    #[serde(rename_all = "camelCase")]
    Message {
        room_id: String,
        #[serde(default)]
        text: Option<String>,
    },
}

/// Frames pushed to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Sent once per join, to the joining connection only.
    History(Vec<ChatMessage>),
    /// Broadcast to every subscriber of the message's room.
    Message(ChatMessage),
}
