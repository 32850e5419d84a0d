use tracing::debug;

use crate::db::{ChatMessage, ChatRoom, Collection, DbOperations};
use crate::error::{AppError, StoreError};

/// Resolves room ids to their message history.
///
/// Rooms are never created by lookups. A room only appears in storage once
/// a message has been appended to it.
pub struct RoomRegistry {
    db: DbOperations,
}

impl RoomRegistry {
    pub fn new(db: DbOperations) -> Self {
        Self { db }
    }

    /// The stored room, or an empty placeholder that is not persisted.
    pub async fn get_or_create(&self, room_id: &str) -> Result<ChatRoom, StoreError> {
        let rooms: Vec<ChatRoom> = self.db.read(Collection::ChatRooms).await?;
        Ok(rooms
            .into_iter()
            .find(|r| r.id == room_id)
            .unwrap_or_else(|| ChatRoom::empty(room_id)))
    }

    pub async fn history(&self, room_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self.get_or_create(room_id).await?.messages)
    }

    /// Appends `message` to the room, creating and persisting the room if needed.
    ///
    /// Returns the message as stored. Its `ts` is raised to the room's latest
    /// timestamp when needed so a room's timestamps never go backwards.
    pub async fn append_message(
        &self,
        room_id: &str,
        mut message: ChatMessage,
    ) -> Result<ChatMessage, AppError> {
        self.db
            .update(Collection::ChatRooms, |rooms: &mut Vec<ChatRoom>| {
                let index = match rooms.iter().position(|r| r.id == room_id) {
                    Some(index) => index,
                    None => {
                        debug!("Creating room {}", room_id);
                        rooms.push(ChatRoom::empty(room_id));
                        rooms.len() - 1
                    }
                };
                let room = &mut rooms[index];

                if let Some(last) = room.messages.last() {
                    if message.ts < last.ts {
                        message.ts = last.ts;
                    }
                }
                room.messages.push(message.clone());
                Ok(message)
            })
            .await
    }
}
