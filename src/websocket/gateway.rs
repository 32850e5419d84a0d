use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::db::{ChatMessage, PublicUser};
use crate::error::AppError;
use crate::rooms::RoomRegistry;
use crate::websocket::{ClientEvent, ConnectionPool, ServerEvent};

/// Per-connection state. `identity` is resolved once, at connect time.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub id: Uuid,
    pub identity: Option<PublicUser>,
}

impl ConnectionContext {
    /// Who messages from this connection are attributed to.
    pub fn sender(&self) -> PublicUser {
        self.identity.clone().unwrap_or_else(PublicUser::guest)
    }
}

/// Transport-independent core of the realtime channel.
///
/// Malformed input is never answered with an error frame: a message without
/// text is dropped, and joining an unknown room yields an empty history.
///
/// Joining a room (subscribe, read history, send it) and sending to it
/// (append, broadcast) run under the same per-room lock, so a joiner sees
/// each message exactly once: either in its history or as a live event
/// after it.
pub struct Gateway {
    auth: Arc<AuthService>,
    rooms: Arc<RoomRegistry>,
    pool: ConnectionPool,
    room_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Gateway {
    pub fn new(auth: Arc<AuthService>, rooms: Arc<RoomRegistry>) -> Self {
        Self {
            auth,
            rooms,
            pool: ConnectionPool::new(),
            room_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn room_lock(&self, room_id: &str) -> Arc<Mutex<()>> {
        self.room_locks
            .lock()
            .await
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Registers a connection. A missing or invalid token leaves it as a guest.
    pub async fn connect(
        &self,
        token: Option<&str>,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnectionContext {
        let identity = match token.filter(|t| !t.is_empty()) {
            Some(token) => match self.auth.validate_token(token).await {
                Ok(user) => user,
                Err(e) => {
                    warn!("Token validation failed during connect: {}", e);
                    None
                }
            },
            None => None,
        };

        let conn = ConnectionContext { id: Uuid::new_v4(), identity };
        self.pool.add(conn.id, sender).await;
        info!(
            "Connection {} established as {}",
            conn.id,
            conn.identity.as_ref().map_or("guest", |u| u.username.as_str())
        );
        conn
    }

    pub async fn handle_event(&self, conn: &ConnectionContext, event: ClientEvent) -> Result<(), AppError> {
        match event {
            ClientEvent::JoinRoom { room_id } => self.join_room(conn, &room_id).await,
            ClientEvent::Message { room_id, text } => {
                self.send_message(conn, &room_id, text).await.map(|_| ())
            }
        }
    }

    /// Subscribes the connection to `room_id` and replays the room's history to it alone.
    pub async fn join_room(&self, conn: &ConnectionContext, room_id: &str) -> Result<(), AppError> {
        let lock = self.room_lock(room_id).await;
        let _guard = lock.lock().await;

        self.pool.join(conn.id, room_id).await;
        let history = self.rooms.history(room_id).await?;
        debug!("Replaying {} messages of room {} to {}", history.len(), room_id, conn.id);
        self.pool.send_to(&conn.id, ServerEvent::History(history)).await?;
        Ok(())
    }

    /// Persists and broadcasts a message. Returns `None` when the message was dropped.
    pub async fn send_message(
        &self,
        conn: &ConnectionContext,
        room_id: &str,
        text: Option<String>,
    ) -> Result<Option<ChatMessage>, AppError> {
        let text = match text.filter(|t| !t.is_empty()) {
            Some(text) => text,
            None => {
                debug!("Dropped empty message from {} to room {}", conn.id, room_id);
                return Ok(None);
            }
        };

        let lock = self.room_lock(room_id).await;
        let _guard = lock.lock().await;

        let message = ChatMessage::new(&conn.sender(), text);
        let stored = self.rooms.append_message(room_id, message).await?;
        let delivered = self
            .pool
            .broadcast_to_room(room_id, &ServerEvent::Message(stored.clone()))
            .await;
        debug!("Message {} in room {} delivered to {} connections", stored.id, room_id, delivered);
        Ok(Some(stored))
    }

    pub async fn disconnect(&self, id: Uuid) {
        if self.pool.remove(&id).await {
            info!("Connection {} disconnected", id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Collection, DbOperations, DocumentStore, MemoryStore};
    use crate::error::StoreError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Memory store whose first ChatRooms load stalls, widening the window
    /// between a join's subscribe and its history read.
    struct SlowFirstRoomLoad {
        inner: MemoryStore,
        stalled: AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for SlowFirstRoomLoad {
        async fn load(&self, collection: Collection) -> Result<Value, StoreError> {
            if collection == Collection::ChatRooms && !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.inner.load(collection).await
        }

        async fn save(&self, collection: Collection, document: &Value) -> Result<(), StoreError> {
            self.inner.save(collection, document).await
        }
    }

    struct Fixture {
        gateway: Gateway,
        auth: Arc<AuthService>,
        rooms: Arc<RoomRegistry>,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryStore::new()))
    }

    fn fixture_with(store: Arc<dyn DocumentStore>) -> Fixture {
        let db = DbOperations::new(store);
        let auth = Arc::new(AuthService::new(db.clone(), 24));
        let rooms = Arc::new(RoomRegistry::new(db));
        Fixture {
            gateway: Gateway::new(auth.clone(), rooms.clone()),
            auth,
            rooms,
        }
    }

    async fn connect(gateway: &Gateway, token: Option<&str>) -> (ConnectionContext, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (gateway.connect(token, tx).await, rx)
    }

    fn expect_message(rx: &mut UnboundedReceiver<ServerEvent>) -> ChatMessage {
        match rx.try_recv() {
            Ok(ServerEvent::Message(m)) => m,
            other => panic!("expected message event, got {:?}", other),
        }
    }

    fn expect_history(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ChatMessage> {
        match rx.try_recv() {
            Ok(ServerEvent::History(h)) => h,
            other => panic!("expected history event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_with_valid_token_attaches_identity() {
        let f = fixture();
        let user = f.auth.register("alice", "pw", "Alice").await.unwrap();
        let login = f.auth.login("alice", "pw").await.unwrap();

        let (conn, _rx) = connect(&f.gateway, Some(&login.token)).await;
        assert_eq!(conn.identity, Some(user.clone()));
        assert_eq!(conn.sender(), user);
    }

    #[tokio::test]
    async fn test_connect_without_or_with_bad_token_is_guest() {
        let f = fixture();
        let (anon, _rx1) = connect(&f.gateway, None).await;
        let (bad, _rx2) = connect(&f.gateway, Some("bogus")).await;

        assert!(anon.identity.is_none());
        assert!(bad.identity.is_none());
        assert_eq!(bad.sender(), PublicUser::guest());
        assert_eq!(f.gateway.pool().connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_join_sends_history_only_to_joiner() {
        let f = fixture();
        let (a, mut rx_a) = connect(&f.gateway, None).await;
        let (b, mut rx_b) = connect(&f.gateway, None).await;

        f.gateway.join_room(&a, "lobby").await.unwrap();
        assert!(expect_history(&mut rx_a).is_empty());

        f.gateway.send_message(&a, "lobby", Some("first".into())).await.unwrap();
        expect_message(&mut rx_a);

        f.gateway.join_room(&b, "lobby").await.unwrap();
        let history = expect_history(&mut rx_b);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "first");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_room_subscribers() {
        let f = fixture();
        let (a, mut rx_a) = connect(&f.gateway, None).await;
        let (b, mut rx_b) = connect(&f.gateway, None).await;
        let (c, mut rx_c) = connect(&f.gateway, None).await;

        f.gateway.join_room(&a, "r").await.unwrap();
        f.gateway.join_room(&b, "r").await.unwrap();
        f.gateway.join_room(&c, "s").await.unwrap();
        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            expect_history(rx);
        }

        let sent = f.gateway.send_message(&a, "r", Some("hi".into())).await.unwrap().unwrap();

        assert_eq!(expect_message(&mut rx_a), sent);
        assert_eq!(expect_message(&mut rx_b), sent);
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_message_is_persisted_with_sender_identity() {
        let f = fixture();
        let user = f.auth.register("alice", "pw", "Alice").await.unwrap();
        let login = f.auth.login("alice", "pw").await.unwrap();
        let (conn, _rx) = connect(&f.gateway, Some(&login.token)).await;

        // Sending without joining still persists; there is just nobody to broadcast to.
        let sent = f.gateway.send_message(&conn, "lobby", Some("hello".into())).await.unwrap().unwrap();
        assert!(sent.id.starts_with("m_"));

        let history = f.rooms.history("lobby").await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.text, "hello");
        assert_eq!(last.user_id, user.id);
        assert_eq!(last.username, "alice");
        assert_eq!(last.first_name, "Alice");
        assert_eq!(last.id, sent.id);
        assert_eq!(last.ts, sent.ts);
    }

    #[tokio::test]
    async fn test_guest_messages_use_guest_identity() {
        let f = fixture();
        let (conn, _rx) = connect(&f.gateway, None).await;

        let sent = f.gateway.send_message(&conn, "lobby", Some("hey".into())).await.unwrap().unwrap();
        assert_eq!(sent.user_id, "guest");
        assert_eq!(sent.username, "Guest");
        assert_eq!(sent.first_name, "guest");
    }

    #[tokio::test]
    async fn test_empty_text_is_silently_dropped() {
        let f = fixture();
        let (conn, mut rx) = connect(&f.gateway, None).await;
        f.gateway.join_room(&conn, "lobby").await.unwrap();
        expect_history(&mut rx);

        assert!(f.gateway.send_message(&conn, "lobby", Some(String::new())).await.unwrap().is_none());
        assert!(f.gateway.send_message(&conn, "lobby", None).await.unwrap().is_none());

        assert!(rx.try_recv().is_err());
        assert!(f.rooms.history("lobby").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_messages_from_one_connection_keep_order() {
        let f = fixture();
        let (conn, _rx) = connect(&f.gateway, None).await;

        for text in ["m1", "m2", "m3"] {
            f.gateway
                .handle_event(&conn, ClientEvent::Message { room_id: "lobby".into(), text: Some(text.into()) })
                .await
                .unwrap();
        }

        let texts: Vec<String> = f.rooms.history("lobby").await.unwrap().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_disconnect_removes_subscriptions() {
        let f = fixture();
        let (a, _rx_a) = connect(&f.gateway, None).await;
        let (b, mut rx_b) = connect(&f.gateway, None).await;
        f.gateway.join_room(&a, "lobby").await.unwrap();
        f.gateway.join_room(&b, "lobby").await.unwrap();
        expect_history(&mut rx_b);

        f.gateway.disconnect(a.id).await;
        assert_eq!(f.gateway.pool().room_size("lobby").await, 1);
        assert_eq!(f.gateway.pool().connection_count().await, 1);

        f.gateway.send_message(&b, "lobby", Some("still here".into())).await.unwrap();
        assert_eq!(expect_message(&mut rx_b).text, "still here");
    }

    #[tokio::test]
    async fn test_message_sent_during_join_is_delivered_once_after_history() {
        let f = fixture_with(Arc::new(SlowFirstRoomLoad {
            inner: MemoryStore::new(),
            stalled: AtomicBool::new(false),
        }));
        let (a, mut rx_a) = connect(&f.gateway, None).await;
        let (b, _rx_b) = connect(&f.gateway, None).await;

        let (joined, sent) = tokio::join!(f.gateway.join_room(&a, "lobby"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            f.gateway.send_message(&b, "lobby", Some("M".into())).await
        });
        joined.unwrap();
        let sent = sent.unwrap().unwrap();

        assert!(expect_history(&mut rx_a).is_empty());
        assert_eq!(expect_message(&mut rx_a), sent);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(f.rooms.history("lobby").await.unwrap().len(), 1);
    }
}
