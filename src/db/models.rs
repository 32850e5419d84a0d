use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current time at the millisecond precision the documents are stored with.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now)
}

/// Stored account. The password is kept as submitted; see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
    pub first_name: String,
}

impl User {
    pub fn new(username: String, password: String, first_name: String) -> Self {
        Self {
            id: format!("u_{}", Uuid::new_v4()),
            username,
            password,
            first_name,
        }
    }

    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
        }
    }
}

/// The view of a user that leaves the server: never carries the password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub first_name: String,
}

impl PublicUser {
    /// Identity used for realtime sends from connections without a valid token.
    pub fn guest() -> Self {
        Self {
            id: "guest".to_string(),
            username: "Guest".to_string(),
            first_name: "guest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, user_id: String, expires_in_hours: i64) -> Self {
        Self {
            token,
            user_id,
            expires_at: now_millis() + Duration::hours(expires_in_hours),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub first_name: String,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ts: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: &PublicUser, text: String) -> Self {
        Self {
            id: format!("m_{}", Uuid::new_v4()),
            user_id: sender.id.clone(),
            username: sender.username.clone(),
            first_name: sender.first_name.clone(),
            text,
            ts: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRoom {
    pub id: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRoom {
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_public_view_drops_password() {
        let user = User::new("alice".into(), "secret".into(), "Alice".into());
        assert!(user.id.starts_with("u_"));

        let value = serde_json::to_value(user.public()).unwrap();
        assert_eq!(value["username"], "alice");
        assert_eq!(value["firstName"], "Alice");
        assert!(value.get("password").is_none());
    }

    #[test]
    fn test_session_expiry() {
        let mut session = Session::new("tok".into(), "u_1".into(), 24);
        assert!(!session.is_expired());

        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(session.is_expired());
    }

    #[test]
    fn test_timestamps_stored_as_epoch_millis() {
        let session = Session::new("tok".into(), "u_1".into(), 1);
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["expiresAt"], json!(session.expires_at.timestamp_millis()));
        assert_eq!(value["userId"], "u_1");

        let message = ChatMessage::new(&PublicUser::guest(), "hello".into());
        assert!(message.id.starts_with("m_"));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["ts"], json!(message.ts.timestamp_millis()));
        assert_eq!(value["userId"], "guest");
    }
}
