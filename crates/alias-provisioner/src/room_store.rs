//! Room-store capability contract consumed by the provisioner and command layers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const POWER_LEVELS_EVENT_TYPE: &str = "m.room.power_levels";
pub const ALIASES_EVENT_TYPE: &str = "m.room.aliases";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
/// Room directory listing state.
pub enum DirectoryVisibility {
    Public,
    #[default]
    Private,
}

impl DirectoryVisibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Styling hint attached to every bot reply.
pub enum ReplyStatus {
    Info,
    Warning,
    Error,
    Critical,
    Success,
}

impl ReplyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Success => "success",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outbound notice content handed to the transport.
pub struct RoomMessage {
    pub body: String,
    pub formatted_body: Option<String>,
    pub status: Option<ReplyStatus>,
    pub in_reply_to: Option<String>,
}

impl RoomMessage {
    /// Plain notice with no formatting or reply threading.
    pub fn notice(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            formatted_body: None,
            status: None,
            in_reply_to: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Failure reported by a room-store implementation.
pub enum RoomStoreError {
    #[error("homeserver returned status {status}: {errcode} {error}")]
    Api {
        status: u16,
        errcode: String,
        error: String,
    },
    #[error("room store transport failed: {0}")]
    Transport(String),
    #[error("invalid room store response: {0}")]
    InvalidResponse(String),
}

impl RoomStoreError {
    pub fn api(status: u16, errcode: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Api {
            status,
            errcode: errcode.into(),
            error: error.into(),
        }
    }

    pub fn errcode(&self) -> Option<&str> {
        match self {
            Self::Api { errcode, .. } => Some(errcode.as_str()),
            _ => None,
        }
    }

    /// Human-readable error text reported by the homeserver, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Api { error, .. } => Some(error.as_str()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. }) || self.errcode() == Some("M_NOT_FOUND")
    }
}

#[async_trait]
/// Capability interface over the chat server's room state, alias directory,
/// and message sending.
pub trait RoomStore: Send + Sync {
    /// The bot's own user id.
    fn bot_user_id(&self) -> &str;

    /// Fetches a state event's content; `Ok(None)` when the event does not exist.
    async fn get_state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<Value>, RoomStoreError>;

    async fn joined_members(&self, room_id: &str) -> Result<Vec<String>, RoomStoreError>;

    async fn create_alias(&self, alias: &str, room_id: &str) -> Result<(), RoomStoreError>;

    async fn delete_alias(&self, alias: &str) -> Result<(), RoomStoreError>;

    async fn directory_visibility(
        &self,
        room_id: &str,
    ) -> Result<DirectoryVisibility, RoomStoreError>;

    async fn set_directory_visibility(
        &self,
        room_id: &str,
        visibility: DirectoryVisibility,
    ) -> Result<(), RoomStoreError>;

    /// Sends a message and returns the new event id.
    async fn send_message(
        &self,
        room_id: &str,
        message: RoomMessage,
    ) -> Result<String, RoomStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_directory_visibility_parse_accepts_only_known_values() {
        assert_eq!(
            DirectoryVisibility::parse("public"),
            Some(DirectoryVisibility::Public)
        );
        assert_eq!(
            DirectoryVisibility::parse(" private "),
            Some(DirectoryVisibility::Private)
        );
        assert_eq!(DirectoryVisibility::parse("Public"), None);
        assert_eq!(DirectoryVisibility::parse(""), None);
    }

    #[test]
    fn unit_room_store_error_not_found_matches_status_or_errcode() {
        assert!(RoomStoreError::api(404, "M_UNKNOWN", "nope").is_not_found());
        assert!(RoomStoreError::api(400, "M_NOT_FOUND", "nope").is_not_found());
        assert!(!RoomStoreError::api(403, "M_FORBIDDEN", "nope").is_not_found());
        assert!(!RoomStoreError::Transport("reset".to_string()).is_not_found());
    }
}
