//! In-memory [`RoomStore`] used by tests and dry runs.
//!
//! Mirrors the homeserver behaviors the provisioner relies on: alias
//! uniqueness, local-domain enforcement, `m.room.aliases` state derived from
//! bindings, and directory visibility.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::room_store::{
    DirectoryVisibility, RoomMessage, RoomStore, RoomStoreError, ALIASES_EVENT_TYPE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Mutating call observed by the store, in call order.
pub enum RoomStoreOperation {
    CreateAlias { alias: String, room_id: String },
    DeleteAlias { alias: String },
    SetDirectoryVisibility {
        room_id: String,
        visibility: DirectoryVisibility,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    members: BTreeMap<String, BTreeSet<String>>,
    state_events: BTreeMap<(String, String, String), Value>,
    // alias -> room, kept in insertion order per room through `alias_order`.
    alias_bindings: BTreeMap<String, String>,
    alias_order: Vec<String>,
    visibility: BTreeMap<String, DirectoryVisibility>,
    failing_member_lookups: BTreeSet<String>,
    failing_alias_creates: BTreeSet<String>,
    failing_alias_deletes: BTreeMap<String, RoomStoreError>,
    operations: Vec<RoomStoreOperation>,
    lookups: usize,
    sent: Vec<(String, RoomMessage)>,
}

pub struct InMemoryRoomStore {
    bot_user_id: String,
    server_name: String,
    state: Mutex<MemoryState>,
}

impl InMemoryRoomStore {
    /// Creates an empty store; the server name is taken from the bot's user id.
    pub fn new(bot_user_id: impl Into<String>) -> Self {
        let bot_user_id = bot_user_id.into();
        let server_name = bot_user_id
            .split_once(':')
            .map(|(_, server)| server.to_string())
            .unwrap_or_default();
        Self {
            bot_user_id,
            server_name,
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn join(&self, room_id: &str, user_id: &str) {
        self.lock()
            .members
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn set_state_event(&self, room_id: &str, event_type: &str, state_key: &str, content: Value) {
        self.lock().state_events.insert(
            (
                room_id.to_string(),
                event_type.to_string(),
                state_key.to_string(),
            ),
            content,
        );
    }

    pub fn set_power_levels(&self, room_id: &str, content: Value) {
        self.set_state_event(room_id, "m.room.power_levels", "", content);
    }

    /// Binds an alias without recording a mutation.
    pub fn bind_alias(&self, alias: &str, room_id: &str) {
        let mut state = self.lock();
        if state
            .alias_bindings
            .insert(alias.to_string(), room_id.to_string())
            .is_none()
        {
            state.alias_order.push(alias.to_string());
        }
    }

    pub fn set_visibility(&self, room_id: &str, visibility: DirectoryVisibility) {
        self.lock()
            .visibility
            .insert(room_id.to_string(), visibility);
    }

    pub fn fail_joined_members(&self, room_id: &str) {
        self.lock()
            .failing_member_lookups
            .insert(room_id.to_string());
    }

    pub fn fail_create_alias(&self, alias: &str) {
        self.lock().failing_alias_creates.insert(alias.to_string());
    }

    /// Makes `delete_alias` for `alias` fail with the given homeserver error,
    /// leaving the binding in place.
    pub fn fail_delete_alias(&self, alias: &str, errcode: &str, message: &str) {
        let status = if errcode == "M_FORBIDDEN" { 403 } else { 400 };
        self.lock().failing_alias_deletes.insert(
            alias.to_string(),
            RoomStoreError::api(status, errcode, message),
        );
    }

    pub fn alias_binding(&self, alias: &str) -> Option<String> {
        self.lock().alias_bindings.get(alias).cloned()
    }

    pub fn visibility(&self, room_id: &str) -> DirectoryVisibility {
        self.lock()
            .visibility
            .get(room_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn operations(&self) -> Vec<RoomStoreOperation> {
        self.lock().operations.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock().operations.len()
    }

    /// Reads and mutations served so far, excluding sent messages.
    pub fn call_count(&self) -> usize {
        let state = self.lock();
        state.lookups + state.operations.len()
    }

    pub fn sent_messages(&self, room_id: &str) -> Vec<RoomMessage> {
        self.lock()
            .sent
            .iter()
            .filter(|(room, _)| room == room_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    fn aliases_content(state: &MemoryState, room_id: &str, domain: &str) -> Option<Value> {
        let suffix = format!(":{domain}");
        let aliases = state
            .alias_order
            .iter()
            .filter(|alias| alias.ends_with(&suffix))
            .filter(|alias| state.alias_bindings.get(*alias).map(String::as_str) == Some(room_id))
            .cloned()
            .collect::<Vec<_>>();
        if aliases.is_empty() {
            None
        } else {
            Some(json!({ "aliases": aliases }))
        }
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    async fn get_state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<Value>, RoomStoreError> {
        let mut state = self.lock();
        state.lookups += 1;
        if event_type == ALIASES_EVENT_TYPE {
            return Ok(Self::aliases_content(&state, room_id, state_key));
        }
        Ok(state
            .state_events
            .get(&(
                room_id.to_string(),
                event_type.to_string(),
                state_key.to_string(),
            ))
            .cloned())
    }

    async fn joined_members(&self, room_id: &str) -> Result<Vec<String>, RoomStoreError> {
        let mut state = self.lock();
        state.lookups += 1;
        if state.failing_member_lookups.contains(room_id) {
            return Err(RoomStoreError::Transport(format!(
                "joined members unavailable for {room_id}"
            )));
        }
        Ok(state
            .members
            .get(room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_alias(&self, alias: &str, room_id: &str) -> Result<(), RoomStoreError> {
        let mut state = self.lock();
        state.operations.push(RoomStoreOperation::CreateAlias {
            alias: alias.to_string(),
            room_id: room_id.to_string(),
        });
        if state.failing_alias_creates.contains(alias) {
            return Err(RoomStoreError::api(500, "M_UNKNOWN", "Internal server error"));
        }
        if !alias.ends_with(&format!(":{}", self.server_name)) {
            return Err(RoomStoreError::api(
                400,
                "M_INVALID_PARAM",
                "Room alias must be local",
            ));
        }
        if state.alias_bindings.contains_key(alias) {
            return Err(RoomStoreError::api(
                409,
                "M_ROOM_IN_USE",
                format!("Room alias {alias} already exists"),
            ));
        }
        state
            .alias_bindings
            .insert(alias.to_string(), room_id.to_string());
        state.alias_order.push(alias.to_string());
        Ok(())
    }

    async fn delete_alias(&self, alias: &str) -> Result<(), RoomStoreError> {
        let mut state = self.lock();
        state.operations.push(RoomStoreOperation::DeleteAlias {
            alias: alias.to_string(),
        });
        if let Some(error) = state.failing_alias_deletes.get(alias) {
            return Err(error.clone());
        }
        if state.alias_bindings.remove(alias).is_none() {
            return Err(RoomStoreError::api(404, "M_NOT_FOUND", "Room alias not found"));
        }
        state.alias_order.retain(|existing| existing != alias);
        Ok(())
    }

    async fn directory_visibility(
        &self,
        room_id: &str,
    ) -> Result<DirectoryVisibility, RoomStoreError> {
        let mut state = self.lock();
        state.lookups += 1;
        Ok(state.visibility.get(room_id).copied().unwrap_or_default())
    }

    async fn set_directory_visibility(
        &self,
        room_id: &str,
        visibility: DirectoryVisibility,
    ) -> Result<(), RoomStoreError> {
        let mut state = self.lock();
        state.operations.push(RoomStoreOperation::SetDirectoryVisibility {
            room_id: room_id.to_string(),
            visibility,
        });
        state.visibility.insert(room_id.to_string(), visibility);
        Ok(())
    }

    async fn send_message(
        &self,
        room_id: &str,
        message: RoomMessage,
    ) -> Result<String, RoomStoreError> {
        let mut state = self.lock();
        state.sent.push((room_id.to_string(), message));
        Ok(format!("$sent-{}", state.sent.len()))
    }
}
