//! Permission-checked alias and directory provisioning against a [`RoomStore`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::alias_pattern::{matching_alias_pattern, normalize_alias, CATCH_ALL_ALIAS_PATTERN};
use crate::provisioner_error::{ProvisionerError, ProvisionerErrorKind};
use crate::room_store::{
    DirectoryVisibility, RoomStore, RoomStoreError, ALIASES_EVENT_TYPE, POWER_LEVELS_EVENT_TYPE,
};

const DEFAULT_USER_POWER_LEVEL: i64 = 0;
const DEFAULT_REQUIRED_POWER_LEVEL: i64 = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
/// Static provisioning policy loaded once at startup.
pub struct ProvisionerConfig {
    pub alias_domain: String,
    #[serde(default)]
    pub allowed_aliases: Vec<String>,
    #[serde(default)]
    pub admin_users: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RoomPowerLevels {
    users: HashMap<String, i64>,
    users_default: Option<i64>,
    events: HashMap<String, i64>,
    state_default: Option<i64>,
}

impl RoomPowerLevels {
    fn from_content(content: &Value) -> Self {
        fn level_map(value: Option<&Value>) -> HashMap<String, i64> {
            value
                .and_then(Value::as_object)
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|(key, level)| power_level_value(level).map(|l| (key.clone(), l)))
                        .collect()
                })
                .unwrap_or_default()
        }

        Self {
            users: level_map(content.get("users")),
            users_default: content.get("users_default").and_then(power_level_value),
            events: level_map(content.get("events")),
            state_default: content.get("state_default").and_then(power_level_value),
        }
    }

    fn user_level(&self, user_id: &str) -> i64 {
        self.users
            .get(user_id)
            .copied()
            .or(self.users_default)
            .unwrap_or(DEFAULT_USER_POWER_LEVEL)
    }

    fn required_alias_level(&self) -> i64 {
        self.events
            .get(ALIASES_EVENT_TYPE)
            .copied()
            .or(self.state_default)
            .unwrap_or(DEFAULT_REQUIRED_POWER_LEVEL)
    }
}

// Older room versions allow power levels encoded as strings.
fn power_level_value(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|raw| raw.trim().parse::<i64>().ok()))
}

pub(crate) fn classify_create_alias_error(alias: &str, error: &RoomStoreError) -> ProvisionerErrorKind {
    let message = error.server_message().unwrap_or_default();
    if error.errcode() == Some("M_ROOM_IN_USE")
        || message == format!("Room alias {alias} already exists")
    {
        ProvisionerErrorKind::Taken
    } else if message == "Room alias must be local" {
        ProvisionerErrorKind::Invalid
    } else {
        ProvisionerErrorKind::UnknownError
    }
}

pub(crate) fn classify_delete_alias_error(error: &RoomStoreError) -> ProvisionerErrorKind {
    let message = error.server_message().unwrap_or_default();
    if message == "Room alias must be local" {
        ProvisionerErrorKind::Invalid
    } else if error.errcode() == Some("M_FORBIDDEN")
        || message == "You don't have permission to delete the alias."
    {
        ProvisionerErrorKind::CannotDelete
    } else {
        ProvisionerErrorKind::UnknownError
    }
}

#[derive(Clone)]
/// Stateless-per-call alias provisioning service.
pub struct Provisioner {
    config: Arc<ProvisionerConfig>,
    store: Arc<dyn RoomStore>,
}

impl Provisioner {
    pub fn new(config: Arc<ProvisionerConfig>, store: Arc<dyn RoomStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    pub fn alias_domain(&self) -> &str {
        &self.config.alias_domain
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.config.admin_users.iter().any(|admin| admin == user_id)
    }

    /// Effective allow-set: catch-all first for admins, then configured patterns.
    pub fn get_allowed_aliases(&self, user_id: &str) -> Vec<String> {
        let mut allowed = Vec::with_capacity(self.config.allowed_aliases.len() + 1);
        if self.is_admin(user_id) {
            allowed.push(CATCH_ALL_ALIAS_PATTERN.to_string());
        }
        allowed.extend(self.config.allowed_aliases.iter().cloned());
        allowed
    }

    /// Binds `alias` to `room_id` and returns the canonical alias.
    pub async fn add_alias(
        &self,
        room_id: &str,
        user_id: &str,
        alias: &str,
    ) -> Result<String, ProvisionerError> {
        let alias = normalize_alias(alias, &self.config.alias_domain);
        if !self.has_permission(room_id, user_id).await? {
            return Err(ProvisionerError::permission_denied(
                "You cannot add aliases in this room.",
            ));
        }
        self.ensure_alias_allowed(user_id, &alias)?;

        if let Err(store_error) = self.store.create_alias(&alias, room_id).await {
            error!(
                room_id,
                alias = alias.as_str(),
                error = %store_error,
                "failed to add alias"
            );
            let kind = classify_create_alias_error(&alias, &store_error);
            let message = match kind {
                ProvisionerErrorKind::Taken => "The alias is already in use by another room.",
                ProvisionerErrorKind::Invalid => "The alias is invalid",
                _ => "An unknown error occurred while adding the alias",
            };
            return Err(ProvisionerError::with_source(kind, message, store_error));
        }

        debug!(room_id, user_id, alias = alias.as_str(), "alias added");
        Ok(alias)
    }

    /// Unbinds `alias` from `room_id` and returns the canonical alias.
    pub async fn remove_alias(
        &self,
        room_id: &str,
        user_id: &str,
        alias: &str,
    ) -> Result<String, ProvisionerError> {
        let alias = normalize_alias(alias, &self.config.alias_domain);
        if !self.has_permission(room_id, user_id).await? {
            return Err(ProvisionerError::permission_denied(
                "You cannot remove aliases in this room.",
            ));
        }
        self.ensure_alias_allowed(user_id, &alias)?;

        let aliases = self.get_aliases_in_room(room_id, user_id).await?;
        if !aliases.contains(&alias) {
            return Err(ProvisionerError::new(
                ProvisionerErrorKind::NotFound,
                "The alias does not appear to belong to this room or does not exist.",
            ));
        }

        if let Err(store_error) = self.store.delete_alias(&alias).await {
            error!(
                room_id,
                alias = alias.as_str(),
                error = %store_error,
                "failed to remove alias"
            );
            let kind = classify_delete_alias_error(&store_error);
            let message = match kind {
                ProvisionerErrorKind::Invalid => "The alias is invalid",
                ProvisionerErrorKind::CannotDelete => {
                    "The alias does not exist or the bot does not have permission to remove the alias."
                }
                _ => "An unknown error occurred while removing the alias",
            };
            return Err(ProvisionerError::with_source(kind, message, store_error));
        }

        debug!(room_id, user_id, alias = alias.as_str(), "alias removed");
        Ok(alias)
    }

    /// Aliases published in the room for the bot's own domain.
    pub async fn get_aliases_in_room(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Vec<String>, ProvisionerError> {
        if !self.is_in_room(user_id, room_id).await? {
            return Err(ProvisionerError::permission_denied("You are not in the room."));
        }

        let content = match self
            .store
            .get_state_event(room_id, ALIASES_EVENT_TYPE, &self.config.alias_domain)
            .await
        {
            Ok(content) => content,
            Err(store_error) => {
                error!(room_id, error = %store_error, "failed to read room aliases");
                return Err(ProvisionerError::unknown(
                    "Error retrieving the room aliases",
                    store_error,
                ));
            }
        };

        Ok(content
            .as_ref()
            .and_then(|content| content.get("aliases"))
            .and_then(Value::as_array)
            .map(|aliases| {
                aliases
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn list_room_in_directory(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), ProvisionerError> {
        self.set_directory_visibility(room_id, user_id, DirectoryVisibility::Public)
            .await
    }

    pub async fn remove_room_from_directory(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), ProvisionerError> {
        self.set_directory_visibility(room_id, user_id, DirectoryVisibility::Private)
            .await
    }

    pub async fn get_room_directory_visibility(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<DirectoryVisibility, ProvisionerError> {
        if !self.is_in_room(user_id, room_id).await? {
            return Err(ProvisionerError::permission_denied("You are not in the room."));
        }
        self.store
            .directory_visibility(room_id)
            .await
            .map_err(|store_error| {
                error!(room_id, error = %store_error, "failed to read directory visibility");
                ProvisionerError::unknown(
                    "Error retrieving the room directory visibility",
                    store_error,
                )
            })
    }

    async fn set_directory_visibility(
        &self,
        room_id: &str,
        user_id: &str,
        visibility: DirectoryVisibility,
    ) -> Result<(), ProvisionerError> {
        if !self.has_permission(room_id, user_id).await? {
            return Err(ProvisionerError::permission_denied(
                "You cannot change the directory visibility of this room.",
            ));
        }
        self.store
            .set_directory_visibility(room_id, visibility)
            .await
            .map_err(|store_error| {
                error!(
                    room_id,
                    visibility = visibility.as_str(),
                    error = %store_error,
                    "failed to update directory visibility"
                );
                ProvisionerError::unknown(
                    "An unknown error occurred while updating the room directory",
                    store_error,
                )
            })?;
        debug!(room_id, user_id, visibility = visibility.as_str(), "directory visibility updated");
        Ok(())
    }

    fn ensure_alias_allowed(&self, user_id: &str, alias: &str) -> Result<(), ProvisionerError> {
        let allowed = self.get_allowed_aliases(user_id);
        if matching_alias_pattern(&allowed, alias).is_none() {
            return Err(ProvisionerError::new(
                ProvisionerErrorKind::NotAllowed,
                "The alias you provided is not allowed.",
            ));
        }
        Ok(())
    }

    async fn has_permission(&self, room_id: &str, user_id: &str) -> Result<bool, ProvisionerError> {
        if self.is_admin(user_id) {
            return Ok(true);
        }
        if !self.is_in_room(user_id, room_id).await? {
            return Ok(false);
        }

        let power_levels = match self
            .store
            .get_state_event(room_id, POWER_LEVELS_EVENT_TYPE, "")
            .await
        {
            Ok(Some(content)) => RoomPowerLevels::from_content(&content),
            Ok(None) => {
                warn!(room_id, "room has no power levels event; using defaults");
                RoomPowerLevels::default()
            }
            Err(store_error) => {
                error!(room_id, error = %store_error, "failed to read room power levels");
                return Err(ProvisionerError::unknown(
                    "Error retrieving the room power levels",
                    store_error,
                ));
            }
        };

        Ok(power_levels.user_level(user_id) >= power_levels.required_alias_level())
    }

    async fn is_in_room(&self, user_id: &str, room_id: &str) -> Result<bool, ProvisionerError> {
        if self.is_admin(user_id) {
            return Ok(true);
        }
        match self.store.joined_members(room_id).await {
            Ok(members) => Ok(members.iter().any(|member| member == user_id)),
            Err(store_error) => {
                error!(room_id, error = %store_error, "failed to read joined members");
                Err(ProvisionerError::unknown(
                    "Error retrieving the room members",
                    store_error,
                ))
            }
        }
    }
}
