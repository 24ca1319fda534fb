//! Dispatches parsed `!alias` commands to the provisioner and replies in-room.

use alias_provisioner::{
    Provisioner, ProvisionerError, ProvisionerErrorKind, ReplyStatus, RoomStoreError,
};
use tracing::{debug, error, warn};

use crate::alias_command::{parse_alias_command, AliasCommand};
use crate::reply_render::{render_allowed_aliases_html, render_help_html, render_quoted_reply};

const GENERIC_FAILURE_MESSAGE: &str = "There was an error processing your command.";
const MISSING_ALIAS_MESSAGE: &str = "Please provide a room alias. For help, say !alias help";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Inbound plain-text room message.
pub struct InboundRoomMessage {
    pub event_id: String,
    pub sender: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Reply produced for one handled command.
pub struct CommandReply {
    pub command: AliasCommand,
    pub status: ReplyStatus,
    pub html: String,
    pub event_id: String,
}

fn add_alias_error_message(kind: ProvisionerErrorKind) -> Option<&'static str> {
    match kind {
        ProvisionerErrorKind::PermissionDenied => {
            Some("You do not have permission to add aliases in this room.")
        }
        ProvisionerErrorKind::NotAllowed => Some("That alias is not allowed."),
        ProvisionerErrorKind::Taken => Some("That alias is already in use in another room."),
        ProvisionerErrorKind::Invalid => Some("That alias is invalid."),
        ProvisionerErrorKind::NotFound
        | ProvisionerErrorKind::CannotDelete
        | ProvisionerErrorKind::UnknownError => None,
    }
}

fn remove_alias_error_message(kind: ProvisionerErrorKind) -> Option<&'static str> {
    match kind {
        ProvisionerErrorKind::PermissionDenied => {
            Some("You do not have permission to remove aliases in this room.")
        }
        ProvisionerErrorKind::NotAllowed => Some("That alias is not allowed."),
        ProvisionerErrorKind::NotFound => {
            Some("That alias does not exist or does not belong to this room.")
        }
        ProvisionerErrorKind::Invalid => Some("That alias is invalid."),
        ProvisionerErrorKind::CannotDelete => {
            Some("The alias does not exist or I do not have permission to remove it.")
        }
        ProvisionerErrorKind::Taken | ProvisionerErrorKind::UnknownError => None,
    }
}

fn render_error_reply(
    error: &ProvisionerError,
    message_for_kind: fn(ProvisionerErrorKind) -> Option<&'static str>,
) -> (ReplyStatus, String) {
    match message_for_kind(error.kind) {
        Some(message) => (ReplyStatus::Error, message.to_string()),
        None => {
            warn!(kind = ?error.kind, %error, "alias command failed without a specific reply");
            (ReplyStatus::Critical, GENERIC_FAILURE_MESSAGE.to_string())
        }
    }
}

/// Turns `!alias` messages into provisioner calls and quoted replies.
pub struct CommandProcessor {
    provisioner: Provisioner,
    help_room: Option<String>,
}

impl CommandProcessor {
    pub fn new(provisioner: Provisioner, help_room: Option<String>) -> Self {
        Self {
            provisioner,
            help_room,
        }
    }

    /// Handles one message. Returns `Ok(None)` when the message is not a command.
    ///
    /// Each provisioner call is attempted once; only a failure to send the
    /// reply itself is returned as an error.
    pub async fn try_command(
        &self,
        room_id: &str,
        message: &InboundRoomMessage,
    ) -> Result<Option<CommandReply>, RoomStoreError> {
        let Some(command) = parse_alias_command(&message.body) else {
            return Ok(None);
        };
        debug!(room_id, sender = message.sender.as_str(), command = command.name(), "handling alias command");

        let (status, html) = self.execute(room_id, &message.sender, &command).await;
        let reply = render_quoted_reply(
            room_id,
            &message.event_id,
            &message.sender,
            &message.body,
            &html,
            status,
        );
        let event_id = self
            .provisioner
            .store()
            .send_message(room_id, reply)
            .await?;

        Ok(Some(CommandReply {
            command,
            status,
            html,
            event_id,
        }))
    }

    async fn execute(
        &self,
        room_id: &str,
        sender: &str,
        command: &AliasCommand,
    ) -> (ReplyStatus, String) {
        match command {
            AliasCommand::Allowed => {
                let patterns = self.provisioner.get_allowed_aliases(sender);
                (ReplyStatus::Info, render_allowed_aliases_html(&patterns))
            }
            AliasCommand::MissingAlias => (ReplyStatus::Warning, MISSING_ALIAS_MESSAGE.to_string()),
            AliasCommand::Add { alias } => {
                match self.provisioner.add_alias(room_id, sender, alias).await {
                    Ok(_) => (
                        ReplyStatus::Success,
                        "That alias has been added to the room.".to_string(),
                    ),
                    Err(error) => render_error_reply(&error, add_alias_error_message),
                }
            }
            AliasCommand::Remove { alias } => {
                match self.provisioner.remove_alias(room_id, sender, alias).await {
                    Ok(_) => (
                        ReplyStatus::Success,
                        "That alias has been removed from the room.".to_string(),
                    ),
                    Err(error) => render_error_reply(&error, remove_alias_error_message),
                }
            }
            AliasCommand::Publish => {
                match self.provisioner.list_room_in_directory(room_id, sender).await {
                    Ok(()) => (
                        ReplyStatus::Success,
                        "This room will now appear in the public room directory.".to_string(),
                    ),
                    Err(error) => {
                        error!(room_id, sender, kind = ?error.kind, error = ?error, "failed to publish room");
                        (ReplyStatus::Critical, GENERIC_FAILURE_MESSAGE.to_string())
                    }
                }
            }
            AliasCommand::Unpublish => {
                match self
                    .provisioner
                    .remove_room_from_directory(room_id, sender)
                    .await
                {
                    Ok(()) => (
                        ReplyStatus::Success,
                        "This room has been removed from the public room directory.".to_string(),
                    ),
                    Err(error) => {
                        error!(room_id, sender, kind = ?error.kind, error = ?error, "failed to unpublish room");
                        (ReplyStatus::Critical, GENERIC_FAILURE_MESSAGE.to_string())
                    }
                }
            }
            AliasCommand::Help => (
                ReplyStatus::Info,
                render_help_html(self.provisioner.alias_domain(), self.help_room.as_deref()),
            ),
        }
    }
}
