//! Best-effort alias and directory migration when a room is upgraded.

use tracing::{info, warn};

use crate::provisioner::Provisioner;
use crate::provisioner_error::ProvisionerError;
use crate::room_store::{DirectoryVisibility, RoomMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of one upgrade migration.
pub struct RoomUpgradeReport {
    pub old_room_id: String,
    pub new_room_id: String,
    pub aliases: Vec<String>,
    pub relisted: bool,
    pub failed_steps: usize,
    pub notice: String,
}

pub fn render_room_upgrade_notice(aliases: &[String], relisted: bool, alias_domain: &str) -> String {
    let mut message = format!(
        "I have migrated the aliases I can from your old room and added them here: {}",
        aliases.join(", ")
    );
    if relisted {
        message.push_str(&format!(
            "\n\nAdditionally, I have listed this room in the room directory for {alias_domain}"
        ));
    }
    message
}

/// Moves every alias of `old_room_id` onto `new_room_id`, acting as the bot.
///
/// Aliases are migrated one at a time in list order. A failed step is logged
/// and skipped; earlier steps are never rolled back and the summary notice
/// always names the full original alias list.
pub async fn migrate_upgraded_room(
    provisioner: &Provisioner,
    old_room_id: &str,
    new_room_id: &str,
) -> Result<RoomUpgradeReport, ProvisionerError> {
    let store = provisioner.store();
    let bot_user_id = store.bot_user_id().to_string();

    let visibility = provisioner
        .get_room_directory_visibility(old_room_id, &bot_user_id)
        .await?;
    let aliases = provisioner
        .get_aliases_in_room(old_room_id, &bot_user_id)
        .await?;

    let mut failed_steps = 0_usize;
    for alias in &aliases {
        if let Err(error) = provisioner
            .remove_alias(old_room_id, &bot_user_id, alias)
            .await
        {
            failed_steps += 1;
            warn!(old_room_id, alias = alias.as_str(), kind = ?error.kind, %error, "failed to remove alias from upgraded room");
        }
        if let Err(error) = provisioner
            .add_alias(new_room_id, &bot_user_id, alias)
            .await
        {
            failed_steps += 1;
            warn!(new_room_id, alias = alias.as_str(), kind = ?error.kind, %error, "failed to add alias to replacement room");
        }
    }

    let relisted = visibility == DirectoryVisibility::Public;
    if relisted {
        provisioner
            .list_room_in_directory(new_room_id, &bot_user_id)
            .await?;
    }

    let notice = render_room_upgrade_notice(&aliases, relisted, provisioner.alias_domain());
    if let Err(error) = store
        .send_message(new_room_id, RoomMessage::notice(notice.clone()))
        .await
    {
        warn!(new_room_id, %error, "failed to send room upgrade notice");
    }

    info!(
        old_room_id,
        new_room_id,
        aliases = aliases.len(),
        relisted,
        failed_steps,
        "room upgrade migration finished"
    );
    Ok(RoomUpgradeReport {
        old_room_id: old_room_id.to_string(),
        new_room_id: new_room_id.to_string(),
        aliases,
        relisted,
        failed_steps,
        notice,
    })
}
