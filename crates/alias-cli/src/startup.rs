use std::sync::Arc;

use alias_commands::CommandProcessor;
use alias_gateway::run_provisioning_api;
use alias_matrix::{run_matrix_bridge, MatrixApiClient};
use alias_provisioner::{Provisioner, RoomStore};
use anyhow::{Context, Result};
use tracing::info;

use crate::bot_config::BotConfig;

/// Connects to the homeserver and runs the sync loop, plus the provisioning
/// API when enabled, until ctrl-c or a fatal error.
pub(crate) async fn run_alias_bot(config: BotConfig) -> Result<()> {
    let client = MatrixApiClient::connect(config.client_settings())
        .await
        .context("failed to connect to homeserver")?;
    let client = Arc::new(client);
    info!(bot_user_id = client.bot_user_id(), "connected to homeserver");

    let provisioner = Provisioner::new(
        Arc::new(config.provisioner_config()),
        Arc::clone(&client) as Arc<dyn RoomStore>,
    );
    let commands = CommandProcessor::new(provisioner.clone(), config.help_room.clone());
    let bridge = run_matrix_bridge(
        config.runtime_config(),
        client,
        provisioner.clone(),
        commands,
    );

    if config.provisioning.enabled {
        let api = run_provisioning_api(config.provisioning.clone(), provisioner);
        tokio::try_join!(bridge, api)?;
    } else {
        bridge.await?;
    }
    info!("alias bot stopped");
    Ok(())
}
