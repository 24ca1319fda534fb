//! Matrix sync runtime that feeds room events to the alias command processor.

use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use alias_commands::CommandProcessor;
use alias_provisioner::{migrate_upgraded_room, Provisioner, RoomStore};
use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

mod matrix_api_client;
mod matrix_state_store;
mod matrix_sync_events;

pub use matrix_api_client::{MatrixApiClient, MatrixClientSettings};
use matrix_state_store::{MatrixSyncStateStore, MATRIX_SYNC_STATE_FILE};
use matrix_sync_events::{collect_bridge_events, MatrixBridgeEvent};

#[derive(Debug, Clone)]
/// Runtime configuration for the Matrix sync loop.
pub struct MatrixBridgeRuntimeConfig {
    pub data_path: PathBuf,
    pub sync_timeout_ms: u64,
    pub reconnect_delay: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Counters for one sync round-trip.
pub struct SyncCycleReport {
    pub initial_sync: bool,
    pub discovered_events: usize,
    pub joined_rooms: usize,
    pub handled_commands: usize,
    pub migrated_rooms: usize,
    pub skipped_events: usize,
    pub failed_events: usize,
}

/// Runs the Matrix sync loop until ctrl-c.
pub async fn run_matrix_bridge(
    config: MatrixBridgeRuntimeConfig,
    client: Arc<MatrixApiClient>,
    provisioner: Provisioner,
    commands: CommandProcessor,
) -> Result<()> {
    let mut runtime = MatrixBridgeRuntime::new(config, client, provisioner, commands)?;
    runtime.run().await
}

pub struct MatrixBridgeRuntime {
    config: MatrixBridgeRuntimeConfig,
    client: Arc<MatrixApiClient>,
    provisioner: Provisioner,
    commands: CommandProcessor,
    state_store: MatrixSyncStateStore,
    migrated_rooms: HashSet<String>,
}

impl MatrixBridgeRuntime {
    pub fn new(
        config: MatrixBridgeRuntimeConfig,
        client: Arc<MatrixApiClient>,
        provisioner: Provisioner,
        commands: CommandProcessor,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_path)
            .with_context(|| format!("failed to create {}", config.data_path.display()))?;
        let state_store =
            MatrixSyncStateStore::load(config.data_path.join(MATRIX_SYNC_STATE_FILE))?;
        Ok(Self {
            config,
            client,
            provisioner,
            commands,
            state_store,
            migrated_rooms: HashSet::new(),
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(
            bot_user_id = self.client.bot_user_id(),
            since = self.state_store.next_batch().unwrap_or("<none>"),
            "matrix bridge started"
        );
        let mut failure_streak = 0_usize;
        loop {
            let result = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("matrix bridge shutdown requested");
                    return Ok(());
                }
                result = self.poll_once() => result,
            };

            match result {
                Ok(report) => {
                    failure_streak = 0;
                    debug!(?report, "matrix sync cycle completed");
                    continue;
                }
                Err(error) => {
                    failure_streak = failure_streak.saturating_add(1);
                    warn!(failure_streak, error = %format!("{error:#}"), "matrix sync failed");
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("matrix bridge shutdown requested");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// Performs one sync and dispatches its events.
    ///
    /// Without a stored position only invites and tombstones are acted on, so
    /// a fresh start never replays old commands.
    pub async fn poll_once(&mut self) -> Result<SyncCycleReport> {
        let since = self.state_store.next_batch().map(str::to_string);
        let initial_sync = since.is_none();
        let timeout_ms = if initial_sync {
            0
        } else {
            self.config.sync_timeout_ms
        };
        let response = self
            .client
            .sync(since.as_deref(), timeout_ms)
            .await
            .context("matrix sync request failed")?;

        let events = collect_bridge_events(&response, self.client.bot_user_id());
        let mut report = SyncCycleReport {
            initial_sync,
            discovered_events: events.len(),
            ..SyncCycleReport::default()
        };

        for event in events {
            if initial_sync
                && matches!(
                    event,
                    MatrixBridgeEvent::Message { .. } | MatrixBridgeEvent::RoomUpgraded { .. }
                )
            {
                report.skipped_events += 1;
                continue;
            }
            let kind = event.kind();
            if let Err(error) = self.handle_event(event, &mut report).await {
                report.failed_events += 1;
                warn!(kind, error = %format!("{error:#}"), "failed to handle matrix event");
            }
        }

        if self.state_store.update_next_batch(&response.next_batch) {
            self.state_store.save()?;
        }
        Ok(report)
    }

    async fn handle_event(
        &mut self,
        event: MatrixBridgeEvent,
        report: &mut SyncCycleReport,
    ) -> Result<()> {
        match event {
            MatrixBridgeEvent::Invite { room_id } => {
                self.client
                    .join_room(&room_id)
                    .await
                    .with_context(|| format!("failed to join invited room {room_id}"))?;
                info!(room_id = room_id.as_str(), "joined invited room");
                report.joined_rooms += 1;
            }
            MatrixBridgeEvent::Tombstone {
                room_id,
                replacement_room,
            } => {
                self.client
                    .join_room(&replacement_room)
                    .await
                    .with_context(|| format!("failed to join replacement room {replacement_room}"))?;
                info!(
                    room_id = room_id.as_str(),
                    replacement_room = replacement_room.as_str(),
                    "joined replacement room"
                );
                report.joined_rooms += 1;
            }
            MatrixBridgeEvent::Message { room_id, message } => {
                let reply = self
                    .commands
                    .try_command(&room_id, &message)
                    .await
                    .with_context(|| format!("failed to reply to {} in {room_id}", message.event_id))?;
                if reply.is_some() {
                    report.handled_commands += 1;
                }
            }
            MatrixBridgeEvent::RoomUpgraded {
                old_room_id,
                new_room_id,
            } => {
                if !self.migrated_rooms.insert(new_room_id.clone()) {
                    report.skipped_events += 1;
                    return Ok(());
                }
                migrate_upgraded_room(&self.provisioner, &old_room_id, &new_room_id)
                    .await
                    .map_err(|error| {
                        anyhow!(error).context(format!(
                            "failed to migrate aliases from {old_room_id} to {new_room_id}"
                        ))
                    })?;
                report.migrated_rooms += 1;
            }
        }
        Ok(())
    }
}
