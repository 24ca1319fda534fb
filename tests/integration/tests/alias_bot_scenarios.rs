use std::sync::Arc;
use std::time::Duration;

use alias_commands::{AliasCommand, CommandProcessor, InboundRoomMessage};
use alias_gateway::{build_provisioning_api_router, ProvisioningApiState};
use alias_provisioner::{
    migrate_upgraded_room, DirectoryVisibility, InMemoryRoomStore, Provisioner,
    ProvisionerConfig, ProvisionerErrorKind, ReplyStatus, RoomStore, RoomStoreOperation,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const BOT: &str = "@aliasbot:example.org";
const ROOM: &str = "!room:example.org";
const ADMIN: &str = "@admin:example.org";
const MODERATOR: &str = "@mod:example.org";
const MEMBER: &str = "@member:example.org";
const STRANGER: &str = "@stranger:example.org";

struct BotHarness {
    store: Arc<InMemoryRoomStore>,
    provisioner: Provisioner,
    commands: CommandProcessor,
    next_event: usize,
}

impl BotHarness {
    fn new(admin_users: &[&str]) -> Self {
        let store = Arc::new(InMemoryRoomStore::new(BOT));
        store.join(ROOM, BOT);
        store.join(ROOM, MODERATOR);
        store.join(ROOM, MEMBER);
        store.set_power_levels(
            ROOM,
            json!({ "users": { BOT: 100, MODERATOR: 50, MEMBER: 0 }, "state_default": 50 }),
        );
        let config = ProvisionerConfig {
            alias_domain: "example.org".to_string(),
            allowed_aliases: vec!["#team-*".to_string()],
            admin_users: admin_users.iter().map(|user| user.to_string()).collect(),
        };
        let provisioner =
            Provisioner::new(Arc::new(config), Arc::clone(&store) as Arc<dyn RoomStore>);
        let commands = CommandProcessor::new(provisioner.clone(), Some("#alias-help:example.org".to_string()));
        Self {
            store,
            provisioner,
            commands,
            next_event: 0,
        }
    }

    async fn say(&mut self, sender: &str, body: &str) -> Option<(AliasCommand, ReplyStatus, String)> {
        self.next_event += 1;
        let message = InboundRoomMessage {
            event_id: format!("$event-{}", self.next_event),
            sender: sender.to_string(),
            body: body.to_string(),
        };
        self.commands
            .try_command(ROOM, &message)
            .await
            .expect("reply sent")
            .map(|reply| (reply.command, reply.status, reply.html))
    }
}

#[tokio::test]
async fn integration_non_member_add_is_denied_without_store_mutation() {
    let mut bot = BotHarness::new(&[]);

    let (command, status, html) = bot
        .say(STRANGER, "!alias #team-eng")
        .await
        .expect("command reply");

    assert_eq!(
        command,
        AliasCommand::Add {
            alias: "#team-eng".to_string()
        }
    );
    assert_eq!(status, ReplyStatus::Error);
    assert_eq!(html, "You do not have permission to add aliases in this room.");
    assert_eq!(bot.store.mutation_count(), 0);
}

#[tokio::test]
async fn integration_moderator_add_outside_allow_list_is_not_allowed() {
    let mut bot = BotHarness::new(&[]);

    let (_, status, html) = bot
        .say(MODERATOR, "!alias #random")
        .await
        .expect("command reply");

    assert_eq!(status, ReplyStatus::Error);
    assert_eq!(html, "That alias is not allowed.");
    assert_eq!(bot.store.mutation_count(), 0);
}

#[tokio::test]
async fn integration_admin_remove_without_alias_prompts_usage_only() {
    let mut bot = BotHarness::new(&[ADMIN]);

    let (command, status, html) = bot
        .say(ADMIN, "!alias remove")
        .await
        .expect("command reply");

    assert_eq!(command, AliasCommand::MissingAlias);
    assert_eq!(status, ReplyStatus::Warning);
    assert!(html.contains("Please provide a room alias"));
    assert_eq!(bot.store.call_count(), 0);
    assert_eq!(bot.store.sent_messages(ROOM).len(), 1);
}

#[tokio::test]
async fn integration_room_conversation_manages_aliases_and_directory() {
    let mut bot = BotHarness::new(&[ADMIN]);

    assert!(bot.say(MEMBER, "good morning").await.is_none());

    let (_, status, html) = bot.say(MEMBER, "!alias allowed").await.expect("reply");
    assert_eq!(status, ReplyStatus::Info);
    assert!(html.contains("<code>#team-*</code>"));
    assert!(!html.contains("<code>#*</code>"));

    let (_, status, _) = bot.say(MODERATOR, "!alias add #team-eng").await.expect("reply");
    assert_eq!(status, ReplyStatus::Success);
    let (_, status, _) = bot.say(ADMIN, "!alias #anything-goes").await.expect("reply");
    assert_eq!(status, ReplyStatus::Success);
    assert_eq!(
        bot.provisioner
            .get_aliases_in_room(ROOM, MEMBER)
            .await
            .expect("aliases"),
        vec![
            "#team-eng:example.org".to_string(),
            "#anything-goes:example.org".to_string()
        ]
    );

    let (_, status, html) = bot.say(MODERATOR, "!alias publish").await.expect("reply");
    assert_eq!(status, ReplyStatus::Success);
    assert_eq!(html, "This room will now appear in the public room directory.");
    assert_eq!(bot.store.visibility(ROOM), DirectoryVisibility::Public);

    let (_, status, _) = bot
        .say(MODERATOR, "!alias remove #team-eng")
        .await
        .expect("reply");
    assert_eq!(status, ReplyStatus::Success);
    assert_eq!(bot.store.alias_binding("#team-eng:example.org"), None);

    let (_, status, html) = bot
        .say(MODERATOR, "!alias remove #team-eng")
        .await
        .expect("reply");
    assert_eq!(status, ReplyStatus::Error);
    assert_eq!(html, "That alias does not exist or does not belong to this room.");

    let (_, status, html) = bot.say(MEMBER, "!alias").await.expect("reply");
    assert_eq!(status, ReplyStatus::Info);
    assert!(html.contains("#alias-help:example.org"));

    let replies = bot.store.sent_messages(ROOM);
    assert_eq!(replies.len(), 7);
    assert!(replies
        .iter()
        .all(|reply| reply.in_reply_to.as_deref().is_some_and(|id| id.starts_with("$event-"))));
}

#[tokio::test]
async fn integration_power_level_change_flips_permission_outcome() {
    let mut bot = BotHarness::new(&[]);

    let (_, status, _) = bot.say(MEMBER, "!alias #team-ops").await.expect("reply");
    assert_eq!(status, ReplyStatus::Error);

    bot.store.set_power_levels(
        ROOM,
        json!({ "users": { BOT: 100, MODERATOR: 50, MEMBER: 50 }, "state_default": 50 }),
    );
    let (_, status, _) = bot.say(MEMBER, "!alias #team-ops").await.expect("reply");
    assert_eq!(status, ReplyStatus::Success);
    assert_eq!(
        bot.store.alias_binding("#team-ops:example.org").as_deref(),
        Some(ROOM)
    );
}

#[tokio::test]
async fn integration_room_upgrade_moves_aliases_and_relists_new_room() {
    let bot = BotHarness::new(&[]);
    let new_room = "!new:example.org";
    bot.store.join(new_room, BOT);
    bot.store
        .set_power_levels(new_room, json!({ "users": { BOT: 100 } }));
    bot.store.bind_alias("#team-a:example.org", ROOM);
    bot.store.bind_alias("#team-b:example.org", ROOM);
    bot.store.set_visibility(ROOM, DirectoryVisibility::Public);

    let report = migrate_upgraded_room(&bot.provisioner, ROOM, new_room)
        .await
        .expect("migration");

    assert_eq!(report.failed_steps, 0);
    assert!(report.relisted);
    assert_eq!(
        bot.store.operations(),
        vec![
            RoomStoreOperation::DeleteAlias {
                alias: "#team-a:example.org".to_string()
            },
            RoomStoreOperation::CreateAlias {
                alias: "#team-a:example.org".to_string(),
                room_id: new_room.to_string()
            },
            RoomStoreOperation::DeleteAlias {
                alias: "#team-b:example.org".to_string()
            },
            RoomStoreOperation::CreateAlias {
                alias: "#team-b:example.org".to_string(),
                room_id: new_room.to_string()
            },
            RoomStoreOperation::SetDirectoryVisibility {
                room_id: new_room.to_string(),
                visibility: DirectoryVisibility::Public
            },
        ]
    );
    let notices = bot.store.sent_messages(new_room);
    assert_eq!(notices.len(), 1);
    assert!(notices[0].body.contains("#team-a:example.org, #team-b:example.org"));
    assert!(notices[0].body.contains("room directory for example.org"));
}

#[tokio::test]
async fn integration_provisioning_api_and_commands_share_one_provisioner() {
    let mut bot = BotHarness::new(&[ADMIN]);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = build_provisioning_api_router(Arc::new(ProvisioningApiState::new(
        bot.provisioner.clone(),
        "integration-secret",
    )));
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = reqwest::Client::new()
        .put(format!(
            "http://{addr}/api/v1/rooms/{ROOM}/aliases/team-api?userId={MODERATOR}"
        ))
        .bearer_auth("integration-secret")
        .send()
        .await
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);
    let body = response.json::<Value>().await.expect("json");
    assert_eq!(body, json!({ "alias": "#team-api:example.org" }));

    let (_, status, html) = bot
        .say(MODERATOR, "!alias add #team-api")
        .await
        .expect("reply");
    assert_eq!(status, ReplyStatus::Error);
    assert_eq!(html, "That alias is already in use in another room.");

    let error = bot
        .provisioner
        .add_alias("!elsewhere:example.org", ADMIN, "#team-api")
        .await
        .expect_err("taken");
    assert_eq!(error.kind, ProvisionerErrorKind::Taken);
    server.abort();
}
