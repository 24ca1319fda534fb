use std::collections::BTreeMap;

use alias_commands::InboundRoomMessage;
use serde::Deserialize;
use serde_json::Value;

const ROOM_MESSAGE_EVENT_TYPE: &str = "m.room.message";
const ROOM_TOMBSTONE_EVENT_TYPE: &str = "m.room.tombstone";
const ROOM_CREATE_EVENT_TYPE: &str = "m.room.create";
const TEXT_MSGTYPE: &str = "m.text";

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct MatrixSyncResponse {
    pub next_batch: String,
    #[serde(default)]
    rooms: MatrixSyncRooms,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MatrixSyncRooms {
    #[serde(default)]
    join: BTreeMap<String, MatrixJoinedRoom>,
    #[serde(default)]
    invite: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MatrixJoinedRoom {
    #[serde(default)]
    state: MatrixEventBatch,
    #[serde(default)]
    timeline: MatrixEventBatch,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MatrixEventBatch {
    #[serde(default)]
    events: Vec<MatrixRoomEvent>,
}

#[derive(Debug, Clone, Deserialize)]
struct MatrixRoomEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    event_id: String,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    state_key: Option<String>,
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Room event the bridge acts on.
pub(crate) enum MatrixBridgeEvent {
    Invite {
        room_id: String,
    },
    Message {
        room_id: String,
        message: InboundRoomMessage,
    },
    Tombstone {
        room_id: String,
        replacement_room: String,
    },
    RoomUpgraded {
        old_room_id: String,
        new_room_id: String,
    },
}

impl MatrixBridgeEvent {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Invite { .. } => "invite",
            Self::Message { .. } => "message",
            Self::Tombstone { .. } => "tombstone",
            Self::RoomUpgraded { .. } => "room_upgraded",
        }
    }
}

/// Flattens a sync response into bridge events: invites first, then each
/// joined room's state and timeline in delivery order.
pub(crate) fn collect_bridge_events(
    response: &MatrixSyncResponse,
    bot_user_id: &str,
) -> Vec<MatrixBridgeEvent> {
    let mut events = response
        .rooms
        .invite
        .keys()
        .map(|room_id| MatrixBridgeEvent::Invite {
            room_id: room_id.clone(),
        })
        .collect::<Vec<_>>();

    for (room_id, room) in &response.rooms.join {
        for event in room.state.events.iter().chain(room.timeline.events.iter()) {
            if let Some(bridge_event) = normalize_room_event(room_id, event, bot_user_id) {
                events.push(bridge_event);
            }
        }
    }
    events
}

fn normalize_room_event(
    room_id: &str,
    event: &MatrixRoomEvent,
    bot_user_id: &str,
) -> Option<MatrixBridgeEvent> {
    match event.event_type.as_str() {
        ROOM_MESSAGE_EVENT_TYPE => {
            if event.sender == bot_user_id || event.event_id.is_empty() {
                return None;
            }
            if event.content.get("msgtype").and_then(Value::as_str) != Some(TEXT_MSGTYPE) {
                return None;
            }
            let body = event.content.get("body").and_then(Value::as_str)?;
            Some(MatrixBridgeEvent::Message {
                room_id: room_id.to_string(),
                message: InboundRoomMessage {
                    event_id: event.event_id.clone(),
                    sender: event.sender.clone(),
                    body: body.to_string(),
                },
            })
        }
        ROOM_TOMBSTONE_EVENT_TYPE if event.state_key.as_deref() == Some("") => {
            let replacement_room = event
                .content
                .get("replacement_room")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|room| !room.is_empty())?;
            Some(MatrixBridgeEvent::Tombstone {
                room_id: room_id.to_string(),
                replacement_room: replacement_room.to_string(),
            })
        }
        ROOM_CREATE_EVENT_TYPE if event.state_key.as_deref() == Some("") => {
            let old_room_id = event
                .content
                .get("predecessor")
                .and_then(|predecessor| predecessor.get("room_id"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|room| !room.is_empty())?;
            Some(MatrixBridgeEvent::RoomUpgraded {
                old_room_id: old_room_id.to_string(),
                new_room_id: room_id.to_string(),
            })
        }
        _ => None,
    }
}
