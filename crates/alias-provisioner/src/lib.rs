//! Alias provisioning and authorization core for the alias bot.
//!
//! Hosts the room-store capability contract, the provisioner error taxonomy,
//! alias pattern matching, the `Provisioner` itself, and the room-upgrade
//! alias migration flow.

pub mod alias_pattern;
pub mod memory_room_store;
pub mod provisioner;
pub mod provisioner_error;
pub mod room_store;
pub mod room_upgrade;

pub use alias_pattern::*;
pub use memory_room_store::{InMemoryRoomStore, RoomStoreOperation};
pub use provisioner::*;
pub use provisioner_error::*;
pub use room_store::*;
pub use room_upgrade::*;
