//! In-room `!alias` command parsing, dispatch, and reply rendering.

pub mod alias_command;
pub mod command_processor;
pub mod reply_render;

pub use alias_command::{parse_alias_command, AliasCommand, ALIAS_COMMAND_PREFIX};
pub use command_processor::{CommandProcessor, CommandReply, InboundRoomMessage};
pub use reply_render::{render_help_html, render_quoted_reply, strip_html_tags};
