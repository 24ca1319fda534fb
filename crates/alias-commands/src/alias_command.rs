//! `!alias` command parsing.

pub const ALIAS_COMMAND_PREFIX: &str = "!alias";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasCommand {
    Help,
    Allowed,
    Add { alias: String },
    Remove { alias: String },
    Publish,
    Unpublish,
    /// `add`/`remove` given without an alias argument.
    MissingAlias,
}

impl AliasCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Allowed => "allowed",
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
            Self::MissingAlias => "missing-alias",
        }
    }
}

/// Parses a message body; `None` when the body does not start with `!alias`.
///
/// Whatever follows the prefix is the command, so `!alias#team` is an
/// implicit `add`. Unknown verbs fall back to help.
pub fn parse_alias_command(body: &str) -> Option<AliasCommand> {
    let rest = body.trim_start().strip_prefix(ALIAS_COMMAND_PREFIX)?;
    let mut pieces = rest.split_whitespace();

    let verb = pieces.next().unwrap_or("help");
    let argument = pieces.next().map(str::to_string);
    let command = match verb {
        "allowed" => AliasCommand::Allowed,
        "add" => argument.map_or(AliasCommand::MissingAlias, |alias| AliasCommand::Add {
            alias,
        }),
        "remove" => argument.map_or(AliasCommand::MissingAlias, |alias| {
            AliasCommand::Remove { alias }
        }),
        "publish" => AliasCommand::Publish,
        "unpublish" => AliasCommand::Unpublish,
        bare if bare.starts_with('#') => AliasCommand::Add {
            alias: bare.to_string(),
        },
        _ => AliasCommand::Help,
    };
    Some(command)
}
