use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "alias-bot",
    about = "Matrix bot that manages room aliases and room directory listings",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "ALIAS_BOT_CONFIG",
        default_value = "config/alias-bot.toml",
        help = "Path to the TOML configuration file."
    )]
    pub(crate) config: PathBuf,

    #[arg(
        long = "check-config",
        default_value_t = false,
        help = "Load and validate the configuration, print a summary, and exit."
    )]
    pub(crate) check_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_cli_defaults_to_bundled_config_path() {
        let cli = Cli::try_parse_from(["alias-bot"]).expect("parse");
        if std::env::var_os("ALIAS_BOT_CONFIG").is_none() {
            assert_eq!(cli.config, PathBuf::from("config/alias-bot.toml"));
        }
        assert!(!cli.check_config);
    }

    #[test]
    fn functional_cli_accepts_config_path_and_check_flag() {
        let cli = Cli::try_parse_from(["alias-bot", "--config", "/etc/alias-bot.toml", "--check-config"])
            .expect("parse");
        assert_eq!(cli.config, PathBuf::from("/etc/alias-bot.toml"));
        assert!(cli.check_config);
    }

    #[test]
    fn regression_cli_rejects_unknown_flags() {
        assert!(Cli::try_parse_from(["alias-bot", "--provisioning"]).is_err());
    }
}
