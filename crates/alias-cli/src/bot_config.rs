//! TOML configuration for the alias bot.
//!
//! ```toml
//! homeserver_url = "https://matrix.example.org"
//! access_token = "syt_..."
//! alias_domain = "example.org"
//! allowed_aliases = ["#team-*"]
//! admin_users = ["@admin:example.org"]
//!
//! [provisioning]
//! enabled = true
//! shared_secret = "long-random-string"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use alias_gateway::{ProvisioningApiConfig, DEFAULT_SHARED_SECRET};
use alias_matrix::{MatrixBridgeRuntimeConfig, MatrixClientSettings};
use alias_provisioner::ProvisionerConfig;
use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct BotConfig {
    pub(crate) homeserver_url: String,
    pub(crate) access_token: String,
    pub(crate) alias_domain: String,
    #[serde(default)]
    pub(crate) allowed_aliases: Vec<String>,
    #[serde(default)]
    pub(crate) admin_users: Vec<String>,
    #[serde(default)]
    pub(crate) help_room: Option<String>,
    #[serde(default = "default_data_path")]
    pub(crate) data_path: PathBuf,
    #[serde(default)]
    pub(crate) provisioning: ProvisioningApiConfig,
    #[serde(default)]
    pub(crate) logging: LoggingConfig,
    #[serde(default)]
    pub(crate) transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub(crate) struct LoggingConfig {
    pub(crate) level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
/// Matrix HTTP and sync-loop tuning.
pub(crate) struct TransportConfig {
    pub(crate) request_timeout_ms: u64,
    pub(crate) sync_timeout_ms: u64,
    pub(crate) retry_max_attempts: usize,
    pub(crate) retry_base_delay_ms: u64,
    pub(crate) reconnect_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            sync_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            reconnect_delay_ms: 5_000,
        }
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("storage")
}

/// Reads, parses, and validates the config file at `path`.
pub(crate) fn load_bot_config(path: &Path) -> Result<BotConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = parse_bot_config(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    Ok(config)
}

pub(crate) fn parse_bot_config(raw: &str) -> Result<BotConfig> {
    let config = toml::from_str::<BotConfig>(raw).context("failed to parse config")?;
    config.validate()?;
    Ok(config)
}

impl BotConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("homeserver_url", &self.homeserver_url),
            ("access_token", &self.access_token),
            ("alias_domain", &self.alias_domain),
        ] {
            if value.trim().is_empty() {
                bail!("{field} cannot be empty");
            }
        }
        let homeserver_url = self.homeserver_url.trim();
        if !homeserver_url.starts_with("https://") && !homeserver_url.starts_with("http://") {
            bail!("homeserver_url must start with http:// or https://");
        }
        if self.transport.retry_max_attempts == 0 {
            bail!("transport.retry_max_attempts must be at least 1");
        }

        if self.provisioning.enabled {
            if self.provisioning.shared_secret.trim() == DEFAULT_SHARED_SECRET {
                bail!(
                    "provisioning is enabled but the shared secret has not been changed; \
                     set provisioning.shared_secret"
                );
            }
            if self.provisioning.shared_secret.trim().is_empty() {
                bail!("provisioning.shared_secret cannot be empty");
            }
            self.provisioning.socket_addr()?;
        }
        Ok(())
    }

    pub(crate) fn provisioner_config(&self) -> ProvisionerConfig {
        ProvisionerConfig {
            alias_domain: self.alias_domain.trim().to_string(),
            allowed_aliases: self.allowed_aliases.clone(),
            admin_users: self.admin_users.clone(),
        }
    }

    pub(crate) fn client_settings(&self) -> MatrixClientSettings {
        MatrixClientSettings {
            homeserver_url: self.homeserver_url.trim().to_string(),
            access_token: self.access_token.clone(),
            request_timeout_ms: self.transport.request_timeout_ms,
            retry_max_attempts: self.transport.retry_max_attempts,
            retry_base_delay_ms: self.transport.retry_base_delay_ms,
        }
    }

    pub(crate) fn runtime_config(&self) -> MatrixBridgeRuntimeConfig {
        MatrixBridgeRuntimeConfig {
            data_path: self.data_path.clone(),
            sync_timeout_ms: self.transport.sync_timeout_ms,
            reconnect_delay: Duration::from_millis(self.transport.reconnect_delay_ms),
        }
    }

    /// One-screen summary for `--check-config`; secrets are never printed.
    pub(crate) fn render_summary(&self) -> String {
        let provisioning = if self.provisioning.enabled {
            format!(
                "enabled ({}:{})",
                self.provisioning.bind.trim(),
                self.provisioning.port
            )
        } else {
            "disabled".to_string()
        };
        [
            "config ok".to_string(),
            format!("homeserver_url={}", self.homeserver_url.trim()),
            format!("alias_domain={}", self.alias_domain.trim()),
            format!("allowed_aliases={}", self.allowed_aliases.len()),
            format!("admin_users={}", self.admin_users.len()),
            format!("help_room={}", self.help_room.as_deref().unwrap_or("<none>")),
            format!("data_path={}", self.data_path.display()),
            format!("provisioning={provisioning}"),
            format!("log_level={}", self.logging.level),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
homeserver_url = "https://matrix.example.org"
access_token = "syt_secret_token"
alias_domain = "example.org"
"#;

    #[test]
    fn unit_minimal_config_applies_defaults() {
        let config = parse_bot_config(MINIMAL).expect("parse");
        assert!(config.allowed_aliases.is_empty());
        assert!(config.admin_users.is_empty());
        assert_eq!(config.help_room, None);
        assert_eq!(config.data_path, PathBuf::from("storage"));
        assert_eq!(config.provisioning, ProvisioningApiConfig::default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.transport, TransportConfig::default());
    }

    #[test]
    fn functional_full_config_maps_into_component_configs() {
        let raw = r##"
homeserver_url = "http://localhost:8008 "
access_token = "syt_secret_token"
alias_domain = "example.org"
allowed_aliases = ["#team-*", "#ops-?"]
admin_users = ["@admin:example.org"]
help_room = "#alias-help:example.org"
data_path = "/var/lib/alias-bot"

[provisioning]
enabled = true
bind = "0.0.0.0"
port = 9100
shared_secret = "not-the-default"

[logging]
level = "debug"

[transport]
request_timeout_ms = 1000
sync_timeout_ms = 2000
retry_max_attempts = 5
retry_base_delay_ms = 10
reconnect_delay_ms = 250
"##;
        let config = parse_bot_config(raw).expect("parse");

        let provisioner = config.provisioner_config();
        assert_eq!(provisioner.alias_domain, "example.org");
        assert_eq!(provisioner.allowed_aliases, vec!["#team-*", "#ops-?"]);
        assert_eq!(provisioner.admin_users, vec!["@admin:example.org"]);

        let settings = config.client_settings();
        assert_eq!(settings.homeserver_url, "http://localhost:8008");
        assert_eq!(settings.request_timeout_ms, 1000);
        assert_eq!(settings.retry_max_attempts, 5);
        assert_eq!(settings.retry_base_delay_ms, 10);

        let runtime = config.runtime_config();
        assert_eq!(runtime.data_path, PathBuf::from("/var/lib/alias-bot"));
        assert_eq!(runtime.sync_timeout_ms, 2000);
        assert_eq!(runtime.reconnect_delay, Duration::from_millis(250));

        assert_eq!(
            config.provisioning.socket_addr().expect("addr").to_string(),
            "0.0.0.0:9100"
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn regression_enabled_provisioning_with_placeholder_secret_is_fatal() {
        let raw = format!("{MINIMAL}\n[provisioning]\nenabled = true\n");
        let error = parse_bot_config(&raw).expect_err("placeholder secret");
        assert!(error
            .to_string()
            .contains("shared secret has not been changed"));

        let raw = format!("{MINIMAL}\n[provisioning]\nenabled = false\n");
        assert!(parse_bot_config(&raw).is_ok());
    }

    #[test]
    fn regression_blank_required_fields_are_rejected() {
        let raw = MINIMAL.replace("syt_secret_token", "  ");
        let error = parse_bot_config(&raw).expect_err("blank token");
        assert_eq!(error.to_string(), "access_token cannot be empty");

        let raw = MINIMAL.replace("https://matrix.example.org", "matrix.example.org");
        assert!(parse_bot_config(&raw).is_err());

        let missing_domain = "homeserver_url = \"https://h\"\naccess_token = \"t\"\n";
        assert!(parse_bot_config(missing_domain).is_err());
    }

    #[test]
    fn functional_load_reads_file_and_reports_path_on_error() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("alias-bot.toml");
        std::fs::write(&path, MINIMAL).expect("write config");
        assert!(load_bot_config(&path).is_ok());

        let missing = temp.path().join("missing.toml");
        let error = load_bot_config(&missing).expect_err("missing file");
        assert!(error.to_string().contains("missing.toml"));
    }

    #[test]
    fn unit_summary_never_prints_secrets() {
        let raw = format!(
            "{MINIMAL}\n[provisioning]\nenabled = true\nshared_secret = \"hunter2-provisioning\"\n"
        );
        let summary = parse_bot_config(&raw).expect("parse").render_summary();
        assert!(summary.contains("provisioning=enabled (127.0.0.1:9000)"));
        assert!(summary.contains("alias_domain=example.org"));
        assert!(!summary.contains("syt_secret_token"));
        assert!(!summary.contains("hunter2-provisioning"));
    }
}
