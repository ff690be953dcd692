//! Bot configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`TELEGRAM__TOKEN`, `CRM__BASE_URL`, ...).

use deal_courier_core::CrmUserId;
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct BotConfig {
    pub telegram: TelegramConfig,
    pub crm: CrmConfig,

    /// File remembering which CRM user each Telegram user proved to be.
    #[serde(default = "default_links_file")]
    pub links_file: PathBuf,

    #[serde(default)]
    pub dialog: DialogConfig,
}

/// Telegram Bot API access.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub token: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Long-poll timeout for `getUpdates`, in seconds.
    #[serde(default = "default_poll_timeout_seconds")]
    pub poll_timeout_seconds: u64,
}

/// CRM inbound webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct CrmConfig {
    /// Portal URL, e.g. `https://example.bitrix24.ru`.
    pub base_url: String,
    /// The user the webhook was issued to.
    pub user_id: CrmUserId,
    pub webhook_token: String,
}

/// Conversation rendering.
#[derive(Debug, Clone, Deserialize)]
pub struct DialogConfig {
    /// Pattern removed from task titles on buttons; empty disables it.
    #[serde(default = "default_task_label_strip")]
    pub task_label_strip: String,
}

fn default_links_file() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_seconds() -> u64 {
    10
}

fn default_task_label_strip() -> String {
    r"\s*по сделке.*$".to_string()
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            task_label_strip: default_task_label_strip(),
        }
    }
}

impl BotConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<BotConfig, config::ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_environment(config::Environment::default().source(Some(vars)))
    }

    #[test]
    fn required_values_with_defaults() {
        let config = load(&[
            ("TELEGRAM__TOKEN", "123:abc"),
            ("CRM__BASE_URL", "https://crm.example.com"),
            ("CRM__USER_ID", "12"),
            ("CRM__WEBHOOK_TOKEN", "hook"),
        ])
        .expect("config should load");

        assert_eq!(config.telegram.token, "123:abc");
        assert_eq!(config.telegram.api_url, "https://api.telegram.org");
        assert_eq!(config.telegram.poll_timeout_seconds, 10);
        assert_eq!(config.crm.user_id, CrmUserId::new(12));
        assert_eq!(config.links_file, PathBuf::from("users.json"));
        assert_eq!(config.dialog.task_label_strip, default_task_label_strip());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("TELEGRAM__TOKEN", "t"),
            ("TELEGRAM__POLL_TIMEOUT_SECONDS", "30"),
            ("CRM__BASE_URL", "https://crm.example.com"),
            ("CRM__USER_ID", "1"),
            ("CRM__WEBHOOK_TOKEN", "hook"),
            ("LINKS_FILE", "/var/lib/deal-courier/links.json"),
            ("DIALOG__TASK_LABEL_STRIP", ""),
        ])
        .expect("config should load");

        assert_eq!(config.telegram.poll_timeout_seconds, 30);
        assert_eq!(
            config.links_file,
            PathBuf::from("/var/lib/deal-courier/links.json")
        );
        assert_eq!(config.dialog.task_label_strip, "");
    }

    #[test]
    fn missing_token_is_an_error() {
        let result = load(&[
            ("CRM__BASE_URL", "https://crm.example.com"),
            ("CRM__USER_ID", "1"),
            ("CRM__WEBHOOK_TOKEN", "hook"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn dialog_config_defaults() {
        let config = DialogConfig::default();
        assert!(config.task_label_strip.contains("по сделке"));
    }
}
