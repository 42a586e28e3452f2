use crate::error::ChatSweepError;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "CHATSWEEP_CONFIG";
const CLEANUP_TIME_FORMAT: &str = "%H:%M";

fn default_telegram_bot_token() -> String {
    String::new()
}
fn default_data_dir() -> String {
    "./chatsweep.data".into()
}
fn default_cleanup_delay_secs() -> u64 {
    2
}
fn default_cleanup_requires_admin() -> bool {
    true
}
fn default_join_link_ttl_secs() -> u64 {
    60
}
fn default_webhook_listen() -> String {
    "0.0.0.0".into()
}
fn default_webhook_port() -> u16 {
    8443
}

/// Webhook delivery. Updates are served on `<base_url><bot token>`, so the
/// public path is only known to Telegram.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_listen")]
    pub listen: String,
    #[serde(default = "default_webhook_port")]
    pub port: u16,
    pub base_url: String,
}

impl WebhookConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ChatSweepError> {
        let ip: IpAddr = self.listen.trim().parse().map_err(|e| {
            ChatSweepError::Config(format!("Invalid webhook.listen '{}': {e}", self.listen))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn url(&self, bot_token: &str) -> String {
        let base = self.base_url.trim();
        if base.ends_with('/') {
            format!("{base}{bot_token}")
        } else {
            format!("{base}/{bot_token}")
        }
    }

    fn validate(&self) -> Result<(), ChatSweepError> {
        self.socket_addr()?;
        if self.port == 0 {
            return Err(ChatSweepError::Config("webhook.port must be non-zero".into()));
        }
        let base = self.base_url.trim();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ChatSweepError::Config(format!(
                "Invalid webhook.base_url '{}', expected an http(s) URL",
                self.base_url
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_telegram_bot_token")]
    pub telegram_bot_token: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Daily global cleanup, "HH:MM" in UTC. Unset disables the daily sweep.
    #[serde(default)]
    pub cleanup_time: Option<String>,
    /// Pause between a /cleanup request and the cleanup itself, so the
    /// command message is fully processed before it gets deleted.
    #[serde(default = "default_cleanup_delay_secs")]
    pub cleanup_delay_secs: u64,
    #[serde(default = "default_cleanup_requires_admin")]
    pub cleanup_requires_admin: bool,
    #[serde(default = "default_join_link_ttl_secs")]
    pub join_link_ttl_secs: u64,
    /// Receive updates through a webhook. Long polling when unset.
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

impl Config {
    pub fn data_root_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Runtime data directory (database, logs).
    pub fn runtime_data_dir(&self) -> String {
        self.data_root_dir()
            .join("runtime")
            .to_string_lossy()
            .to_string()
    }

    pub fn daily_cleanup_time(&self) -> Option<NaiveTime> {
        self.cleanup_time
            .as_deref()
            .and_then(|raw| NaiveTime::parse_from_str(raw.trim(), CLEANUP_TIME_FORMAT).ok())
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }

    pub fn join_link_ttl(&self) -> Duration {
        Duration::from_secs(self.join_link_ttl_secs)
    }

    pub fn resolve_config_path() -> Result<Option<PathBuf>, ChatSweepError> {
        if let Ok(custom) = std::env::var(CONFIG_ENV_VAR) {
            if std::path::Path::new(&custom).exists() {
                return Ok(Some(PathBuf::from(custom)));
            }
            return Err(ChatSweepError::Config(format!(
                "{CONFIG_ENV_VAR} points to non-existent file: {custom}"
            )));
        }

        for candidate in ["./chatsweep.config.yaml", "./chatsweep.config.yml"] {
            if std::path::Path::new(candidate).exists() {
                return Ok(Some(PathBuf::from(candidate)));
            }
        }
        Ok(None)
    }

    /// Load config from YAML file.
    pub fn load() -> Result<Self, ChatSweepError> {
        let Some(path) = Self::resolve_config_path()? else {
            return Err(ChatSweepError::Config(format!(
                "No chatsweep.config.yaml found. Create one or set {CONFIG_ENV_VAR}."
            )));
        };
        let path_str = path.to_string_lossy().to_string();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ChatSweepError::Config(format!("Failed to read {path_str}: {e}")))?;
        Self::from_yaml(&content)
            .map_err(|e| ChatSweepError::Config(format!("{path_str}: {e}")))
    }

    pub fn from_yaml(content: &str) -> Result<Self, ChatSweepError> {
        let mut config: Config = serde_yaml::from_str(content)
            .map_err(|e| ChatSweepError::Config(format!("Failed to parse config: {e}")))?;
        config.post_deserialize()?;
        Ok(config)
    }

    /// Apply post-deserialization normalization and validation.
    pub(crate) fn post_deserialize(&mut self) -> Result<(), ChatSweepError> {
        self.telegram_bot_token = self.telegram_bot_token.trim().to_string();
        if self.telegram_bot_token.is_empty() {
            return Err(ChatSweepError::Config(
                "telegram_bot_token is required".into(),
            ));
        }
        if self.data_dir.trim().is_empty() {
            self.data_dir = default_data_dir();
        }
        if let Some(raw) = &self.cleanup_time {
            if raw.trim().is_empty() {
                self.cleanup_time = None;
            } else if NaiveTime::parse_from_str(raw.trim(), CLEANUP_TIME_FORMAT).is_err() {
                return Err(ChatSweepError::Config(format!(
                    "Invalid cleanup_time '{raw}', expected HH:MM (UTC)"
                )));
            }
        }
        if self.cleanup_delay_secs == 0 {
            self.cleanup_delay_secs = default_cleanup_delay_secs();
        }
        if self.join_link_ttl_secs == 0 {
            self.join_link_ttl_secs = default_join_link_ttl_secs();
        }
        if let Some(webhook) = &self.webhook {
            webhook.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env_lock;

    pub fn test_config() -> Config {
        Config {
            telegram_bot_token: "123:ABC".into(),
            data_dir: "./chatsweep.data".into(),
            cleanup_time: None,
            cleanup_delay_secs: 2,
            cleanup_requires_admin: true,
            join_link_ttl_secs: 60,
            webhook: None,
        }
    }

    #[test]
    fn test_config_yaml_defaults() {
        let config = Config::from_yaml("telegram_bot_token: tok\n").unwrap();
        assert_eq!(config.data_dir, "./chatsweep.data");
        assert!(config.cleanup_time.is_none());
        assert!(config.daily_cleanup_time().is_none());
        assert_eq!(config.cleanup_delay(), Duration::from_secs(2));
        assert!(config.cleanup_requires_admin);
        assert_eq!(config.join_link_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_missing_token_rejected() {
        let err = Config::from_yaml("data_dir: ./x\n").unwrap_err();
        assert!(err.to_string().contains("telegram_bot_token is required"));

        let err = Config::from_yaml("telegram_bot_token: '   '\n").unwrap_err();
        assert!(err.to_string().contains("telegram_bot_token is required"));
    }

    #[test]
    fn test_cleanup_time_parsed_as_utc_wall_clock() {
        let config =
            Config::from_yaml("telegram_bot_token: tok\ncleanup_time: '03:30'\n").unwrap();
        assert_eq!(
            config.daily_cleanup_time(),
            NaiveTime::from_hms_opt(3, 30, 0)
        );
    }

    #[test]
    fn test_blank_cleanup_time_disables_daily_sweep() {
        let config = Config::from_yaml("telegram_bot_token: tok\ncleanup_time: ' '\n").unwrap();
        assert!(config.cleanup_time.is_none());
    }

    #[test]
    fn test_invalid_cleanup_time_rejected() {
        let err =
            Config::from_yaml("telegram_bot_token: tok\ncleanup_time: '25:99'\n").unwrap_err();
        assert!(err.to_string().contains("Invalid cleanup_time"));
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let yaml = "telegram_bot_token: tok\ncleanup_delay_secs: 0\njoin_link_ttl_secs: 0\ndata_dir: ''\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.cleanup_delay_secs, 2);
        assert_eq!(config.join_link_ttl_secs, 60);
        assert_eq!(config.data_dir, "./chatsweep.data");
    }

    #[test]
    fn test_no_webhook_block_means_polling() {
        let config = Config::from_yaml("telegram_bot_token: tok\n").unwrap();
        assert!(config.webhook.is_none());
    }

    #[test]
    fn test_webhook_block_parsed() {
        let yaml = "telegram_bot_token: '123:ABC'\nwebhook:\n  listen: 127.0.0.1\n  port: 8080\n  base_url: https://bot.example.org/hook/\n";
        let config = Config::from_yaml(yaml).unwrap();
        let webhook = config.webhook.as_ref().unwrap();
        assert_eq!(
            webhook.socket_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            webhook.url(&config.telegram_bot_token),
            "https://bot.example.org/hook/123:ABC"
        );
    }

    #[test]
    fn test_webhook_defaults_and_missing_slash() {
        let yaml = "telegram_bot_token: tok\nwebhook:\n  base_url: https://bot.example.org\n";
        let config = Config::from_yaml(yaml).unwrap();
        let webhook = config.webhook.unwrap();
        assert_eq!(webhook.listen, "0.0.0.0");
        assert_eq!(webhook.port, 8443);
        assert_eq!(webhook.url("tok"), "https://bot.example.org/tok");
    }

    #[test]
    fn test_invalid_webhook_rejected() {
        let bad_url = "telegram_bot_token: tok\nwebhook:\n  base_url: bot.example.org\n";
        let err = Config::from_yaml(bad_url).unwrap_err();
        assert!(err.to_string().contains("webhook.base_url"));

        let bad_listen =
            "telegram_bot_token: tok\nwebhook:\n  listen: somewhere\n  base_url: https://x.org/\n";
        let err = Config::from_yaml(bad_listen).unwrap_err();
        assert!(err.to_string().contains("webhook.listen"));

        let zero_port =
            "telegram_bot_token: tok\nwebhook:\n  port: 0\n  base_url: https://x.org/\n";
        let err = Config::from_yaml(zero_port).unwrap_err();
        assert!(err.to_string().contains("webhook.port"));
    }

    #[test]
    fn test_runtime_dir_is_under_data_root() {
        let mut config = test_config();
        config.data_dir = "./chatsweep.data".into();
        let runtime = PathBuf::from(config.runtime_data_dir());
        assert!(runtime.ends_with(std::path::Path::new("chatsweep.data").join("runtime")));
    }

    #[test]
    fn test_config_env_var_pointing_nowhere_is_an_error() {
        let _guard = env_lock();
        let prev = std::env::var(CONFIG_ENV_VAR).ok();
        std::env::set_var(CONFIG_ENV_VAR, "/definitely/not/here/chatsweep.yaml");

        let result = Config::resolve_config_path();

        match prev {
            Some(v) => std::env::set_var(CONFIG_ENV_VAR, v),
            None => std::env::remove_var(CONFIG_ENV_VAR),
        }
        let err = result.unwrap_err();
        assert!(err.to_string().contains("non-existent file"));
    }

    #[test]
    fn test_load_from_env_path() {
        let _guard = env_lock();
        let prev = std::env::var(CONFIG_ENV_VAR).ok();
        let path = std::env::temp_dir().join(format!(
            "chatsweep_config_{}.yaml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "telegram_bot_token: tok\ncleanup_time: '00:05'\n").unwrap();
        std::env::set_var(CONFIG_ENV_VAR, &path);

        let result = Config::load();

        match prev {
            Some(v) => std::env::set_var(CONFIG_ENV_VAR, v),
            None => std::env::remove_var(CONFIG_ENV_VAR),
        }
        let _ = std::fs::remove_file(&path);
        let config = result.unwrap();
        assert_eq!(config.daily_cleanup_time(), NaiveTime::from_hms_opt(0, 5, 0));
    }
}
