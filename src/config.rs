//! TOML configuration.
//!
//! See `config/estate.example.toml` for a complete file. Every section except
//! `[db]` and `[auth]` may be omitted.

use anyhow::{Context, Result};
use estate_harness_core::Portal;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Remote feeds visited by the scheduled sweep.
    #[serde(default)]
    pub feeds: Vec<FeedSource>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allowed CORS origin; any origin when unset.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origin: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HMAC key for session tokens.
    pub secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
}

fn default_token_ttl_hours() -> u64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub scheduler_enabled: bool,
    /// Six-field cron expression (seconds first).
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// Pause between feeds during a sweep.
    #[serde(default = "default_feed_delay_secs")]
    pub feed_delay_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            scheduler_enabled: false,
            schedule: default_schedule(),
            feed_delay_secs: default_feed_delay_secs(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}
fn default_schedule() -> String {
    "0 0 */6 * * *".to_string()
}
fn default_feed_delay_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// One remote feed in the sweep list.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedSource {
    pub url: String,
    pub portal: Portal,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.auth.secret.trim().is_empty() {
        anyhow::bail!("auth.secret must not be empty");
    }
    if config.auth.token_ttl_hours == 0 {
        anyhow::bail!("auth.token_ttl_hours must be > 0");
    }
    if config.import.fetch_timeout_secs == 0 {
        anyhow::bail!("import.fetch_timeout_secs must be > 0");
    }
    if config.import.max_upload_bytes == 0 {
        anyhow::bail!("import.max_upload_bytes must be > 0");
    }
    for feed in &config.feeds {
        if feed.url.trim().is_empty() {
            anyhow::bail!("feeds.url must not be empty (portal {})", feed.portal);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [db]
        path = "./data/estate.sqlite"

        [auth]
        secret = "s3cret"
    "#;

    #[test]
    fn test_defaults_applied() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3001");
        assert_eq!(config.auth.token_ttl_hours, 24);
        assert_eq!(config.import.fetch_timeout_secs, 30);
        assert_eq!(config.import.schedule, "0 0 */6 * * *");
        assert_eq!(config.import.feed_delay_secs, 60);
        assert!(!config.import.scheduler_enabled);
        assert_eq!(config.logging.level, "info");
        assert!(config.feeds.is_empty());
    }

    #[test]
    fn test_feeds_parse_portal_aliases() {
        let toml_str = format!(
            r#"{}
            [[feeds]]
            url = "https://a.example.com/feed.xml"
            portal = "portalA"

            [[feeds]]
            url = "https://b.example.com/feed.xml"
            portal = "canalpro"
            active = false
            "#,
            MINIMAL
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feeds[0].portal, Portal::ChavesNaMao);
        assert!(config.feeds[0].active);
        assert_eq!(config.feeds[1].portal, Portal::CanalPro);
        assert!(!config.feeds[1].active);
    }

    #[test]
    fn test_unknown_feed_portal_rejected() {
        let toml_str = format!(
            "{}\n[[feeds]]\nurl = \"https://x\"\nportal = \"zap\"\n",
            MINIMAL
        );
        assert!(toml::from_str::<Config>(&toml_str).is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let config: Config =
            toml::from_str("[db]\npath = \"x.sqlite\"\n[auth]\nsecret = \"  \"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let toml_str = format!("{}\n[import]\nfetch_timeout_secs = 0\n", MINIMAL);
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(validate(&config).is_err());
    }
}
