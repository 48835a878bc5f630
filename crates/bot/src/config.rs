//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::{ChatId, UserId};

const DEFAULT_CONTACTS: &str = "Phone: +7 977 412 60 27\nEmail: example@mail.com";

/// Bot configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: SQLite database (default: `"sqlite://shop.db"`)
/// - `ADMIN_IDS`: comma-separated administrator user ids (default: none)
/// - `GROUP_CHAT_ID`: admin channel for order announcements (default: none)
/// - `TRANSACTION_TIMEOUT_MS`: store transaction bound (default: `5000`)
/// - `SESSION_TIMEOUT_SECS`: idle time after which a conversation resets (default: `900`)
/// - `CONTACTS_TEXT`: reply to the contacts command
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: String,
    pub admin_ids: Vec<UserId>,
    pub group_chat_id: Option<ChatId>,
    pub transaction_timeout: Duration,
    pub session_timeout: Duration,
    pub contacts_text: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            admin_ids: lookup("ADMIN_IDS")
                .map(|ids| parse_admin_ids(&ids))
                .unwrap_or(defaults.admin_ids),
            group_chat_id: lookup("GROUP_CHAT_ID").and_then(|id| id.parse().ok()),
            transaction_timeout: lookup("TRANSACTION_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.transaction_timeout),
            session_timeout: lookup("SESSION_TIMEOUT_SECS")
                .and_then(|secs| secs.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_timeout),
            contacts_text: lookup("CONTACTS_TEXT").unwrap_or(defaults.contacts_text),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: "sqlite://shop.db".to_string(),
            admin_ids: Vec::new(),
            group_chat_id: None,
            transaction_timeout: Duration::from_millis(5000),
            session_timeout: Duration::from_secs(900),
            contacts_text: DEFAULT_CONTACTS.to_string(),
        }
    }
}

/// Parses a comma-separated id list, skipping entries that are not integers.
fn parse_admin_ids(ids: &str) -> Vec<UserId> {
    ids.split(',')
        .filter(|id| !id.trim().is_empty())
        .filter_map(|id| match id.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(id, "Ignoring malformed admin id");
                None
            }
        })
        .collect()
}
