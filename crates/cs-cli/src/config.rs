//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// User whose rules and history are read and written.
    pub user_id: String,
    pub harvest_account_id: Option<String>,
    pub harvest_access_token: Option<String>,
    /// Calendar export (JSON array of events) used when `--events` is absent.
    pub events_path: Option<PathBuf>,
    /// Project catalog file used instead of Harvest when set.
    pub catalog_path: Option<PathBuf>,
    pub rule_cache_ttl_secs: u64,
    pub suggestion_weeks: u32,
    pub insight_weeks: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("user_id", &self.user_id)
            .field("harvest_account_id", &self.harvest_account_id)
            .field(
                "harvest_access_token",
                &self.harvest_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("events_path", &self.events_path)
            .field("catalog_path", &self.catalog_path)
            .field("rule_cache_ttl_secs", &self.rule_cache_ttl_secs)
            .field("suggestion_weeks", &self.suggestion_weeks)
            .field("insight_weeks", &self.insight_weeks)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("cs.db"),
            user_id: "default".to_string(),
            harvest_account_id: None,
            harvest_access_token: None,
            events_path: None,
            catalog_path: None,
            rule_cache_ttl_secs: cs_core::mapping::DEFAULT_RULE_CACHE_TTL.as_secs(),
            suggestion_weeks: cs_core::suggest::DEFAULT_SUGGESTION_WEEKS,
            insight_weeks: cs_core::suggest::DEFAULT_INSIGHT_WEEKS,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (CS_*)
        figment = figment.merge(Env::prefixed("CS_"));

        figment.extract()
    }

    pub const fn rule_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.rule_cache_ttl_secs)
    }
}

/// Returns the platform-specific config directory for cs.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("cs"))
}

/// Returns the platform-specific data directory for cs.
///
/// On Linux: `~/.local/share/cs`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("cs"))
}
