//! Application-level configuration loading: JSON file first, then environment overrides.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COUNTING_BACK_CONFIG_PATH";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;
const DEFAULT_SUBMIT_TIMEOUT_MS: u64 = 5_000;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// TCP port the HTTP server binds to.
    pub port: u16,
    /// Persistence backend holding the game ledger.
    pub store: StoreConfig,
    /// Chat platform settings used by the attempt normalizer.
    pub slack: SlackConfig,
    /// Commit retry and deadline settings of the counting engine.
    pub engine: EngineConfig,
}

/// Which backend stores the game state, leaderboard and history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local store; state is lost on restart.
    #[default]
    Memory,
    /// MongoDB replica set.
    Mongo {
        /// Connection string.
        uri: String,
        /// Database name, `counting` when omitted.
        #[serde(default)]
        database: Option<String>,
    },
}

/// Slack integration settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct SlackConfig {
    /// Token Slack sends with every event and slash command; unchecked when absent.
    pub verification_token: Option<String>,
    /// Only messages from this channel are counted when set.
    pub channel_id: Option<String>,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Optimistic commit attempts made per submission before reporting the store busy.
    pub max_commit_attempts: u32,
    /// Deadline applied to submissions and reads, in milliseconds. 0 disables it.
    pub submit_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            store: StoreConfig::default(),
            slack: SlackConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            submit_timeout_ms: DEFAULT_SUBMIT_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Commit attempts per submission, never less than one.
    pub fn commit_attempts(&self) -> u32 {
        self.max_commit_attempts.max(1)
    }

    /// Default deadline for engine operations.
    pub fn deadline(&self) -> Option<Duration> {
        (self.submit_timeout_ms > 0).then(|| Duration::from_millis(self.submit_timeout_ms))
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_file(&resolve_config_path());
        config.apply_overrides(|name| env::var(name).ok());
        config
    }

    fn from_file(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration file");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Apply environment overrides read through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(err) => warn!(value = %port, error = %err, "ignoring invalid PORT"),
            }
        }

        let backend = lookup("STORE_BACKEND");
        let mongo_uri = lookup("MONGO_URI");
        let mongo_db = lookup("MONGO_DB");
        match backend.as_deref() {
            Some("memory") => self.store = StoreConfig::Memory,
            Some("mongo") | None if mongo_uri.is_some() || backend.is_some() => {
                let (current_uri, current_db) = match &self.store {
                    StoreConfig::Mongo { uri, database } => (Some(uri.clone()), database.clone()),
                    StoreConfig::Memory => (None, None),
                };
                match mongo_uri.or(current_uri) {
                    Some(uri) => {
                        self.store = StoreConfig::Mongo {
                            uri,
                            database: mongo_db.or(current_db),
                        }
                    }
                    None => warn!("STORE_BACKEND=mongo requires MONGO_URI; keeping memory store"),
                }
            }
            Some(other) => warn!(value = %other, "ignoring unknown STORE_BACKEND"),
            None => {
                if let (Some(db), StoreConfig::Mongo { database, .. }) = (mongo_db, &mut self.store)
                {
                    *database = Some(db);
                }
            }
        }

        if let Some(token) = lookup("SLACK_VERIFICATION_TOKEN") {
            self.slack.verification_token = Some(token);
        }
        if let Some(channel) = lookup("SLACK_CHANNEL_ID") {
            self.slack.channel_id = Some(channel);
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "port": 9000, "store": { "backend": "mongo", "uri": "mongodb://db:27017" } }"#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(
            config.store,
            StoreConfig::Mongo {
                uri: "mongodb://db:27017".into(),
                database: None
            }
        );
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.slack.verification_token, None);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = AppConfig::default();
        config.apply_overrides(overrides(&[
            ("PORT", "3000"),
            ("MONGO_URI", "mongodb://localhost:27017"),
            ("MONGO_DB", "counting_test"),
            ("SLACK_VERIFICATION_TOKEN", "secret"),
            ("SLACK_CHANNEL_ID", "C123"),
        ]));

        assert_eq!(config.port, 3000);
        assert_eq!(
            config.store,
            StoreConfig::Mongo {
                uri: "mongodb://localhost:27017".into(),
                database: Some("counting_test".into())
            }
        );
        assert_eq!(config.slack.verification_token.as_deref(), Some("secret"));
        assert_eq!(config.slack.channel_id.as_deref(), Some("C123"));
    }

    #[test]
    fn explicit_memory_backend_wins_over_mongo_uri() {
        let mut config = AppConfig::default();
        config.apply_overrides(overrides(&[
            ("STORE_BACKEND", "memory"),
            ("MONGO_URI", "mongodb://localhost:27017"),
        ]));

        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn invalid_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(overrides(&[("PORT", "not-a-port"), ("STORE_BACKEND", "mongo")]));

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn engine_settings_are_clamped() {
        let engine = EngineConfig {
            max_commit_attempts: 0,
            submit_timeout_ms: 0,
        };

        assert_eq!(engine.commit_attempts(), 1);
        assert_eq!(engine.deadline(), None);
        assert_eq!(
            EngineConfig::default().deadline(),
            Some(Duration::from_millis(DEFAULT_SUBMIT_TIMEOUT_MS))
        );
    }
}
