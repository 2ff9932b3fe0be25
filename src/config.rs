//! Application-level configuration loading: room rules and storage retry policy.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::room::{RoomRules, ScorePolicy};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CAT_BATTLE_BACK_CONFIG_PATH";
/// Placeholder replaced by the host name in [`AppConfig::default_room_name`].
const HOST_PLACEHOLDER: &str = "{host}";

const DEFAULT_MIN_PLAYERS: usize = 2;
const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_ROOM_NAME: &str = "{host}'s Cat Battle";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    rules: RoomRules,
    max_write_attempts: u32,
    store_timeout: Duration,
    room_name_template: String,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        min_players = app_config.rules.min_players,
                        score_policy = ?app_config.rules.score_policy,
                        "loaded configuration"
                    );
                    app_config
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

    /// Rules applied to every room.
    pub fn rules(&self) -> &RoomRules {
        &self.rules
    }

    /// Upper bound on load/compute/write cycles for one request.
    pub fn max_write_attempts(&self) -> u32 {
        self.max_write_attempts
    }

    /// Time allowed for a single storage call.
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Room name used when the host does not provide one.
    pub fn default_room_name(&self, host: &str) -> String {
        self.room_name_template.replace(HOST_PLACEHOLDER, host.trim())
    }

    /// Replace the room rules, keeping everything else.
    pub fn with_rules(mut self, rules: RoomRules) -> Self {
        self.rules = rules;
        self
    }

    /// Replace the storage retry bound, keeping everything else.
    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    /// Replace the per-call storage timeout, keeping everything else.
    pub fn with_store_timeout(mut self, limit: Duration) -> Self {
        self.store_timeout = limit;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    min_players: usize,
    max_write_attempts: u32,
    store_timeout_ms: u64,
    score_policy: ScorePolicy,
    default_room_name: String,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            min_players: DEFAULT_MIN_PLAYERS,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            score_policy: ScorePolicy::default(),
            default_room_name: DEFAULT_ROOM_NAME.to_owned(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            rules: RoomRules {
                min_players: value.min_players.max(1),
                score_policy: value.score_policy,
            },
            max_write_attempts: value.max_write_attempts.max(1),
            store_timeout: Duration::from_millis(value.store_timeout_ms.max(1)),
            room_name_template: value.default_room_name,
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
