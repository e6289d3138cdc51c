use crate::core::error::StatuteError;
use crate::core::store::Store;
use serde::{Deserialize, Serialize};
use std::fs;

pub const DEFAULT_LEASE_TIMEOUT_SECS: u64 = 300;
const ACTOR_ENV: &str = "STATUTE_ACTOR";

/// Optional `.constitution/statute.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Age after which an evaluation/resolution lease counts as abandoned.
    pub lease_timeout_secs: u64,
    /// Programs added to the built-in read-only inspection set.
    pub read_only_commands: Vec<String>,
    /// Actor recorded in journal entries.
    pub actor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lease_timeout_secs: DEFAULT_LEASE_TIMEOUT_SECS,
            read_only_commands: Vec::new(),
            actor: "statute".to_string(),
        }
    }
}

impl Config {
    /// Loads the config for `store`. No file means defaults (not an error);
    /// a file that does not parse is an error.
    pub fn load(store: &Store) -> Result<Self, StatuteError> {
        let path = store.config_path();
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            toml::from_str::<Config>(&content)
                .map_err(|e| StatuteError::ConfigError(format!("{}: {}", path.display(), e)))?
        } else {
            Config::default()
        };
        if let Ok(actor) = std::env::var(ACTOR_ENV) {
            if !actor.trim().is_empty() {
                config.actor = actor.trim().to_string();
            }
        }
        if config.lease_timeout_secs == 0 {
            return Err(StatuteError::ConfigError(
                "lease_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}
