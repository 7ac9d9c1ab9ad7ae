// Process configuration, read from the environment (after `.env` is loaded).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_HANDLERS_DIR: &str = "handlers";
const DEFAULT_CACHE_DB_PATH: &str = "data/shortterm.db";
const DEFAULT_CLEANUP_SECS: u64 = 3600;
const DEFAULT_DURABLE_MIGRATIONS_DIR: &str = "migrations/persistent";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing {0} environment variable")]
    Missing(&'static str),

    #[error("{name} has an invalid value `{value}`: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Development,
    Production,
}

impl FromStr for RunMode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RunMode::Development),
            "production" | "prod" => Ok(RunMode::Production),
            _ => Err("expected `development` or `production`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub key: String,
    /// `*.sql` files applied after connecting, tracked in `_migrations`.
    pub migrations_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub discord_token: String,
    pub run_mode: RunMode,
    pub dev_guild_id: Option<u64>,
    pub handlers_dir: PathBuf,
    pub cache_db_path: PathBuf,
    pub supabase: Option<SupabaseConfig>,
    pub cleanup_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let discord_token = get("DISCORD_TOKEN").ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let run_mode = match get("RUN_MODE") {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                name: "RUN_MODE",
                value,
                reason,
            })?,
            None => RunMode::Production,
        };

        let dev_guild_id = get("DEV_GUILD_ID")
            .map(|value| {
                value.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
                    name: "DEV_GUILD_ID",
                    value,
                    reason: "expected a numeric guild id",
                })
            })
            .transpose()?;

        let cleanup_secs = get("CACHE_CLEANUP_SECS")
            .map(|value| match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(secs),
                _ => Err(ConfigError::Invalid {
                    name: "CACHE_CLEANUP_SECS",
                    value,
                    reason: "expected a positive number of seconds",
                }),
            })
            .transpose()?
            .unwrap_or(DEFAULT_CLEANUP_SECS);

        // Both or nothing; a half-configured pair is treated as absent.
        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_KEY")) {
            (Some(url), Some(key)) => Some(SupabaseConfig {
                url,
                key,
                migrations_dir: get("SUPABASE_MIGRATIONS_DIR")
                    .unwrap_or_else(|| DEFAULT_DURABLE_MIGRATIONS_DIR.to_string())
                    .into(),
            }),
            _ => None,
        };

        Ok(Self {
            discord_token,
            run_mode,
            dev_guild_id,
            handlers_dir: get("HANDLERS_DIR")
                .unwrap_or_else(|| DEFAULT_HANDLERS_DIR.to_string())
                .into(),
            cache_db_path: get("CACHE_DB_PATH")
                .unwrap_or_else(|| DEFAULT_CACHE_DB_PATH.to_string())
                .into(),
            supabase,
            cleanup_interval: Duration::from_secs(cleanup_secs),
        })
    }

    /// Guild for instant slash-command registration, development only.
    pub fn command_guild(&self) -> Option<u64> {
        match self.run_mode {
            RunMode::Development => self.dev_guild_id,
            RunMode::Production => None,
        }
    }
}
