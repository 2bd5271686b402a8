//! # Configuration Management Module
//!
//! Loads the TOML configuration for the economy engine and supplies defaults
//! for every section.
//!
//! ## Configuration Structure
//!
//! - [`StorageConfig`] - where the Sled database lives
//! - [`CatalogConfig`] - where the recipe, scavenge and project documents live
//! - [`RulesConfig`] - game tuning (durations, roll counts, caps)
//! - [`SweepsConfig`] - how often each background sweep runs
//! - [`PermissionsConfig`] - privileged identities and confirmation timeout
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use guildledger::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("Database: {}", config.db_path().display());
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data"
//!
//! [catalog]
//! dir = "./data"
//!
//! [rules]
//! scavenge_minutes = 60
//! scavenge_chance = 0.4
//!
//! [sweeps]
//! task_interval_secs = 60
//!
//! [permissions]
//! superusers = ["1234"]
//! honor_admins = []
//! ```

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::economy::scheduler::SweepConfig;
use crate::economy::Rules;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub sweeps: SweepsConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Optional override for the Sled database path; defaults to `<data_dir>/economy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory holding `recipes.json`, `scavenge.json` and `projects.json`.
    pub dir: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub scavenge_minutes: i64,
    pub general_scavenge_rolls: u32,
    pub targeted_scavenge_rolls: u32,
    pub scavenge_chance: f64,
    pub max_labor_hours: u32,
    pub trade_expiry_days: i64,
    pub max_characters_per_owner: usize,
    pub honor_xp_rate: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            scavenge_minutes: 60,
            general_scavenge_rolls: 10,
            targeted_scavenge_rolls: 5,
            scavenge_chance: 0.4,
            max_labor_hours: 10,
            trade_expiry_days: 7,
            max_characters_per_owner: 10,
            honor_xp_rate: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepsConfig {
    pub task_interval_secs: u64,
    pub trade_interval_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for SweepsConfig {
    fn default() -> Self {
        Self {
            task_interval_secs: 60,
            trade_interval_secs: 3600,
            cleanup_interval_secs: 6 * 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Identities allowed to delete any character and award honor.
    pub superusers: Vec<String>,
    /// Identities allowed to award honor.
    pub honor_admins: Vec<String>,
    pub confirmation_timeout_secs: u64,
    /// Answer used for confirmation prompts when no interactive chat is attached.
    pub auto_confirm: bool,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            superusers: Vec::new(),
            honor_admins: Vec::new(),
            confirmation_timeout_secs: 30,
            auto_confirm: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let r = &self.rules;
        if !(0.0..=1.0).contains(&r.scavenge_chance) {
            return Err(anyhow!("rules.scavenge_chance must be between 0 and 1, got {}", r.scavenge_chance));
        }
        if r.scavenge_minutes < 0 || r.trade_expiry_days < 0 {
            return Err(anyhow!("rules durations must not be negative"));
        }
        if r.max_labor_hours == 0 {
            return Err(anyhow!("rules.max_labor_hours must be at least 1"));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        match &self.storage.db_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.storage.data_dir).join("economy"),
        }
    }

    pub fn catalog_dir(&self) -> PathBuf {
        PathBuf::from(&self.catalog.dir)
    }

    pub fn rules(&self) -> Rules {
        let r = &self.rules;
        Rules {
            scavenge_duration: Duration::minutes(r.scavenge_minutes),
            general_scavenge_rolls: r.general_scavenge_rolls,
            targeted_scavenge_rolls: r.targeted_scavenge_rolls,
            scavenge_chance: r.scavenge_chance,
            max_labor_hours: r.max_labor_hours,
            trade_expiry: Duration::days(r.trade_expiry_days),
            max_characters_per_owner: r.max_characters_per_owner,
            honor_xp_rate: r.honor_xp_rate,
            confirmation_timeout: StdDuration::from_secs(self.permissions.confirmation_timeout_secs),
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            task_interval: StdDuration::from_secs(self.sweeps.task_interval_secs),
            trade_interval: StdDuration::from_secs(self.sweeps.trade_interval_secs),
            cleanup_interval: StdDuration::from_secs(self.sweeps.cleanup_interval_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                db_path: None,
            },
            catalog: CatalogConfig::default(),
            rules: RulesConfig::default(),
            sweeps: SweepsConfig::default(),
            permissions: PermissionsConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("guildledger.log".to_string()),
            },
        }
    }
}
