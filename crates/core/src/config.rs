//! Server configuration
//!
//! Loaded from an optional TOML file, then overridden from the environment.
//! Every field has a default so an empty file (or no file) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::room::MAX_PARTICIPANTS;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "PLANPOKER_CONFIG";

/// Default port for planpoker servers
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub rooms: RoomsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub default_expiry_hours: u32,
    pub max_rooms: usize,
    pub max_participants: usize,
    /// How long an emptied room survives before deletion
    pub grace_period_secs: u64,
    /// Interval of the expired/empty room sweep
    pub sweep_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            default_expiry_hours: 24,
            max_rooms: 1000,
            max_participants: MAX_PARTICIPANTS,
            grace_period_secs: 30,
            sweep_interval_secs: 600,
        }
    }
}

impl RoomsConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot rooms to SQLite
    pub enabled: bool,
    /// Database file; the platform data directory is used when unset
    pub db_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the database path, falling back to the platform data dir
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }

        let dirs = ProjectDirs::from("dev", "onyx", "planpoker").ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine data directory",
            ))
        })?;

        Ok(dirs.data_dir().join("planpoker.db"))
    }
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load using `PLANPOKER_CONFIG` (if set) and environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PORT`, `DEFAULT_ROOM_EXPIRY_HOURS`, and `DB_PATH` overrides
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("Invalid PORT: {port}")))?;
        }
        if let Some(hours) = lookup("DEFAULT_ROOM_EXPIRY_HOURS") {
            self.rooms.default_expiry_hours = hours
                .parse()
                .map_err(|_| Error::Config(format!("Invalid DEFAULT_ROOM_EXPIRY_HOURS: {hours}")))?;
        }
        if let Some(path) = lookup("DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(path));
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.rooms.default_expiry_hours == 0 {
            return Err(Error::Config("default_expiry_hours must be positive".into()));
        }
        if self.rooms.max_rooms == 0 || self.rooms.max_participants == 0 {
            return Err(Error::Config("room capacities must be positive".into()));
        }
        if self.rooms.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }
}
