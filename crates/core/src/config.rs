//! Engine and service configuration
//!
//! Loaded from `slotswap.toml`. Every section is optional.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "SLOTSWAP_CONFIG";

/// Default TCP port for the swap service
pub const DEFAULT_PORT: u16 = 7441;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// `[store]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file; defaults to the platform data directory
    pub path: Option<PathBuf>,
    /// How long a writer waits for another connection's lock
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Resolve the database path, falling back to `<data dir>/slotswap.db`
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join("slotswap.db")),
        }
    }
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_connections: 64,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address {:?}: {}", self.bind, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// `[identity]` section: a static credential table standing in for an
/// external identity provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    pub users: Vec<IdentityEntry>,
}

/// One `[[identity.users]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityEntry {
    pub credential: String,
    pub user_id: Uuid,
    pub display_name: String,
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        debug!(
            path = %path.display(),
            identities = config.identity.users.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// `$SLOTSWAP_CONFIG`, or `<config dir>/slotswap.toml`
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        Ok(project_dirs()?.config_dir().join("slotswap.toml"))
    }

    fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;

        if self.server.max_connections == 0 {
            return Err(Error::Config("server.max_connections must be > 0".into()));
        }

        for entry in &self.identity.users {
            if entry.credential.is_empty() {
                return Err(Error::Config(format!(
                    "empty credential for user {}",
                    entry.user_id
                )));
            }
            if entry.display_name.trim().is_empty() {
                return Err(Error::Config(format!(
                    "empty display_name for user {}",
                    entry.user_id
                )));
            }
        }

        let mut credentials: Vec<&str> = self
            .identity
            .users
            .iter()
            .map(|e| e.credential.as_str())
            .collect();
        credentials.sort_unstable();
        if credentials.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::Config("duplicate identity credential".into()));
        }

        Ok(())
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "onyx", "slotswap").ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine data directory",
        ))
    })
}
