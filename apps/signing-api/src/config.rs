//! Process configuration, read once from the environment

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STRATEGY_TIMEOUT_MS: u64 = 15_000;

/// Which artifact backend receives new writes for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Managed deployments keep artifacts in the database blob table
    Managed,
    /// Everything else writes under the local document root
    Local,
}

impl StorageMode {
    pub fn from_deployment_mode(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "managed" || v == "production" => StorageMode::Managed,
            _ => StorageMode::Local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub storage_mode: StorageMode,
    pub artifact_root: PathBuf,
    pub strategy_timeout: Option<Duration>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| {
            let data_dir = dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("signing-api");
            std::fs::create_dir_all(&data_dir).ok();
            format!("sqlite:{}/signing.db?mode=rwc", data_dir.display())
        });

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS is not a number: {}", raw))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let strategy_timeout_ms = match lookup("PDF_STRATEGY_TIMEOUT_MS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PDF_STRATEGY_TIMEOUT_MS is not a number: {}", raw))?,
            None => DEFAULT_STRATEGY_TIMEOUT_MS,
        };

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT is not a valid port: {}", raw))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            max_connections: max_connections.max(1),
            storage_mode: StorageMode::from_deployment_mode(lookup("DEPLOYMENT_MODE").as_deref()),
            artifact_root: lookup("ARTIFACT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            strategy_timeout: (strategy_timeout_ms > 0)
                .then(|| Duration::from_millis(strategy_timeout_ms)),
            port,
        })
    }
}

/// Get platform-specific data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("DATABASE_URL", "sqlite::memory:")]).unwrap();
        assert_eq!(cfg.storage_mode, StorageMode::Local);
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.artifact_root, PathBuf::from("."));
        assert_eq!(cfg.strategy_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_managed_mode() {
        let cfg = config(&[("DATABASE_URL", "sqlite::memory:"), ("DEPLOYMENT_MODE", "Managed")]).unwrap();
        assert_eq!(cfg.storage_mode, StorageMode::Managed);
    }

    #[test]
    fn test_zero_timeout_disables_bound() {
        let cfg = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("PDF_STRATEGY_TIMEOUT_MS", "0"),
        ])
        .unwrap();
        assert_eq!(cfg.strategy_timeout, None);
    }

    #[test]
    fn test_bad_port_is_rejected() {
        assert!(config(&[("DATABASE_URL", "sqlite::memory:"), ("PORT", "http")]).is_err());
    }
}
