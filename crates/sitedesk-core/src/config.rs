use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "sitedesk.yaml";

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    3141
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Relative paths resolve against the data root.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("sitedesk.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default = "default_otp_step_secs")]
    pub otp_step_secs: u64,
    /// Accepted steps behind the current one.
    #[serde(default = "default_otp_drift_steps")]
    pub otp_drift_steps: u64,
    #[serde(default = "default_true")]
    pub require_otp_by_default: bool,
}

fn default_token_ttl_hours() -> i64 {
    24 * 14
}

fn default_otp_step_secs() -> u64 {
    30
}

fn default_otp_drift_steps() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: default_token_ttl_hours(),
            otp_step_secs: default_otp_step_secs(),
            otp_drift_steps: default_otp_drift_steps(),
            require_otp_by_default: true,
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Progress moves smaller than this (in points) do not notify anyone.
    #[serde(default = "default_progress_threshold")]
    pub progress_threshold: f64,
    #[serde(default = "default_deadline_window_days")]
    pub deadline_window_days: i64,
}

fn default_progress_threshold() -> f64 {
    5.0
}

fn default_deadline_window_days() -> i64 {
    3
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            progress_threshold: default_progress_threshold(),
            deadline_window_days: default_deadline_window_days(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Config {
    /// Load `sitedesk.yaml` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        std::fs::create_dir_all(root)?;
        std::fs::write(root.join(CONFIG_FILE), data)?;
        Ok(())
    }

    pub fn database_path(&self, root: &Path) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            root.join(&self.database.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.auth.otp_step_secs, 30);
        assert_eq!(config.notifications.progress_threshold, 5.0);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "server:\n  port: 8080\nauth:\n  require_otp_by_default: false\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.cors_origins, vec!["*"]);
        assert!(!config.auth.require_otp_by_default);
        assert_eq!(config.auth.token_ttl_hours, 336);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = PathBuf::from("data/site.db");
        config.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(
            loaded.database_path(dir.path()),
            dir.path().join("data/site.db")
        );
    }
}
