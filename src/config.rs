use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: PathBuf,
    /// Authenticated owner scoping all remote operations
    pub owner_id: Option<Uuid>,
    /// Run a full sync before commands when the backend is reachable
    pub auto_sync: bool,
    /// Remote backend settings
    pub remote: RemoteConfig,
}

/// Settings for the hosted backend.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub bucket: String,
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.api_key.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: home.join(".diaryme").join("diaryme.db"),
            owner_id: None,
            auto_sync: false,
            remote: RemoteConfig {
                base_url: None,
                api_key: None,
                bucket: "diary-media".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Self::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Read(path.clone(), e))?;
            config =
                serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(path.clone(), e))?;
            if config.remote.bucket.is_empty() {
                config.remote.bucket = "diary-media".to_string();
            }
        }

        // Apply environment variable overrides
        if let Ok(db_path) = std::env::var("DIARYME_DATABASE_PATH") {
            config.database_path = PathBuf::from(db_path);
        }
        if let Ok(base_url) = std::env::var("DIARYME_REMOTE_URL") {
            config.remote.base_url = Some(base_url);
        }
        if let Ok(api_key) = std::env::var("DIARYME_REMOTE_KEY") {
            config.remote.api_key = Some(api_key);
        }
        if let Ok(bucket) = std::env::var("DIARYME_REMOTE_BUCKET") {
            config.remote.bucket = bucket;
        }
        if let Ok(owner) = std::env::var("DIARYME_OWNER_ID") {
            if let Ok(owner_id) = Uuid::parse_str(&owner) {
                config.owner_id = Some(owner_id);
            }
        }

        Ok(config)
    }

    /// Default config file path: ~/.config/diaryme/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("diaryme")
            .join("config.yaml")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {1}", .0.display())]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file '{}': {1}", .0.display())]
    Parse(PathBuf, serde_yaml::Error),
}
