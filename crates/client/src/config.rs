//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Context, Result};

use conciliar_common::{Database, UserQuery};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub directory: DirectorySettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl ClientConfig {
    pub fn load(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = directories::ProjectDirs::from("co", "conciliar", "conciliar") {
            config_dir.config_dir().join("client.toml")
        } else {
            PathBuf::from("client.toml")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/api".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    pub page_size: u32,
    pub search_debounce_ms: u64,
}

impl DirectorySettings {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            page_size: UserQuery::DEFAULT_LIMIT,
            search_debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub database_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: Database::default_path(),
        }
    }
}

pub fn generate_example_config() -> String {
    let config = ClientConfig::default();
    toml::to_string_pretty(&config).expect("Failed to serialize default config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serialization() {
        let config = ClientConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: ClientConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config.api.base_url, deserialized.api.base_url);
        assert_eq!(deserialized.directory.page_size, 15);
        assert_eq!(deserialized.directory.search_debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://conciliar.example/api"
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://conciliar.example/api");
        assert_eq!(config.api.timeout(), Duration::from_secs(5));
        assert_eq!(config.directory.page_size, 15);
    }
}
