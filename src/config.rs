use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Result, anyhow};

pub const DEFAULT_TITLE: &str = "Obec Lhota";
pub const DEFAULT_SUBTITLE: &str = "CzechBot";
pub const DEFAULT_RECONNECT_JITTER_MS: u64 = 5000;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub endpoint: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub reconnect_jitter_ms: Option<u64>,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub reconnect_jitter_ms: Option<u64>,
}

/// Effective settings after merging the config file with overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoint: String,
    pub title: String,
    pub subtitle: String,
    pub reconnect_jitter: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn resolve(self, overrides: Overrides) -> Result<Settings> {
        let endpoint = overrides
            .endpoint
            .or(self.endpoint)
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                let path = Self::get_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.json".into());
                anyhow!("No endpoint configured. Pass --href <host:port> or set \"endpoint\" in {path}")
            })?;

        let jitter_ms = overrides
            .reconnect_jitter_ms
            .or(self.reconnect_jitter_ms)
            .unwrap_or(DEFAULT_RECONNECT_JITTER_MS);

        Ok(Settings {
            endpoint,
            title: overrides
                .title
                .or(self.title)
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            subtitle: overrides
                .subtitle
                .or(self.subtitle)
                .unwrap_or_else(|| DEFAULT_SUBTITLE.to_string()),
            reconnect_jitter: Duration::from_millis(jitter_ms),
        })
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("botchat").join("config.json"))
    }
}

/// Directory for persisted client state and logs.
pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;

    Ok(data_dir.join("botchat"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.endpoint.is_none());
        assert!(config.title.is_none());
    }

    #[test]
    fn test_partial_file_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"endpoint":"bot.example:8080/ws","reconnect_jitter_ms":250}"#,
        )
        .unwrap();

        let settings = Config::load_from(&path).unwrap().resolve(Overrides::default()).unwrap();
        assert_eq!(settings.endpoint, "bot.example:8080/ws");
        assert_eq!(settings.title, DEFAULT_TITLE);
        assert_eq!(settings.subtitle, DEFAULT_SUBTITLE);
        assert_eq!(settings.reconnect_jitter, Duration::from_millis(250));
    }

    #[test]
    fn test_overrides_win() {
        let config = Config {
            endpoint: Some("file:1".into()),
            title: Some("File".into()),
            subtitle: None,
            reconnect_jitter_ms: Some(10),
        };
        let settings = config
            .resolve(Overrides {
                endpoint: Some("cli:2".into()),
                title: None,
                subtitle: Some("Sub".into()),
                reconnect_jitter_ms: None,
            })
            .unwrap();

        assert_eq!(settings.endpoint, "cli:2");
        assert_eq!(settings.title, "File");
        assert_eq!(settings.subtitle, "Sub");
        assert_eq!(settings.reconnect_jitter, Duration::from_millis(10));
    }

    #[test]
    fn test_missing_endpoint_is_an_error() {
        assert!(Config::default().resolve(Overrides::default()).is_err());
        let blank = Overrides { endpoint: Some("   ".into()), ..Overrides::default() };
        assert!(Config::default().resolve(blank).is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
