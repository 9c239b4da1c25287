use anyhow::{Context, Result};
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::api::DEFAULT_API_URL;
use crate::feed::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSettings {
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub level: String,
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api: Api,
    pub feed: FeedSettings,
    pub logging: Logging,
}

/// Environment variables that override the config file
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PLAZA_API_URL", "api.base_url"),
    ("PLAZA_TIMEOUT_SECS", "api.timeout_secs"),
    ("PLAZA_PAGE_SIZE", "feed.page_size"),
    ("PLAZA_LOG_LEVEL", "logging.level"),
    ("PLAZA_LOG_FILE", "logging.file"),
];

/// The `~/.plaza` directory holding the session and config files
pub fn config_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home_dir.join(".plaza"))
}

impl Settings {
    /// Load settings with this priority (highest first):
    /// 1. `PLAZA_*` environment variables
    /// 2. `~/.plaza/config.toml`, when present
    /// 3. Built-in defaults
    pub fn load() -> Result<Self> {
        let file = config_dir()?.join("config.toml");
        Self::build(Some(&file), |key| std::env::var(key).ok())
            .context("Failed to load settings")
    }

    /// Assemble settings from an optional file and an environment lookup
    pub fn build(
        file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("api.base_url", DEFAULT_API_URL)?
            .set_default("api.timeout_secs", 30)?
            .set_default("feed.page_size", DEFAULT_PAGE_SIZE as i64)?
            .set_default("logging.level", "info")?
            .set_default("logging.file", "plaza.log")?;

        if let Some(path) = file {
            if path.exists() {
                builder = builder.add_source(File::from(path.to_path_buf()).required(false));
            }
        }

        for (var, key) in ENV_OVERRIDES {
            if let Some(value) = env(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        builder.build()?.try_deserialize()
    }

    /// The API root to use: an explicit CLI value wins over everything else
    pub fn api_url(&self, cli_override: Option<&str>) -> String {
        match cli_override {
            Some(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => self.api.base_url.clone(),
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.logging
            .level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::build(None, no_env).unwrap();
        assert_eq!(settings.api.base_url, "http://localhost:8080/api");
        assert_eq!(settings.api.timeout_secs, 30);
        assert_eq!(settings.feed.page_size, 20);
        assert_eq!(settings.log_level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[api]\nbase_url = \"https://plaza.example.com/api\"\n\n[feed]\npage_size = 5\n",
        );

        let settings = Settings::build(Some(&path), no_env).unwrap();
        assert_eq!(settings.api.base_url, "https://plaza.example.com/api");
        assert_eq!(settings.feed.page_size, 5);
        assert_eq!(settings.api.timeout_secs, 30);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[api]\nbase_url = \"https://file.example.com/api\"\n");
        let env: HashMap<&str, &str> = [
            ("PLAZA_API_URL", "http://env.example.com/api"),
            ("PLAZA_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let settings =
            Settings::build(Some(&path), |key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.api.base_url, "http://env.example.com/api");
        assert_eq!(settings.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_cli_override_priority() {
        let settings = Settings::build(None, |key| {
            (key == "PLAZA_API_URL").then(|| "http://env:8080/api".to_string())
        })
        .unwrap();

        assert_eq!(settings.api_url(Some("http://cli:9000/api")), "http://cli:9000/api");
        assert_eq!(settings.api_url(Some("  ")), "http://env:8080/api");
        assert_eq!(settings.api_url(None), "http://env:8080/api");
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Settings::build(Some(&path), no_env).is_ok());
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let settings =
            Settings::build(None, |key| (key == "PLAZA_LOG_LEVEL").then(|| "loud".to_string()))
                .unwrap();
        assert_eq!(settings.log_level(), log::LevelFilter::Info);
    }
}
