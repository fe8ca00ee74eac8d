use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model id used for every exchange
    pub model: String,

    /// Base URL of the Generative Language API
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Data directory (preferences, log file)
    #[serde(skip)]
    pub home: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "API_KEY".to_string(),
            home: default_home(),
        }
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".begleiter")
}

impl Config {
    /// Load configuration from `~/.begleiter/config.toml`, falling back to defaults.
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Self::load_from(&home.join(".begleiter"))
    }

    /// Load configuration rooted at `home`.
    pub fn load_from(home: &Path) -> Result<Self> {
        fs::create_dir_all(home).context("Failed to create data directory")?;

        let config_path = home.join(CONFIG_FILE);
        if !config_path.exists() {
            let config = Config {
                home: home.to_path_buf(),
                ..Config::default()
            };
            config.save()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path)
            .context("Failed to read config file")?;
        let mut config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        config.home = home.to_path_buf();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(self.home.join(CONFIG_FILE), content)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// API key from the configured environment variable. Blank counts as missing.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn log_path(&self) -> PathBuf {
        self.home.join("begleiter.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults_and_writes_them() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_FILE).exists());

        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.api_key_env, "API_KEY");
        assert_eq!(config.home, dir.path());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "model = \"gemini-2.0-flash\"\n").unwrap();

        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.base_url, "https://generativelanguage.googleapis.com/v1beta");
    }

    #[test]
    fn save_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load_from(dir.path()).unwrap();
        config.base_url = "http://127.0.0.1:9".to_string();
        config.save().unwrap();

        let reloaded = Config::load_from(dir.path()).unwrap();
        assert_eq!(reloaded.base_url, "http://127.0.0.1:9");
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = Config {
            api_key_env: "BEGLEITER_TEST_BLANK_KEY".to_string(),
            ..Config::default()
        };
        std::env::set_var("BEGLEITER_TEST_BLANK_KEY", "   ");
        assert!(config.api_key().is_none());

        std::env::set_var("BEGLEITER_TEST_BLANK_KEY", "secret");
        assert_eq!(config.api_key().as_deref(), Some("secret"));
        std::env::remove_var("BEGLEITER_TEST_BLANK_KEY");
    }
}
