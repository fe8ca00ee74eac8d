use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::prompts::{normalize_name, DEFAULT_ASSISTANT_NAME};

const PREFERENCES_FILE: &str = "preferences.json";
const ASSISTANT_NAME_KEY: &str = "ai_name";

/// Small key/value preference file in the data directory
#[derive(Debug, Clone)]
pub struct StorageManager {
    data_dir: PathBuf,
}

impl StorageManager {
    pub fn new(data_dir: &Path) -> Self {
        StorageManager {
            data_dir: data_dir.to_path_buf(),
        }
    }

    fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_FILE)
    }

    fn read_preferences(&self) -> Result<BTreeMap<String, String>> {
        let path = self.preferences_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&path)
            .context("Failed to read preferences")?;
        serde_json::from_str(&content)
            .context("Failed to parse preferences")
    }

    /// Stored assistant name, or the default when absent or blank.
    pub fn load_assistant_name(&self) -> String {
        let stored = match self.read_preferences() {
            Ok(mut prefs) => prefs.remove(ASSISTANT_NAME_KEY),
            Err(e) => {
                tracing::warn!("Ignoring unreadable preferences: {:#}", e);
                None
            }
        };

        stored
            .as_deref()
            .and_then(normalize_name)
            .unwrap_or_else(|| DEFAULT_ASSISTANT_NAME.to_string())
    }

    pub fn save_assistant_name(&self, name: &str) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .context("Failed to create data directory")?;

        // Unreadable files are overwritten rather than blocking the save.
        let mut prefs = self.read_preferences().unwrap_or_default();
        prefs.insert(ASSISTANT_NAME_KEY.to_string(), name.to_string());

        let content = serde_json::to_string_pretty(&prefs)
            .context("Failed to serialize preferences")?;
        fs::write(self.preferences_path(), content)
            .context("Failed to write preferences")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        assert_eq!(storage.load_assistant_name(), DEFAULT_ASSISTANT_NAME);
    }

    #[test]
    fn saved_name_is_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());
        storage.save_assistant_name("Nova").unwrap();

        assert_eq!(StorageManager::new(dir.path()).load_assistant_name(), "Nova");
    }

    #[test]
    fn blank_or_corrupt_values_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path());

        fs::write(dir.path().join(PREFERENCES_FILE), r#"{"ai_name": "   "}"#).unwrap();
        assert_eq!(storage.load_assistant_name(), DEFAULT_ASSISTANT_NAME);

        fs::write(dir.path().join(PREFERENCES_FILE), "not json").unwrap();
        assert_eq!(storage.load_assistant_name(), DEFAULT_ASSISTANT_NAME);

        storage.save_assistant_name("Mira").unwrap();
        assert_eq!(storage.load_assistant_name(), "Mira");
    }

    #[test]
    fn save_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PREFERENCES_FILE), r#"{"theme": "dark"}"#).unwrap();

        StorageManager::new(dir.path()).save_assistant_name("Nova").unwrap();

        let content = fs::read_to_string(dir.path().join(PREFERENCES_FILE)).unwrap();
        let prefs: BTreeMap<String, String> = serde_json::from_str(&content).unwrap();
        assert_eq!(prefs.get("theme").map(String::as_str), Some("dark"));
        assert_eq!(prefs.get("ai_name").map(String::as_str), Some("Nova"));
    }
}
