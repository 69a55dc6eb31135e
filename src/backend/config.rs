use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::error::{ChatError, Result};

const APP_DIR: &str = "Chat";
const APPDATA_FILE: &str = "config.json";
const LOCAL_FILE: &str = "chat_settings.json";
const DEFAULT_TRANSPARENCY: u8 = 90;

fn default_transparency() -> u8 {
    DEFAULT_TRANSPARENCY
}

/// Persisted user settings. Missing fields fall back to their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub twitch_token: String,
    #[serde(default)]
    pub twitch_channel: String,
    /// Helix client id; without it channel badges are skipped
    #[serde(default)]
    pub twitch_client_id: String,
    #[serde(default)]
    pub youtube_input: String,
    #[serde(default)]
    pub youtube_api_key: Option<String>,
    /// Window opacity in percent
    #[serde(default = "default_transparency")]
    pub transparency: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            twitch_token: String::new(),
            twitch_channel: String::new(),
            twitch_client_id: String::new(),
            youtube_input: String::new(),
            youtube_api_key: None,
            transparency: DEFAULT_TRANSPARENCY,
        }
    }
}

impl AppConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// `%APPDATA%/Chat/config.json`, else `chat_settings.json` in the project
/// root or the working directory
pub fn config_path() -> PathBuf {
    if let Some(appdata) = std::env::var_os("APPDATA") {
        return PathBuf::from(appdata).join(APP_DIR).join(APPDATA_FILE);
    }

    match project_root::get_project_root() {
        Ok(root) => root.join(LOCAL_FILE),
        Err(_) => PathBuf::from(LOCAL_FILE),
    }
}

pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path())
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &config_path())
}

/// Defaults when the file does not exist yet
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        log::info!("No settings at {}, using defaults", path.display());
        return Ok(AppConfig::default());
    }

    AppConfig::from_file(path)
        .map_err(|e| ChatError::Config(format!("Failed to load {}: {}", path.display(), e)))
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    config
        .to_file(path)
        .map_err(|e| ChatError::Config(format!("Failed to save {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("duofeed-test-{}-{}", std::process::id(), name))
            .join(LOCAL_FILE)
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"twitch_channel": "somechannel", "youtube_api_key": null}"#)
                .unwrap();
        assert_eq!(config.twitch_channel, "somechannel");
        assert_eq!(config.transparency, 90);
        assert_eq!(config.youtube_api_key, None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config_from(&temp_path("missing")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("save");
        let config = AppConfig {
            twitch_token: "oauth:abc".to_string(),
            twitch_channel: "chan".to_string(),
            youtube_input: "@streamer".to_string(),
            youtube_api_key: Some("key".to_string()),
            transparency: 75,
            ..Default::default()
        };

        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_is_config_error() {
        let path = temp_path("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(load_config_from(&path), Err(ChatError::Config(_))));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
