// Bookmark-sync Settings Engine
// Loads client settings from a JSON file at the platform config path, applies
// environment overrides, validates, and persists edits made by key path.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::platform;
use crate::types::errors::ConfigError;
use crate::types::settings::ClientSettings;

pub const ENV_API_URL: &str = "BOOKMARK_SYNC_API_URL";
pub const ENV_ANON_KEY: &str = "BOOKMARK_SYNC_ANON_KEY";
pub const ENV_REDIRECT_TO: &str = "BOOKMARK_SYNC_REDIRECT_TO";

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<ClientSettings, ConfigError>;
    fn save(&self) -> Result<(), ConfigError>;
    fn get_settings(&self) -> &ClientSettings;
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), ConfigError>;
    fn reset(&mut self) -> Result<(), ConfigError>;
    fn get_config_path(&self) -> &str;
}

/// Settings engine that persists client settings as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    settings: ClientSettings,
}

impl SettingsEngine {
    /// Uses `path_override` when given, otherwise `config.json` in the
    /// platform config directory.
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = match path_override {
            Some(p) => p,
            None => platform::get_config_dir()
                .join("config.json")
                .to_string_lossy()
                .to_string(),
        };

        Self {
            config_path,
            settings: ClientSettings::default(),
        }
    }

    /// Overrides values from `BOOKMARK_SYNC_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Overrides values using `lookup` in place of the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_API_URL) {
            debug!(var = ENV_API_URL, "settings override");
            self.settings.backend.api_url = url;
        }
        if let Some(key) = non_empty(ENV_ANON_KEY) {
            debug!(var = ENV_ANON_KEY, "settings override");
            self.settings.backend.anon_key = key;
        }
        if let Some(redirect) = non_empty(ENV_REDIRECT_TO) {
            debug!(var = ENV_REDIRECT_TO, "settings override");
            self.settings.auth.redirect_to = redirect;
        }
    }

    /// Checks that the settings are usable against a real backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.settings;
        if s.backend.api_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "backend.api_url is empty (set it in {} or {})",
                self.config_path, ENV_API_URL
            )));
        }
        if !s.backend.api_url.starts_with("http://") && !s.backend.api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(format!(
                "backend.api_url must be an http(s) URL: {}",
                s.backend.api_url
            )));
        }
        if s.backend.anon_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "backend.anon_key is empty (set it in {} or {})",
                self.config_path, ENV_ANON_KEY
            )));
        }
        if s.sync.table.trim().is_empty() {
            return Err(ConfigError::InvalidValue("sync.table is empty".to_string()));
        }
        if s.sync.channel_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue("sync.channel_name is empty".to_string()));
        }
        if s.sync.reconnect.base_delay_ms > s.sync.reconnect.max_delay_ms {
            return Err(ConfigError::InvalidValue(
                "sync.reconnect.base_delay_ms exceeds max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from the JSON config file.
    ///
    /// A missing file yields defaults. A malformed file is an error.
    fn load(&mut self) -> Result<ClientSettings, ConfigError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            info!(path = %self.config_path, "no config file, using defaults");
            self.settings = ClientSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read config file: {}", e)))?;

        self.settings = serde_json::from_str(&content).map_err(|e| {
            ConfigError::Serialization(format!("Failed to parse config file: {}", e))
        })?;
        info!(path = %self.config_path, "config loaded");
        Ok(self.settings.clone())
    }

    /// Writes the current settings, creating parent directories as needed.
    fn save(&self) -> Result<(), ConfigError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Io(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            ConfigError::Serialization(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| ConfigError::Io(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn get_settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Updates one value by dot-notation path (e.g. `sync.reconnect.enabled`)
    /// and saves. The edited tree must still deserialize as `ClientSettings`.
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), ConfigError> {
        if key.is_empty() {
            return Err(ConfigError::InvalidValue("Key cannot be empty".to_string()));
        }

        let mut tree = serde_json::to_value(&self.settings).map_err(|e| {
            ConfigError::Serialization(format!("Failed to serialize settings: {}", e))
        })?;

        let (parents, leaf) = match key.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, key),
        };
        let mut current = &mut tree;
        for part in parents.into_iter().flat_map(|p| p.split('.')) {
            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::InvalidValue(format!("Unknown key '{}'", key)))?;
        }
        match current {
            serde_json::Value::Object(map) if map.contains_key(leaf) => {
                map.insert(leaf.to_string(), value);
            }
            _ => return Err(ConfigError::InvalidValue(format!("Unknown key '{}'", key))),
        }

        self.settings = serde_json::from_value(tree).map_err(|e| {
            ConfigError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;
        self.save()
    }

    fn reset(&mut self) -> Result<(), ConfigError> {
        self.settings = ClientSettings::default();
        self.save()
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
