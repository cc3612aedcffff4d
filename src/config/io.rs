//! Config I/O operations: load and save.

use std::path::{Path, PathBuf};

use crate::config::config_struct::Config;

/// Environment variable that overrides the stored API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

// ============================================================================
// CONFIG PATH
// ============================================================================

/// Get the config file path
pub fn get_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_default()
        .join("live-interpreter");
    let _ = std::fs::create_dir_all(&config_dir);
    config_dir.join("config.json")
}

// ============================================================================
// CONFIG LOADING
// ============================================================================

/// Load config from the default location, applying the environment override
pub fn load_config() -> Config {
    let mut config = load_config_from(&get_config_path());

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            config.gemini_api_key = key.trim().to_string();
        }
    }

    config
}

/// Load config from a file. Missing or malformed files yield defaults.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("[Config] Failed to read {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&data) {
        Ok(c) => c,
        Err(e) => {
            log::warn!("[Config] Ignoring malformed {}: {}", path.display(), e);
            Config::default()
        }
    }
}

// ============================================================================
// CONFIG SAVING
// ============================================================================

/// Save config to the default location
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    save_config_to(config, &get_config_path())
}

/// Save config to a file as pretty JSON
pub fn save_config_to(config: &Config, path: &Path) -> anyhow::Result<()> {
    let data = serde_json::to_string_pretty(config)?;
    std::fs::write(path, data)?;
    Ok(())
}
