use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_program")]
    pub default_program: String,
    #[serde(default)]
    pub auto_yes: bool,
}

fn default_program() -> String {
    "claude".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_program: default_program(),
            auto_yes: false,
        }
    }
}

impl AppConfig {
    // A blank program would make every new session fail at start, so a
    // config that clears it falls back to the default instead.
    fn normalized(mut self) -> Self {
        let trimmed = self.default_program.trim();
        self.default_program = if trimmed.is_empty() {
            default_program()
        } else {
            trimmed.to_string()
        };
        self
    }
}

fn config_directory() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir() {
        return Some(path.join("squad"));
    }

    dirs::home_dir().map(|path| path.join(".config").join("squad"))
}

pub fn config_path() -> Option<PathBuf> {
    config_directory().map(|path| path.join("config.toml"))
}

pub fn state_path() -> Option<PathBuf> {
    config_directory().map(|path| path.join("state.json"))
}

pub fn load() -> Result<AppConfig, String> {
    let path = config_path().ok_or_else(|| "cannot resolve config path".to_string())?;
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<AppConfig, String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AppConfig::default());
        }
        Err(error) => {
            return Err(format!("cannot read config {}: {error}", path.display()));
        }
    };

    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    let parsed: AppConfig = toml::from_str(&raw)
        .map_err(|error| format!("config {} is not valid TOML: {error}", path.display()))?;
    Ok(parsed.normalized())
}

// Saved the same way the session state is: encode, write a sibling tmp
// file, rename over the target.
pub fn save_to_path(path: &Path, config: &AppConfig) -> Result<(), String> {
    let parent = path
        .parent()
        .ok_or_else(|| format!("config path {} has no parent directory", path.display()))?;
    fs::create_dir_all(parent)
        .map_err(|error| format!("cannot create config directory {}: {error}", parent.display()))?;

    let encoded = toml::to_string_pretty(config)
        .map_err(|error| format!("cannot encode config: {error}"))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, encoded)
        .map_err(|error| format!("cannot write config {}: {error}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .map_err(|error| format!("cannot move config into place at {}: {error}", path.display()))
}
