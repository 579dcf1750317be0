//! Bridge configuration.
//!
//! Config file lives at `~/.config/kartridge/bridge.toml` unless a path is
//! given explicitly. Every field is optional:
//!
//! ```toml
//! library_path = "vendor/kongregate.dll"
//! game_id = 123456
//! log_filter = "kartridge_core=debug"
//! log_json = false
//!
//! [settings]      # forwarded to initialize as a JSON object
//! debug = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::KartridgeError;

/// File the SDK reads a game id from when present in the working directory.
/// Meant for local testing only.
pub const LOCAL_GAME_ID_FILE: &str = "kong_gameid.txt";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BridgeConfig {
    /// Path to the vendor shared library. Default: platform name for `kongregate`.
    pub library_path: Option<PathBuf>,
    /// Kongregate game id used for the restart check.
    pub game_id: Option<u32>,
    /// Initialization settings, passed through as JSON.
    pub settings: Option<toml::Table>,
    /// `EnvFilter` directive for logging.
    pub log_filter: Option<String>,
    /// Emit JSON log lines.
    pub log_json: Option<bool>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kartridge")
}

/// Default location of the config file.
pub fn config_path() -> PathBuf {
    config_dir().join("bridge.toml")
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, KartridgeError> {
        let text = std::fs::read_to_string(path).map_err(|source| KartridgeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| KartridgeError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from [`config_path`], falling back to defaults if the file is
    /// missing or unreadable.
    pub fn load_default() -> Self {
        let path = config_path();
        if !path.exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("{e}; using defaults");
            Self::default()
        })
    }

    /// Library path to open: configured, or the platform default name.
    pub fn library_path(&self) -> PathBuf {
        self.library_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::vendor::library::default_library_name()))
    }

    /// The `[settings]` table as the JSON string `initialize` expects.
    pub fn settings_json(&self) -> Result<Option<String>, KartridgeError> {
        self.settings
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(KartridgeError::from)
    }
}

/// Read the game id from `kong_gameid.txt` in `dir`, if the file exists.
///
/// A file that doesn't hold a number is reported and treated as absent.
pub fn local_game_id(dir: &Path) -> Result<Option<u32>, KartridgeError> {
    let path = dir.join(LOCAL_GAME_ID_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path).map_err(|source| KartridgeError::Io {
        path: path.clone(),
        source,
    })?;
    match text.trim().parse() {
        Ok(id) => Ok(Some(id)),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring malformed game id file: {e}");
            Ok(None)
        }
    }
}

/// Log whether the SDK will pick up a local game id file from the working
/// directory. A release build carrying one is a packaging mistake.
pub fn check_local_game_id_file() {
    let Ok(dir) = std::env::current_dir() else {
        return;
    };
    match local_game_id(&dir) {
        Ok(Some(id)) if cfg!(debug_assertions) => {
            tracing::info!(game_id = id, "{LOCAL_GAME_ID_FILE} present, SDK will use it");
        }
        Ok(Some(id)) => {
            tracing::warn!(game_id = id, "{LOCAL_GAME_ID_FILE} present in a release build; do not ship it");
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("{e}"),
    }
}
