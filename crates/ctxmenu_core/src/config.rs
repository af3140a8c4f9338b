//! Injected configuration values.
//!
//! # Responsibility
//! - Hold every tunable the validator and manager consult.
//! - Load/save the operator configuration file (JSON).
//!
//! # Invariants
//! - Core components receive configuration at construction and never read
//!   ambient process state.
//! - Every field has a default, so partial files are valid.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Default upper bound for one command string, in characters.
pub const DEFAULT_MAX_COMMAND_LENGTH: usize = 2048;
/// Default upper bound for icon files.
pub const DEFAULT_MAX_ICON_SIZE_BYTES: u64 = 10 * 1024 * 1024;
/// Default upper bound for entries in one interchange document.
pub const DEFAULT_MAX_IMPORT_COUNT: usize = 1000;

const DEFAULT_TRUSTED_EXECUTABLES: &[&str] = &[
    "notepad.exe",
    "code.exe",
    "cmd.exe",
    "powershell.exe",
    "pwsh.exe",
    "explorer.exe",
    "mspaint.exe",
    "calc.exe",
    "wordpad.exe",
    "python.exe",
    "pythonw.exe",
    "git.exe",
    "vim.exe",
    "wt.exe",
];

/// Security validator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub max_command_length: usize,
    pub max_icon_size_bytes: u64,
    /// Executable basenames that bypass the on-disk existence check.
    ///
    /// Compared case-insensitively; `notepad` and `notepad.exe` are equal.
    pub trusted_executables: BTreeSet<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_command_length: DEFAULT_MAX_COMMAND_LENGTH,
            max_icon_size_bytes: DEFAULT_MAX_ICON_SIZE_BYTES,
            trusted_executables: DEFAULT_TRUSTED_EXECUTABLES
                .iter()
                .map(|value| value.to_string())
                .collect(),
        }
    }
}

impl ValidatorConfig {
    /// Returns a config whose whitelist holds exactly `executables`.
    pub fn with_trusted_executables<I, S>(mut self, executables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_executables = executables.into_iter().map(Into::into).collect();
        self
    }
}

/// Top-level operator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub validator: ValidatorConfig,
    pub max_import_count: usize,
    /// Trusted external fact; see `capability::StaticCapabilities`.
    pub supports_modern_menu_style: bool,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            validator: ValidatorConfig::default(),
            max_import_count: DEFAULT_MAX_IMPORT_COUNT,
            supports_modern_menu_style: false,
            log_level: crate::logging::default_log_level().to_string(),
        }
    }
}

impl AppConfig {
    /// Loads a config file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "event=config_load module=config status=ok source=default path={}",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(err) => return Err(ConfigError::Io(err)),
        };

        let config: Self = serde_json::from_str(&text).map_err(ConfigError::Parse)?;
        info!(
            "event=config_load module=config status=ok source=file path={} trusted_executables={}",
            path.display(),
            config.validator.trusted_executables.len()
        );
        Ok(config)
    }

    /// Writes this config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(ConfigError::Parse)?;
        std::fs::write(path, text).map_err(ConfigError::Io)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, ValidatorConfig, DEFAULT_MAX_COMMAND_LENGTH};

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "supports_modern_menu_style": true }"#)
                .expect("partial config should parse");
        assert!(config.supports_modern_menu_style);
        assert_eq!(
            config.validator.max_command_length,
            DEFAULT_MAX_COMMAND_LENGTH
        );
        assert!(config.validator.trusted_executables.contains("notepad.exe"));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig::load(dir.path().join("absent.json")).expect("defaults");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn save_then_load_preserves_whitelist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ctxmenu.json");
        let config = AppConfig {
            validator: ValidatorConfig::default().with_trusted_executables(["tool.exe"]),
            ..AppConfig::default()
        };
        config.save(&path).expect("save");

        let loaded = AppConfig::load(&path).expect("load");
        assert_eq!(loaded.validator.trusted_executables.len(), 1);
        assert!(loaded.validator.trusted_executables.contains("tool.exe"));
    }
}
