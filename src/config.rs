/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

//! Completer configuration loaded from TOML.
//!
//! ```toml
//! module_dir = "node_modules"
//! load_modules = true
//! request_timeout_ms = 2000
//! env_command = ["node", "nesh-env.js"]
//! cwd = "/home/me/project"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = ".neshrc.toml";
const CONFIG_VAR: &str = "NESH_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Directory, relative to the working directory, searched first when an
    /// identifier is loaded as a module.
    pub module_dir: String,
    /// Whether identifiers are loaded as modules before completing them.
    pub load_modules: bool,
    /// Upper bound for one round-trip to the live environment.
    pub request_timeout_ms: u64,
    /// Command line of the live environment process.
    pub env_command: Option<Vec<String>>,
    /// Base directory for relative path completion.
    pub cwd: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            module_dir: "node_modules".to_string(),
            load_modules: true,
            request_timeout_ms: 2000,
            env_command: None,
            cwd: None,
        }
    }
}

impl Config {
    /// `$NESH_CONFIG`, or `~/.neshrc.toml`
    pub fn default_path() -> Option<PathBuf> {
        match std::env::var_os(CONFIG_VAR) {
            Some(path) => Some(PathBuf::from(path)),
            None => dirs::home_dir().map(|home| home.join(CONFIG_FILE)),
        }
    }

    /// Loads the configuration from its default location and applies the
    /// environment overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `NESH_MODULE_DIR` and `NESH_TIMEOUT_MS` as returned by `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("NESH_MODULE_DIR") {
            self.module_dir = dir;
        }

        if let Some(timeout) = lookup("NESH_TIMEOUT_MS") {
            self.request_timeout_ms =
                timeout
                    .trim()
                    .parse()
                    .map_err(|err| ConfigError::InvalidValue {
                        key: "NESH_TIMEOUT_MS".to_string(),
                        reason: format!("{err}"),
                    })?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.module_dir.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "module_dir".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if matches!(&self.env_command, Some(argv) if argv.is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "env_command".to_string(),
                reason: "must name a program".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The configured working directory, else the process's own
    pub fn base_dir(&self) -> PathBuf {
        match &self.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.module_dir, "node_modules");
        assert!(config.load_modules);
        assert_eq!(config.request_timeout(), Duration::from_millis(2000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "load_modules = false").unwrap();
        writeln!(file, "env_command = [\"node\", \"env.js\"]").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert!(!config.load_modules);
        assert_eq!(config.module_dir, "node_modules");
        assert_eq!(
            config.env_command,
            Some(vec!["node".to_string(), "env.js".to_string()])
        );
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request_timeout_ms = \"soon\"").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "request_timeout_ms = 0").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "request_timeout_ms"));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load_from(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(|key| match key {
                "NESH_MODULE_DIR" => Some("vendor".to_string()),
                "NESH_TIMEOUT_MS" => Some("150".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.module_dir, "vendor");
        assert_eq!(config.request_timeout_ms, 150);

        let err = config
            .apply_overrides(|key| (key == "NESH_TIMEOUT_MS").then(|| "fast".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
