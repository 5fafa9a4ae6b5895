/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures talking to the live environment.
///
/// The completer never surfaces these; they are logged and the request
/// degrades to "no completion".
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("failed to start environment process: {0}")]
    Spawn(#[source] io::Error),

    #[error("environment I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("environment closed the connection")]
    Closed,

    #[error("environment did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed environment message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("environment error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("unknown object id: {0}")]
    UnknownObject(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
}
