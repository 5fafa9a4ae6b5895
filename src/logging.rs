/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

//! Diagnostic logging.
//!
//! ```bash
//! NESH_LOG=debug nesh complete "fs."
//! NESH_LOG="nesh::completion=trace" nesh complete "ls('sr"
//! ```
//!
//! Output always goes to stderr so it never mixes with the JSON printed on
//! stdout.

use tracing_subscriber::EnvFilter;

const LOG_VAR: &str = "NESH_LOG";

/// `NESH_LOG` wins over `RUST_LOG` when both are set.
fn build_filter() -> EnvFilter {
    match std::env::var(LOG_VAR) {
        Ok(directives) => EnvFilter::builder().parse_lossy(directives),
        Err(_) => EnvFilter::from_default_env(),
    }
}

/// Installs the global subscriber.
///
/// Does nothing unless `NESH_LOG` or `RUST_LOG` is set. Calling it twice is
/// harmless.
pub fn init() {
    if std::env::var_os(LOG_VAR).is_none() && std::env::var_os("RUST_LOG").is_none() {
        return;
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter())
        .with_writer(std::io::stderr)
        .try_init();
}
