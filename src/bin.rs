/*
 * Copyright (c) 2025 Raphael Amorim
 *
 * This file is part of nesh, which is licensed
 * under GNU General Public License v3.0.
 */

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nesh::completion::Completer;
use nesh::config::Config;
use nesh::live::Session;
use nesh::live::memory::MemoryEnvironment;
use nesh::path::PathCompleter;
use nesh::logging;

#[derive(Parser)]
#[command(name = "nesh", version, about = "Completion engine for a scripting shell")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Complete a line of script source and print the result as JSON
    Complete {
        source: String,
        /// Byte offset of the cursor, defaults to the end of the source
        #[arg(long)]
        cursor: Option<usize>,
        /// Command line of a live environment process to introspect
        #[arg(long, num_args = 1.., value_name = "CMD")]
        env_command: Option<Vec<String>>,
        /// Directory relative paths are completed against
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Complete a filesystem path the way shell commands do
    Paths {
        line: String,
        /// Only offer directories
        #[arg(long)]
        dirs: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let mut config = Config::load().context("loading configuration")?;

    match cli.command {
        Command::Complete {
            source,
            cursor,
            env_command,
            cwd,
        } => {
            if env_command.is_some() {
                config.env_command = env_command;
            }
            if cwd.is_some() {
                config.cwd = cwd;
            }

            let session = open_session(&config)?;
            let completer = Completer::with_config(session.clone(), config);
            let completion = completer.complete(&source, cursor).await;
            println!("{}", serde_json::to_string(&completion)?);

            session.shutdown().await.ok();
        }
        Command::Paths { line, dirs } => {
            let completer = PathCompleter::new(config.base_dir());
            let (items, prefix) = if dirs {
                completer.dirs(&line)
            } else {
                completer.items(Some(&line)).unwrap_or_default()
            };
            println!("{}", serde_json::to_string(&(items, prefix))?);
        }
    }

    Ok(())
}

fn open_session(config: &Config) -> Result<Session> {
    match &config.env_command {
        #[cfg(feature = "process")]
        Some(argv) => {
            let environment =
                nesh::live::client::ProcessEnvironment::spawn(argv, config.request_timeout())
                    .with_context(|| format!("starting `{}`", argv.join(" ")))?;
            Ok(Arc::new(environment))
        }
        #[cfg(not(feature = "process"))]
        Some(_) => anyhow::bail!("built without process support"),
        None => Ok(Arc::new(MemoryEnvironment::shell())),
    }
}
