//! namelock - keeps every member of a locked group on one nickname.
//!
//! The binary is a line-oriented host for [`namelock_engine::Reconciler`]:
//!
//! ```text
//! stdin (JSON lines) -> Driver -> per-group worker -> Reconciler::dispatch
//!                                                         |
//!                                                         v
//!                            ConsolePlatform / outcomes -> stdout (JSON lines)
//! ```
//!
//! Logs go to `~/.namelock/logs/namelock.log` so stdout stays machine-readable.

mod console;
mod driver;

use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use namelock_config::NamelockConfig;
use namelock_engine::{JsonFileStore, Reconciler};

use crate::console::{ConsolePlatform, Emitter};
use crate::driver::Driver;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // stdout carries output lines, so logs fall back to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = namelock_config::data_dir() {
        candidates.push(dir.join("logs").join("namelock.log"));
    }
    candidates.push(PathBuf::from(".namelock").join("logs").join("namelock.log"));

    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = NamelockConfig::load()
        .context("failed to load namelock config")?
        .unwrap_or_default();
    let settings = config.reconcile_settings();
    let store_path = config
        .store_path()
        .context("no home directory; set [store] path in the config")?;

    tracing::info!(
        store = %store_path.display(),
        admins = settings.admins.len(),
        admin_override = settings.admin_override.as_str(),
        "Starting namelock"
    );

    let emitter = Emitter::stdout();
    let platform = Arc::new(ConsolePlatform::new(emitter.clone()));
    let reconciler = Reconciler::with_system_clock(
        platform.clone(),
        Arc::new(JsonFileStore::new(store_path)),
        settings,
    );

    let stats = Driver::new(reconciler, platform, emitter)
        .run(BufReader::new(tokio::io::stdin()))
        .await
        .context("failed to read input")?;

    tracing::info!(
        lines = stats.lines,
        dispatched = stats.dispatched,
        skipped = stats.skipped,
        "Input exhausted"
    );
    Ok(())
}
