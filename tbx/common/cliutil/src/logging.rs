// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use anyhow::{Context, Result};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// An environment variable choosing whether to log to the console.
/// If "0", don't log to the console.
/// Otherwise, do log to the console.
pub const CONSOLE_LOG_ENV: &str = "TBX_LOG_CONSOLE";

/// The configuration for the logger.
pub struct LoggingConfig {
    /// A filter for which logs should be written to the console.
    /// If None, logs will not be written to the console.
    pub console_logger: Option<EnvFilter>,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        let console_logger = match std::env::var(CONSOLE_LOG_ENV).ok().as_deref() {
            Some("0") => None,
            _ => Some(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env()?,
            ),
        };

        Ok(Self { console_logger })
    }

    /// Sets up the standard tracing subscriber in accordance with the config.
    pub fn setup(self) -> Result<()> {
        if let Some(filter) = self.console_logger {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| anyhow::anyhow!("{err}"))
                .context(
                    "Failed to start tracing. You probably already have a log subscriber running.",
                )?;
        }
        Ok(())
    }
}
