// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Provides functions common to the Rust-based CLI programs in this tree.

use std::{
    ffi::OsStr,
    process::{ExitCode, Termination},
};

use anyhow::Result;
use itertools::Itertools;
use thiserror::Error;

mod logging;

pub use crate::logging::*;

/// An argument-level error: reported with the message only and exit code 2.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UsageError(pub String);

/// Builds a [`UsageError`] wrapped in [`anyhow::Error`].
pub fn usage_error(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(UsageError(message.into()))
}

/// Wraps a CLI main function to provide the common startup/cleanup logic.
pub fn cli_main<F, T>(main: F, config: LoggingConfig) -> ExitCode
where
    F: FnOnce() -> Result<T>,
    T: Termination,
{
    config.setup().unwrap();
    log_current_command_line();
    handle_top_level_result(main())
}

/// Logs the command line of the current process.
///
/// You don't need this function if you use [`cli_main`] because it calls this
/// function for you.
pub fn log_current_command_line() {
    let escaped_command = std::env::args()
        .map(|s| shell_escape::escape(s.into()))
        .join(" ");
    tracing::debug!("COMMAND: {}", escaped_command);
}

/// Handles the top-level [`Result`] and returns the [`ExitCode`] to report.
pub fn handle_top_level_result<T: Termination>(result: Result<T>) -> ExitCode {
    match result {
        Err(error) => {
            if let Some(usage) = error.downcast_ref::<UsageError>() {
                eprintln!("usage error: {}", usage);
                ExitCode::from(2)
            } else {
                eprintln!("FATAL: {}: {:?}", get_current_process_name(), error);
                ExitCode::FAILURE
            }
        }
        Ok(value) => value.report(),
    }
}

/// Returns the current process name, or `__unknown__` if it failed to get one.
pub fn get_current_process_name() -> String {
    let current_exe = std::env::current_exe().unwrap_or_default();
    current_exe
        .file_name()
        .unwrap_or(OsStr::new("__unknown__"))
        .to_string_lossy()
        .into_owned()
}
