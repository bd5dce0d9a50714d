// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

mod convert;
mod read_scons;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cliutil::LoggingConfig;

use crate::convert::convert_main;
use crate::read_scons::read_scons_main;

#[derive(Parser, Debug)]
#[command(multicall(true))]
struct Cli {
    #[clap(subcommand)]
    executables: Executables,
}

#[derive(Subcommand, Debug)]
enum Executables {
    /// Scans a distribution, runs its build scripts and dumps diagnostics.
    #[command(name = "read-scons")]
    ReadScons(read_scons::Args),

    /// Converts a distribution into a CMakeLists tree.
    #[command(name = "tbx2cmake")]
    Tbx2Cmake(convert::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let logging = match LoggingConfig::from_env() {
        Ok(logging) => logging,
        Err(err) => {
            eprintln!("FATAL: {err:?}");
            return ExitCode::FAILURE;
        }
    };
    cliutil::cli_main(
        || match cli.executables {
            Executables::ReadScons(args) => read_scons_main(args),
            Executables::Tbx2Cmake(args) => convert_main(args),
        },
        logging,
    )
}
