// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The `tbx2cmake` command: the full conversion pipeline.
//!
//! No root CMakeLists.txt is created. Instead, an `autogen_CMakeLists.txt`
//! file is written in the root output directory, to be included by a
//! hand-maintained root CMakeLists.txt.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use cliutil::usage_error;

use tbx2cmake::autogen::AutogenSpec;
use tbx2cmake::output::write_distribution;
use tbx2cmake::postprocess;
use tbx2cmake::reader::read_distribution;

#[derive(Parser, Debug)]
#[command(about = "Converts a distribution of build scripts into CMake build files")]
pub struct Args {
    /// Root directory of the distribution.
    pub module_dir: PathBuf,

    /// The autogen YAML file with generated-source and dependency data.
    pub autogen: PathBuf,

    /// Output directory; created if missing.
    pub output_dir: PathBuf,
}

pub fn convert_main(args: Args) -> Result<()> {
    if !args.module_dir.is_dir() {
        return Err(usage_error(format!(
            "module path {} must be a directory",
            args.module_dir.display()
        )));
    }
    if args.output_dir.is_file() {
        return Err(usage_error(format!(
            "output path {} is a file; specify a directory or the name of one to create",
            args.output_dir.display()
        )));
    }

    tracing::info!("Reading distribution");
    let mut dist = read_distribution(&args.module_dir)?;
    tracing::info!(
        "Read {} targets in {} modules",
        dist.target_count(),
        dist.module_count()
    );

    let autogen = AutogenSpec::load(&args.autogen)?;
    postprocess::resolve(&mut dist, &autogen)?;

    write_distribution(&dist, &args.output_dir)?;
    tracing::info!("Wrote build files to {}", args.output_dir.display());

    Ok(())
}
