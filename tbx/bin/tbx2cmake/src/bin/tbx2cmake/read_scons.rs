// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The `read-scons` command: scan a distribution, run its build scripts
//! and print what was found.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use cliutil::usage_error;
use itertools::Itertools;

use tbx2cmake::reader::read_distribution;

#[derive(Parser, Debug)]
#[command(about = "Reads a tree of build scripts and extracts module and target information")]
pub struct Args {
    /// Root directory of the distribution.
    pub module_dir: PathBuf,
}

pub fn read_scons_main(args: Args) -> Result<()> {
    if !args.module_dir.is_dir() {
        return Err(usage_error(format!(
            "module path {} must be a directory",
            args.module_dir.display()
        )));
    }

    let dist = read_distribution(&args.module_dir)?;

    let with_scripts: Vec<_> = dist
        .modules()
        .filter(|module| module.has_sconscript)
        .sorted_by_key(|module| module.name.clone())
        .collect();
    println!("Found modules (excluding modules without SConscripts):");
    let width = with_scripts
        .iter()
        .map(|module| module.name.len())
        .max()
        .unwrap_or(0);
    for module in &with_scripts {
        println!(
            "  {:width$}  {}",
            module.name,
            module.path.display(),
            width = width
        );
    }

    let all_libs: BTreeSet<&str> = dist
        .targets()
        .flat_map(|(_, target)| target.extra_libs.iter().map(|dep| dep.as_str()))
        .collect();
    let target_names: BTreeSet<&str> = dist
        .targets()
        .map(|(_, target)| target.name.as_str())
        .collect();
    let external: BTreeSet<&str> = all_libs.difference(&target_names).copied().collect();

    println!("All linked libraries: {}", all_libs.iter().join(", "));
    println!("All external: {}", external.iter().join(", "));
    println!(
        "{} targets remaining in {} modules",
        dist.target_count(),
        dist.module_count()
    );

    Ok(())
}
