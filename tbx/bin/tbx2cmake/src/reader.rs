// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reads a whole distribution: discovery, ordering, and script emulation.

use std::path::Path;

use anyhow::Result;
use itertools::Itertools;

use crate::discovery;
use crate::distribution::Distribution;
use crate::emulator::SconsEmulator;
use crate::postprocess;

/// Parses all modules and their build scripts in a distribution root.
pub fn read_module_scripts(module_path: &Path) -> Result<Distribution> {
    let mut dist = discovery::discover(module_path)?;

    let order = discovery::build_order(&dist)?;
    tracing::debug!("Dependency processing order: {}", order.iter().join(", "));

    let emu = SconsEmulator::new(module_path);
    let mut interp = SconsEmulator::make_interp();

    for name in &order {
        let Some(module) = dist.get_module(name) else {
            continue;
        };
        if !module.has_sconscript {
            continue;
        }
        tracing::info!("Parsing {}", name);
        let module_path = module.path.clone();
        let targets = emu.run_module_script(&mut interp, &module_path)?;
        if let Some(module) = dist.get_module_mut(name) {
            module.targets = targets;
        }
    }

    tracing::info!("Processing of SConscripts done.");
    tracing::info!("{} targets recognised", dist.target_count());

    Ok(dist)
}

/// Reads a distribution and runs the graph-only post-processing, leaving it
/// ready for output conversion.
pub fn read_distribution(module_path: &Path) -> Result<Distribution> {
    let mut dist = read_module_scripts(module_path)?;
    postprocess::prepare(&mut dist)?;
    Ok(dist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::write_files;

    #[test]
    fn reads_a_small_distribution() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            [
                ("libtbx/libtbx_config", "{}"),
                (
                    "alpha/libtbx_config",
                    "{\"modules_required_for_build\": []}",
                ),
                (
                    "alpha/SConscript",
                    "env = Environment()\n\
                     env.SharedLibrary(target='#lib/alpha_core', source=['core.cpp'])\n",
                ),
                ("alpha/core.cpp", ""),
            ],
        )
        .unwrap();
        let dist = read_distribution(dir.path()).unwrap();
        assert_eq!(dist.module_count(), 2);
        assert_eq!(dist.target_count(), 1);
        let (module, target) = dist.targets().next().unwrap();
        assert_eq!(module.name, "alpha");
        assert_eq!(target.name, "alpha_core");
    }

    #[test]
    fn module_without_sconscript_contributes_no_targets() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            [(
                "quiet/libtbx_config",
                "{\"modules_required_for_build\": []}",
            )],
        )
        .unwrap();
        let dist = read_distribution(dir.path()).unwrap();
        assert_eq!(dist.module_count(), 1);
        assert_eq!(dist.target_count(), 0);
    }

    #[test]
    fn exports_flow_between_modules_in_dependency_order() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            [
                ("libtbx/SConscript", "env_base = Environment()\nExport('env_base')\n"),
                ("libtbx/libtbx_config", "{}"),
                (
                    "user/libtbx_config",
                    "{\"modules_required_for_build\": [\"libtbx\"]}",
                ),
                (
                    "user/SConscript",
                    "Import('env_base')\n\
                     env = env_base.Clone()\n\
                     env.SharedLibrary(target='#lib/user', source=['u.cpp'])\n",
                ),
                ("user/u.cpp", ""),
            ],
        )
        .unwrap();
        let dist = read_distribution(dir.path()).unwrap();
        assert_eq!(dist.target_count(), 1);
    }
}
