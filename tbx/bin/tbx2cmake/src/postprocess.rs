// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Post-processing of the recorded build graph: pruning, deduplication,
//! classification, and source resolution against the generated-file
//! manifest.
//!
//! `prepare` runs the steps that need nothing but the graph itself;
//! `resolve` runs the steps that consume the autogen data and the
//! distribution on disk. Between them the steps run in the fixed order the
//! rest of the pipeline depends on.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use itertools::Itertools;

use crate::autogen::AutogenSpec;
use crate::discovery::SUB_REPOSITORY;
use crate::distribution::{Distribution, TargetType};
use crate::pathutil::{normalize, normalize_str};

/// Library targets provided externally by the emitted build.
const BOOST_TARGET_NAMES: &[&str] = &["boost_thread", "boost_system", "boost_python", "boost_chrono"];

/// Modules with broken cross-references that never convert.
const PRUNED_MODULES: &[&str] = &["clipper", "clipper_adaptbx"];

/// Shared-source lists that are known to be safe to fold into the target's
/// own sources.
const KNOWN_IGNORABLE_SHARED: &[&[&str]] = &[
    &["numpy_bridge.cpp"],
    &["lbfgs_fem.cpp"],
    &["boost_python/outlier_helpers.cc"],
    &["nanoBragg_ext.cpp", "nanoBragg.cpp"],
];

/// Repository roots tried, in order, when resolving `#`-prefixed sources.
const REPOSITORY_PREFIXES: &[&str] = &["", SUB_REPOSITORY];

/// Steps that need only the recorded graph: boost pruning, module pruning,
/// name deduplication, python-extension classification and shared-source
/// collapse.
pub fn prepare(dist: &mut Distribution) -> Result<()> {
    prune_boost_targets(dist);
    prune_modules(dist);
    deduplicate_target_names(dist)?;
    classify_python_extensions(dist)?;
    collapse_shared_sources(dist)?;
    check_invariants(dist)
}

/// Steps that need the autogen data and the distribution on disk: source
/// resolution, forced dependencies and include-path injection.
pub fn resolve(dist: &mut Distribution, autogen: &AutogenSpec) -> Result<()> {
    apply_refresh_manifest(dist, autogen);
    let manifest = generated_manifest(dist, autogen);
    resolve_repository_sources(dist, &manifest)?;
    check_source_gaps(dist, &manifest)?;
    inject_dependencies(dist, autogen);
    inject_include_paths(dist, autogen);
    check_invariants(dist)
}

fn prune_boost_targets(dist: &mut Distribution) {
    for (module, target) in dist.targets() {
        if BOOST_TARGET_NAMES.contains(&target.name.as_str()) {
            tracing::info!("Removing target {} (in {})", target.name, module.name);
        }
    }
    dist.remove_targets(|target| BOOST_TARGET_NAMES.contains(&target.name.as_str()));
}

fn prune_modules(dist: &mut Distribution) {
    for name in PRUNED_MODULES {
        if let Some(module) = dist.remove_module(name) {
            tracing::info!(
                "Removing module {} ({} targets)",
                name,
                module.targets.len()
            );
        }
    }
}

/// Renames duplicated target names to `<name>_<module>`. Two targets with
/// the same name must come from distinct modules.
fn deduplicate_target_names(dist: &mut Distribution) -> Result<()> {
    let mut owners: HashMap<String, Vec<String>> = HashMap::new();
    for (module, target) in dist.targets() {
        owners
            .entry(target.name.clone())
            .or_default()
            .push(module.name.clone());
    }

    let duplicated: BTreeSet<String> = owners
        .iter()
        .filter(|(_, modules)| modules.len() > 1)
        .map(|(name, _)| name.clone())
        .collect();
    for name in &duplicated {
        let modules = &owners[name];
        if modules.iter().unique().count() != modules.len() {
            bail!(
                "module name not enough to disambiguate duplicate targets named {} (in {})",
                name,
                modules.iter().join(", ")
            );
        }
    }

    dist.for_each_target_mut(|module_name, target| {
        if duplicated.contains(&target.name) {
            let old = target.name.clone();
            target.name = format!("{}_{}", target.name, module_name);
            tracing::info!("Renaming target {} to {}", old, target.name);
        }
        Ok(())
    })?;

    let mut seen = BTreeSet::new();
    for (_, target) in dist.targets() {
        if !seen.insert(target.name.clone()) {
            bail!("deduplication failed: {} still collides", target.name);
        }
    }
    Ok(())
}

/// A boost-python target without a library prefix is a loadable extension.
fn classify_python_extensions(dist: &mut Distribution) -> Result<()> {
    dist.for_each_target_mut(|_, target| {
        if target.boost_python && target.prefix.is_empty() {
            target.target_type = TargetType::Module;
        }
        Ok(())
    })
}

/// Folds known-safe shared-source lists into the owning target's sources.
fn collapse_shared_sources(dist: &mut Distribution) -> Result<()> {
    dist.for_each_target_mut(|_, target| {
        if target.shared_sources.is_empty() {
            return Ok(());
        }
        for shared in &target.shared_sources {
            let known = KNOWN_IGNORABLE_SHARED
                .iter()
                .any(|candidate| candidate.iter().copied().eq(shared.iter().map(|s| s.as_str())));
            if !known {
                bail!(
                    "target {} uses an unrecognised shared-source list: [{}]",
                    target.name,
                    shared.iter().join(", ")
                );
            }
        }
        let folded: Vec<String> = target.shared_sources.drain(..).flatten().collect();
        target.sources.extend(folded);
        Ok(())
    })
}

/// Records each module's refresh outputs on the module itself. The
/// generated-file manifest is assembled from these sets, so a refresh entry
/// that names no known module drops out of resolution.
fn apply_refresh_manifest(dist: &mut Distribution, autogen: &AutogenSpec) {
    for (module_name, paths) in &autogen.libtbx_refresh {
        match dist.get_module_mut(module_name) {
            Some(module) => {
                module.generated = paths
                    .iter()
                    .map(|path| normalize_str(path))
                    .collect();
            }
            None => tracing::warn!(
                "autogen refresh entry for unknown module {module_name}; \
                 its generated sources are ignored"
            ),
        }
    }
}

/// The generated-source paths of every module, plus the extras not tied to
/// a refresh step.
fn generated_manifest(dist: &Distribution, autogen: &AutogenSpec) -> BTreeSet<String> {
    dist.modules()
        .flat_map(|module| module.generated.iter().cloned())
        .chain(autogen.other_generated.iter().map(|path| normalize_str(path)))
        .collect()
}

/// Resolves `#`-prefixed sources: generated files move to the generated
/// set, repository files are rewritten relative to the target's origin,
/// anything else is collected and reported as fatal.
fn resolve_repository_sources(dist: &mut Distribution, manifest: &BTreeSet<String>) -> Result<()> {
    let root = dist.module_path.clone();
    let mut unknown: BTreeSet<String> = BTreeSet::new();

    dist.for_each_target_mut(|_, target| {
        let mut kept: Vec<String> = Vec::new();
        for source in std::mem::take(&mut target.sources) {
            let Some(rest) = source.strip_prefix('#') else {
                kept.push(source);
                continue;
            };
            let rest = rest.trim_start_matches('/');
            let normalized = normalize_str(rest);
            if manifest.contains(&normalized) {
                target.generated_sources.insert(normalized);
                continue;
            }
            let resolved = REPOSITORY_PREFIXES.iter().find_map(|prefix| {
                let candidate = normalize(&Path::new(prefix).join(rest));
                root.join(&candidate).is_file().then_some(candidate)
            });
            match resolved {
                Some(candidate) => {
                    let relative = pathdiff::diff_paths(&candidate, &target.origin_path)
                        .unwrap_or_else(|| candidate.clone());
                    kept.push(relative.to_string_lossy().into_owned());
                }
                None => {
                    unknown.insert(source.clone());
                    kept.push(source);
                }
            }
        }
        target.sources = kept;
        Ok(())
    })?;

    if !unknown.is_empty() {
        bail!(
            "unknown repository-prefixed sources: {}",
            unknown.iter().join(", ")
        );
    }
    Ok(())
}

/// Every remaining source must exist on disk relative to its target's
/// origin, or resolve against the generated-file manifest under
/// `<module_name>/<rel>/<source>`.
fn check_source_gaps(dist: &mut Distribution, manifest: &BTreeSet<String>) -> Result<()> {
    let root = dist.module_path.clone();
    let module_paths: HashMap<String, PathBuf> = dist
        .modules()
        .map(|module| (module.name.clone(), module.path.clone()))
        .collect();

    dist.for_each_target_mut(|module_name, target| {
        let mut kept: Vec<String> = Vec::new();
        for source in std::mem::take(&mut target.sources) {
            let on_disk = normalize(&root.join(&target.origin_path).join(&source));
            if on_disk.is_file() {
                kept.push(source);
                continue;
            }

            let module_path = module_paths
                .get(module_name)
                .context("module path table is in sync")?;
            let rel = target
                .origin_path
                .strip_prefix(module_path)
                .unwrap_or_else(|_| Path::new(""));
            let key = normalize(&Path::new(module_name).join(rel).join(&source))
                .to_string_lossy()
                .into_owned();
            if manifest.contains(&key) {
                target.generated_sources.insert(key);
                continue;
            }
            bail!(
                "source {} of target {} neither exists at {} nor appears in the generated manifest",
                source,
                target.name,
                on_disk.display()
            );
        }
        target.sources = kept;
        Ok(())
    })
}

fn inject_dependencies(dist: &mut Distribution, autogen: &AutogenSpec) {
    for (target_name, deps) in &autogen.dependencies {
        match dist.find_target_mut(target_name) {
            Some(target) => {
                target
                    .extra_libs
                    .extend(deps.iter().map(|dep| dep.to_string()));
            }
            None => tracing::warn!(
                "autogen dependency entry for unknown target {target_name}"
            ),
        }
    }
}

fn inject_include_paths(dist: &mut Distribution, autogen: &AutogenSpec) {
    for (name, paths) in &autogen.target_includes {
        if let Some(target) = dist.find_target_mut(name) {
            target
                .include_paths
                .extend(paths.iter().map(|path| path.to_string()));
        } else if let Some(module) = dist.get_module_mut(name) {
            module
                .include_paths
                .extend(paths.iter().map(|path| path.to_string()));
        } else {
            tracing::warn!("autogen include entry for unknown target or module {name}");
        }
    }
}

/// The invariants every later stage relies on.
fn check_invariants(dist: &Distribution) -> Result<()> {
    for (module, target) in dist.targets() {
        match target.target_type {
            TargetType::Shared | TargetType::Static => {
                if target.prefix != "lib" {
                    bail!(
                        "library target {} (in {}) has prefix {:?}, expected \"lib\"",
                        target.name,
                        module.name,
                        target.prefix
                    );
                }
            }
            TargetType::Module => {
                if !target.prefix.is_empty() {
                    bail!(
                        "extension target {} (in {}) has prefix {:?}, expected none",
                        target.name,
                        module.name,
                        target.prefix
                    );
                }
            }
            TargetType::Program => {}
        }
        if !target.shared_sources.is_empty() {
            bail!(
                "target {} still carries shared sources after post-processing",
                target.name
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{Module, Target};
    use crate::testutils::write_files;
    use std::path::PathBuf;

    fn target(name: &str, target_type: TargetType, origin: &str) -> Target {
        let mut target = Target::new(name, target_type, PathBuf::from(origin));
        if matches!(target.target_type, TargetType::Shared | TargetType::Static) {
            target.prefix = "lib".to_string();
        }
        target
    }

    fn dist_with(modules: Vec<Module>) -> Distribution {
        let mut dist = Distribution::new(Path::new("/nonexistent"));
        for module in modules {
            dist.insert_module(module).unwrap();
        }
        dist
    }

    #[test]
    fn boost_targets_are_pruned() {
        let mut module = Module::new("boost_adaptbx", PathBuf::from("boost_adaptbx"));
        module
            .targets
            .push(target("boost_python", TargetType::Shared, "boost_adaptbx"));
        module
            .targets
            .push(target("kept", TargetType::Shared, "boost_adaptbx"));
        let mut dist = dist_with(vec![module]);
        prepare(&mut dist).unwrap();
        let names: Vec<_> = dist.targets().map(|(_, t)| t.name.clone()).collect();
        assert_eq!(names, vec!["kept"]);
    }

    #[test]
    fn pruned_modules_take_their_targets_along() {
        let mut clipper = Module::new("clipper", PathBuf::from("clipper"));
        clipper
            .targets
            .push(target("clipper_lib", TargetType::Shared, "clipper"));
        let dist = &mut dist_with(vec![clipper, Module::new("kept", PathBuf::from("kept"))]);
        prepare(dist).unwrap();
        assert!(dist.get_module("clipper").is_none());
        assert_eq!(dist.target_count(), 0);
    }

    #[test]
    fn duplicate_names_are_renamed_per_module() {
        let mut a = Module::new("A", PathBuf::from("A"));
        a.targets.push(target("util", TargetType::Shared, "A"));
        let mut b = Module::new("B", PathBuf::from("B"));
        b.targets.push(target("util", TargetType::Shared, "B"));
        let mut dist = dist_with(vec![a, b]);
        prepare(&mut dist).unwrap();
        let names: Vec<_> = dist.targets().map(|(_, t)| t.name.clone()).collect();
        assert_eq!(names, vec!["util_A", "util_B"]);
        // The output file stem is untouched by the rename.
        assert!(dist.targets().all(|(_, t)| t.filename == "util"));
    }

    #[test]
    fn duplicates_within_one_module_are_fatal() {
        let mut module = Module::new("A", PathBuf::from("A"));
        module.targets.push(target("util", TargetType::Shared, "A"));
        module.targets.push(target("util", TargetType::Static, "A"));
        let mut dist = dist_with(vec![module]);
        assert!(prepare(&mut dist).is_err());
    }

    #[test]
    fn boost_python_targets_without_prefix_become_modules() {
        let mut module = Module::new("A", PathBuf::from("A"));
        let mut ext = target("a_ext", TargetType::Shared, "A");
        ext.boost_python = true;
        ext.prefix = String::new();
        module.targets.push(ext);
        let mut dist = dist_with(vec![module]);
        prepare(&mut dist).unwrap();
        let (_, target) = dist.targets().next().unwrap();
        assert_eq!(target.target_type, TargetType::Module);
    }

    #[test]
    fn known_shared_sources_collapse() {
        let mut module = Module::new("A", PathBuf::from("A"));
        let mut lib = target("a", TargetType::Shared, "A");
        lib.sources.push("a.cpp".to_string());
        lib.shared_sources.push(vec!["numpy_bridge.cpp".to_string()]);
        module.targets.push(lib);
        let mut dist = dist_with(vec![module]);
        prepare(&mut dist).unwrap();
        let (_, target) = dist.targets().next().unwrap();
        assert_eq!(target.sources, vec!["a.cpp", "numpy_bridge.cpp"]);
        assert!(target.shared_sources.is_empty());
    }

    #[test]
    fn unknown_shared_sources_are_fatal() {
        let mut module = Module::new("A", PathBuf::from("A"));
        let mut lib = target("a", TargetType::Shared, "A");
        lib.shared_sources.push(vec!["mystery.cpp".to_string()]);
        module.targets.push(lib);
        let mut dist = dist_with(vec![module]);
        let err = prepare(&mut dist).unwrap_err();
        assert!(format!("{err:#}").contains("mystery.cpp"));
    }

    fn resolvable_dist(dir: &Path) -> Distribution {
        write_files(
            dir,
            [
                ("mod/existing.cpp", ""),
                ("cctbx_project/other/shared.cpp", ""),
            ],
        )
        .unwrap();
        let mut dist = Distribution::new(dir);
        let mut module = Module::new("mod", PathBuf::from("mod"));
        module.has_sconscript = true;
        dist.insert_module(module).unwrap();
        dist
    }

    #[test]
    fn generated_sources_resolve_against_the_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut dist = resolvable_dist(dir.path());
        let mut lib = target("a", TargetType::Shared, "mod");
        lib.sources.push("#generated/foo.cpp".to_string());
        lib.sources.push("existing.cpp".to_string());
        dist.get_module_mut("mod").unwrap().targets.push(lib);

        let autogen: AutogenSpec = serde_yaml::from_str(
            "libtbx_refresh:\n  mod: [generated/foo.cpp]\n",
        )
        .unwrap();
        resolve(&mut dist, &autogen).unwrap();
        // The refresh entry landed on the module, and the manifest built
        // from it resolved the source.
        assert!(dist
            .get_module("mod")
            .unwrap()
            .generated
            .contains("generated/foo.cpp"));
        let (_, target) = dist.targets().next().unwrap();
        assert_eq!(target.sources, vec!["existing.cpp"]);
        assert!(target.generated_sources.contains("generated/foo.cpp"));
    }

    #[test]
    fn refresh_entries_for_unknown_modules_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut dist = resolvable_dist(dir.path());
        let mut lib = target("a", TargetType::Shared, "mod");
        lib.sources.push("#gen/ghost.cpp".to_string());
        dist.get_module_mut("mod").unwrap().targets.push(lib);

        let autogen: AutogenSpec =
            serde_yaml::from_str("libtbx_refresh:\n  ghost: [gen/ghost.cpp]\n").unwrap();
        let err = resolve(&mut dist, &autogen).unwrap_err();
        assert!(format!("{err:#}").contains("#gen/ghost.cpp"));
    }

    #[test]
    fn repository_sources_are_rewritten_relative_to_origin() {
        let dir = tempfile::tempdir().unwrap();
        let mut dist = resolvable_dist(dir.path());
        let mut lib = target("a", TargetType::Shared, "mod");
        lib.sources.push("#other/shared.cpp".to_string());
        dist.get_module_mut("mod").unwrap().targets.push(lib);

        resolve(&mut dist, &AutogenSpec::default()).unwrap();
        let (_, target) = dist.targets().next().unwrap();
        assert_eq!(target.sources, vec!["../cctbx_project/other/shared.cpp"]);
    }

    #[test]
    fn unknown_repository_sources_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut dist = resolvable_dist(dir.path());
        let mut lib = target("a", TargetType::Shared, "mod");
        lib.sources.push("#nowhere/else.cpp".to_string());
        dist.get_module_mut("mod").unwrap().targets.push(lib);

        let err = resolve(&mut dist, &AutogenSpec::default()).unwrap_err();
        assert!(format!("{err:#}").contains("#nowhere/else.cpp"));
    }

    #[test]
    fn missing_sources_fall_back_to_the_module_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut dist = resolvable_dist(dir.path());
        let mut lib = target("a", TargetType::Shared, "mod");
        lib.sources.push("refreshed.cpp".to_string());
        dist.get_module_mut("mod").unwrap().targets.push(lib);

        let autogen: AutogenSpec =
            serde_yaml::from_str("libtbx_refresh:\n  mod: [mod/refreshed.cpp]\n").unwrap();
        resolve(&mut dist, &autogen).unwrap();
        let (_, target) = dist.targets().next().unwrap();
        assert!(target.sources.is_empty());
        assert!(target.generated_sources.contains("mod/refreshed.cpp"));
    }

    #[test]
    fn missing_sources_without_manifest_entry_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut dist = resolvable_dist(dir.path());
        let mut lib = target("a", TargetType::Shared, "mod");
        lib.sources.push("vanished.cpp".to_string());
        dist.get_module_mut("mod").unwrap().targets.push(lib);

        let err = resolve(&mut dist, &AutogenSpec::default()).unwrap_err();
        assert!(format!("{err:#}").contains("vanished.cpp"));
    }

    #[test]
    fn forced_dependencies_and_includes_are_injected() {
        let dir = tempfile::tempdir().unwrap();
        let mut dist = resolvable_dist(dir.path());
        let mut lib = target("a", TargetType::Shared, "mod");
        lib.sources.push("existing.cpp".to_string());
        dist.get_module_mut("mod").unwrap().targets.push(lib);

        let autogen: AutogenSpec = serde_yaml::from_str(
            "dependencies:\n  a: [tiff, GL]\ntarget_includes:\n  a: '!private_inc'\n  mod: ['#base/include']\n",
        )
        .unwrap();
        resolve(&mut dist, &autogen).unwrap();
        let (module, target) = dist.targets().next().unwrap();
        assert!(target.extra_libs.contains("tiff"));
        assert!(target.extra_libs.contains("GL"));
        assert!(target.include_paths.contains("!private_inc"));
        assert!(module.include_paths.contains("#base/include"));
    }
}
