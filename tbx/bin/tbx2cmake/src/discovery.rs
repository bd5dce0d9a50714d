// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Module discovery and build ordering.
//!
//! A distribution root contains modules as direct subdirectories, plus a
//! nested sub-repository directory that contains more. A per-module
//! `libtbx_config` manifest names the modules it requires; the manifests
//! drive a dependency DAG whose reverse topological order is the order the
//! build scripts execute in.

use std::collections::{BTreeSet, HashMap};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use walkdir::WalkDir;

use crate::distribution::{Distribution, Module};
use crate::script::ast::Expr;
use crate::script::parse_expression;

/// The nested directory that carries further modules.
pub const SUB_REPOSITORY: &str = "cctbx_project";

/// The foundational module every other module implicitly depends on.
const ROOT_MODULE: &str = "libtbx";

/// Hardcoded edges required to reproduce the legacy system's implicit
/// ordering. Data, not policy: extend the table when a new wart shows up.
const REPAIR_EDGES: &[(&str, &str)] = &[("scitbx", "omptbx")];

/// Module-name aliases in manifests.
const REQUIRED_ALIASES: &[(&str, &str)] =
    &[("boost", "boost_adaptbx"), ("annlib", "annlib_adaptbx")];

fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// Pulls the recognised string-list keys out of a manifest dict literal.
fn manifest_lists(expr: &Expr, keys: &[&str]) -> Result<HashMap<String, Vec<String>>> {
    let entries = match expr {
        Expr::Dict(entries) => entries,
        _ => bail!("manifest must be a single dictionary literal"),
    };
    let mut result = HashMap::new();
    for (key, value) in entries {
        let key = match key {
            Expr::Str(key) => key,
            other => bail!("manifest keys must be strings, found {other:?}"),
        };
        if !keys.contains(&key.as_str()) {
            continue;
        }
        let items = match value {
            Expr::List(items) => items
                .iter()
                .map(|item| match item {
                    Expr::Str(value) => Ok(value.clone()),
                    other => bail!("manifest entry '{key}' must list strings, found {other:?}"),
                })
                .collect::<Result<Vec<_>>>()?,
            other => bail!("manifest entry '{key}' must be a list, found {other:?}"),
        };
        result.insert(key.clone(), items);
    }
    Ok(result)
}

fn load_module(root: &Path, name: &str, rel_path: PathBuf) -> Result<Module> {
    let mut module = Module::new(name, rel_path);
    let dir = root.join(&module.path);
    module.has_sconscript = dir.join("SConscript").is_file();

    let config_path = dir.join("libtbx_config");
    if config_path.is_file() {
        let source = read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let expr = parse_expression(&source)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        let lists = manifest_lists(
            &expr,
            &[
                "modules_required_for_build",
                "optional_modules",
                "modules_required_for_use",
            ],
        )
        .with_context(|| format!("bad manifest {}", config_path.display()))?;

        let mut required: BTreeSet<String> = lists
            .get("modules_required_for_build")
            .into_iter()
            .flatten()
            .chain(lists.get("optional_modules").into_iter().flatten())
            .cloned()
            .collect();
        // Handle aliases/multis.
        for (alias, replacement) in REQUIRED_ALIASES {
            if required.remove(*alias) {
                required.insert(replacement.to_string());
            }
        }
        module.required = required;
        module.required_for_use = lists
            .get("modules_required_for_use")
            .into_iter()
            .flatten()
            .cloned()
            .collect();
    }

    Ok(module)
}

/// Finds all modules in a distribution root: its direct subdirectories and
/// those of the nested sub-repository.
pub fn discover(root: &Path) -> Result<Distribution> {
    let mut dist = Distribution::new(root);

    let mut locations: Vec<(String, PathBuf)> = Vec::new();
    for name in subdirectories(root)? {
        if name == SUB_REPOSITORY {
            for nested in subdirectories(&root.join(SUB_REPOSITORY))? {
                locations.push((nested.clone(), Path::new(SUB_REPOSITORY).join(nested)));
            }
        } else {
            locations.push((name.clone(), PathBuf::from(name)));
        }
    }

    for (name, rel_path) in locations {
        let module = load_module(root, &name, rel_path)?;
        dist.insert_module(module)?;
    }

    Ok(dist)
}

/// Builds the dependency DAG and returns the module execution order:
/// dependencies before dependents, deterministic for a given input.
pub fn build_order(dist: &Distribution) -> Result<Vec<String>> {
    let mut names = dist.module_names();
    names.sort();

    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut indices: HashMap<String, NodeIndex> = HashMap::new();
    for name in &names {
        indices.insert(name.clone(), graph.add_node(name.clone()));
    }

    for name in &names {
        let module = dist.get_module(name).expect("name list is in sync");
        let missing: Vec<&String> = module
            .required
            .iter()
            .filter(|req| !indices.contains_key(*req))
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "{} has missing dependency: {{{}}}",
                name,
                missing.iter().join(", ")
            );
        }
        for req in &module.required {
            if let Some(&req_index) = indices.get(req) {
                graph.add_edge(indices[name], req_index, ());
            }
        }
        // Force a dependency on the root module so it goes before
        // everything else.
        if name != ROOT_MODULE {
            if let Some(&root_index) = indices.get(ROOT_MODULE) {
                graph.add_edge(indices[name], root_index, ());
            }
        }
    }

    for (from, to) in REPAIR_EDGES {
        if let (Some(&from_index), Some(&to_index)) = (indices.get(*from), indices.get(*to)) {
            graph.add_edge(from_index, to_index, ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order
            .into_iter()
            .rev()
            .map(|index| graph[index].clone())
            .collect()),
        Err(_) => {
            let cycles: Vec<String> = tarjan_scc(&graph)
                .into_iter()
                .filter(|scc| scc.len() > 1)
                .map(|scc| {
                    format!(
                        "[{}]",
                        scc.iter().map(|&index| graph[index].clone()).join(" -> ")
                    )
                })
                .collect();
            bail!("cycles found in dependency graph: {}", cycles.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::write_files;

    #[test]
    fn empty_root_has_no_modules() {
        let dir = tempfile::tempdir().unwrap();
        let dist = discover(dir.path()).unwrap();
        assert_eq!(dist.module_count(), 0);
    }

    #[test]
    fn discovers_nested_sub_repository_modules() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            [
                ("libtbx/libtbx_config", "{}"),
                ("cctbx_project/scitbx/SConscript", ""),
                ("cctbx_project/.git/config", ""),
            ],
        )
        .unwrap();
        let dist = discover(dir.path()).unwrap();
        assert_eq!(dist.module_names(), vec!["libtbx", "scitbx"]);
        assert_eq!(
            dist.get_module("scitbx").unwrap().path,
            PathBuf::from("cctbx_project/scitbx")
        );
        assert!(dist.get_module("scitbx").unwrap().has_sconscript);
        assert!(!dist.get_module("libtbx").unwrap().has_sconscript);
    }

    #[test]
    fn manifest_aliases_are_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            [(
                "mod/libtbx_config",
                "{\"modules_required_for_build\": [\"boost\"],\n \"optional_modules\": [\"annlib\"]}",
            )],
        )
        .unwrap();
        let dist = discover(dir.path()).unwrap();
        let required = &dist.get_module("mod").unwrap().required;
        assert!(required.contains("boost_adaptbx"));
        assert!(required.contains("annlib_adaptbx"));
        assert!(!required.contains("boost"));
        assert!(!required.contains("annlib"));
    }

    #[test]
    fn order_puts_dependencies_first() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            [
                ("libtbx/libtbx_config", "{}"),
                (
                    "cctbx_project/cctbx/libtbx_config",
                    "{\"modules_required_for_build\": [\"scitbx\"]}",
                ),
                ("cctbx_project/scitbx/libtbx_config", "{}"),
                ("cctbx_project/omptbx/libtbx_config", "{}"),
            ],
        )
        .unwrap();
        let dist = discover(dir.path()).unwrap();
        let order = build_order(&dist).unwrap();
        let position =
            |name: &str| order.iter().position(|other| other == name).unwrap();
        assert!(position("libtbx") < position("scitbx"));
        assert!(position("scitbx") < position("cctbx"));
        // The repair edge orders omptbx before scitbx.
        assert!(position("omptbx") < position("scitbx"));
    }

    #[test]
    fn unknown_requirements_drop_the_edge() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            [(
                "mod/libtbx_config",
                "{\"modules_required_for_build\": [\"no_such_module\"]}",
            )],
        )
        .unwrap();
        let dist = discover(dir.path()).unwrap();
        assert_eq!(build_order(&dist).unwrap(), vec!["mod"]);
    }

    #[test]
    fn cycles_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_files(
            dir.path(),
            [
                (
                    "a/libtbx_config",
                    "{\"modules_required_for_build\": [\"b\"]}",
                ),
                (
                    "b/libtbx_config",
                    "{\"modules_required_for_build\": [\"a\"]}",
                ),
            ],
        )
        .unwrap();
        let dist = discover(dir.path()).unwrap();
        let err = build_order(&dist).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("cycles found"));
        assert!(message.contains('a') && message.contains('b'));
    }
}
