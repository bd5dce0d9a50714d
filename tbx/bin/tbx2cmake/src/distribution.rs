// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The build-graph model: a distribution of modules, each owning the
//! targets its build script declared.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use strum_macros::Display;

/// A build output declared by an environment-method call.
#[derive(Clone, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TargetType {
    Shared,
    Static,
    Module,
    Program,
}

#[derive(Clone, Debug)]
pub struct Target {
    pub name: String,
    /// The output file stem; kept stable when deduplication renames `name`.
    pub filename: String,
    /// `"lib"` for library variants, empty for loadable extensions and
    /// programs.
    pub prefix: String,
    pub target_type: TargetType,
    /// Directory of the declaring script, relative to the distribution root.
    pub origin_path: PathBuf,
    /// Source paths relative to `origin_path`, or prefixed with the `#`
    /// repository-lookup sigil.
    pub sources: Vec<String>,
    /// Paths relative to the build root, resolved from the generated-file
    /// manifest.
    pub generated_sources: BTreeSet<String>,
    /// Source lists spliced in from shared-object sentinels; collapsed away
    /// by post-processing.
    pub shared_sources: Vec<Vec<String>>,
    /// Link dependencies by name.
    pub extra_libs: BTreeSet<String>,
    /// Include paths; entries starting with `!` are private.
    pub include_paths: BTreeSet<String>,
    pub boost_python: bool,
    pub output_path: String,
}

impl Target {
    pub fn new(name: &str, target_type: TargetType, origin_path: PathBuf) -> Self {
        Target {
            name: name.to_string(),
            filename: name.to_string(),
            prefix: String::new(),
            target_type,
            origin_path,
            sources: Vec::new(),
            generated_sources: BTreeSet::new(),
            shared_sources: Vec::new(),
            extra_libs: BTreeSet::new(),
            include_paths: BTreeSet::new(),
            boost_python: false,
            output_path: "#/lib".to_string(),
        }
    }
}

/// A named unit discovered on disk.
#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    /// Module directory relative to the distribution root.
    pub path: PathBuf,
    /// Names of modules this one requires, after alias rewriting.
    pub required: BTreeSet<String>,
    /// Use-time requirements from the manifest; informational only.
    pub required_for_use: BTreeSet<String>,
    pub has_sconscript: bool,
    pub targets: Vec<Target>,
    /// Source paths (relative to the build root) produced by this module's
    /// refresh step.
    pub generated: BTreeSet<String>,
    pub include_paths: BTreeSet<String>,
}

impl Module {
    pub fn new(name: &str, path: PathBuf) -> Self {
        Module {
            name: name.to_string(),
            path,
            required: BTreeSet::new(),
            required_for_use: BTreeSet::new(),
            has_sconscript: false,
            targets: Vec::new(),
            generated: BTreeSet::new(),
            include_paths: BTreeSet::new(),
        }
    }
}

/// Holds everything read out of one distribution.
#[derive(Debug, Default)]
pub struct Distribution {
    /// The distribution root on disk.
    pub module_path: PathBuf,
    modules: HashMap<String, Module>,
    // Keeps the insertion order of `modules`.
    order: Vec<String>,
}

impl Distribution {
    pub fn new(module_path: &Path) -> Self {
        Distribution {
            module_path: module_path.to_owned(),
            modules: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn insert_module(&mut self, module: Module) -> Result<()> {
        if self.modules.contains_key(&module.name) {
            bail!("multiple modules have the same name: {}", module.name);
        }
        self.order.push(module.name.clone());
        self.modules.insert(module.name.clone(), module);
        Ok(())
    }

    pub fn get_module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn get_module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    pub fn remove_module(&mut self, name: &str) -> Option<Module> {
        self.order.retain(|existing| existing != name);
        self.modules.remove(name)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Modules in insertion order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.order.iter().map(|name| &self.modules[name])
    }

    pub fn module_count(&self) -> usize {
        self.order.len()
    }

    /// Every target reachable through some module, with its owning module.
    /// Iteration follows module insertion order and, within a module,
    /// declaration order.
    pub fn targets(&self) -> impl Iterator<Item = (&Module, &Target)> {
        self.modules()
            .flat_map(|module| module.targets.iter().map(move |target| (module, target)))
    }

    pub fn target_count(&self) -> usize {
        self.modules().map(|module| module.targets.len()).sum()
    }

    /// Applies `f` to every target in iteration order.
    pub fn for_each_target_mut(&mut self, mut f: impl FnMut(&str, &mut Target) -> Result<()>) -> Result<()> {
        for name in &self.order {
            let module = self
                .modules
                .get_mut(name)
                .ok_or_else(|| anyhow!("module order out of sync: {name}"))?;
            for target in &mut module.targets {
                f(&module.name, target)?;
            }
        }
        Ok(())
    }

    /// Detaches every target the predicate selects from its module.
    pub fn remove_targets(&mut self, mut predicate: impl FnMut(&Target) -> bool) {
        for name in &self.order {
            let module = self.modules.get_mut(name).expect("order is in sync");
            module.targets.retain(|target| !predicate(target));
        }
    }

    /// Looks up a target by name.
    pub fn find_target_mut(&mut self, target_name: &str) -> Option<&mut Target> {
        let mut found = None;
        for name in &self.order {
            let module = self.modules.get(name).expect("order is in sync");
            if let Some(index) = module
                .targets
                .iter()
                .position(|target| target.name == target_name)
            {
                found = Some((name.clone(), index));
                break;
            }
        }
        let (name, index) = found?;
        self.modules.get_mut(&name)?.targets.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Distribution {
        let mut dist = Distribution::new(Path::new("/dist"));
        let mut a = Module::new("alpha", PathBuf::from("alpha"));
        a.targets.push(Target::new(
            "util",
            TargetType::Shared,
            PathBuf::from("alpha"),
        ));
        let mut b = Module::new("beta", PathBuf::from("beta"));
        b.targets.push(Target::new(
            "util",
            TargetType::Static,
            PathBuf::from("beta"),
        ));
        b.targets.push(Target::new(
            "tool",
            TargetType::Program,
            PathBuf::from("beta"),
        ));
        dist.insert_module(a).unwrap();
        dist.insert_module(b).unwrap();
        dist
    }

    #[test]
    fn iteration_follows_module_then_declaration_order() {
        let dist = sample();
        let names: Vec<_> = dist
            .targets()
            .map(|(module, target)| format!("{}/{}", module.name, target.name))
            .collect();
        assert_eq!(names, vec!["alpha/util", "beta/util", "beta/tool"]);
    }

    #[test]
    fn removal_detaches_targets_from_modules() {
        let mut dist = sample();
        dist.remove_targets(|target| target.name == "util");
        assert_eq!(dist.target_count(), 1);
        assert!(dist.get_module("alpha").unwrap().targets.is_empty());
    }

    #[test]
    fn duplicate_module_names_are_rejected() {
        let mut dist = sample();
        assert!(dist
            .insert_module(Module::new("alpha", PathBuf::from("other/alpha")))
            .is_err());
    }

    #[test]
    fn removing_a_module_removes_its_targets() {
        let mut dist = sample();
        dist.remove_module("beta");
        assert_eq!(dist.target_count(), 1);
        assert_eq!(dist.module_count(), 1);
    }
}
