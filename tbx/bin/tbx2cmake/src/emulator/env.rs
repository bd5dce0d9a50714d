// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The `Environment` stand-in the scripts declare build outputs against.

use std::{
    any::Any,
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    rc::{Rc, Weak},
};

use anyhow::{anyhow, bail, Context, Result};

use super::configure::ConfigureContext;
use super::dispatcher::SconsEmulator;
use super::stubs::{OpaqueSentinel, ProgramReturn, SharedObjectSentinel};
use crate::distribution::{Target, TargetType};
use crate::script::interp::Interp;
use crate::script::value::{CallArgs, NativeObject, Value};

/// The default key table. Reads of absent keys fall back here; the entry is
/// materialized into the store on first read so in-place mutation sticks.
fn default_entry(key: &str) -> Option<Value> {
    Some(match key {
        "OBJSUFFIX" => Value::str(".o"),
        "SHLINKFLAGS" | "CCFLAGS" | "SHCCFLAGS" | "CXXFLAGS" | "SHCXXFLAGS" => {
            Value::list(Vec::new())
        }
        "BUILDERS" => Value::dict(BTreeMap::new()),
        "SHLINKCOM" => Value::string_list(["SHLINKCOMDEFAULT"]),
        "LINKCOM" => Value::string_list(["LINKCOMDEFAULT"]),
        "PROGPREFIX" | "PROGSUFFIX" => Value::str(""),
        "SHLIBPREFIX" | "LIBPREFIX" => Value::str("lib"),
        _ => return None,
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BuilderKind {
    SharedLibrary,
    StaticLibrary,
    Program,
    CudaSharedLibrary,
}

pub struct SconsEnvironment {
    emu: Weak<SconsEmulator>,
    store: RefCell<BTreeMap<String, Value>>,
}

impl SconsEnvironment {
    pub fn create(emu: &Rc<SconsEmulator>, kwargs: Vec<(String, Value)>) -> Value {
        Value::native(SconsEnvironment {
            emu: Rc::downgrade(emu),
            store: RefCell::new(kwargs.into_iter().collect()),
        })
    }

    fn emulator(&self) -> Result<Rc<SconsEmulator>> {
        self.emu
            .upgrade()
            .context("environment outlived its emulator")
    }

    fn read_entry(&self, key: &str) -> Result<Value> {
        if let Some(value) = self.store.borrow().get(key) {
            return Ok(value.clone());
        }
        let value = default_entry(key)
            .ok_or_else(|| anyhow!("environment has no entry '{key}'"))?;
        self.store
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        Ok(value)
    }

    fn append(&self, args: CallArgs, prepend: bool) -> Result<Value> {
        for (key, value) in &args.kwargs {
            // Snapshot first so appending a list to itself cannot deadlock
            // the refcell.
            let items = match value {
                Value::List(_) => value.iter_list()?,
                other => vec![other.clone()],
            };
            let entry = {
                let mut store = self.store.borrow_mut();
                store
                    .entry(key.clone())
                    .or_insert_with(|| Value::list(Vec::new()))
                    .clone()
            };
            match entry {
                Value::List(existing) => {
                    let mut existing = existing.borrow_mut();
                    if prepend {
                        existing.splice(0..0, items);
                    } else {
                        existing.extend(items);
                    }
                }
                other => bail!(
                    "cannot append to environment entry '{}' of type {}",
                    key,
                    other.type_name()
                ),
            }
        }
        Ok(Value::None)
    }

    fn clone_env(&self, kwargs: Vec<(String, Value)>) -> Result<Value> {
        let mut store: BTreeMap<String, Value> = self
            .store
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.deep_copy()))
            .collect();
        store.extend(kwargs);
        Ok(Value::Native(Rc::new(SconsEnvironment {
            emu: self.emu.clone(),
            store: RefCell::new(store),
        })))
    }

    /// Flattens a builder `source` argument: a string, a list of strings
    /// (possibly with nested lists, e.g. a `Glob` result), or shared-object
    /// sentinels.
    fn normalize_sources(value: &Value) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let mut sources = Vec::new();
        let mut shared = Vec::new();
        let mut push_item = |item: &Value| -> Result<()> {
            match item {
                Value::Str(path) => sources.push(path.clone()),
                Value::Native(object) => {
                    match object.as_any().downcast_ref::<SharedObjectSentinel>() {
                        Some(sentinel) => shared.push(sentinel.sources.clone()),
                        None => bail!(
                            "unsupported source entry of type {}",
                            object.type_name()
                        ),
                    }
                }
                Value::List(nested) => {
                    for inner in nested.borrow().iter() {
                        sources.push(inner.as_str()?.to_string());
                    }
                }
                other => bail!("unsupported source entry of type {}", other.type_name()),
            }
            Ok(())
        };
        match value {
            Value::List(items) => {
                for item in items.borrow().iter() {
                    push_item(item)?;
                }
            }
            other => push_item(other)?,
        }
        Ok((sources, shared))
    }

    /// Splits a builder target name into the bare name and its output
    /// directory under the build root.
    fn split_target_name(raw: &str) -> (String, String) {
        match raw.strip_prefix('#') {
            Some(rest) => {
                let rest = rest.trim_start_matches('/');
                match rest.rsplit_once('/') {
                    Some((dir, base)) => (base.to_string(), format!("#/{dir}")),
                    None => (rest.to_string(), "#/".to_string()),
                }
            }
            None => (raw.to_string(), "#/lib".to_string()),
        }
    }

    fn string_set_entry(&self, key: &str) -> Result<BTreeSet<String>> {
        match self.store.borrow().get(key) {
            Some(value) => Ok(value.string_items()?.into_iter().collect()),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Include paths an environment carries are only interesting when they
    /// point back into the distribution or the build tree.
    fn include_paths_from_cpppath(&self) -> Result<BTreeSet<String>> {
        let mut paths = BTreeSet::new();
        if let Some(value) = self.store.borrow().get("CPPPATH") {
            for entry in value.iter_list()? {
                let entry = match &entry {
                    Value::Str(text) => text.clone(),
                    Value::Native(object) => object.repr(),
                    other => bail!("unsupported CPPPATH entry: {}", other.repr()),
                };
                if let Some(rest) = entry.strip_prefix("DISTPATH/") {
                    paths.insert(format!("#base/{rest}"));
                } else if entry == "DISTPATH" {
                    paths.insert("#base".to_string());
                } else if let Some(rest) = entry.strip_prefix("UNDERBUILD/") {
                    paths.insert(format!("#build/{rest}"));
                }
            }
        }
        Ok(paths)
    }

    fn builder_call(&self, kind: BuilderKind, args: &CallArgs) -> Result<Value> {
        let raw_target = match args.kwarg("target") {
            Some(value) => value.as_str()?.to_string(),
            None => args.str_arg(0, "target")?.to_string(),
        };
        let source = args
            .kwarg("source")
            .or_else(|| args.args.get(1))
            .with_context(|| format!("builder call for '{raw_target}' is missing sources"))?;
        let (sources, shared_sources) = Self::normalize_sources(source)?;

        let emu = self.emulator()?;
        let origin_path = emu
            .current_script()?
            .parent()
            .map(|dir| dir.to_path_buf())
            .unwrap_or_default();

        let (name, output_path) = Self::split_target_name(&raw_target);
        let target_type = match kind {
            BuilderKind::SharedLibrary | BuilderKind::CudaSharedLibrary => TargetType::Shared,
            BuilderKind::StaticLibrary => TargetType::Static,
            BuilderKind::Program => TargetType::Program,
        };
        let prefix = match kind {
            BuilderKind::SharedLibrary | BuilderKind::CudaSharedLibrary => {
                self.read_entry("SHLIBPREFIX")?.as_str()?.to_string()
            }
            BuilderKind::StaticLibrary => self.read_entry("LIBPREFIX")?.as_str()?.to_string(),
            BuilderKind::Program => self.read_entry("PROGPREFIX")?.as_str()?.to_string(),
        };

        let mut extra_libs = self.string_set_entry("LIBS")?;
        if let Some(libs) = args.kwarg("LIBS") {
            extra_libs.extend(libs.string_items()?);
        }

        let boost_python = extra_libs.contains("boost_python")
            || sources.iter().any(|source| source.contains("boost_python"));

        let filename = name.clone();
        let target = Target {
            name,
            filename,
            prefix,
            target_type,
            origin_path,
            sources,
            generated_sources: BTreeSet::new(),
            shared_sources,
            extra_libs,
            include_paths: self.include_paths_from_cpppath()?,
            boost_python,
            output_path,
        };
        emu.record_target(target);

        match kind {
            BuilderKind::Program => Ok(Value::list(vec![Value::native(ProgramReturn {
                path: raw_target,
            })])),
            _ => Ok(OpaqueSentinel::value("build node")),
        }
    }
}

impl NativeObject for SconsEnvironment {
    fn type_name(&self) -> &'static str {
        "environment"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_index(&self, key: &Value) -> Result<Value> {
        self.read_entry(key.as_str()?)
    }

    fn set_index(&self, key: &Value, value: Value) -> Result<()> {
        self.store
            .borrow_mut()
            .insert(key.as_str()?.to_string(), value);
        Ok(())
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(
            name,
            "Append"
                | "Prepend"
                | "Replace"
                | "Clone"
                | "Copy"
                | "Configure"
                | "Repository"
                | "SConscript"
                | "SharedLibrary"
                | "StaticLibrary"
                | "Program"
                | "SharedObject"
                | "cudaSharedLibrary"
        )
    }

    fn call_method(&self, name: &str, interp: &mut Interp, args: CallArgs) -> Result<Value> {
        match name {
            "Append" => self.append(args, false),
            "Prepend" => self.append(args, true),
            "Replace" => {
                let mut store = self.store.borrow_mut();
                for (key, value) in args.kwargs {
                    store.insert(key, value);
                }
                Ok(Value::None)
            }
            // Some scripts rely on the old `Copy` spelling.
            "Clone" | "Copy" => self.clone_env(args.kwargs),
            "Configure" => Ok(Value::native(ConfigureContext)),
            "Repository" => {
                let path = args.str_arg(0, "path")?;
                if path == "DISTPATH" {
                    Ok(Value::None)
                } else {
                    bail!("unknown Repository usage: {path:?}");
                }
            }
            "SConscript" => {
                let name = args.str_arg(0, "name")?.to_string();
                let exports = args.kwarg("exports").or_else(|| args.args.get(1)).cloned();
                self.emulator()?.sconscript(interp, &name, exports)?;
                Ok(Value::None)
            }
            "SharedLibrary" => self.builder_call(BuilderKind::SharedLibrary, &args),
            "StaticLibrary" => self.builder_call(BuilderKind::StaticLibrary, &args),
            "Program" => self.builder_call(BuilderKind::Program, &args),
            "cudaSharedLibrary" => self.builder_call(BuilderKind::CudaSharedLibrary, &args),
            "SharedObject" => {
                let source = args
                    .kwarg("source")
                    .or_else(|| args.args.first())
                    .context("SharedObject call is missing sources")?;
                let (sources, _) = Self::normalize_sources(source)?;
                Ok(Value::native(SharedObjectSentinel { sources }))
            }
            _ => bail!("environment has no method '{name}'"),
        }
    }
}
