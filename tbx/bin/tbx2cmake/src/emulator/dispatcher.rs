// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Drives script execution: ordering is decided elsewhere, this module owns
//! the per-run mutable state — the global export table, the stack of
//! currently executing scripts, and the targets collected so far.
//!
//! NOTE: this deliberately executes build scripts read from disk. The
//! scripts are the developer's own, on the developer's own machine; nothing
//! here sandboxes the filesystem beyond the dialect's own limits.

use std::{
    cell::RefCell,
    collections::HashMap,
    fs::read_to_string,
    path::{Path, PathBuf},
    rc::{Rc, Weak},
};

use anyhow::{bail, Context, Result};
use scopeguard::defer;

use super::env::SconsEnvironment;
use super::stubs;
use crate::distribution::Target;
use crate::script::interp::{language_builtins, Interp, Scope};
use crate::script::value::{native_fn, CallArgs, Value};
use crate::script::parser::parse;

pub struct SconsEmulator {
    weak_self: Weak<SconsEmulator>,
    dist_root: PathBuf,
    exports: RefCell<HashMap<String, Value>>,
    /// Relative paths of the scripts currently executing, innermost last.
    script_stack: RefCell<Vec<PathBuf>>,
    /// Per-frame custom export mappings from `SConscript(..., exports=...)`.
    custom_exports: RefCell<Vec<HashMap<String, Value>>>,
    collected: RefCell<Vec<Target>>,
}

impl SconsEmulator {
    pub fn new(dist_root: &Path) -> Rc<Self> {
        Rc::new_cyclic(|weak| SconsEmulator {
            weak_self: weak.clone(),
            dist_root: dist_root.to_owned(),
            exports: RefCell::new(HashMap::new()),
            script_stack: RefCell::new(Vec::new()),
            custom_exports: RefCell::new(Vec::new()),
            collected: RefCell::new(Vec::new()),
        })
    }

    fn rc(&self) -> Rc<Self> {
        self.weak_self
            .upgrade()
            .expect("the emulator is kept alive by its caller")
    }

    /// A fresh interpreter with the stub-module registry installed.
    pub fn make_interp() -> Interp {
        Interp::new(stubs::stub_modules())
    }

    /// Runs one module's `SConscript` and returns the targets it (and any
    /// nested scripts) declared.
    pub fn run_module_script(
        &self,
        interp: &mut Interp,
        module_path: &Path,
    ) -> Result<Vec<Target>> {
        let script = module_path.join("SConscript");
        self.execute_script(interp, &script, HashMap::new())?;
        Ok(self.collected.borrow_mut().drain(..).collect())
    }

    /// The relative path of the innermost executing script.
    pub fn current_script(&self) -> Result<PathBuf> {
        self.script_stack
            .borrow()
            .last()
            .cloned()
            .context("no script is currently executing")
    }

    pub(crate) fn record_target(&self, target: Target) {
        tracing::debug!(
            "{}: {} (relative to {})",
            target.target_type,
            target.name,
            target.origin_path.display()
        );
        self.collected.borrow_mut().push(target);
    }

    /// Handles a nested `SConscript(name, exports=...)` call, from either
    /// the injected global or an environment method.
    pub(crate) fn sconscript(
        &self,
        interp: &mut Interp,
        name: &str,
        exports: Option<Value>,
    ) -> Result<()> {
        let current = self.current_script()?;
        let parent = current.parent().unwrap_or_else(|| Path::new(""));
        let script = crate::pathutil::normalize(&parent.join(name));
        let custom = match exports {
            None | Some(Value::None) => HashMap::new(),
            Some(Value::Dict(items)) => items.borrow().clone().into_iter().collect(),
            Some(other) => bail!(
                "SConscript exports must be a mapping, got {}",
                other.type_name()
            ),
        };
        tracing::debug!("Loading sub-sconscript {}", script.display());
        self.execute_script(interp, &script, custom)?;
        tracing::debug!("Returning to sconscript {}", current.display());
        Ok(())
    }

    /// Executes one script file. The current-script pointer and the active
    /// custom-export mapping are restored on every exit path.
    fn execute_script(
        &self,
        interp: &mut Interp,
        rel_path: &Path,
        custom_exports: HashMap<String, Value>,
    ) -> Result<()> {
        let full_path = self.dist_root.join(rel_path);
        let source = read_to_string(&full_path)
            .with_context(|| format!("failed to read {}", full_path.display()))?;
        let stmts =
            parse(&source).with_context(|| format!("failed to parse {}", rel_path.display()))?;

        let globals = Scope::new();
        for (name, value) in language_builtins() {
            globals.set(name, value);
        }
        for (name, value) in self.injections() {
            globals.set(name, value);
        }

        self.script_stack.borrow_mut().push(rel_path.to_owned());
        self.custom_exports.borrow_mut().push(custom_exports);
        defer! {
            self.script_stack.borrow_mut().pop();
            self.custom_exports.borrow_mut().pop();
        }

        interp
            .exec_module(&stmts, globals)
            .with_context(|| format!("while executing {}", rel_path.display()))
    }

    /// The names injected into every script before execution.
    fn injections(&self) -> Vec<(String, Value)> {
        let environment = {
            let emu = self.rc();
            native_fn("Environment", move |_interp, args: CallArgs| {
                Ok(SconsEnvironment::create(&emu, args.kwargs))
            })
        };

        let export = {
            let emu = self.rc();
            native_fn("Export", move |interp, args: CallArgs| {
                let globals = interp.current_globals()?;
                for name in &args.args {
                    let name = name.as_str()?;
                    let value = globals
                        .get(name)
                        .with_context(|| format!("Export of undefined name '{name}'"))?;
                    emu.exports.borrow_mut().insert(name.to_string(), value);
                }
                Ok(Value::None)
            })
        };

        let import = {
            let emu = self.rc();
            native_fn("Import", move |interp, args: CallArgs| {
                let globals = interp.current_globals()?;
                for name in &args.args {
                    let name = name.as_str()?;
                    // The per-call exports mapping shadows the global table.
                    let custom = emu
                        .custom_exports
                        .borrow()
                        .last()
                        .and_then(|frame| frame.get(name).cloned());
                    let value = match custom {
                        Some(value) => value,
                        None => emu
                            .exports
                            .borrow()
                            .get(name)
                            .cloned()
                            .with_context(|| {
                                format!("Import('{name}') before anything exported it")
                            })?,
                    };
                    globals.set(name.to_string(), value);
                }
                Ok(Value::None)
            })
        };

        let sconscript = {
            let emu = self.rc();
            native_fn("SConscript", move |interp, args: CallArgs| {
                let name = args.str_arg(0, "name")?.to_string();
                let exports = args.kwarg("exports").or_else(|| args.args.get(1)).cloned();
                emu.sconscript(interp, &name, exports)?;
                Ok(Value::None)
            })
        };

        let glob = {
            let emu = self.rc();
            native_fn("Glob", move |_interp, args: CallArgs| {
                let pattern = args.str_arg(0, "pattern")?;
                let current = emu.current_script()?;
                let dir = emu
                    .dist_root
                    .join(current.parent().unwrap_or_else(|| Path::new("")));
                let full_pattern = dir.join(pattern);
                let full_pattern = full_pattern
                    .to_str()
                    .context("glob pattern is not valid UTF-8")?;
                let mut matches = Vec::new();
                for entry in glob::glob(full_pattern)
                    .with_context(|| format!("invalid glob pattern {pattern:?}"))?
                {
                    let path = entry?;
                    let relative = path.strip_prefix(&dir).unwrap_or(&path);
                    matches.push(relative.to_string_lossy().into_owned());
                }
                matches.sort();
                Ok(Value::string_list(matches))
            })
        };

        vec![
            ("Environment".to_string(), environment),
            ("open".to_string(), stubs::open_stub()),
            ("ARGUMENTS".to_string(), Value::dict(Default::default())),
            ("Builder".to_string(), stubs::builder_stub()),
            ("Export".to_string(), export),
            ("Import".to_string(), import),
            ("SConscript".to_string(), sconscript),
            ("Glob".to_string(), glob),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::write_files;
    use crate::distribution::TargetType;

    fn run_one(files: &[(&str, &str)], module: &str) -> Result<Vec<Target>> {
        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), files.iter().copied()).unwrap();
        let emu = SconsEmulator::new(dir.path());
        let mut interp = SconsEmulator::make_interp();
        emu.run_module_script(&mut interp, Path::new(module))
    }

    #[test]
    fn records_a_shared_library_target() {
        let targets = run_one(
            &[(
                "mod/SConscript",
                "env = Environment()\n\
                 env.Append(LIBS=['boost_python'])\n\
                 env.SharedLibrary(target='#lib/util', source=['a.cpp', 'b.cpp'])\n",
            )],
            "mod",
        )
        .unwrap();
        assert_eq!(targets.len(), 1);
        let target = &targets[0];
        assert_eq!(target.name, "util");
        assert_eq!(target.target_type, TargetType::Shared);
        assert_eq!(target.prefix, "lib");
        assert_eq!(target.output_path, "#/lib");
        assert_eq!(target.sources, vec!["a.cpp", "b.cpp"]);
        assert!(target.extra_libs.contains("boost_python"));
        assert!(target.boost_python);
        assert_eq!(target.origin_path, PathBuf::from("mod"));
    }

    #[test]
    fn nested_sconscript_with_exports_restores_current_script() {
        let targets = run_one(
            &[
                (
                    "mod/SConscript",
                    "CFG = {'x': 1}\n\
                     Export('CFG')\n\
                     env = Environment()\n\
                     SConscript('sub/SConscript', exports={'env': env})\n\
                     env.Program(target='after', source=['main.cpp'])\n",
                ),
                (
                    "mod/sub/SConscript",
                    "Import('CFG')\n\
                     Import('env')\n\
                     sub = env.Clone()\n\
                     sub.SharedLibrary(target='named_{}'.format(str(CFG['x'])), source=['s.cpp'])\n",
                ),
            ],
            "mod",
        )
        .unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "named_1");
        assert_eq!(targets[0].origin_path, PathBuf::from("mod/sub"));
        // The outer script kept executing with its own current-script
        // pointer restored after the nested call.
        assert_eq!(targets[1].name, "after");
        assert_eq!(targets[1].origin_path, PathBuf::from("mod"));
    }

    #[test]
    fn shared_objects_become_shared_sources() {
        let targets = run_one(
            &[(
                "mod/SConscript",
                "env = Environment()\n\
                 obj = env.SharedObject(['numpy_bridge.cpp'])\n\
                 env.SharedLibrary(target='#lib/one', source=['a.cpp', obj])\n",
            )],
            "mod",
        )
        .unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].sources, vec!["a.cpp"]);
        assert_eq!(targets[0].shared_sources, vec![vec!["numpy_bridge.cpp"]]);
    }

    #[test]
    fn clone_produces_an_independent_environment() {
        let targets = run_one(
            &[(
                "mod/SConscript",
                "env = Environment()\n\
                 env.Append(LIBS=['base'])\n\
                 child = env.Clone()\n\
                 child.Append(LIBS=['extra'])\n\
                 env.SharedLibrary(target='#lib/parent', source=['p.cpp'])\n\
                 child.SharedLibrary(target='#lib/child', source=['c.cpp'])\n",
            )],
            "mod",
        )
        .unwrap();
        assert!(!targets[0].extra_libs.contains("extra"));
        assert!(targets[1].extra_libs.contains("extra"));
        assert!(targets[1].extra_libs.contains("base"));
    }

    #[test]
    fn program_return_value_has_get_abspath() {
        let targets = run_one(
            &[(
                "mod/SConscript",
                "env = Environment()\n\
                 prog = env.Program(target='tool', source=['t.cpp'])\n\
                 path = prog[0].get_abspath()\n\
                 env.Replace(NOTE=[path])\n",
            )],
            "mod",
        )
        .unwrap();
        assert_eq!(targets[0].name, "tool");
        assert_eq!(targets[0].target_type, TargetType::Program);
        assert_eq!(targets[0].prefix, "");
    }

    #[test]
    fn probes_are_recognised_by_calling_frame() {
        let targets = run_one(
            &[(
                "mod/SConscript",
                "import libtbx.load_env\n\
                 env = Environment()\n\
                 conf = env.Configure()\n\
                 def enable_openmp_if_possible(conf):\n\
                 \x20 result = conf.TryRun('#include <omp.h>')\n\
                 \x20 return result[0]\n\
                 ok = enable_openmp_if_possible(conf)\n\
                 conf.Finish()\n\
                 if ok == 1:\n\
                 \x20 env.Append(LIBS=['gomp'])\n\
                 env.SharedLibrary(target='#lib/omp', source=['o.cpp'])\n",
            )],
            "mod",
        )
        .unwrap();
        assert!(targets[0].extra_libs.contains("gomp"));
    }

    #[test]
    fn unknown_probe_aborts_with_the_code_verbatim() {
        let err = run_one(
            &[(
                "mod/SConscript",
                "env = Environment()\n\
                 conf = env.Configure()\n\
                 conf.TryCompile('#include <unknown.h>')\n",
            )],
            "mod",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("#include <unknown.h>"));
    }

    #[test]
    fn easy_run_and_build_options_are_reachable_from_scripts() {
        let targets = run_one(
            &[(
                "mod/SConscript",
                "import libtbx.load_env\n\
                 import libtbx.easy_run\n\
                 env = Environment()\n\
                 libs = []\n\
                 if libtbx.env.build_options.enable_cuda:\n\
                 \x20 version = libtbx.easy_run.fully_buffered('nvcc --version').raise_if_errors().stdout_lines[0]\n\
                 \x20 if 'release' in version:\n\
                 \x20   libs.append('cudart')\n\
                 env.SharedLibrary(target='#lib/gpu', source=['g.cu'], LIBS=libs)\n",
            )],
            "mod",
        )
        .unwrap();
        assert!(targets[0].extra_libs.contains("cudart"));
    }

    #[test]
    fn include_registry_feeds_cpppath() {
        let targets = run_one(
            &[(
                "mod/SConscript",
                "import libtbx.load_env\n\
                 env = Environment()\n\
                 registry = libtbx.env_config.include_registry()\n\
                 registry.append(env, [libtbx.env.dist_path('scitbx'), libtbx.env.under_build('include')])\n\
                 env.SharedLibrary(target='#lib/inc', source=['i.cpp'])\n",
            )],
            "mod",
        )
        .unwrap();
        assert!(targets[0].include_paths.contains("#base/scitbx"));
        assert!(targets[0].include_paths.contains("#build/include"));
    }

    #[test]
    fn import_of_unexported_name_fails() {
        let err = run_one(&[("mod/SConscript", "Import('missing')\n")], "mod").unwrap_err();
        assert!(format!("{err:#}").contains("Import('missing')"));
    }

    #[test]
    fn glob_matches_relative_to_the_script() {
        let targets = run_one(
            &[
                ("mod/SConscript", "env = Environment()\nenv.SharedLibrary(target='#lib/g', source=Glob('*.cpp'))\n"),
                ("mod/z.cpp", ""),
                ("mod/a.cpp", ""),
                ("mod/skip.h", ""),
            ],
            "mod",
        )
        .unwrap();
        assert_eq!(targets[0].sources, vec!["a.cpp", "z.cpp"]);
    }
}
