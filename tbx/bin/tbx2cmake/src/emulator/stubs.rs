// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stand-ins for the legacy runtime surface the build scripts import.
//!
//! Every stub is fail-closed: querying anything that is not explicitly
//! shimmed aborts the run with a message naming the missing piece, so a
//! script that starts using new legacy API tells the maintainer exactly what
//! to add here.

use std::{any::Any, cell::RefCell, collections::BTreeMap, collections::HashMap, rc::Rc};

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::script::interp::Interp;
use crate::script::value::{native_fn, CallArgs, NativeObject, Value};

/// A stub for an importable module: a fixed attribute table with a
/// fail-closed lookup.
pub struct StubModule {
    name: String,
    attrs: BTreeMap<String, Value>,
}

impl StubModule {
    pub fn new(name: &str, attrs: BTreeMap<String, Value>) -> Value {
        Value::native(StubModule {
            name: name.to_string(),
            attrs,
        })
    }
}

impl NativeObject for StubModule {
    fn type_name(&self) -> &'static str {
        "module"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn repr(&self) -> String {
        format!("<module {}>", self.name)
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>> {
        match self.attrs.get(name) {
            Some(value) => Ok(Some(value.clone())),
            None => bail!("no emulation stub for '{}.{}'", self.name, name),
        }
    }
}

/// The object returned by `libtbx.group_args(...)`: a mutable attribute bag.
pub struct AttrDict {
    attrs: RefCell<BTreeMap<String, Value>>,
}

impl AttrDict {
    pub fn from_kwargs(kwargs: Vec<(String, Value)>) -> Value {
        Value::native(AttrDict {
            attrs: RefCell::new(kwargs.into_iter().collect()),
        })
    }
}

impl NativeObject for AttrDict {
    fn type_name(&self) -> &'static str {
        "group_args"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>> {
        match self.attrs.borrow().get(name) {
            Some(value) => Ok(Some(value.clone())),
            None => bail!("group_args object has no attribute '{name}'"),
        }
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<()> {
        self.attrs.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }
}

/// A fake build-tree path. Only enough surface to survive the string
/// manipulations scripts perform on it.
pub struct FakePath {
    pub path: String,
}

impl FakePath {
    pub fn value(path: impl Into<String>) -> Value {
        Value::native(FakePath { path: path.into() })
    }
}

impl NativeObject for FakePath {
    fn type_name(&self) -> &'static str {
        "path"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn repr(&self) -> String {
        self.path.clone()
    }

    fn has_method(&self, name: &str) -> bool {
        name == "find"
    }

    fn call_method(&self, name: &str, _interp: &mut Interp, args: CallArgs) -> Result<Value> {
        match name {
            "find" => {
                let needle = args.str_arg(0, "substring")?;
                Ok(Value::Int(
                    self.path.find(needle).map(|i| i as i64).unwrap_or(-1),
                ))
            }
            _ => bail!("path has no method '{name}'"),
        }
    }
}

/// Coerces a script value to a path-ish string (strings and fake paths).
pub fn path_string(value: &Value) -> Result<String> {
    match value {
        Value::Str(text) => Ok(text.clone()),
        Value::Native(object) => {
            if let Some(path) = object.as_any().downcast_ref::<FakePath>() {
                Ok(path.path.clone())
            } else {
                bail!("expected a path or string, got {}", object.type_name());
            }
        }
        other => bail!("expected a path or string, got {}", other.type_name()),
    }
}

/// An inert sentinel for legacy API objects that scripts only pass around.
pub struct OpaqueSentinel {
    name: String,
}

impl OpaqueSentinel {
    pub fn value(name: &str) -> Value {
        Value::native(OpaqueSentinel {
            name: name.to_string(),
        })
    }
}

impl NativeObject for OpaqueSentinel {
    fn type_name(&self) -> &'static str {
        "sentinel"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn repr(&self) -> String {
        format!("<{}>", self.name)
    }

    fn call(&self, _interp: &mut Interp, _args: CallArgs) -> Result<Value> {
        Ok(OpaqueSentinel::value(&self.name))
    }
}

/// The return value of the `Program` builder. Exactly one script cares, and
/// it only calls `get_abspath`.
pub struct ProgramReturn {
    pub path: String,
}

impl NativeObject for ProgramReturn {
    fn type_name(&self) -> &'static str {
        "program"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn has_method(&self, name: &str) -> bool {
        name == "get_abspath"
    }

    fn call_method(&self, name: &str, _interp: &mut Interp, _args: CallArgs) -> Result<Value> {
        match name {
            "get_abspath" => Ok(Value::str(self.path.clone())),
            _ => bail!("program has no method '{name}'"),
        }
    }
}

/// The return value of the `SharedObject` builder: an intermediate object
/// list that other builder calls may splice into their sources.
pub struct SharedObjectSentinel {
    pub sources: Vec<String>,
}

impl NativeObject for SharedObjectSentinel {
    fn type_name(&self) -> &'static str {
        "shared object"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The inert recorder returned by the injected `Builder` factory.
pub struct BuilderRecorder {
    src_builders: RefCell<Vec<Value>>,
}

impl NativeObject for BuilderRecorder {
    fn type_name(&self) -> &'static str {
        "builder"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn has_method(&self, name: &str) -> bool {
        name == "add_src_builder"
    }

    fn call_method(&self, name: &str, _interp: &mut Interp, args: CallArgs) -> Result<Value> {
        match name {
            "add_src_builder" => {
                if let Some(builder) = args.args.first() {
                    self.src_builders.borrow_mut().push(builder.clone());
                }
                Ok(Value::None)
            }
            _ => bail!("builder has no method '{name}'"),
        }
    }
}

/// The in-memory stand-in for `open()`: absorbs writes, and satisfies the
/// two known read sites with empty contents.
pub struct FakeFile {
    filename: String,
    data: RefCell<String>,
}

impl NativeObject for FakeFile {
    fn type_name(&self) -> &'static str {
        "file"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn repr(&self) -> String {
        format!("<file {}>", self.filename)
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(name, "write" | "read" | "close")
    }

    fn call_method(&self, name: &str, interp: &mut Interp, args: CallArgs) -> Result<Value> {
        match name {
            "write" => {
                self.data
                    .borrow_mut()
                    .push_str(args.str_arg(0, "data")?);
                Ok(Value::None)
            }
            "read" => {
                if self.filename.contains("csymlib.c")
                    || interp.innermost_function() == Some("replace_printf")
                {
                    return Ok(Value::str(""));
                }
                bail!(
                    "open(): no canned contents for reading {:?} — extend the emulation surface",
                    self.filename
                );
            }
            "close" => Ok(Value::None),
            _ => bail!("file has no method '{name}'"),
        }
    }
}

/// The sandboxed `open()` replacement injected into every script.
pub fn open_stub() -> Value {
    native_fn("open", |_interp, args| {
        let filename = args.str_arg(0, "filename")?.to_string();
        Ok(Value::native(FakeFile {
            filename,
            data: RefCell::new(String::new()),
        }))
    })
}

/// The injected `Builder` factory.
pub fn builder_stub() -> Value {
    native_fn("Builder", |_interp, _args| {
        Ok(Value::native(BuilderRecorder {
            src_builders: RefCell::new(Vec::new()),
        }))
    })
}

/// The result object `libtbx.easy_run.fully_buffered` hands back.
pub struct EasyRunResult {
    lines: Vec<String>,
}

impl NativeObject for EasyRunResult {
    fn type_name(&self) -> &'static str {
        "easy_run result"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>> {
        match name {
            "stdout_lines" => Ok(Some(Value::string_list(self.lines.clone()))),
            _ => Ok(None),
        }
    }

    fn has_method(&self, name: &str) -> bool {
        name == "raise_if_errors"
    }

    fn call_method(&self, name: &str, _interp: &mut Interp, _args: CallArgs) -> Result<Value> {
        match name {
            "raise_if_errors" => Ok(Value::native(EasyRunResult {
                lines: self.lines.clone(),
            })),
            _ => bail!("easy_run result has no method '{name}'"),
        }
    }
}

fn easy_run_fully_buffered(_interp: &mut Interp, args: CallArgs) -> Result<Value> {
    let command = args.str_arg(0, "command")?;
    let lines: &[&str] = match command {
        "/usr/bin/uname -p" => &["i386"],
        "/usr/bin/sw_vers -productVersion" => &["10.12.0"],
        "nvcc --version" => &["Cuda compilation tools, release 8.0, V8.0.61"],
        other => bail!(
            "easy_run has no canned output for command {other:?} — extend the emulation surface"
        ),
    };
    Ok(Value::native(EasyRunResult {
        lines: lines.iter().map(|s| s.to_string()).collect(),
    }))
}

/// The fixed build-option table the scripts branch on.
pub struct BuildOptions;

impl NativeObject for BuildOptions {
    fn type_name(&self) -> &'static str {
        "build_options"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>> {
        let value = match name {
            "build_boost_python_extensions" => Value::Bool(true),
            "scan_boost" => Value::Bool(false),
            "compiler" => Value::str("default"),
            "static_exe" => Value::Bool(false),
            "debug_symbols" => Value::Bool(true),
            "force_32bit" => Value::Bool(false),
            "warning_level" => Value::Int(0),
            "optimization" => Value::Bool(false),
            "use_environment_flags" => Value::Bool(false),
            "enable_cxx11" => Value::Bool(false),
            "enable_openmp_if_possible" => Value::Bool(true),
            "enable_cuda" => Value::Bool(true),
            "enable_boost_threads" => Value::Bool(true),
            "boost_python_no_py_signatures" => Value::Bool(false),
            "precompile_headers" => Value::Bool(false),
            "boost_python_bool_int_strict" => Value::Bool(true),
            "mode" => Value::str("invalid"),
            "static_libraries" => Value::Bool(false),
            other => bail!("no emulation stub for build option '{other}'"),
        };
        Ok(Some(value))
    }
}

/// The `libtbx.env` root object.
pub struct LibtbxEnv;

impl NativeObject for LibtbxEnv {
    fn type_name(&self) -> &'static str {
        "libtbx env"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_attr(&self, name: &str) -> Result<Option<Value>> {
        let value = match name {
            "boost_version" => Value::Int(106500),
            "build_options" => Value::native(BuildOptions),
            "build_path" => Value::str("UNDERBUILD"),
            "lib_path" => FakePath::value("UNDERBUILD/lib"),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(
            name,
            "under_build"
                | "under_base"
                | "dist_path"
                | "under_dist"
                | "find_in_repositories"
                | "has_module"
                | "write_dispatcher_in_bin"
        )
    }

    fn call_method(&self, name: &str, _interp: &mut Interp, args: CallArgs) -> Result<Value> {
        match name {
            "under_build" => Ok(Value::str(format!(
                "UNDERBUILD/{}",
                args.str_arg(0, "path")?
            ))),
            "under_base" => Ok(Value::str(format!("BASEDIR/{}", args.str_arg(0, "path")?))),
            "dist_path" => Ok(Value::str(format!("DISTPATH/{}", args.str_arg(0, "path")?))),
            "under_dist" => {
                let module = args.str_arg(0, "module")?;
                let path = args.str_arg(1, "path")?;
                Ok(Value::str(format!("DISTPATH[{module}]/{path}")))
            }
            "find_in_repositories" => Ok(Value::str(format!(
                "REPOSITORIES/{}",
                args.str_arg(0, "relative_path")?
            ))),
            "has_module" => Ok(Value::Bool(true)),
            "write_dispatcher_in_bin" => {
                let source = args.str_arg(0, "source_file").unwrap_or("<unknown>");
                let target = args.str_arg(1, "target_file").unwrap_or("<unknown>");
                tracing::info!("Called to write dispatcher {} to {}", target, source);
                Ok(Value::None)
            }
            _ => bail!("libtbx env has no method '{name}'"),
        }
    }
}

/// The include registry: forwards its paths into the environment's CPPPATH.
pub struct IncludeRegistry;

impl NativeObject for IncludeRegistry {
    fn type_name(&self) -> &'static str {
        "include registry"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn has_method(&self, name: &str) -> bool {
        matches!(
            name,
            "append" | "prepend" | "scan_boost" | "set_boost_dir_name"
        )
    }

    fn call_method(&self, name: &str, interp: &mut Interp, args: CallArgs) -> Result<Value> {
        match name {
            "append" | "prepend" => {
                let env = match args.args.first() {
                    Some(Value::Native(object)) => Rc::clone(object),
                    _ => bail!("include registry {name}() expects an environment"),
                };
                let env_method = if name == "append" { "Append" } else { "Prepend" };
                let paths = args
                    .args
                    .get(1)
                    .context("include registry expects a path list")?
                    .iter_list()?;
                for path in paths {
                    let path = path_string(&path)?;
                    env.call_method(
                        env_method,
                        interp,
                        CallArgs::new(
                            Vec::new(),
                            vec![("CPPPATH".to_string(), Value::string_list([path]))],
                        ),
                    )?;
                }
                Ok(Value::None)
            }
            // Boost is provided externally by the emitted build; scanning is
            // a no-op that hands the registry back.
            "scan_boost" | "set_boost_dir_name" => Ok(Value::native(IncludeRegistry)),
            _ => bail!("include registry has no method '{name}'"),
        }
    }
}

fn fail_stub(name: &'static str) -> Value {
    native_fn(name, move |_interp, _args| -> Result<Value> {
        bail!("legacy function {name}() is not implemented in the emulation surface");
    })
}

fn noop_stub(name: &'static str) -> Value {
    native_fn(name, |_interp, _args| Ok(Value::None))
}

fn select_matching(_interp: &mut Interp, args: CallArgs) -> Result<Value> {
    let key = args.str_arg(0, "key")?;
    let choices = args
        .args
        .get(1)
        .context("select_matching() expects a choice list")?
        .iter_list()?;
    let default = args
        .args
        .get(2)
        .or_else(|| args.kwarg("default"))
        .cloned()
        .unwrap_or(Value::None);
    for choice in choices {
        let pair = choice.iter_list()?;
        let (pattern, value) = match pair.as_slice() {
            [pattern, value] => (pattern.as_str()?, value),
            _ => bail!("select_matching() choices must be [pattern, value] pairs"),
        };
        let regex = Regex::new(pattern)
            .with_context(|| format!("invalid select_matching pattern {pattern:?}"))?;
        if regex.is_match(key) {
            return Ok(value.clone());
        }
    }
    Ok(default)
}

fn unique_paths(_interp: &mut Interp, args: CallArgs) -> Result<Value> {
    let paths = args
        .args
        .first()
        .context("unique_paths() expects a path list")?
        .iter_list()?;
    let mut seen: Vec<Value> = Vec::new();
    for path in paths {
        if !seen.iter().any(|existing| existing.py_eq(&path)) {
            seen.push(path);
        }
    }
    Ok(Value::list(seen))
}

fn darwin_shlinkcom(_interp: &mut Interp, args: CallArgs) -> Result<Value> {
    let lo = args
        .args
        .get(2)
        .context("darwin_shlinkcom() expects (env_etc, env, lo, dylib)")?;
    let known = ["libboost_thread.lo", "libboost_python.lo", "libboost_system.lo"];
    let recognised = match lo {
        Value::Str(text) => known.iter().any(|needle| text.contains(needle)),
        Value::List(items) => items.borrow().iter().any(|item| {
            item.as_str()
                .map(|text| known.iter().any(|needle| text.contains(needle)))
                .unwrap_or(false)
        }),
        _ => false,
    };
    if recognised {
        return Ok(Value::None);
    }
    bail!(
        "darwin_shlinkcom() called with unrecognised inputs: {} — extend the emulation surface",
        lo.repr()
    );
}

fn norm_join(_interp: &mut Interp, args: CallArgs) -> Result<Value> {
    let a = args.str_arg(0, "a")?;
    let b = args.str_arg(1, "b")?;
    Ok(Value::str(crate::pathutil::normalize_str(&format!(
        "{a}/{b}"
    ))))
}

fn os_module() -> Value {
    let path_attrs: BTreeMap<String, Value> = [
        (
            "join".to_string(),
            native_fn("os.path.join", |_interp, args| {
                let mut parts = Vec::new();
                for arg in &args.args {
                    parts.push(path_string(arg)?);
                }
                Ok(Value::str(parts.join("/")))
            }),
        ),
        (
            "dirname".to_string(),
            native_fn("os.path.dirname", |_interp, args| {
                let path = args.str_arg(0, "path")?;
                Ok(Value::str(
                    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(""),
                ))
            }),
        ),
        (
            "basename".to_string(),
            native_fn("os.path.basename", |_interp, args| {
                let path = args.str_arg(0, "path")?;
                Ok(Value::str(
                    path.rsplit_once('/').map(|(_, base)| base).unwrap_or(path),
                ))
            }),
        ),
        (
            "normpath".to_string(),
            native_fn("os.path.normpath", |_interp, args| {
                Ok(Value::str(crate::pathutil::normalize_str(
                    args.str_arg(0, "path")?,
                )))
            }),
        ),
        (
            "splitext".to_string(),
            native_fn("os.path.splitext", |_interp, args| {
                let path = args.str_arg(0, "path")?;
                let (stem, ext) = match path.rfind('.') {
                    Some(pos) if !path[pos..].contains('/') => (&path[..pos], &path[pos..]),
                    _ => (path, ""),
                };
                Ok(Value::string_list([stem, ext]))
            }),
        ),
    ]
    .into_iter()
    .collect();

    let attrs: BTreeMap<String, Value> = [
        ("path".to_string(), StubModule::new("os.path", path_attrs)),
        ("sep".to_string(), Value::str("/")),
        ("name".to_string(), Value::str("posix")),
    ]
    .into_iter()
    .collect();
    StubModule::new("os", attrs)
}

fn libtbx_module() -> Value {
    let env_config: BTreeMap<String, Value> = [
        (
            "include_registry".to_string(),
            native_fn("include_registry", |_interp, _args| {
                Ok(Value::native(IncludeRegistry))
            }),
        ),
        (
            "is_64bit_architecture".to_string(),
            native_fn("is_64bit_architecture", |_interp, _args| {
                Ok(Value::Bool(true))
            }),
        ),
        (
            "python_include_path".to_string(),
            native_fn("python_include_path", |_interp, _args| {
                Ok(Value::str("PYTHON/INCLUDE/PATH"))
            }),
        ),
        ("unique_paths".to_string(), native_fn("unique_paths", unique_paths)),
        (
            "darwin_shlinkcom".to_string(),
            native_fn("darwin_shlinkcom", darwin_shlinkcom),
        ),
    ]
    .into_iter()
    .collect();

    let utils: BTreeMap<String, Value> = [
        (
            "select_matching".to_string(),
            native_fn("select_matching", select_matching),
        ),
        (
            "warn_if_unexpected_md5_hexdigest".to_string(),
            noop_stub("warn_if_unexpected_md5_hexdigest"),
        ),
        (
            "write_this_is_auto_generated".to_string(),
            noop_stub("write_this_is_auto_generated"),
        ),
        ("getenv_bool".to_string(), fail_stub("getenv_bool")),
    ]
    .into_iter()
    .collect();

    let str_utils: BTreeMap<String, Value> =
        [("show_string".to_string(), fail_stub("show_string"))]
            .into_iter()
            .collect();

    let path: BTreeMap<String, Value> = [
        ("norm_join".to_string(), native_fn("norm_join", norm_join)),
        (
            "full_command_path".to_string(),
            fail_stub("full_command_path"),
        ),
    ]
    .into_iter()
    .collect();

    let easy_run: BTreeMap<String, Value> = [(
        "fully_buffered".to_string(),
        native_fn("fully_buffered", easy_run_fully_buffered),
    )]
    .into_iter()
    .collect();

    let attrs: BTreeMap<String, Value> = [
        ("env".to_string(), Value::native(LibtbxEnv)),
        (
            "load_env".to_string(),
            StubModule::new("libtbx.load_env", BTreeMap::new()),
        ),
        (
            "env_config".to_string(),
            StubModule::new("libtbx.env_config", env_config),
        ),
        ("utils".to_string(), StubModule::new("libtbx.utils", utils)),
        (
            "str_utils".to_string(),
            StubModule::new("libtbx.str_utils", str_utils),
        ),
        ("path".to_string(), StubModule::new("libtbx.path", path)),
        (
            "easy_run".to_string(),
            StubModule::new("libtbx.easy_run", easy_run),
        ),
        ("manual_date_stamp".to_string(), Value::Int(20090819)),
        (
            "group_args".to_string(),
            native_fn("group_args", |_interp, args| {
                Ok(AttrDict::from_kwargs(args.kwargs))
            }),
        ),
    ]
    .into_iter()
    .collect();
    StubModule::new("libtbx", attrs)
}

fn scons_module() -> Value {
    let action: BTreeMap<String, Value> = [(
        "FunctionAction".to_string(),
        OpaqueSentinel::value("SCons.Action.FunctionAction"),
    )]
    .into_iter()
    .collect();
    let scanner_c: BTreeMap<String, Value> = [(
        "CScanner".to_string(),
        OpaqueSentinel::value("SCons.Scanner.C.CScanner"),
    )]
    .into_iter()
    .collect();
    let scanner: BTreeMap<String, Value> = [(
        "C".to_string(),
        StubModule::new("SCons.Scanner.C", scanner_c),
    )]
    .into_iter()
    .collect();
    let attrs: BTreeMap<String, Value> = [
        ("Action".to_string(), StubModule::new("SCons.Action", action)),
        (
            "Scanner".to_string(),
            StubModule::new("SCons.Scanner", scanner),
        ),
    ]
    .into_iter()
    .collect();
    StubModule::new("SCons", attrs)
}

fn fftw3tbx_module() -> Value {
    let attrs: BTreeMap<String, Value> = [("fftw3_h".to_string(), Value::str("fftw3.h"))]
        .into_iter()
        .collect();
    StubModule::new("fftw3tbx", attrs)
}

/// All importable stub modules, keyed by their root name.
pub fn stub_modules() -> HashMap<String, Value> {
    HashMap::from([
        ("libtbx".to_string(), libtbx_module()),
        ("fftw3tbx".to_string(), fftw3tbx_module()),
        ("SCons".to_string(), scons_module()),
        ("os".to_string(), os_module()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(value: &Value, args: CallArgs) -> Result<Value> {
        let mut interp = Interp::new(HashMap::new());
        match value {
            Value::Native(object) => object.call(&mut interp, args),
            other => panic!("not callable: {other:?}"),
        }
    }

    #[test]
    fn easy_run_recognises_only_whitelisted_commands() {
        let result = easy_run_fully_buffered(
            &mut Interp::new(HashMap::new()),
            CallArgs::positional(vec![Value::str("nvcc --version")]),
        )
        .unwrap();
        match result {
            Value::Native(object) => {
                let lines = object.get_attr("stdout_lines").unwrap().unwrap();
                assert_eq!(
                    lines.string_items().unwrap(),
                    vec!["Cuda compilation tools, release 8.0, V8.0.61"]
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let err = easy_run_fully_buffered(
            &mut Interp::new(HashMap::new()),
            CallArgs::positional(vec![Value::str("rm -rf /")]),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("rm -rf /"));
    }

    #[test]
    fn build_options_are_fail_closed() {
        let options = BuildOptions;
        assert!(options.get_attr("enable_cuda").unwrap().unwrap().truthy());
        assert!(options.get_attr("enable_warp_drive").is_err());
    }

    #[test]
    fn select_matching_returns_first_match() {
        let choices = Value::list(vec![
            Value::list(vec![Value::str("^foo"), Value::str("first")]),
            Value::list(vec![Value::str("bar"), Value::str("second")]),
        ]);
        let result = select_matching(
            &mut Interp::new(HashMap::new()),
            CallArgs::positional(vec![Value::str("rebar"), choices]),
        )
        .unwrap();
        assert_eq!(result.as_str().unwrap(), "second");
    }

    #[test]
    fn group_args_supports_attribute_mutation() {
        let bag = AttrDict::from_kwargs(vec![("x".to_string(), Value::Int(1))]);
        match &bag {
            Value::Native(object) => {
                assert_eq!(
                    object.get_attr("x").unwrap().unwrap().as_int().unwrap(),
                    1
                );
                object.set_attr("y", Value::Int(2)).unwrap();
                assert_eq!(
                    object.get_attr("y").unwrap().unwrap().as_int().unwrap(),
                    2
                );
                assert!(object.get_attr("z").is_err());
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn libtbx_env_paths() {
        let env = LibtbxEnv;
        let mut interp = Interp::new(HashMap::new());
        let built = env
            .call_method(
                "under_build",
                &mut interp,
                CallArgs::positional(vec![Value::str("include")]),
            )
            .unwrap();
        assert_eq!(built.as_str().unwrap(), "UNDERBUILD/include");
        let dist = env
            .call_method(
                "under_dist",
                &mut interp,
                CallArgs::positional(vec![Value::str("scitbx"), Value::str("array_family")]),
            )
            .unwrap();
        assert_eq!(dist.as_str().unwrap(), "DISTPATH[scitbx]/array_family");
    }

    #[test]
    fn opaque_sentinels_are_callable() {
        let sentinel = OpaqueSentinel::value("SCons.Action.FunctionAction");
        let result = call(&sentinel, CallArgs::positional(vec![Value::Int(1)])).unwrap();
        assert_eq!(result.type_name(), "sentinel");
    }
}
