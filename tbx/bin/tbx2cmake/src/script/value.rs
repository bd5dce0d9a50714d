// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Runtime values for the build-script dialect.
//!
//! Lists and dicts are shared, mutable references, matching the language the
//! scripts were written in. Everything the emulation surface exposes to the
//! scripts (environments, stub modules, fake paths) implements
//! [`NativeObject`].

use std::{any::Any, cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use anyhow::{anyhow, bail, Result};
use itertools::Itertools;

use super::interp::{FunctionDef, Interp};

/// Evaluated call arguments.
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Self {
        Self { args, kwargs }
    }

    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: Vec::new(),
        }
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn str_arg(&self, index: usize, what: &str) -> Result<&str> {
        self.args
            .get(index)
            .ok_or_else(|| anyhow!("missing argument: {what}"))?
            .as_str()
            .map_err(|_| anyhow!("argument {what} must be a string"))
    }

    pub fn require_no_kwargs(&self, callee: &str) -> Result<()> {
        if let Some((name, _)) = self.kwargs.first() {
            bail!("{callee} got an unexpected keyword argument '{name}'");
        }
        Ok(())
    }
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<BTreeMap<String, Value>>>),
    Function(Rc<FunctionDef>),
    Native(Rc<dyn NativeObject>),
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn string_list<I: IntoIterator<Item = S>, S: Into<String>>(items: I) -> Self {
        Value::list(items.into_iter().map(|s| Value::Str(s.into())).collect())
    }

    pub fn dict(items: BTreeMap<String, Value>) -> Self {
        Value::Dict(Rc::new(RefCell::new(items)))
    }

    pub fn native(object: impl NativeObject + 'static) -> Self {
        Value::Native(Rc::new(object))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Function(_) => "function",
            Value::Native(object) => object.type_name(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::Str(value) => !value.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Dict(items) => !items.borrow().is_empty(),
            Value::Function(_) | Value::Native(_) => true,
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(value) => Ok(value),
            other => bail!("expected a string, got {}", other.type_name()),
        }
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(value) => Ok(*value),
            other => bail!("expected an integer, got {}", other.type_name()),
        }
    }

    /// Returns a snapshot of the list items.
    pub fn iter_list(&self) -> Result<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items.borrow().clone()),
            other => bail!("expected a list, got {}", other.type_name()),
        }
    }

    /// A snapshot of the list as strings; errors if any item is not one.
    pub fn string_items(&self) -> Result<Vec<String>> {
        self.iter_list()?
            .iter()
            .map(|item| item.as_str().map(|s| s.to_string()))
            .collect()
    }

    /// The `str()` form of the value.
    pub fn display_str(&self) -> String {
        match self {
            Value::Str(value) => value.clone(),
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(value) => value.to_string(),
            other => other.repr(),
        }
    }

    pub fn repr(&self) -> String {
        match self {
            Value::Str(value) => format!("'{value}'"),
            Value::List(items) => {
                format!("[{}]", items.borrow().iter().map(|v| v.repr()).join(", "))
            }
            Value::Dict(items) => format!(
                "{{{}}}",
                items
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("'{k}': {}", v.repr()))
                    .join(", ")
            ),
            Value::Function(function) => format!("<function {}>", function.name),
            Value::Native(object) => object.repr(),
            other => other.display_str(),
        }
    }

    /// Structural equality for the data variants, identity for natives.
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Int(b)) | (Value::Int(b), Value::Bool(a)) => {
                i64::from(*a) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.py_eq(vb))
            }
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// A recursive copy: fresh lists and dicts, shared natives.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::List(items) => {
                Value::list(items.borrow().iter().map(|v| v.deep_copy()).collect())
            }
            Value::Dict(items) => Value::dict(
                items
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_copy()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

/// The interface every emulation-surface object implements.
///
/// The default implementations are all fail-closed: an object only answers
/// for what it explicitly supports, and everything else produces an error
/// naming the missing piece.
pub trait NativeObject {
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn repr(&self) -> String {
        format!("<{}>", self.type_name())
    }

    fn get_attr(&self, _name: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    fn set_attr(&self, name: &str, _value: Value) -> Result<()> {
        bail!(
            "{} does not support setting attribute '{}'",
            self.type_name(),
            name
        );
    }

    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn call_method(&self, name: &str, _interp: &mut Interp, _args: CallArgs) -> Result<Value> {
        bail!("{} has no method '{}'", self.type_name(), name);
    }

    fn call(&self, _interp: &mut Interp, _args: CallArgs) -> Result<Value> {
        bail!("{} is not callable", self.type_name());
    }

    fn get_index(&self, key: &Value) -> Result<Value> {
        bail!(
            "{} is not indexable (index was {})",
            self.type_name(),
            key.repr()
        );
    }

    fn set_index(&self, key: &Value, _value: Value) -> Result<()> {
        bail!(
            "{} does not support item assignment (index was {})",
            self.type_name(),
            key.repr()
        );
    }
}

/// A method looked up on a native object, not yet called.
pub struct BoundMethod {
    pub recv: Rc<dyn NativeObject>,
    pub name: String,
}

impl NativeObject for BoundMethod {
    fn type_name(&self) -> &'static str {
        "bound method"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn repr(&self) -> String {
        format!("<method {} of {}>", self.name, self.recv.repr())
    }

    fn call(&self, interp: &mut Interp, args: CallArgs) -> Result<Value> {
        self.recv.call_method(&self.name, interp, args)
    }
}

/// A method looked up on a string, list or dict value.
pub struct BuiltinMethod {
    pub recv: Value,
    pub name: String,
}

impl NativeObject for BuiltinMethod {
    fn type_name(&self) -> &'static str {
        "builtin method"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call(&self, _interp: &mut Interp, args: CallArgs) -> Result<Value> {
        call_builtin_method(&self.recv, &self.name, args)
    }
}

/// A free native function.
pub struct NativeFunc {
    name: String,
    #[allow(clippy::type_complexity)]
    f: Box<dyn Fn(&mut Interp, CallArgs) -> Result<Value>>,
}

impl NativeObject for NativeFunc {
    fn type_name(&self) -> &'static str {
        "function"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn repr(&self) -> String {
        format!("<function {}>", self.name)
    }

    fn call(&self, interp: &mut Interp, args: CallArgs) -> Result<Value> {
        (self.f)(interp, args).map_err(|err| err.context(format!("in {}()", self.name)))
    }
}

pub fn native_fn(
    name: impl Into<String>,
    f: impl Fn(&mut Interp, CallArgs) -> Result<Value> + 'static,
) -> Value {
    Value::native(NativeFunc {
        name: name.into(),
        f: Box::new(f),
    })
}

pub fn has_builtin_method(recv: &Value, name: &str) -> bool {
    let names: &[&str] = match recv {
        Value::Str(_) => &[
            "startswith",
            "endswith",
            "split",
            "strip",
            "replace",
            "join",
            "format",
            "find",
            "lower",
        ],
        Value::List(_) => &["append", "extend", "remove"],
        Value::Dict(_) => &["get", "keys"],
        _ => &[],
    };
    names.contains(&name)
}

pub fn call_builtin_method(recv: &Value, name: &str, args: CallArgs) -> Result<Value> {
    match recv {
        Value::Str(text) => str_method(text, name, args),
        Value::List(items) => {
            args.require_no_kwargs(name)?;
            match name {
                "append" => {
                    let item = args
                        .args
                        .first()
                        .ok_or_else(|| anyhow!("append() takes one argument"))?;
                    items.borrow_mut().push(item.clone());
                    Ok(Value::None)
                }
                "extend" => {
                    let extra = args
                        .args
                        .first()
                        .ok_or_else(|| anyhow!("extend() takes one argument"))?
                        .iter_list()?;
                    items.borrow_mut().extend(extra);
                    Ok(Value::None)
                }
                "remove" => {
                    let needle = args
                        .args
                        .first()
                        .ok_or_else(|| anyhow!("remove() takes one argument"))?;
                    let mut items = items.borrow_mut();
                    let index = items
                        .iter()
                        .position(|item| item.py_eq(needle))
                        .ok_or_else(|| anyhow!("remove(): {} not in list", needle.repr()))?;
                    items.remove(index);
                    Ok(Value::None)
                }
                _ => bail!("list has no method '{name}'"),
            }
        }
        Value::Dict(items) => {
            args.require_no_kwargs(name)?;
            match name {
                "get" => {
                    let key = args.str_arg(0, "key")?;
                    let default = args.args.get(1).cloned().unwrap_or(Value::None);
                    Ok(items.borrow().get(key).cloned().unwrap_or(default))
                }
                "keys" => Ok(Value::string_list(
                    items.borrow().keys().cloned().collect::<Vec<_>>(),
                )),
                _ => bail!("dict has no method '{name}'"),
            }
        }
        other => bail!("{} has no method '{name}'", other.type_name()),
    }
}

fn str_method(text: &str, name: &str, args: CallArgs) -> Result<Value> {
    args.require_no_kwargs(name)?;
    match name {
        "startswith" => Ok(Value::Bool(text.starts_with(args.str_arg(0, "prefix")?))),
        "endswith" => Ok(Value::Bool(text.ends_with(args.str_arg(0, "suffix")?))),
        "split" => {
            let parts: Vec<&str> = match args.args.first() {
                Some(sep) => text.split(sep.as_str()?).collect(),
                None => text.split_whitespace().collect(),
            };
            Ok(Value::string_list(parts))
        }
        "strip" => Ok(Value::str(text.trim())),
        "replace" => Ok(Value::str(
            text.replace(args.str_arg(0, "from")?, args.str_arg(1, "to")?),
        )),
        "join" => {
            let items = args
                .args
                .first()
                .ok_or_else(|| anyhow!("join() takes one argument"))?
                .string_items()?;
            Ok(Value::str(items.join(text)))
        }
        "format" => {
            let mut result = String::new();
            let mut fields = args.args.iter();
            let mut rest = text;
            while let Some(pos) = rest.find("{}") {
                result.push_str(&rest[..pos]);
                let field = fields
                    .next()
                    .ok_or_else(|| anyhow!("format(): not enough arguments for '{text}'"))?;
                result.push_str(&field.display_str());
                rest = &rest[pos + 2..];
            }
            result.push_str(rest);
            Ok(Value::str(result))
        }
        "find" => {
            let needle = args.str_arg(0, "substring")?;
            Ok(Value::Int(
                text.find(needle).map(|i| i as i64).unwrap_or(-1),
            ))
        }
        "lower" => Ok(Value::str(text.to_lowercase())),
        _ => bail!("str has no method '{name}'"),
    }
}
