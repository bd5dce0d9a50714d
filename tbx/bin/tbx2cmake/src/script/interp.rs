// Copyright 2026 The tbx2cmake Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Tree-walking evaluator for the build-script dialect.
//!
//! The interpreter is deliberately small: scripts run synchronously on one
//! thread, there is no sandboxing of the values the emulation surface hands
//! out, and any failure aborts the whole conversion (the scripts are the
//! developer's own, and a script that cannot run points at a gap in the
//! emulation surface, not at user input to be recovered from).

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use anyhow::{bail, Context, Result};

use super::ast::{
    AssignTarget, BinaryOp, CompareOp, Expr, LogicOp, Param, Stmt, StmtKind, UnaryOp,
};
use super::value::{
    has_builtin_method, native_fn, BoundMethod, BuiltinMethod, CallArgs, Value,
};

/// A flat name→value scope. Module globals and function locals are both
/// scopes; there is no intermediate nesting in the dialect.
#[derive(Debug)]
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
}

pub type ScopeRef = Rc<Scope>;

impl Scope {
    pub fn new() -> ScopeRef {
        Rc::new(Scope {
            vars: RefCell::new(HashMap::new()),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }
}

/// A user-defined function together with the globals of its defining script.
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Rc<Vec<Stmt>>,
    pub globals: ScopeRef,
}

struct Frame {
    /// `None` for module-level frames.
    func_name: Option<String>,
    locals: ScopeRef,
    globals: ScopeRef,
}

enum Flow {
    Normal,
    Return(Value),
}

pub struct Interp {
    frames: Vec<Frame>,
    stub_modules: HashMap<String, Value>,
}

impl Interp {
    pub fn new(stub_modules: HashMap<String, Value>) -> Self {
        Self {
            frames: Vec::new(),
            stub_modules,
        }
    }

    /// The name of the innermost user function currently executing, if any.
    /// The configure stubs use this to recognise probes by their caller.
    pub fn innermost_function(&self) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.func_name.as_deref())
    }

    /// The globals of the currently executing script.
    pub fn current_globals(&self) -> Result<ScopeRef> {
        self.frames
            .last()
            .map(|frame| frame.globals.clone())
            .context("no script is currently executing")
    }

    /// Runs a parsed script against the given globals.
    pub fn exec_module(&mut self, stmts: &[Stmt], globals: ScopeRef) -> Result<()> {
        self.frames.push(Frame {
            func_name: None,
            locals: globals.clone(),
            globals,
        });
        let result = self.exec_block(stmts);
        self.frames.pop();
        match result? {
            Flow::Return(_) => bail!("'return' outside of a function"),
            Flow::Normal => Ok(()),
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        self.exec_stmt_kind(&stmt.kind)
            .with_context(|| format!("at line {}", stmt.line))
    }

    fn exec_stmt_kind(&mut self, kind: &StmtKind) -> Result<Flow> {
        match kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
                Ok(Flow::Normal)
            }
            StmtKind::Import(path) => {
                let root = &path[0];
                let module = self
                    .stub_modules
                    .get(root)
                    .cloned()
                    .with_context(|| format!("no emulation stub for module '{root}'"))?;
                // Validate the whole dotted path so a missing submodule stub
                // fails at the import, not at first use.
                let mut current = module.clone();
                for segment in &path[1..] {
                    current = match &current {
                        Value::Native(object) => object
                            .get_attr(segment)?
                            .with_context(|| {
                                format!("no emulation stub for module '{}'", path.join("."))
                            })?,
                        other => bail!("'{}' is not a module", other.type_name()),
                    };
                }
                self.current_locals()?.set(root.clone(), module);
                Ok(Flow::Normal)
            }
            StmtKind::If { arms, orelse } => {
                for (cond, body) in arms {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(orelse)
            }
            StmtKind::For { var, iter, body } => {
                let items = match self.eval(iter)? {
                    Value::List(items) => items.borrow().clone(),
                    Value::Dict(items) => items
                        .borrow()
                        .keys()
                        .map(|key| Value::str(key.clone()))
                        .collect(),
                    other => bail!("cannot iterate over {}", other.type_name()),
                };
                for item in items {
                    self.current_locals()?.set(var.clone(), item);
                    match self.exec_block(body)? {
                        Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Def { name, params, body } => {
                let function = FunctionDef {
                    name: name.clone(),
                    params: params.clone(),
                    body: Rc::clone(body),
                    globals: self.current_globals()?,
                };
                self.current_locals()?
                    .set(name.clone(), Value::Function(Rc::new(function)));
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                if self.innermost_function().is_none() {
                    bail!("'return' outside of a function");
                }
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Pass => Ok(Flow::Normal),
        }
    }

    fn current_locals(&self) -> Result<ScopeRef> {
        self.frames
            .last()
            .map(|frame| frame.locals.clone())
            .context("no script is currently executing")
    }

    fn assign(&mut self, target: &AssignTarget, value: Value) -> Result<()> {
        match target {
            AssignTarget::Name(name) => {
                self.current_locals()?.set(name.clone(), value);
                Ok(())
            }
            AssignTarget::Attr(obj, name) => match self.eval(obj)? {
                Value::Native(object) => object.set_attr(name, value),
                other => bail!("cannot set attribute on {}", other.type_name()),
            },
            AssignTarget::Index(obj, key) => {
                let key = self.eval(key)?;
                match self.eval(obj)? {
                    Value::Dict(items) => {
                        items
                            .borrow_mut()
                            .insert(key.as_str()?.to_string(), value);
                        Ok(())
                    }
                    Value::List(items) => {
                        let index = normalize_index(key.as_int()?, items.borrow().len())?;
                        items.borrow_mut()[index] = value;
                        Ok(())
                    }
                    Value::Native(object) => object.set_index(&key, value),
                    other => bail!("{} does not support item assignment", other.type_name()),
                }
            }
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Str(value) => Ok(Value::str(value.clone())),
            Expr::Int(value) => Ok(Value::Int(*value)),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::None => Ok(Value::None),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            Expr::Dict(items) => {
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in items {
                    let key = self.eval(key)?;
                    map.insert(key.as_str()?.to_string(), self.eval(value)?);
                }
                Ok(Value::dict(map))
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => Ok(Value::Int(-operand.as_int()?)),
                    UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)
            }
            Expr::Compare(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.compare(*op, left, right)
            }
            Expr::Logic(op, left, right) => {
                let left = self.eval(left)?;
                match (op, left.truthy()) {
                    (LogicOp::And, false) | (LogicOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::Call {
                callee,
                args,
                kwargs,
            } => {
                let callee = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                let kwargs = kwargs
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), self.eval(value)?)))
                    .collect::<Result<Vec<_>>>()?;
                self.call_value(&callee, CallArgs::new(args, kwargs))
            }
            Expr::Attr(obj, name) => {
                let obj = self.eval(obj)?;
                self.get_attr(&obj, name)
            }
            Expr::Index(obj, key) => {
                let obj = self.eval(obj)?;
                let key = self.eval(key)?;
                match &obj {
                    Value::List(items) => {
                        let items = items.borrow();
                        let index = normalize_index(key.as_int()?, items.len())?;
                        Ok(items[index].clone())
                    }
                    Value::Dict(items) => items
                        .borrow()
                        .get(key.as_str()?)
                        .cloned()
                        .with_context(|| format!("key {} not found", key.repr())),
                    Value::Native(object) => object.get_index(&key),
                    other => bail!("{} is not indexable", other.type_name()),
                }
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        let frame = self
            .frames
            .last()
            .context("no script is currently executing")?;
        frame
            .locals
            .get(name)
            .or_else(|| frame.globals.get(name))
            .with_context(|| format!("name '{name}' is not defined"))
    }

    fn get_attr(&mut self, obj: &Value, name: &str) -> Result<Value> {
        match obj {
            Value::Native(object) => {
                if let Some(value) = object.get_attr(name)? {
                    return Ok(value);
                }
                if object.has_method(name) {
                    return Ok(Value::native(BoundMethod {
                        recv: Rc::clone(object),
                        name: name.to_string(),
                    }));
                }
                bail!("{} has no attribute '{}'", object.type_name(), name);
            }
            recv @ (Value::Str(_) | Value::List(_) | Value::Dict(_)) => {
                if has_builtin_method(recv, name) {
                    Ok(Value::native(BuiltinMethod {
                        recv: recv.clone(),
                        name: name.to_string(),
                    }))
                } else {
                    bail!("{} has no attribute '{}'", recv.type_name(), name);
                }
            }
            other => bail!("{} has no attribute '{}'", other.type_name(), name),
        }
    }

    pub fn call_value(&mut self, callee: &Value, args: CallArgs) -> Result<Value> {
        match callee {
            Value::Function(function) => self.call_function(function, args),
            Value::Native(object) => object.clone().call(self, args),
            other => bail!("{} is not callable", other.type_name()),
        }
    }

    fn call_function(&mut self, function: &Rc<FunctionDef>, args: CallArgs) -> Result<Value> {
        if args.args.len() > function.params.len() {
            bail!(
                "{}() takes at most {} arguments ({} given)",
                function.name,
                function.params.len(),
                args.args.len()
            );
        }
        let locals = Scope::new();
        self.frames.push(Frame {
            func_name: Some(function.name.clone()),
            locals: locals.clone(),
            globals: function.globals.clone(),
        });
        let result = (|| -> Result<Flow> {
            for (param, value) in function.params.iter().zip(args.args.iter()) {
                locals.set(param.name.clone(), value.clone());
            }
            for (name, value) in &args.kwargs {
                if !function.params.iter().any(|param| &param.name == name) {
                    bail!(
                        "{}() got an unexpected keyword argument '{}'",
                        function.name,
                        name
                    );
                }
                locals.set(name.clone(), value.clone());
            }
            for param in &function.params {
                if locals.get(&param.name).is_none() {
                    match &param.default {
                        Some(default) => {
                            let value = self.eval(default)?;
                            locals.set(param.name.clone(), value);
                        }
                        None => bail!(
                            "{}() missing required argument '{}'",
                            function.name,
                            param.name
                        ),
                    }
                }
            }
            self.exec_block(&function.body)
        })();
        self.frames.pop();
        let flow = result.with_context(|| format!("in function '{}'", function.name))?;
        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Normal => Value::None,
        })
    }

    fn binary(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value> {
        match op {
            BinaryOp::Add => match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
                (Value::List(a), Value::List(b)) => {
                    let mut items = a.borrow().clone();
                    items.extend(b.borrow().iter().cloned());
                    Ok(Value::list(items))
                }
                _ => bail!(
                    "cannot add {} and {}",
                    left.type_name(),
                    right.type_name()
                ),
            },
            BinaryOp::Sub => Ok(Value::Int(left.as_int()? - right.as_int()?)),
        }
    }

    fn compare(&self, op: CompareOp, left: Value, right: Value) -> Result<Value> {
        let result = match op {
            CompareOp::Eq => left.py_eq(&right),
            CompareOp::Ne => !left.py_eq(&right),
            CompareOp::In | CompareOp::NotIn => {
                let contains = match &right {
                    Value::Str(haystack) => haystack.contains(left.as_str()?),
                    Value::List(items) => items.borrow().iter().any(|item| item.py_eq(&left)),
                    Value::Dict(items) => items.borrow().contains_key(left.as_str()?),
                    other => bail!("'in' is not supported for {}", other.type_name()),
                };
                if op == CompareOp::In {
                    contains
                } else {
                    !contains
                }
            }
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                let ordering = match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => a.cmp(b),
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    _ => bail!(
                        "cannot order {} and {}",
                        left.type_name(),
                        right.type_name()
                    ),
                };
                match op {
                    CompareOp::Lt => ordering.is_lt(),
                    CompareOp::Le => ordering.is_le(),
                    CompareOp::Gt => ordering.is_gt(),
                    CompareOp::Ge => ordering.is_ge(),
                    _ => unreachable!(),
                }
            }
        };
        Ok(Value::Bool(result))
    }
}

fn normalize_index(index: i64, len: usize) -> Result<usize> {
    let adjusted = if index < 0 { index + len as i64 } else { index };
    if adjusted < 0 || adjusted as usize >= len {
        bail!("list index {index} out of range (length {len})");
    }
    Ok(adjusted as usize)
}

/// The language-level builtin functions, independent of the emulation
/// surface.
pub fn language_builtins() -> Vec<(String, Value)> {
    vec![
        (
            "len".to_string(),
            native_fn("len", |_interp, args| {
                let value = args
                    .args
                    .first()
                    .context("len() takes exactly one argument")?;
                let len = match value {
                    Value::Str(text) => text.chars().count(),
                    Value::List(items) => items.borrow().len(),
                    Value::Dict(items) => items.borrow().len(),
                    other => bail!("len() is not supported for {}", other.type_name()),
                };
                Ok(Value::Int(len as i64))
            }),
        ),
        (
            "str".to_string(),
            native_fn("str", |_interp, args| {
                let value = args
                    .args
                    .first()
                    .context("str() takes exactly one argument")?;
                Ok(Value::str(value.display_str()))
            }),
        ),
        (
            "sorted".to_string(),
            native_fn("sorted", |_interp, args| {
                let items = args
                    .args
                    .first()
                    .context("sorted() takes exactly one argument")?
                    .iter_list()?;
                let mut strings = Vec::with_capacity(items.len());
                for item in &items {
                    strings.push(item.as_str()?.to_string());
                }
                strings.sort();
                Ok(Value::string_list(strings))
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse;

    fn run(source: &str) -> Result<ScopeRef> {
        let stmts = parse(source)?;
        let globals = Scope::new();
        for (name, value) in language_builtins() {
            globals.set(name, value);
        }
        let mut interp = Interp::new(HashMap::new());
        interp.exec_module(&stmts, globals.clone())?;
        Ok(globals)
    }

    fn get_str(scope: &ScopeRef, name: &str) -> String {
        scope.get(name).unwrap().as_str().unwrap().to_string()
    }

    #[test]
    fn evaluates_arithmetic_and_logic() {
        let scope = run("x = 1 + 2\ny = x == 3 and 'a' in 'cat'\n").unwrap();
        assert_eq!(scope.get("x").unwrap().as_int().unwrap(), 3);
        assert!(scope.get("y").unwrap().truthy());
    }

    #[test]
    fn or_returns_the_first_truthy_operand() {
        let scope = run("x = '' or 'fallback'\n").unwrap();
        assert_eq!(get_str(&scope, "x"), "fallback");
    }

    #[test]
    fn functions_bind_args_and_defaults() {
        let scope = run("def f(a, b='d'):\n  return a + b\nx = f('c')\ny = f('c', b='e')\n")
            .unwrap();
        assert_eq!(get_str(&scope, "x"), "cd");
        assert_eq!(get_str(&scope, "y"), "ce");
    }

    #[test]
    fn for_loops_iterate_lists() {
        let scope = run("total = 0\nfor n in [1, 2, 3]:\n  total = total + n\n").unwrap();
        assert_eq!(scope.get("total").unwrap().as_int().unwrap(), 6);
    }

    #[test]
    fn string_methods_work() {
        let scope = run(
            "a = 'boost_python'.startswith('boost')\nb = '/'.join(['x', 'y'])\nc = '{}_ext'.format('mod')\n",
        )
        .unwrap();
        assert!(scope.get("a").unwrap().truthy());
        assert_eq!(get_str(&scope, "b"), "x/y");
        assert_eq!(get_str(&scope, "c"), "mod_ext");
    }

    #[test]
    fn list_mutation_is_shared() {
        let scope = run("a = [1]\nb = a\nb.append(2)\nn = len(a)\n").unwrap();
        assert_eq!(scope.get("n").unwrap().as_int().unwrap(), 2);
    }

    #[test]
    fn undefined_names_are_reported() {
        let err = run("x = nope\n").unwrap_err();
        assert!(format!("{err:#}").contains("name 'nope' is not defined"));
    }

    #[test]
    fn unknown_imports_are_fail_closed() {
        let err = run("import sys\n").unwrap_err();
        assert!(format!("{err:#}").contains("no emulation stub for module 'sys'"));
    }

    #[test]
    fn dict_indexing_and_get() {
        let scope = run("d = {'a': 1}\nx = d['a']\ny = d.get('b', 9)\nd['c'] = 3\nz = d['c']\n")
            .unwrap();
        assert_eq!(scope.get("x").unwrap().as_int().unwrap(), 1);
        assert_eq!(scope.get("y").unwrap().as_int().unwrap(), 9);
        assert_eq!(scope.get("z").unwrap().as_int().unwrap(), 3);
    }
}
