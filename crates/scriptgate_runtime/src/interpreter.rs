//! Tree-walking interpreter over compiled scripts.
//!
//! Every attribute read, item access, iteration, call and import goes
//! through this module's dispatch; scripts never touch a host object
//! directly. Cancellation and the step budget are checked before every
//! statement, loop iteration, comprehension element and call.

use crate::args::Args;
use crate::builtins;
use crate::capability::CapabilityRegistry;
use crate::host::HostContext;
use crate::import::{ImportGate, ModuleHandle};
use crate::meter::{StepMeter, STEP_LIMIT_KIND};
use crate::methods;
use crate::ops;
use crate::output::OutputCollector;
use crate::value::{type_error, value_error, BoundMethod, DictMap, Key, ModuleValue, Value, MAX_SEQUENCE_LEN};
use indexmap::IndexMap;
use scriptgate_core::{GateResult, ScriptError};
use scriptgate_script::ast::{
    BoolOp, CmpOp, Comprehension, ExceptHandler, Expr, ExprKind, FunctionDef, Literal, Program, Stmt,
    StmtKind, Target,
};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Maximum nesting of script function calls
pub const MAX_CALL_DEPTH: usize = 100;

/// Variable scope
#[derive(Default)]
pub struct Env {
    vars: RefCell<IndexMap<String, Value>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    /// Fresh top-level scope
    #[must_use]
    pub fn global() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Scope nested in `parent`
    #[must_use]
    pub fn child(parent: &Rc<Env>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(IndexMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Look a name up through enclosing scopes
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.vars.borrow().get(name) {
                return Some(value.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// Bind a name in this scope
    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Unbind a name in this scope
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().shift_remove(name)
    }

    /// Bindings of this scope, in definition order
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.vars.borrow().clone()
    }

    /// Drop every binding, breaking closure cycles
    pub fn clear(&self) {
        let drained: Vec<Value> = self.vars.borrow_mut().drain(..).map(|(_, v)| v).collect();
        drop(drained);
    }
}

/// Script function together with its defining scope
pub struct Closure {
    /// Definition
    pub def: Arc<FunctionDef>,
    defaults: Vec<Option<Value>>,
    env: Rc<Env>,
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::None => Value::None,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::string(s),
    }
}

fn catchable(err: &ScriptError) -> bool {
    err.is_catchable() && err.kind() != STEP_LIMIT_KIND
}

pub(crate) fn kind_matches(handler: &str, kind: &str) -> bool {
    handler == kind
        || match handler {
            "Exception" | "BaseException" => true,
            "LookupError" => matches!(kind, "KeyError" | "IndexError"),
            "ArithmeticError" => matches!(kind, "ZeroDivisionError" | "OverflowError"),
            "RuntimeError" => kind == "RecursionError",
            "ImportError" => kind == "ImportDenied",
            _ => false,
        }
}

fn handler_matches(handler: &ExceptHandler, err: &ScriptError) -> bool {
    handler.kinds.is_empty() || handler.kinds.iter().any(|k| kind_matches(k, err.kind()))
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> GateResult<bool> {
    Ok(match op {
        CmpOp::Eq => a.py_eq(b),
        CmpOp::Ne => !a.py_eq(b),
        CmpOp::Lt => a.compare(b)? == Some(Ordering::Less),
        CmpOp::Le => matches!(a.compare(b)?, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => a.compare(b)? == Some(Ordering::Greater),
        CmpOp::Ge => matches!(a.compare(b)?, Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::In => ops::contains(b, a)?,
        CmpOp::NotIn => !ops::contains(b, a)?,
        CmpOp::Is => a.is_same(b),
        CmpOp::IsNot => !a.is_same(b),
    })
}

fn attribute_error(message: String) -> ScriptError {
    ScriptError::runtime("AttributeError", message)
}

/// Read an attribute through the guarded dispatch table
///
/// # Errors
///
/// Returns `AttributeError` for anything outside the table
pub fn get_attr(obj: &Value, attr: &str) -> GateResult<Value> {
    match obj {
        Value::Module(module) => module.members.get(attr).cloned().ok_or_else(|| {
            attribute_error(format!("module '{}' has no attribute '{attr}'", module.name))
        }),
        Value::Exception(err) if attr == "args" => Ok(Value::tuple(vec![Value::string(err.message())])),
        _ => match methods::lookup(obj, attr) {
            Some(name) => Ok(Value::Method(Rc::new(BoundMethod {
                receiver: obj.clone(),
                name,
            }))),
            None => Err(attribute_error(format!(
                "'{}' object has no attribute '{attr}'",
                obj.type_name()
            ))),
        },
    }
}

/// Script interpreter for one execution
pub struct Interpreter<'a> {
    pub(crate) host: HostContext<'a>,
    registry: &'a CapabilityRegistry,
    imports: &'a ImportGate,
    meter: StepMeter,
    depth: usize,
    handling: Vec<ScriptError>,
    modules: HashMap<String, Value>,
    loading: Vec<String>,
    module_scopes: Vec<Rc<Env>>,
}

impl<'a> Interpreter<'a> {
    /// Interpreter wired to a host context, capabilities and import gate
    #[must_use]
    pub fn new(
        host: HostContext<'a>,
        registry: &'a CapabilityRegistry,
        imports: &'a ImportGate,
        meter: StepMeter,
    ) -> Self {
        Self {
            host,
            registry,
            imports,
            meter,
            depth: 0,
            handling: Vec::new(),
            modules: HashMap::new(),
            loading: Vec::new(),
            module_scopes: Vec::new(),
        }
    }

    /// Host context
    #[must_use]
    pub fn host(&self) -> &HostContext<'a> {
        &self.host
    }

    /// Steps consumed so far
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.meter.consumed()
    }

    /// Take the output collected so far
    pub fn take_output(&mut self) -> OutputCollector {
        std::mem::take(&mut self.host.output)
    }

    /// Run a program in `globals`
    ///
    /// # Errors
    ///
    /// Returns the first uncaught error
    pub fn run(&mut self, program: &Program, globals: &Rc<Env>) -> GateResult<()> {
        self.exec_block(&program.body, globals).map(|_| ())
    }

    fn tick(&mut self) -> GateResult<()> {
        self.host.check_cancelled()?;
        self.meter.consume(1)?;
        Ok(())
    }

    fn lookup(&self, name: &str, env: &Env) -> GateResult<Value> {
        if let Some(value) = env.get(name) {
            return Ok(value);
        }
        if let Some(value) = self.registry.lookup(name, self.host.mode()) {
            return Ok(value);
        }
        builtins::lookup(name)
            .ok_or_else(|| ScriptError::runtime("NameError", format!("name '{name}' is not defined")))
    }

    fn exec_block(&mut self, body: &[Stmt], env: &Rc<Env>) -> GateResult<Flow> {
        for stmt in body {
            self.tick()?;
            let flow = self.exec_stmt(stmt, env)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Rc<Env>) -> GateResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, env)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, env)?;
                for target in targets {
                    self.assign(target, value.clone(), env)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value, env)?,
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    if self.eval(test, env)?.is_truthy() {
                        return self.exec_block(body, env);
                    }
                }
                return self.exec_block(orelse, env);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let items = ops::iterate(&self.eval(iter, env)?)?;
                for item in items {
                    self.tick()?;
                    self.assign(target, item, env)?;
                    match self.exec_block(body, env)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                return self.exec_block(orelse, env);
            }
            StmtKind::While { test, body, orelse } => {
                loop {
                    self.tick()?;
                    if !self.eval(test, env)?.is_truthy() {
                        break;
                    }
                    match self.exec_block(body, env)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Continue | Flow::Normal => {}
                    }
                }
                return self.exec_block(orelse, env);
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::FunctionDef(def) => {
                let function = self.make_closure(def, env)?;
                env.set(&def.name, function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, env),
            StmtKind::Raise(expr) => return Err(self.raised(expr.as_ref(), env)?),
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, env)?.is_truthy() {
                    let message = match msg {
                        Some(expr) => self.eval(expr, env)?.to_display(),
                        None => String::new(),
                    };
                    return Err(ScriptError::runtime("AssertionError", message));
                }
            }
            StmtKind::Import(names) => {
                for name in names {
                    let module = self.import_module(&name.name)?;
                    env.set(name.bound_name(), module);
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let imported = self.import_module(module)?;
                for name in names {
                    let member = match &imported {
                        Value::Module(m) => m.members.get(&name.name).cloned(),
                        _ => None,
                    }
                    .ok_or_else(|| {
                        ScriptError::runtime(
                            "ImportError",
                            format!("cannot import name '{}' from '{module}'", name.name),
                        )
                    })?;
                    env.set(name.bound_name(), member);
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target, env)?;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        env: &Rc<Env>,
    ) -> GateResult<Flow> {
        let outcome = match self.exec_block(body, env) {
            Ok(Flow::Normal) => self.exec_block(orelse, env),
            Ok(flow) => Ok(flow),
            Err(err) if catchable(&err) => match handlers.iter().find(|h| handler_matches(h, &err)) {
                Some(handler) => {
                    if let Some(name) = &handler.name {
                        env.set(name, Value::Exception(Rc::new(err.clone())));
                    }
                    self.handling.push(err);
                    let handled = self.exec_block(&handler.body, env);
                    self.handling.pop();
                    if let Some(name) = &handler.name {
                        env.remove(name);
                    }
                    handled
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        };
        if finalbody.is_empty() {
            return outcome;
        }
        match self.exec_block(finalbody, env)? {
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    fn raised(&mut self, expr: Option<&Expr>, env: &Rc<Env>) -> GateResult<ScriptError> {
        let Some(expr) = expr else {
            return Ok(self.handling.last().cloned().unwrap_or_else(|| {
                ScriptError::runtime("RuntimeError", "No active exception to reraise")
            }));
        };
        Ok(match self.eval(expr, env)? {
            Value::Exception(err) => (*err).clone(),
            Value::ExceptionType(kind) => ScriptError::runtime(kind.to_string(), ""),
            other => type_error(format!(
                "exceptions must derive from BaseException, not {}",
                other.type_name()
            )),
        })
    }

    fn assign(&mut self, target: &Target, value: Value, env: &Rc<Env>) -> GateResult<()> {
        match target {
            Target::Name(name, _) => env.set(name, value),
            Target::Subscript { value: container, index } => {
                let container = self.eval(container, env)?;
                let index = self.eval(index, env)?;
                ops::set_item(&container, &index, value)?;
            }
            Target::Attribute { attr, .. } => {
                return Err(attribute_error(format!("attribute '{attr}' is read-only")));
            }
            Target::Tuple(targets) => {
                let items = ops::iterate(&value)?;
                if items.len() < targets.len() {
                    return Err(value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, env)?;
                }
            }
        }
        Ok(())
    }

    fn aug_assign(
        &mut self,
        target: &Target,
        op: scriptgate_script::ast::BinOp,
        value: &Expr,
        env: &Rc<Env>,
    ) -> GateResult<()> {
        match target {
            Target::Name(name, _) => {
                let current = self.lookup(name, env)?;
                let rhs = self.eval(value, env)?;
                let updated = augmented(op, current, &rhs)?;
                env.set(name, updated);
            }
            Target::Subscript { value: container, index } => {
                let container = self.eval(container, env)?;
                let index = self.eval(index, env)?;
                let current = ops::get_item(&container, &index)?;
                let rhs = self.eval(value, env)?;
                let updated = augmented(op, current, &rhs)?;
                ops::set_item(&container, &index, updated)?;
            }
            Target::Attribute { attr, .. } => {
                return Err(attribute_error(format!("attribute '{attr}' is read-only")));
            }
            Target::Tuple(_) => {
                return Err(type_error("illegal expression for augmented assignment"));
            }
        }
        Ok(())
    }

    fn delete(&mut self, target: &Target, env: &Rc<Env>) -> GateResult<()> {
        match target {
            Target::Name(name, _) => env.remove(name).map(|_| ()).ok_or_else(|| {
                ScriptError::runtime("NameError", format!("name '{name}' is not defined"))
            }),
            Target::Subscript { value, index } => {
                let container = self.eval(value, env)?;
                let index = self.eval(index, env)?;
                ops::del_item(&container, &index)
            }
            Target::Attribute { attr, .. } => {
                Err(attribute_error(format!("attribute '{attr}' is read-only")))
            }
            Target::Tuple(targets) => {
                for target in targets {
                    self.delete(target, env)?;
                }
                Ok(())
            }
        }
    }

    fn import_module(&mut self, name: &str) -> GateResult<Value> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }
        if self.loading.iter().any(|l| l == name) {
            return Err(ScriptError::ImportDenied {
                module: name.to_string(),
                reason: "is imported circularly".to_string(),
            });
        }
        let handle = self.imports.resolve(name)?;
        let module = match &*handle {
            ModuleHandle::Native(native) => native.instantiate(),
            ModuleHandle::Script(compiled) => {
                self.loading.push(name.to_string());
                let scope = Env::global();
                let outcome = self.exec_block(&compiled.program().body, &scope);
                self.loading.pop();
                outcome?;
                let members = scope.snapshot();
                self.module_scopes.push(scope);
                Value::Module(Rc::new(ModuleValue {
                    name: name.to_string(),
                    members,
                }))
            }
        };
        debug!(module = name, "module instantiated");
        self.modules.insert(name.to_string(), module.clone());
        Ok(module)
    }

    fn make_closure(&mut self, def: &Arc<FunctionDef>, env: &Rc<Env>) -> GateResult<Value> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, env)?),
                None => None,
            });
        }
        Ok(Value::Function(Rc::new(Closure {
            def: Arc::clone(def),
            defaults,
            env: Rc::clone(env),
        })))
    }

    /// Call a callable value
    ///
    /// # Errors
    ///
    /// Returns `TypeError` for non-callables and whatever the callee raises
    pub fn call(&mut self, callee: &Value, args: Args) -> GateResult<Value> {
        self.tick()?;
        match callee {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Builtin(builtin) => builtin.call(self, args),
            Value::Host(function) => function.call(&mut self.host, args),
            Value::Native(function) => function.call(args),
            Value::Method(method) => methods::call(self, &method.receiver, method.name, args),
            Value::ExceptionType(kind) => {
                args.no_keywords(kind)?;
                let message = match args.positional.as_slice() {
                    [] => String::new(),
                    [one] => one.to_display(),
                    many => Value::tuple(many.to_vec()).repr(),
                };
                Ok(Value::Exception(Rc::new(ScriptError::runtime(kind.to_string(), message))))
            }
            other => Err(type_error(format!("'{}' object is not callable", other.type_name()))),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Args) -> GateResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::runtime("RecursionError", "maximum recursion depth exceeded"));
        }
        let def = &closure.def;
        let Args {
            positional,
            mut keywords,
        } = args;
        if positional.len() > def.params.len() {
            return Err(type_error(format!(
                "{}() takes {} positional argument{} but {} were given",
                def.name,
                def.params.len(),
                if def.params.len() == 1 { "" } else { "s" },
                positional.len()
            )));
        }
        let scope = Env::child(&closure.env);
        let mut provided = positional.into_iter();
        for (param, default) in def.params.iter().zip(&closure.defaults) {
            let keyword = keywords.iter().position(|(k, _)| *k == param.name);
            let value = match (provided.next(), keyword) {
                (Some(_), Some(_)) => {
                    return Err(type_error(format!(
                        "{}() got multiple values for argument '{}'",
                        def.name, param.name
                    )));
                }
                (Some(value), None) => value,
                (None, Some(index)) => keywords.remove(index).1,
                (None, None) => default.clone().ok_or_else(|| {
                    type_error(format!(
                        "{}() missing required argument: '{}'",
                        def.name, param.name
                    ))
                })?,
            };
            scope.set(&param.name, value);
        }
        if let Some((name, _)) = keywords.first() {
            return Err(type_error(format!(
                "{}() got an unexpected keyword argument '{name}'",
                def.name
            )));
        }
        self.depth += 1;
        let outcome = self.exec_block(&def.body, &scope);
        self.depth -= 1;
        Ok(match outcome? {
            Flow::Return(value) => value,
            _ => Value::None,
        })
    }

    fn eval_all(&mut self, exprs: &[Expr], env: &Rc<Env>) -> GateResult<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, env)).collect()
    }

    fn eval_opt(&mut self, expr: Option<&Expr>, env: &Rc<Env>) -> GateResult<Option<Value>> {
        expr.map(|e| self.eval(e, env)).transpose()
    }

    fn eval(&mut self, expr: &Expr, env: &Rc<Env>) -> GateResult<Value> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(literal(lit)),
            ExprKind::Name(name) => self.lookup(name, env),
            ExprKind::Slot(index) => {
                let table = self.host.parameters().ok_or_else(|| {
                    ScriptError::runtime("KeyError", format!("no parameter slot ${index}"))
                })?;
                Ok(Value::from_json(table.lookup(*index)?))
            }
            ExprKind::List(items) => Ok(Value::list(self.eval_all(items, env)?)),
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_all(items, env)?)),
            ExprKind::Dict(pairs) => {
                let mut map = DictMap::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = Key::from_value(&self.eval(key, env)?)?;
                    let value = self.eval(value, env)?;
                    map.insert(key, value);
                }
                Ok(Value::dict(map))
            }
            ExprKind::Attribute { value, attr } => {
                let obj = self.eval(value, env)?;
                get_attr(&obj, attr)
            }
            ExprKind::Subscript { value, index } => {
                let container = self.eval(value, env)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let lower = self.eval_opt(lower.as_deref(), env)?;
                    let upper = self.eval_opt(upper.as_deref(), env)?;
                    let step = self.eval_opt(step.as_deref(), env)?;
                    return ops::get_slice(&container, lower.as_ref(), upper.as_ref(), step.as_ref());
                }
                let index = self.eval(index, env)?;
                ops::get_item(&container, &index)
            }
            ExprKind::Slice { .. } => Err(type_error("slices are only valid inside a subscript")),
            ExprKind::Call { func, args, kwargs } => {
                let callee = self.eval(func, env)?;
                let positional = self.eval_all(args, env)?;
                let mut keywords = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    keywords.push((name.clone(), self.eval(value, env)?));
                }
                self.call(&callee, Args { positional, keywords })
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.eval(operand, env)?;
                ops::unary(*op, &operand)
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                ops::binary(*op, &left, &right)
            }
            ExprKind::BoolOp { op, left, right } => {
                let left = self.eval(left, env)?;
                match (op, left.is_truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.eval(right, env),
                }
            }
            ExprKind::Compare { left, ops: comparisons } => {
                let mut current = self.eval(left, env)?;
                for (op, expr) in comparisons {
                    let next = self.eval(expr, env)?;
                    if !compare(*op, &current, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, env)?.is_truthy() {
                    self.eval(body, env)
                } else {
                    self.eval(orelse, env)
                }
            }
            ExprKind::Lambda(def) => self.make_closure(def, env),
            ExprKind::ListComp { element, generators } => {
                let scope = Env::child(env);
                let mut out = Vec::new();
                self.comprehension(element, generators, &scope, &mut out)?;
                Ok(Value::list(out))
            }
        }
    }

    fn comprehension(
        &mut self,
        element: &Expr,
        generators: &[Comprehension],
        scope: &Rc<Env>,
        out: &mut Vec<Value>,
    ) -> GateResult<()> {
        let Some((first, rest)) = generators.split_first() else {
            if out.len() >= MAX_SEQUENCE_LEN {
                return Err(ScriptError::runtime("MemoryError", "comprehension is too large"));
            }
            out.push(self.eval(element, scope)?);
            return Ok(());
        };
        let items = ops::iterate(&self.eval(&first.iter, scope)?)?;
        'items: for item in items {
            self.tick()?;
            self.assign(&first.target, item, scope)?;
            for condition in &first.conditions {
                if !self.eval(condition, scope)?.is_truthy() {
                    continue 'items;
                }
            }
            self.comprehension(element, rest, scope, out)?;
        }
        Ok(())
    }
}

fn augmented(op: scriptgate_script::ast::BinOp, current: Value, rhs: &Value) -> GateResult<Value> {
    if op == scriptgate_script::ast::BinOp::Add {
        if let Value::List(items) = &current {
            let extra = ops::iterate(rhs)?;
            if items.borrow().len().saturating_add(extra.len()) > MAX_SEQUENCE_LEN {
                return Err(ScriptError::runtime("MemoryError", "list is too large"));
            }
            items.borrow_mut().extend(extra);
            return Ok(current);
        }
    }
    ops::binary(op, &current, rhs)
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        for scope in &self.module_scopes {
            scope.clear();
        }
    }
}

impl std::fmt::Debug for Interpreter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("host", &self.host)
            .field("steps", &self.meter.consumed())
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Mode;
    use scriptgate_gateway::CallerContext;
    use scriptgate_script::ScriptCompiler;

    struct Outcome {
        globals: Rc<Env>,
        lines: Vec<String>,
        error: Option<ScriptError>,
    }

    impl Outcome {
        fn get(&self, name: &str) -> Value {
            self.globals.get(name).unwrap_or_else(|| panic!("{name} is not bound"))
        }

        fn repr(&self, name: &str) -> String {
            self.get(name).repr()
        }

        fn texts(&self) -> Vec<String> {
            self.lines
                .iter()
                .map(|l| l.split_once("] ").map(|(_, t)| t.to_string()).unwrap_or_default())
                .collect()
        }
    }

    fn run_with(source: &str, meter: StepMeter, caller: &CallerContext) -> Outcome {
        let compiled = ScriptCompiler::new().compile(source).unwrap();
        let registry = CapabilityRegistry::standard();
        let imports = ImportGate::new("math, json, string, re, datetime", "");
        let host = HostContext::new(caller, Mode::Standard);
        let mut interp = Interpreter::new(host, &registry, &imports, meter);
        let globals = Env::global();
        let error = interp.run(compiled.program(), &globals).err();
        let lines = interp.take_output().into_lines();
        Outcome { globals, lines, error }
    }

    fn run(source: &str) -> Outcome {
        run_with(source, StepMeter::unlimited(), &CallerContext::new(None))
    }

    fn run_ok(source: &str) -> Outcome {
        let outcome = run(source);
        if let Some(err) = &outcome.error {
            panic!("script failed: {err}");
        }
        outcome
    }

    #[test]
    fn test_arithmetic_and_names() {
        let out = run_ok("a = 1 + 2 * 3\nb = a // 2\nc = a / 2\nd = -a ** 2\ne = 7 % 3");
        assert_eq!(out.repr("a"), "7");
        assert_eq!(out.repr("b"), "3");
        assert_eq!(out.repr("c"), "3.5");
        assert_eq!(out.repr("d"), "-49");
        assert_eq!(out.repr("e"), "1");
    }

    #[test]
    fn test_control_flow() {
        let out = run_ok(
            "total = 0\nfor i in range(10):\n    if i % 2 == 0:\n        continue\n    if i > 7:\n        break\n    total += i\nelse:\n    total = -1\nn = 0\nwhile n < 5:\n    n += 1\nelse:\n    done = True",
        );
        assert_eq!(out.repr("total"), "16");
        assert_eq!(out.repr("n"), "5");
        assert_eq!(out.repr("done"), "True");
    }

    #[test]
    fn test_functions_defaults_and_closures() {
        let out = run_ok(
            "def add(a, b=10):\n    return a + b\nx = add(1)\ny = add(1, b=2)\ndef outer(k):\n    return lambda v: v * k\nz = outer(3)(4)\ndef fact(n):\n    return 1 if n <= 1 else n * fact(n - 1)\nf = fact(10)",
        );
        assert_eq!(out.repr("x"), "11");
        assert_eq!(out.repr("y"), "3");
        assert_eq!(out.repr("z"), "12");
        assert_eq!(out.repr("f"), "3628800");
    }

    #[test]
    fn test_bad_calls() {
        let err = run("def f(a):\n    return a\nf(1, 2)").error.unwrap();
        assert_eq!(err.to_string(), "TypeError: f() takes 1 positional argument but 2 were given");
        let err = run("def f(a):\n    return a\nf(b=1)").error.unwrap();
        assert_eq!(err.to_string(), "TypeError: f() missing required argument: 'a'");
        let err = run("x = 1\nx()").error.unwrap();
        assert_eq!(err.to_string(), "TypeError: 'int' object is not callable");
    }

    #[test]
    fn test_recursion_limit() {
        let err = crate::context::on_execution_stack(|| run("def f(n):\n    return f(n + 1)\nf(0)").error)
            .unwrap()
            .unwrap();
        assert_eq!(err.kind(), "RecursionError");
    }

    #[test]
    fn test_unpacking_and_comprehensions() {
        let out = run_ok(
            "a, b = 1, 2\na, b = b, a\npairs = [(x, y) for x in range(3) for y in 'ab' if x != 1]\nsquares = [n * n for n in [1, 2, 3]]",
        );
        assert_eq!(out.repr("a"), "2");
        assert_eq!(out.repr("b"), "1");
        assert_eq!(
            out.repr("pairs"),
            "[(0, 'a'), (0, 'b'), (2, 'a'), (2, 'b')]"
        );
        assert_eq!(out.repr("squares"), "[1, 4, 9]");
        assert!(out.globals.get("n").is_none());

        let err = run("a, b = [1, 2, 3]").error.unwrap();
        assert_eq!(err.to_string(), "ValueError: too many values to unpack (expected 2)");
    }

    #[test]
    fn test_containers() {
        let out = run_ok(
            "d = {'a': 1}\nd['b'] = 2\nd['a'] += 5\ndel d['b']\nl = [3, 1, 2]\nl += [0]\nl[0] = 9\nt = (1, 2)\nhas = 'a' in d and 5 not in l\ns = 'hello'[1:4]",
        );
        assert_eq!(out.repr("d"), "{'a': 6}");
        assert_eq!(out.repr("l"), "[9, 1, 2, 0]");
        assert_eq!(out.repr("has"), "True");
        assert_eq!(out.repr("s"), "'ell'");
    }

    #[test]
    fn test_list_aliasing() {
        let out = run_ok("a = [1]\nb = a\nb.append(2)\nb += [3]");
        assert_eq!(out.repr("a"), "[1, 2, 3]");
    }

    #[test]
    fn test_try_except_finally() {
        let out = run_ok(
            "log = []\ntry:\n    x = {}['missing']\nexcept LookupError as e:\n    log.append(str(e))\nelse:\n    log.append('else')\nfinally:\n    log.append('finally')\ntry:\n    raise ValueError('bad')\nexcept (TypeError, ValueError) as e:\n    log.append(repr(e))\ntry:\n    1 / 0\nexcept:\n    log.append('caught')",
        );
        assert_eq!(
            out.repr("log"),
            "[\"'missing'\", 'finally', \"ValueError('bad')\", 'caught']"
        );
        assert!(out.globals.get("e").is_none());
    }

    #[test]
    fn test_reraise_and_uncaught() {
        let err = run("try:\n    raise KeyError('k')\nexcept KeyError:\n    raise").error.unwrap();
        assert_eq!(err.to_string(), "KeyError: k");
        let err = run("assert 1 == 2, 'math broke'").error.unwrap();
        assert_eq!(err.to_string(), "AssertionError: math broke");
        let err = run("print(undefined_name)").error.unwrap();
        assert_eq!(err.to_string(), "NameError: name 'undefined_name' is not defined");
    }

    #[test]
    fn test_return_in_finally_overrides() {
        let out = run_ok("def f():\n    try:\n        raise ValueError('x')\n    finally:\n        return 'finally'\nr = f()");
        assert_eq!(out.repr("r"), "'finally'");
    }

    #[test]
    fn test_print_and_log_toggle() {
        let out = run_ok("print('a', 1)\nprint('')\ndisable_print_log()\nprint('hidden')\nenable_print_log()\nprint('b')");
        assert_eq!(out.texts(), vec!["a 1", "b"]);
    }

    #[test]
    fn test_guarded_attributes() {
        let err = run("x = [1]\ny = x.nonexistent").error.unwrap();
        assert_eq!(err.to_string(), "AttributeError: 'list' object has no attribute 'nonexistent'");
        let err = run("import math\nmath.nothing").error.unwrap();
        assert_eq!(err.to_string(), "AttributeError: module 'math' has no attribute 'nothing'");
    }

    #[test]
    fn test_imports() {
        let out = run_ok("import math\nfrom json import dumps as d\nr = math.floor(2.5)\ns = d({'a': [1, 2]})");
        assert_eq!(out.repr("r"), "2");
        assert_eq!(out.repr("s"), "'{\"a\": [1, 2]}'");

        let err = run("import os").error.unwrap();
        assert_eq!(err.kind(), "ImportDenied");
        let err = run("from math import nothing").error.unwrap();
        assert_eq!(err.to_string(), "ImportError: cannot import name 'nothing' from 'math'");
    }

    #[test]
    fn test_import_denied_is_catchable_as_import_error() {
        let out = run_ok("try:\n    import os\n    ok = True\nexcept ImportError:\n    ok = False");
        assert_eq!(out.repr("ok"), "False");
    }

    #[test]
    fn test_step_limit_not_catchable() {
        let out = run_with(
            "while True:\n    try:\n        x = 1\n    except:\n        pass",
            StepMeter::new(Some(500)),
            &CallerContext::new(None),
        );
        assert_eq!(out.error.unwrap().kind(), STEP_LIMIT_KIND);
    }

    #[test]
    fn test_cancellation_not_catchable() {
        let caller = CallerContext::new(None);
        caller.cancel.cancel();
        let out = run_with("try:\n    x = 1\nexcept:\n    x = 2", StepMeter::unlimited(), &caller);
        assert_eq!(out.error.unwrap(), ScriptError::CancelledByUser);
        assert!(out.globals.get("x").is_none());
    }

    #[test]
    fn test_chained_comparison_and_identity() {
        let out = run_ok("a = 1 < 2 <= 2 < 3\nb = 1 < 2 > 5\nc = None is None\nd = [] is not []\ne = 1 == 1.0");
        assert_eq!(out.repr("a"), "True");
        assert_eq!(out.repr("b"), "False");
        assert_eq!(out.repr("c"), "True");
        assert_eq!(out.repr("d"), "True");
        assert_eq!(out.repr("e"), "True");
    }

    #[test]
    fn test_capability_shadowing_is_local() {
        let out = run_ok("TYPE_STRING = 'x'\nv = TYPE_STRING\nw = TYPE_INTEGER");
        assert_eq!(out.repr("v"), "'x'");
        assert_eq!(out.repr("w"), "'integer'");
    }
}
