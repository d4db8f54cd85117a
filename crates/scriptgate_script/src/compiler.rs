//! Restriction pass over the parsed script.
//!
//! The parser accepts the full supported grammar; the compiler then walks the
//! tree and rejects everything that must not reach the interpreter: private
//! (`_`-prefixed) names and attributes, reflection builtins, attribute
//! assignment, unsupported import forms, and parameter slots outside secure
//! mode.

use crate::ast::{
    Comprehension, ExceptHandler, Expr, ExprKind, FunctionDef, ImportName, Pos, Program, Stmt,
    StmtKind, Target,
};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::template::RenderedScript;
use scriptgate_core::{GateResult, ScriptError};
use std::sync::Arc;
use tracing::debug;

/// Names that would give a script a way around the guarded dispatch
pub const RESERVED_NAMES: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "globals",
    "locals",
    "vars",
    "open",
    "input",
    "breakpoint",
    "__import__",
];

/// A script that passed the restriction pass
///
/// Only the runtime crate executes it; the tree is shared behind an `Arc`
/// so compiled module code can be cached across executions.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    program: Arc<Program>,
    slot_count: usize,
    secure: bool,
    imports: Vec<String>,
}

impl CompiledScript {
    /// Checked syntax tree
    #[must_use]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Number of parameter slots the script may reference
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Whether the script was compiled from rendered secure-mode text
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Module names imported anywhere in the script, in source order
    #[must_use]
    pub fn imports(&self) -> &[String] {
        &self.imports
    }
}

/// Script compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptCompiler;

impl ScriptCompiler {
    /// Create a compiler
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compile standard-mode script text
    ///
    /// # Errors
    ///
    /// Returns `CompileError` for syntax errors and rejected constructs,
    /// including any parameter slot
    pub fn compile(&self, source: &str) -> GateResult<CompiledScript> {
        self.compile_with(Parser::parse_source(source)?, None)
    }

    /// Compile secure-mode text produced by the placeholder renderer
    ///
    /// # Errors
    ///
    /// Returns `CompileError` for syntax errors, rejected constructs, and
    /// slots outside the rendered parameter table
    pub fn compile_rendered(&self, rendered: &RenderedScript) -> GateResult<CompiledScript> {
        let tokens = Lexer::new(rendered.source())
            .with_slot_offsets(rendered.slot_offsets())
            .tokenize()?;
        let program = Parser::new(tokens).parse_program()?;
        self.compile_with(program, Some(rendered.table().len()))
    }

    fn compile_with(&self, program: Program, slot_limit: Option<usize>) -> GateResult<CompiledScript> {
        let mut checker = Restrictions {
            slot_limit,
            loop_depth: 0,
            function_depth: 0,
            imports: Vec::new(),
        };
        checker.check_block(&program.body)?;

        debug!(
            statements = program.body.len(),
            slots = slot_limit.unwrap_or(0),
            secure = slot_limit.is_some(),
            "script compiled"
        );

        Ok(CompiledScript {
            program: Arc::new(program),
            slot_count: slot_limit.unwrap_or(0),
            secure: slot_limit.is_some(),
            imports: checker.imports,
        })
    }
}

struct Restrictions {
    slot_limit: Option<usize>,
    loop_depth: usize,
    function_depth: usize,
    imports: Vec<String>,
}

fn reject(message: impl Into<String>, pos: Pos) -> ScriptError {
    ScriptError::compile(message, pos.line, pos.column)
}

impl Restrictions {
    fn check_name(&self, name: &str, pos: Pos) -> GateResult<()> {
        if name.starts_with('_') {
            return Err(reject(format!("names starting with '_' are not allowed: '{name}'"), pos));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(reject(format!("'{name}' is not allowed in scripts"), pos));
        }
        Ok(())
    }

    fn check_block(&mut self, body: &[Stmt]) -> GateResult<()> {
        body.iter().try_for_each(|stmt| self.check_stmt(stmt))
    }

    fn check_loop_body(&mut self, body: &[Stmt]) -> GateResult<()> {
        self.loop_depth += 1;
        let checked = self.check_block(body);
        self.loop_depth -= 1;
        checked
    }

    fn check_stmt(&mut self, stmt: &Stmt) -> GateResult<()> {
        let pos = stmt.pos;
        match &stmt.kind {
            StmtKind::Expr(expr) => self.check_expr(expr),
            StmtKind::Assign { targets, value } => {
                targets.iter().try_for_each(|t| self.check_target(t, pos))?;
                self.check_expr(value)
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.check_target(target, pos)?;
                self.check_expr(value)
            }
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    self.check_expr(test)?;
                    self.check_block(body)?;
                }
                self.check_block(orelse)
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.check_target(target, pos)?;
                self.check_expr(iter)?;
                self.check_loop_body(body)?;
                self.check_block(orelse)
            }
            StmtKind::While { test, body, orelse } => {
                self.check_expr(test)?;
                self.check_loop_body(body)?;
                self.check_block(orelse)
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.loop_depth == 0 {
                    let word = if matches!(stmt.kind, StmtKind::Break) { "break" } else { "continue" };
                    return Err(reject(format!("'{word}' outside loop"), pos));
                }
                Ok(())
            }
            StmtKind::Pass => Ok(()),
            StmtKind::FunctionDef(def) => {
                self.check_name(&def.name, def.pos)?;
                self.check_function(def)
            }
            StmtKind::Return(value) => {
                if self.function_depth == 0 {
                    return Err(reject("'return' outside function", pos));
                }
                value.iter().try_for_each(|v| self.check_expr(v))
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.check_block(body)?;
                handlers.iter().try_for_each(|h| self.check_handler(h))?;
                self.check_block(orelse)?;
                self.check_block(finalbody)
            }
            StmtKind::Raise(value) => value.iter().try_for_each(|v| self.check_expr(v)),
            StmtKind::Assert { test, msg } => {
                self.check_expr(test)?;
                msg.iter().try_for_each(|m| self.check_expr(m))
            }
            StmtKind::Import(names) => names.iter().try_for_each(|n| {
                self.check_module_name(&n.name, n.pos)?;
                self.check_import_binding(n)?;
                self.imports.push(n.name.clone());
                Ok(())
            }),
            StmtKind::ImportFrom { module, names } => {
                if module.starts_with('.') {
                    return Err(reject("relative imports are not allowed", pos));
                }
                self.check_module_name(module, pos)?;
                names.iter().try_for_each(|n| {
                    self.check_name(&n.name, n.pos)?;
                    self.check_import_binding(n)
                })?;
                self.imports.push(module.clone());
                Ok(())
            }
            StmtKind::Delete(targets) => targets.iter().try_for_each(|t| self.check_target(t, pos)),
        }
    }

    fn check_module_name(&self, module: &str, pos: Pos) -> GateResult<()> {
        if module.contains('.') {
            return Err(reject(format!("dotted module names are not supported: '{module}'"), pos));
        }
        self.check_name(module, pos)
    }

    fn check_import_binding(&self, name: &ImportName) -> GateResult<()> {
        match &name.alias {
            Some(alias) => self.check_name(alias, name.pos),
            None => Ok(()),
        }
    }

    fn check_handler(&mut self, handler: &ExceptHandler) -> GateResult<()> {
        for kind in &handler.kinds {
            self.check_name(kind, handler.pos)?;
        }
        if let Some(name) = &handler.name {
            self.check_name(name, handler.pos)?;
        }
        self.check_block(&handler.body)
    }

    fn check_function(&mut self, def: &FunctionDef) -> GateResult<()> {
        for param in &def.params {
            self.check_name(&param.name, def.pos)?;
            if let Some(default) = &param.default {
                self.check_expr(default)?;
            }
        }
        let saved_loop_depth = std::mem::take(&mut self.loop_depth);
        self.function_depth += 1;
        let checked = self.check_block(&def.body);
        self.function_depth -= 1;
        self.loop_depth = saved_loop_depth;
        checked
    }

    fn check_target(&mut self, target: &Target, pos: Pos) -> GateResult<()> {
        match target {
            Target::Name(name, name_pos) => self.check_name(name, *name_pos),
            Target::Subscript { value, index } => {
                self.check_expr(value)?;
                self.check_expr(index)
            }
            Target::Attribute { attr, pos, .. } => {
                Err(reject(format!("attribute assignment is not allowed: '.{attr}'"), *pos))
            }
            Target::Tuple(items) => items.iter().try_for_each(|t| self.check_target(t, pos)),
        }
    }

    fn check_comprehension(&mut self, generators: &[Comprehension], pos: Pos) -> GateResult<()> {
        for generator in generators {
            self.check_target(&generator.target, pos)?;
            self.check_expr(&generator.iter)?;
            generator.conditions.iter().try_for_each(|c| self.check_expr(c))?;
        }
        Ok(())
    }

    fn check_expr(&mut self, expr: &Expr) -> GateResult<()> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Literal(_) => Ok(()),
            ExprKind::Name(name) => self.check_name(name, pos),
            ExprKind::Slot(index) => match self.slot_limit {
                None => Err(reject("parameter placeholders are only valid in secure mode", pos)),
                Some(limit) if *index >= limit => {
                    Err(reject(format!("unknown parameter slot ${index}"), pos))
                }
                Some(_) => Ok(()),
            },
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                items.iter().try_for_each(|e| self.check_expr(e))
            }
            ExprKind::Dict(entries) => entries.iter().try_for_each(|(k, v)| {
                self.check_expr(k)?;
                self.check_expr(v)
            }),
            ExprKind::Attribute { value, attr } => {
                if attr.starts_with('_') {
                    return Err(reject(format!("attribute '{attr}' is not accessible"), pos));
                }
                self.check_expr(value)
            }
            ExprKind::Subscript { value, index } => {
                self.check_expr(value)?;
                self.check_expr(index)
            }
            ExprKind::Slice { lower, upper, step } => [lower, upper, step]
                .into_iter()
                .flatten()
                .try_for_each(|e| self.check_expr(e)),
            ExprKind::Call { func, args, kwargs } => {
                self.check_expr(func)?;
                args.iter().try_for_each(|a| self.check_expr(a))?;
                kwargs.iter().try_for_each(|(name, value)| {
                    self.check_name(name, value.pos)?;
                    self.check_expr(value)
                })
            }
            ExprKind::Unary { operand, .. } => self.check_expr(operand),
            ExprKind::Binary { left, right, .. } | ExprKind::BoolOp { left, right, .. } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            ExprKind::Compare { left, ops } => {
                self.check_expr(left)?;
                ops.iter().try_for_each(|(_, e)| self.check_expr(e))
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.check_expr(test)?;
                self.check_expr(body)?;
                self.check_expr(orelse)
            }
            ExprKind::Lambda(def) => self.check_function(def),
            ExprKind::ListComp {
                element,
                generators,
            } => {
                self.check_comprehension(generators, pos)?;
                self.check_expr(element)
            }
        }
    }
}
