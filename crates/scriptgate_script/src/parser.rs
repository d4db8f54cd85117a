//! Recursive-descent parser producing the script syntax tree.
//!
//! The parser accepts only the supported grammar. Constructs the language
//! deliberately leaves out (classes, `with`, `global`, decorators, star
//! imports, generators) are reported as compile errors at their position.

use crate::ast::{
    BinOp, BoolOp, CmpOp, Comprehension, ExceptHandler, Expr, ExprKind, FunctionDef, ImportName,
    Literal, Param, Pos, Program, Stmt, StmtKind, Target, UnaryOp,
};
use crate::lexer::{Lexer, Token, TokenKind};
use scriptgate_core::{GateResult, ScriptError};
use std::sync::Arc;

/// Keywords that are recognised only to reject them with a clear message
fn forbidden_keyword(word: &str) -> Option<&'static str> {
    match word {
        "class" => Some("'class' definitions are not allowed in scripts"),
        "global" | "nonlocal" => Some("scope declarations are not allowed in scripts"),
        "with" => Some("'with' statements are not allowed in scripts"),
        "yield" => Some("generators are not allowed in scripts"),
        "async" | "await" => Some("asynchronous code is not allowed in scripts"),
        _ => None,
    }
}

/// Deepest nesting of blocks, brackets and unary operators, and the
/// tallest expression tree, a script may contain
pub const MAX_NESTING: usize = 100;

/// Script parser
pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
    nesting: usize,
}

impl Parser {
    /// Create a parser over a token stream ending in `Eof`
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            index: 0,
            nesting: 0,
        }
    }

    /// Tokenize and parse source text
    ///
    /// # Errors
    ///
    /// Returns a `CompileError` on any lexical or syntax error
    pub fn parse_source(src: &str) -> GateResult<Program> {
        let tokens = Lexer::new(src).tokenize()?;
        Self::new(tokens).parse_program()
    }

    /// Parse a whole program
    ///
    /// # Errors
    ///
    /// Returns a `CompileError` on any syntax error
    pub fn parse_program(mut self) -> GateResult<Program> {
        let mut body = Vec::new();
        while !self.at(&TokenKind::Eof) {
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    // ----- token helpers -----

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.index.min(last)]
    }

    fn peek_nth(&self, n: usize) -> &TokenKind {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.index + n).min(last)].kind
    }

    fn pos(&self) -> Pos {
        self.peek().pos
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Op(o) if o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> GateResult<Pos> {
        if self.at_op(op) {
            Ok(self.advance().pos)
        } else {
            Err(self.unexpected(&format!("expected '{op}'")))
        }
    }

    fn at_kw(&self, kw: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Keyword(k) if k == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.at_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> GateResult<Pos> {
        if self.at_kw(kw) {
            Ok(self.advance().pos)
        } else {
            Err(self.unexpected(&format!("expected '{kw}'")))
        }
    }

    fn expect_name(&mut self) -> GateResult<(String, Pos)> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Name(name) => {
                self.advance();
                Ok((name, token.pos))
            }
            _ => Err(self.unexpected("expected a name")),
        }
    }

    fn error_at(&self, message: &str, pos: Pos) -> ScriptError {
        ScriptError::compile(message, pos.line, pos.column)
    }

    fn descend(&mut self) -> GateResult<()> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error_at("too many nested levels", self.pos()));
        }
        self.nesting += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.nesting -= 1;
    }

    fn bounded(&self, expr: Expr) -> GateResult<Expr> {
        if expr.depth > MAX_NESTING {
            return Err(self.error_at("expression nested too deeply", expr.pos));
        }
        Ok(expr)
    }

    fn unexpected(&self, context: &str) -> ScriptError {
        let token = self.peek();
        let found = match &token.kind {
            TokenKind::Name(n) => format!("name '{n}'"),
            TokenKind::Keyword(k) => {
                if let Some(message) = forbidden_keyword(k) {
                    return self.error_at(message, token.pos);
                }
                format!("keyword '{k}'")
            }
            TokenKind::Int(i) => format!("number {i}"),
            TokenKind::Float(f) => format!("number {f}"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Slot(_) => "parameter placeholder".to_string(),
            TokenKind::Op(o) => format!("'{o}'"),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "unexpected indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        };
        self.error_at(&format!("invalid syntax: {context}, found {found}"), token.pos)
    }

    fn end_of_simple_line(&mut self) -> GateResult<()> {
        if self.eat(&TokenKind::Newline) || self.at(&TokenKind::Eof) || self.at(&TokenKind::Dedent) {
            Ok(())
        } else {
            Err(self.unexpected("expected end of statement"))
        }
    }

    fn starts_expression(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Name(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Str(_)
            | TokenKind::Slot(_) => true,
            TokenKind::Keyword(k) => matches!(*k, "True" | "False" | "None" | "not" | "lambda"),
            TokenKind::Op(o) => matches!(*o, "(" | "[" | "{" | "-" | "+"),
            _ => false,
        }
    }

    // ----- statements -----

    fn parse_statement(&mut self) -> GateResult<Vec<Stmt>> {
        let pos = self.pos();
        match self.peek().kind.clone() {
            TokenKind::Keyword("if") => Ok(vec![self.parse_if()?]),
            TokenKind::Keyword("while") => Ok(vec![self.parse_while()?]),
            TokenKind::Keyword("for") => Ok(vec![self.parse_for()?]),
            TokenKind::Keyword("try") => Ok(vec![self.parse_try()?]),
            TokenKind::Keyword("def") => Ok(vec![self.parse_def()?]),
            TokenKind::Keyword(k) if forbidden_keyword(k).is_some() => Err(self.unexpected("statement")),
            TokenKind::Op("@") => Err(self.error_at("decorators are not allowed in scripts", pos)),
            TokenKind::Indent => Err(self.error_at("unexpected indent", pos)),
            _ => self.parse_simple_line(),
        }
    }

    fn parse_simple_line(&mut self) -> GateResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_stmt()?];
        while self.eat_op(";") {
            if self.at(&TokenKind::Newline) || self.at(&TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_small_stmt()?);
        }
        self.end_of_simple_line()?;
        Ok(stmts)
    }

    fn parse_small_stmt(&mut self) -> GateResult<Stmt> {
        let pos = self.pos();
        let kind = match self.peek().kind.clone() {
            TokenKind::Keyword("pass") => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Keyword("break") => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Keyword("continue") => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Keyword("return") => {
                self.advance();
                if self.starts_expression() {
                    StmtKind::Return(Some(self.parse_expr_list()?))
                } else {
                    StmtKind::Return(None)
                }
            }
            TokenKind::Keyword("raise") => {
                self.advance();
                if self.starts_expression() {
                    StmtKind::Raise(Some(self.parse_expression()?))
                } else {
                    StmtKind::Raise(None)
                }
            }
            TokenKind::Keyword("assert") => {
                self.advance();
                let test = self.parse_expression()?;
                let msg = if self.eat_op(",") {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Keyword("del") => {
                self.advance();
                let mut targets = vec![self.parse_target_expr()?];
                while self.eat_op(",") {
                    if !self.starts_expression() {
                        break;
                    }
                    targets.push(self.parse_target_expr()?);
                }
                StmtKind::Delete(targets)
            }
            TokenKind::Keyword("import") => {
                self.advance();
                StmtKind::Import(self.parse_import_names(true)?)
            }
            TokenKind::Keyword("from") => self.parse_from_import()?,
            TokenKind::Keyword(k) if forbidden_keyword(k).is_some() => {
                return Err(self.unexpected("statement"));
            }
            _ => return self.parse_expression_statement(),
        };
        Ok(Stmt { kind, pos })
    }

    fn parse_expression_statement(&mut self) -> GateResult<Stmt> {
        let pos = self.pos();
        let first = self.parse_expr_list()?;

        if self.at_op("=") {
            let mut exprs = vec![first];
            while self.eat_op("=") {
                exprs.push(self.parse_expr_list()?);
            }
            let value = exprs.pop().ok_or_else(|| self.error_at("missing value", pos))?;
            let targets = exprs
                .into_iter()
                .map(|e| self.to_target(e))
                .collect::<GateResult<Vec<_>>>()?;
            return Ok(Stmt {
                kind: StmtKind::Assign { targets, value },
                pos,
            });
        }

        let aug = match self.peek().kind {
            TokenKind::Op("+=") => Some(BinOp::Add),
            TokenKind::Op("-=") => Some(BinOp::Sub),
            TokenKind::Op("*=") => Some(BinOp::Mul),
            TokenKind::Op("/=") => Some(BinOp::Div),
            TokenKind::Op("//=") => Some(BinOp::FloorDiv),
            TokenKind::Op("%=") => Some(BinOp::Mod),
            TokenKind::Op("**=") => Some(BinOp::Pow),
            _ => None,
        };
        if let Some(op) = aug {
            self.advance();
            if matches!(first.kind, ExprKind::Tuple(_) | ExprKind::List(_)) {
                return Err(self.error_at("illegal expression for augmented assignment", first.pos));
            }
            let target = self.to_target(first)?;
            let value = self.parse_expr_list()?;
            return Ok(Stmt {
                kind: StmtKind::AugAssign { target, op, value },
                pos,
            });
        }

        Ok(Stmt {
            kind: StmtKind::Expr(first),
            pos,
        })
    }

    fn to_target(&self, expr: Expr) -> GateResult<Target> {
        match expr.kind {
            ExprKind::Name(name) => Ok(Target::Name(name, expr.pos)),
            ExprKind::Subscript { value, index } => Ok(Target::Subscript {
                value: *value,
                index: *index,
            }),
            ExprKind::Attribute { value, attr } => Ok(Target::Attribute {
                value: *value,
                attr,
                pos: expr.pos,
            }),
            ExprKind::Tuple(items) | ExprKind::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|e| self.to_target(e))
                    .collect::<GateResult<Vec<_>>>()?,
            )),
            _ => Err(self.error_at("cannot assign to expression", expr.pos)),
        }
    }

    fn parse_target_expr(&mut self) -> GateResult<Target> {
        let expr = self.parse_arith()?;
        self.to_target(expr)
    }

    /// Targets of `for` loops and comprehensions; stops before `in`
    fn parse_target_list(&mut self) -> GateResult<Target> {
        let pos = self.pos();
        let first = self.parse_arith()?;
        if !self.at_op(",") {
            return self.to_target(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_kw("in") {
                break;
            }
            items.push(self.parse_arith()?);
        }
        self.to_target(Expr::new(ExprKind::Tuple(items), pos))
    }

    fn parse_block(&mut self) -> GateResult<Vec<Stmt>> {
        self.descend()?;
        let body = self.parse_block_body();
        self.ascend();
        body
    }

    fn parse_block_body(&mut self) -> GateResult<Vec<Stmt>> {
        self.expect_op(":")?;
        if !self.eat(&TokenKind::Newline) {
            return self.parse_simple_line();
        }
        if !self.eat(&TokenKind::Indent) {
            return Err(self.unexpected("expected an indented block"));
        }
        let mut body = Vec::new();
        while !self.eat(&TokenKind::Dedent) {
            if self.at(&TokenKind::Eof) {
                break;
            }
            if self.eat(&TokenKind::Newline) {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_if(&mut self) -> GateResult<Stmt> {
        let pos = self.expect_kw("if")?;
        let mut branches = Vec::new();
        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        branches.push((test, body));

        let mut orelse = Vec::new();
        loop {
            if self.eat_kw("elif") {
                let test = self.parse_expression()?;
                let body = self.parse_block()?;
                branches.push((test, body));
            } else if self.eat_kw("else") {
                orelse = self.parse_block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::If { branches, orelse },
            pos,
        })
    }

    fn parse_while(&mut self) -> GateResult<Stmt> {
        let pos = self.expect_kw("while")?;
        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        let orelse = if self.eat_kw("else") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::While { test, body, orelse },
            pos,
        })
    }

    fn parse_for(&mut self) -> GateResult<Stmt> {
        let pos = self.expect_kw("for")?;
        let target = self.parse_target_list()?;
        self.expect_kw("in")?;
        let iter = self.parse_expr_list()?;
        let body = self.parse_block()?;
        let orelse = if self.eat_kw("else") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::For {
                target,
                iter,
                body,
                orelse,
            },
            pos,
        })
    }

    fn parse_try(&mut self) -> GateResult<Stmt> {
        let pos = self.expect_kw("try")?;
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while self.at_kw("except") {
            let handler_pos = self.advance().pos;
            let mut kinds = Vec::new();
            let mut name = None;
            if !self.at_op(":") {
                if self.eat_op("(") {
                    loop {
                        kinds.push(self.expect_name()?.0);
                        if !self.eat_op(",") || self.at_op(")") {
                            break;
                        }
                    }
                    self.expect_op(")")?;
                } else {
                    kinds.push(self.expect_name()?.0);
                }
                if self.eat_kw("as") {
                    name = Some(self.expect_name()?.0);
                }
            }
            let handler_body = self.parse_block()?;
            handlers.push(ExceptHandler {
                kinds,
                name,
                body: handler_body,
                pos: handler_pos,
            });
        }

        let orelse = if !handlers.is_empty() && self.eat_kw("else") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat_kw("finally") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error_at("'try' requires an 'except' or 'finally' clause", pos));
        }
        Ok(Stmt {
            kind: StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            pos,
        })
    }

    fn parse_def(&mut self) -> GateResult<Stmt> {
        let pos = self.expect_kw("def")?;
        let (name, _) = self.expect_name()?;
        self.expect_op("(")?;
        let params = self.parse_params(")")?;
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.parse_expression()?;
        }
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef(Arc::new(FunctionDef {
                name,
                params,
                body,
                pos,
            })),
            pos,
        })
    }

    fn parse_params(&mut self, terminator: &str) -> GateResult<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        while !self.at_op(terminator) {
            if self.at_op("*") || self.at_op("**") {
                return Err(self.error_at("variadic parameters are not supported", self.pos()));
            }
            let (name, pos) = self.expect_name()?;
            let default = if self.eat_op("=") {
                Some(self.parse_expression()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(self.error_at("non-default parameter follows default parameter", pos));
            }
            if params.iter().any(|p| p.name == name) {
                return Err(self.error_at(&format!("duplicate parameter '{name}'"), pos));
            }
            params.push(Param { name, default });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    fn parse_dotted_name(&mut self) -> GateResult<(String, Pos)> {
        let (mut name, pos) = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?.0);
        }
        Ok((name, pos))
    }

    fn parse_import_names(&mut self, dotted: bool) -> GateResult<Vec<ImportName>> {
        let mut names = Vec::new();
        loop {
            let (name, pos) = if dotted {
                self.parse_dotted_name()?
            } else {
                self.expect_name()?
            };
            let alias = if self.eat_kw("as") {
                Some(self.expect_name()?.0)
            } else {
                None
            };
            names.push(ImportName { name, alias, pos });
            if !self.eat_op(",") {
                break;
            }
            if self.at_op(")") {
                break;
            }
        }
        Ok(names)
    }

    fn parse_from_import(&mut self) -> GateResult<StmtKind> {
        self.expect_kw("from")?;
        let mut module = String::new();
        while self.at_op(".") || self.at_op("...") {
            if let TokenKind::Op(dots) = self.advance().kind {
                module.push_str(dots);
            }
        }
        if !self.at_kw("import") {
            module.push_str(&self.parse_dotted_name()?.0);
        }
        self.expect_kw("import")?;
        if self.at_op("*") {
            return Err(self.error_at("star imports are not allowed", self.pos()));
        }
        let names = if self.eat_op("(") {
            let names = self.parse_import_names(false)?;
            self.expect_op(")")?;
            names
        } else {
            self.parse_import_names(false)?
        };
        Ok(StmtKind::ImportFrom { module, names })
    }

    // ----- expressions -----

    /// Expression, or a bare tuple when followed by commas
    fn parse_expr_list(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let first = self.parse_expression()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_expression()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), pos))
    }

    /// A single expression
    ///
    /// # Errors
    ///
    /// Returns a `CompileError` on syntax errors
    pub fn parse_expression(&mut self) -> GateResult<Expr> {
        self.descend()?;
        let expr = self.parse_conditional();
        self.ascend();
        self.bounded(expr?)
    }

    fn parse_conditional(&mut self) -> GateResult<Expr> {
        if self.at_kw("lambda") {
            return self.parse_lambda();
        }
        let pos = self.pos();
        let body = self.parse_or()?;
        if self.eat_kw("if") {
            let test = self.parse_or()?;
            self.expect_kw("else")?;
            let orelse = self.parse_expression()?;
            return Ok(Expr::new(
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                pos,
            ));
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> GateResult<Expr> {
        let pos = self.expect_kw("lambda")?;
        let params = self.parse_params(":")?;
        self.expect_op(":")?;
        let body = self.parse_expression()?;
        let body_pos = body.pos;
        Ok(Expr::new(
            ExprKind::Lambda(Arc::new(FunctionDef {
                name: "<lambda>".to_string(),
                params,
                body: vec![Stmt {
                    kind: StmtKind::Return(Some(body)),
                    pos: body_pos,
                }],
                pos,
            })),
            pos,
        ))
    }

    fn parse_or(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let mut left = self.parse_and()?;
        while self.eat_kw("or") {
            let right = self.parse_and()?;
            left = self.bounded(Expr::new(
                ExprKind::BoolOp {
                    op: BoolOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            ))?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let mut left = self.parse_not()?;
        while self.eat_kw("and") {
            let right = self.parse_not()?;
            left = self.bounded(Expr::new(
                ExprKind::BoolOp {
                    op: BoolOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            ))?;
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        if self.eat_kw("not") {
            self.descend()?;
            let operand = self.parse_not();
            self.ascend();
            let operand = operand?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                pos,
            ));
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek().kind {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::Ne,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::Le,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::Ge,
            TokenKind::Keyword("in") => CmpOp::In,
            TokenKind::Keyword("not") if matches!(self.peek_nth(1), TokenKind::Keyword("in")) => {
                self.advance();
                CmpOp::NotIn
            }
            TokenKind::Keyword("is") => {
                if matches!(self.peek_nth(1), TokenKind::Keyword("not")) {
                    self.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let left = self.parse_arith()?;
        let mut ops = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push((op, self.parse_arith()?));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
            },
            pos,
        ))
    }

    fn parse_arith(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Op("+") => BinOp::Add,
                TokenKind::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = self.bounded(binary(op, left, right, pos))?;
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Op("*") => BinOp::Mul,
                TokenKind::Op("/") => BinOp::Div,
                TokenKind::Op("//") => BinOp::FloorDiv,
                TokenKind::Op("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = self.bounded(binary(op, left, right, pos))?;
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let op = match self.peek().kind {
            TokenKind::Op("-") => UnaryOp::Neg,
            TokenKind::Op("+") => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        self.descend()?;
        let operand = self.parse_factor();
        self.ascend();
        let operand = operand?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            pos,
        ))
    }

    fn parse_power(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let base = self.parse_primary()?;
        if self.eat_op("**") {
            self.descend()?;
            let exponent = self.parse_factor();
            self.ascend();
            return self.bounded(binary(BinOp::Pow, base, exponent?, pos));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat_op("(") {
                expr = self.parse_call(expr, pos)?;
                expr = self.bounded(expr)?;
            } else if self.eat_op("[") {
                let index = self.parse_subscript()?;
                self.expect_op("]")?;
                expr = self.bounded(Expr::new(
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                    pos,
                ))?;
            } else if self.eat_op(".") {
                let (attr, _) = self.expect_name()?;
                expr = self.bounded(Expr::new(
                    ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                    pos,
                ))?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_call(&mut self, func: Expr, pos: Pos) -> GateResult<Expr> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.at_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return Err(self.error_at("argument unpacking is not supported", self.pos()));
            }
            let is_keyword = matches!(self.peek().kind, TokenKind::Name(_))
                && matches!(self.peek_nth(1), TokenKind::Op("="));
            if is_keyword {
                let (name, name_pos) = self.expect_name()?;
                self.expect_op("=")?;
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error_at(&format!("keyword argument repeated: {name}"), name_pos));
                }
                kwargs.push((name, self.parse_expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error_at("positional argument follows keyword argument", self.pos()));
                }
                let arg_pos = self.pos();
                let arg = self.parse_expression()?;
                if self.at_kw("for") {
                    let generators = self.parse_comprehension_clauses()?;
                    args.push(Expr::new(
                        ExprKind::ListComp {
                            element: Box::new(arg),
                            generators,
                        },
                        arg_pos,
                    ));
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(Expr::new(
            ExprKind::Call {
                func: Box::new(func),
                args,
                kwargs,
            },
            pos,
        ))
    }

    fn parse_subscript(&mut self) -> GateResult<Expr> {
        let pos = self.pos();
        let lower = if self.at_op(":") {
            None
        } else {
            let first = self.parse_expression()?;
            if !self.at_op(":") {
                if self.at_op(",") {
                    let mut items = vec![first];
                    while self.eat_op(",") {
                        if self.at_op("]") {
                            break;
                        }
                        items.push(self.parse_expression()?);
                    }
                    return Ok(Expr::new(ExprKind::Tuple(items), pos));
                }
                return Ok(first);
            }
            Some(Box::new(first))
        };
        self.expect_op(":")?;
        let upper = if self.at_op(":") || self.at_op("]") {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        let step = if self.eat_op(":") && !self.at_op("]") {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Slice { lower, upper, step }, pos))
    }

    fn parse_comprehension_clauses(&mut self) -> GateResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.eat_kw("for") {
            let target = self.parse_target_list()?;
            self.expect_kw("in")?;
            let iter = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.eat_kw("if") {
                conditions.push(self.parse_or()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }
        Ok(generators)
    }

    fn parse_atom(&mut self) -> GateResult<Expr> {
        let token = self.peek().clone();
        let pos = token.pos;
        let kind = match token.kind {
            TokenKind::Name(name) => {
                self.advance();
                ExprKind::Name(name)
            }
            TokenKind::Int(i) => {
                self.advance();
                ExprKind::Literal(Literal::Int(i))
            }
            TokenKind::Float(f) => {
                self.advance();
                ExprKind::Literal(Literal::Float(f))
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Literal(Literal::Str(s))
            }
            TokenKind::Slot(index) => {
                self.advance();
                ExprKind::Slot(index)
            }
            TokenKind::Keyword("True") => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::Keyword("False") => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::Keyword("None") => {
                self.advance();
                ExprKind::Literal(Literal::None)
            }
            TokenKind::Op("(") => {
                self.advance();
                return self.parse_paren(pos);
            }
            TokenKind::Op("[") => {
                self.advance();
                return self.parse_list(pos);
            }
            TokenKind::Op("{") => {
                self.advance();
                return self.parse_dict(pos);
            }
            _ => return Err(self.unexpected("expected an expression")),
        };
        Ok(Expr::new(kind, pos))
    }

    fn parse_paren(&mut self, pos: Pos) -> GateResult<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), pos));
        }
        let first = self.parse_expression()?;
        if self.at_kw("for") {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_op(")")?;
            return Ok(Expr::new(
                ExprKind::ListComp {
                    element: Box::new(first),
                    generators,
                },
                pos,
            ));
        }
        if !self.at_op(",") {
            self.expect_op(")")?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op(")") {
                break;
            }
            items.push(self.parse_expression()?);
        }
        self.expect_op(")")?;
        Ok(Expr::new(ExprKind::Tuple(items), pos))
    }

    fn parse_list(&mut self, pos: Pos) -> GateResult<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::new(ExprKind::List(Vec::new()), pos));
        }
        let first = self.parse_expression()?;
        if self.at_kw("for") {
            let generators = self.parse_comprehension_clauses()?;
            self.expect_op("]")?;
            return Ok(Expr::new(
                ExprKind::ListComp {
                    element: Box::new(first),
                    generators,
                },
                pos,
            ));
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            items.push(self.parse_expression()?);
        }
        self.expect_op("]")?;
        Ok(Expr::new(ExprKind::List(items), pos))
    }

    fn parse_dict(&mut self, pos: Pos) -> GateResult<Expr> {
        let mut entries = Vec::new();
        while !self.at_op("}") {
            let key = self.parse_expression()?;
            if !self.at_op(":") {
                return Err(self.error_at("set literals are not supported", key.pos));
            }
            self.advance();
            let value = self.parse_expression()?;
            if self.at_kw("for") {
                return Err(self.error_at("dict comprehensions are not supported", self.pos()));
            }
            entries.push((key, value));
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op("}")?;
        Ok(Expr::new(ExprKind::Dict(entries), pos))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr, pos: Pos) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        pos,
    )
}
