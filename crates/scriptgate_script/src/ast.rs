//! Syntax tree for the script language.
//!
//! Nodes are plain data (`Send + Sync`), so a compiled program can be cached
//! and shared across threads; runtime values never appear in the tree.

use std::sync::Arc;

/// Source position (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pos {
    /// Line
    pub line: usize,
    /// Column
    pub column: usize,
}

impl Pos {
    /// Create a position
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A parsed script
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Top-level statements
    pub body: Vec<Stmt>,
}

/// Statement with position
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Statement kind
    pub kind: StmtKind,
    /// Where it starts
    pub pos: Pos,
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Bare expression
    Expr(Expr),
    /// `a = b = value`
    Assign {
        /// Targets, left to right
        targets: Vec<Target>,
        /// Assigned value
        value: Expr,
    },
    /// `a += value`
    AugAssign {
        /// Target
        target: Target,
        /// Operator
        op: BinOp,
        /// Right-hand side
        value: Expr,
    },
    /// `if / elif / else`
    If {
        /// Condition and body per branch
        branches: Vec<(Expr, Vec<Stmt>)>,
        /// `else` body
        orelse: Vec<Stmt>,
    },
    /// `for target in iter`
    For {
        /// Loop variable(s)
        target: Target,
        /// Iterated expression
        iter: Expr,
        /// Body
        body: Vec<Stmt>,
        /// `else` body (runs when the loop was not broken)
        orelse: Vec<Stmt>,
    },
    /// `while test`
    While {
        /// Condition
        test: Expr,
        /// Body
        body: Vec<Stmt>,
        /// `else` body
        orelse: Vec<Stmt>,
    },
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `pass`
    Pass,
    /// `def name(params): body`
    FunctionDef(Arc<FunctionDef>),
    /// `return [value]`
    Return(Option<Expr>),
    /// `try / except / else / finally`
    Try {
        /// Protected body
        body: Vec<Stmt>,
        /// Handlers in order
        handlers: Vec<ExceptHandler>,
        /// Runs when no exception was raised
        orelse: Vec<Stmt>,
        /// Always runs
        finalbody: Vec<Stmt>,
    },
    /// `raise [exc]`
    Raise(Option<Expr>),
    /// `assert test[, msg]`
    Assert {
        /// Condition
        test: Expr,
        /// Optional message
        msg: Option<Expr>,
    },
    /// `import a [as b], c`
    Import(Vec<ImportName>),
    /// `from module import a [as b]`
    ImportFrom {
        /// Module name
        module: String,
        /// Imported names
        names: Vec<ImportName>,
    },
    /// `del target, ...`
    Delete(Vec<Target>),
}

/// One imported name with optional alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportName {
    /// Name as written
    pub name: String,
    /// `as` alias
    pub alias: Option<String>,
    /// Position
    pub pos: Pos,
}

impl ImportName {
    /// Name bound in the namespace
    #[must_use]
    pub fn bound_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Exception handler
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// Matched exception kinds; empty catches everything catchable
    pub kinds: Vec<String>,
    /// `as` binding
    pub name: Option<String>,
    /// Body
    pub body: Vec<Stmt>,
    /// Position
    pub pos: Pos,
}

/// Function or lambda definition
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Name (`<lambda>` for lambdas)
    pub name: String,
    /// Parameters
    pub params: Vec<Param>,
    /// Body
    pub body: Vec<Stmt>,
    /// Position
    pub pos: Pos,
}

/// Function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Name
    pub name: String,
    /// Default value
    pub default: Option<Expr>,
}

/// Assignment target
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Plain name
    Name(String, Pos),
    /// `value[index]`
    Subscript {
        /// Container
        value: Expr,
        /// Key or index
        index: Expr,
    },
    /// `value.attr` (always rejected by the compiler)
    Attribute {
        /// Object
        value: Expr,
        /// Attribute name
        attr: String,
        /// Position
        pos: Pos,
    },
    /// `a, b`
    Tuple(Vec<Target>),
}

/// Expression with position
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Expression kind
    pub kind: ExprKind,
    /// Where it starts
    pub pos: Pos,
    /// Height of the tree rooted here, 1 for a leaf
    pub depth: usize,
}

impl Expr {
    /// Create an expression
    #[must_use]
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        let depth = 1 + kind.child_depth();
        Self { kind, pos, depth }
    }
}

fn max_depth<'e>(exprs: impl Iterator<Item = &'e Expr>) -> usize {
    exprs.map(|e| e.depth).max().unwrap_or(0)
}

impl ExprKind {
    /// Height of the deepest direct subexpression
    fn child_depth(&self) -> usize {
        match self {
            Self::Literal(_) | Self::Name(_) | Self::Slot(_) => 0,
            Self::List(items) | Self::Tuple(items) => max_depth(items.iter()),
            Self::Dict(entries) => max_depth(entries.iter().flat_map(|(k, v)| [k, v])),
            Self::Attribute { value, .. } => value.depth,
            Self::Subscript { value, index } => value.depth.max(index.depth),
            Self::Slice { lower, upper, step } => {
                max_depth([lower, upper, step].into_iter().flatten().map(|e| &**e))
            }
            Self::Call { func, args, kwargs } => {
                func.depth.max(max_depth(args.iter().chain(kwargs.iter().map(|(_, e)| e))))
            }
            Self::Unary { operand, .. } => operand.depth,
            Self::Binary { left, right, .. } | Self::BoolOp { left, right, .. } => left.depth.max(right.depth),
            Self::Compare { left, ops } => left.depth.max(max_depth(ops.iter().map(|(_, e)| e))),
            Self::IfExp { test, body, orelse } => test.depth.max(body.depth).max(orelse.depth),
            Self::Lambda(def) => {
                let returned = def.body.iter().filter_map(|stmt| match &stmt.kind {
                    StmtKind::Return(Some(expr)) => Some(expr),
                    _ => None,
                });
                max_depth(returned.chain(def.params.iter().filter_map(|p| p.default.as_ref())))
            }
            Self::ListComp { element, generators } => element.depth.max(max_depth(
                generators
                    .iter()
                    .flat_map(|g| std::iter::once(&g.iter).chain(g.conditions.iter())),
            )),
        }
    }
}

/// Constant literal
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(String),
}

/// Expression kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Constant
    Literal(Literal),
    /// Variable reference
    Name(String),
    /// Parameter slot `$n` (secure mode)
    Slot(usize),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `(a, b)`
    Tuple(Vec<Expr>),
    /// `{k: v}`
    Dict(Vec<(Expr, Expr)>),
    /// `value.attr`
    Attribute {
        /// Object
        value: Box<Expr>,
        /// Attribute name
        attr: String,
    },
    /// `value[index]`
    Subscript {
        /// Container
        value: Box<Expr>,
        /// Index (may be a `Slice`)
        index: Box<Expr>,
    },
    /// `lower:upper:step` inside a subscript
    Slice {
        /// Start
        lower: Option<Box<Expr>>,
        /// Stop
        upper: Option<Box<Expr>>,
        /// Step
        step: Option<Box<Expr>>,
    },
    /// `func(args, key=value)`
    Call {
        /// Callee
        func: Box<Expr>,
        /// Positional arguments
        args: Vec<Expr>,
        /// Keyword arguments
        kwargs: Vec<(String, Expr)>,
    },
    /// `-x`, `not x`
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Arithmetic
    Binary {
        /// Operator
        op: BinOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Short-circuit `and` / `or`
    BoolOp {
        /// Operator
        op: BoolOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Possibly chained comparison `a < b <= c`
    Compare {
        /// First operand
        left: Box<Expr>,
        /// Remaining operators and operands
        ops: Vec<(CmpOp, Expr)>,
    },
    /// `body if test else orelse`
    IfExp {
        /// Condition
        test: Box<Expr>,
        /// Value when true
        body: Box<Expr>,
        /// Value when false
        orelse: Box<Expr>,
    },
    /// `lambda params: expr`
    Lambda(Arc<FunctionDef>),
    /// `[element for target in iter if cond]`
    ListComp {
        /// Produced element
        element: Box<Expr>,
        /// Generators, outermost first
        generators: Vec<Comprehension>,
    },
}

/// One `for ... in ... if ...` clause of a comprehension
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    /// Loop variable(s)
    pub target: Target,
    /// Iterated expression
    pub iter: Expr,
    /// Filters
    pub conditions: Vec<Expr>,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `+`
    Pos,
    /// `not`
    Not,
}

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

impl BinOp {
    /// Operator symbol
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

/// Boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// `and`
    And,
    /// `or`
    Or,
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `is`
    Is,
    /// `is not`
    IsNot,
}
