//! Syntax model: the typed node hierarchy produced by parsing
//!
//! Pure data. Every variant exclusively owns its children; the tree is
//! acyclic with no back-references. Expressions embedded in text and
//! attributes are extracted at parse time but never evaluated here.

use crate::error::Pos;
use serde::{Deserialize, Serialize};

/* ===================== Expressions ===================== */

/// Expression AST node
///
/// Placeholders (`{...}`) and expression-valued attributes (guards, assign
/// values) parse into this tree. Evaluation lives in `engine::eval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    LitNull,
    LitBool { v: bool },
    LitNum { v: f64 },
    LitStr { v: String },
    Ident { name: String },
    Member { object: Box<Expr>, property: String },
    Index { object: Box<Expr>, index: Box<Expr> },
    Call { name: String, args: Vec<CallArg> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
}

/// Call argument: positional, or named (`f(limit=10)`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArg {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl Expr {
    /// Collect the root identifier names this expression reads.
    ///
    /// Used to build the reactive-binding side table: a rendered element is
    /// bound to every variable its templates reference.
    pub fn collect_idents(&self, out: &mut Vec<String>) {
        match self {
            Expr::Ident { name } => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            Expr::Member { object, .. } => object.collect_idents(out),
            Expr::Index { object, index } => {
                object.collect_idents(out);
                index.collect_idents(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.value.collect_idents(out);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_idents(out),
            Expr::Binary { left, right, .. } => {
                left.collect_idents(out);
                right.collect_idents(out);
            }
            _ => {}
        }
    }
}

/* ===================== Templates ===================== */

/// Interpolated string: ordered literal and expression segments.
///
/// `"Hello {user.name}!"` becomes `[Lit("Hello "), Expr(...), Lit("!")]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Segment {
    Lit { text: String },
    Expr { expr: Expr },
}

impl Template {
    pub fn lit(text: impl Into<String>) -> Self {
        Template {
            segments: vec![Segment::Lit { text: text.into() }],
        }
    }

    /// True when any segment is an expression (the has-placeholders flag).
    pub fn is_dynamic(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Expr { .. }))
    }

    /// Root identifiers read by any expression segment.
    pub fn collect_idents(&self, out: &mut Vec<String>) {
        for seg in &self.segments {
            if let Segment::Expr { expr } = seg {
                expr.collect_idents(out);
            }
        }
    }
}

/* ===================== Supporting enums ===================== */

/// Declared type for assignments and query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    String,
    Number,
    Boolean,
    Array,
}

impl DeclaredType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(DeclaredType::String),
            "number" => Some(DeclaredType::Number),
            "boolean" => Some(DeclaredType::Boolean),
            "array" => Some(DeclaredType::Array),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeclaredType::String => "string",
            DeclaredType::Number => "number",
            DeclaredType::Boolean => "boolean",
            DeclaredType::Array => "array",
        }
    }
}

/// Variable-binding layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Local,
    Declared,
    Session,
}

impl ScopeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "local" => Some(ScopeKind::Local),
            "declared" => Some(ScopeKind::Declared),
            "session" => Some(ScopeKind::Session),
            _ => None,
        }
    }
}

/// Loop iteration mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum LoopMode {
    /// Numeric range, inclusive of the upper bound
    Range {
        from: Expr,
        to: Expr,
        step: Option<Expr>,
    },
    /// Iterate a resolved sequence, binding element and optional 0-based index
    Items { source: Expr },
    /// Split a string by a delimiter (default comma)
    List {
        source: Expr,
        delimiter: Option<String>,
    },
}

/// Typed function parameter signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSig {
    pub name: String,
    pub ty: Option<DeclaredType>,
}

/// Named query parameter (`q:param` child of `q:query`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    pub value: Expr,
    pub ty: Option<DeclaredType>,
    pub max_length: Option<usize>,
    pub pos: Pos,
}

/// Declared statement kind for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "select" => Some(StatementType::Select),
            "insert" => Some(StatementType::Insert),
            "update" => Some(StatementType::Update),
            "delete" => Some(StatementType::Delete),
            _ => None,
        }
    }

    /// Mutating statements report a last-inserted identifier.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, StatementType::Select)
    }
}

/// What to do when an external call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Failure is fatal for the render (default)
    Abort,
    /// Store the failure response and continue
    Ignore,
}

/* ===================== Syntax Nodes ===================== */

/// Syntax tree node: closed tagged union, exhaustively matched by the
/// parser dispatch table, the executor and the adapter mapping tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyntaxNode {
    /// Pass-through markup element; children parsed recursively
    Literal {
        tag: String,
        attrs: Vec<(String, Template)>,
        children: Vec<SyntaxNode>,
        self_closing: bool,
        pos: Pos,
    },

    /// Raw text run, possibly carrying placeholders
    Text {
        raw: String,
        template: Template,
        pos: Pos,
    },

    /// `q:set` — variable assignment
    Assign {
        name: String,
        value: Expr,
        ty: Option<DeclaredType>,
        scope: Option<ScopeKind>,
        persist: bool,
        pos: Pos,
    },

    /// `q:if` with ordered `q:when` branches and optional `q:otherwise`
    Conditional {
        branches: Vec<Branch>,
        otherwise: Option<Vec<SyntaxNode>>,
        pos: Pos,
    },

    /// `q:loop` in one of three iteration modes
    Loop {
        mode: LoopMode,
        var: String,
        index: Option<String>,
        body: Vec<SyntaxNode>,
        pos: Pos,
    },

    /// `q:function` definition
    FunctionDef {
        name: String,
        params: Vec<ParamSig>,
        body: Vec<SyntaxNode>,
        cache: bool,
        pos: Pos,
    },

    /// `q:return` — truncates the enclosing function body
    Return { value: Option<Expr>, pos: Pos },

    /// `q:query` — parameterized data query
    Query {
        name: String,
        datasource: String,
        statement: String,
        params: Vec<QueryParam>,
        statement_type: StatementType,
        cache_ttl: Option<u64>,
        pos: Pos,
    },

    /// `q:transaction` — member query failure rolls the group back
    Transaction { body: Vec<SyntaxNode>, pos: Pos },

    /// `q:http` — external-call declaration
    ExternalCall {
        target: Template,
        method: String,
        headers: Vec<(String, Template)>,
        result: Option<String>,
        timeout_ms: Option<u64>,
        on_fail: FailMode,
        pos: Pos,
    },
}

/// One (guard, body) conditional branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub guard: Expr,
    pub body: Vec<SyntaxNode>,
    pub pos: Pos,
}

impl SyntaxNode {
    pub fn pos(&self) -> Pos {
        match self {
            SyntaxNode::Literal { pos, .. }
            | SyntaxNode::Text { pos, .. }
            | SyntaxNode::Assign { pos, .. }
            | SyntaxNode::Conditional { pos, .. }
            | SyntaxNode::Loop { pos, .. }
            | SyntaxNode::FunctionDef { pos, .. }
            | SyntaxNode::Return { pos, .. }
            | SyntaxNode::Query { pos, .. }
            | SyntaxNode::Transaction { pos, .. }
            | SyntaxNode::ExternalCall { pos, .. } => *pos,
        }
    }
}

/* ===================== Document ===================== */

/// A fully parsed component source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub roots: Vec<SyntaxNode>,
    /// sha256 of the source text, used for parse-cache invalidation
    pub source_hash: String,
}
