//! Error taxonomy for the parse/execute/render pipeline
//!
//! - `ParseError`: malformed source, fatal, carries line/column
//! - `RuntimeError`: fatal for the current render, carries the node position
//! - `CompatibilityWarning`: adapter-level, non-fatal, accumulated
//!
//! Unresolved variable references are NOT errors: they evaluate to an empty
//! value inside the engine (see `engine::eval`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source position (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub fn new(line: u32, col: u32) -> Self {
        Pos { line, col }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/* ===================== Parse Errors ===================== */

#[derive(Debug, Error, PartialEq)]
#[error("parse error at {pos}: {kind}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub pos: Pos,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, pos: Pos) -> Self {
        ParseError { kind, pos }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseErrorKind {
    #[error("unknown control tag 'q:{0}'")]
    UnknownControlTag(String),

    #[error("unclosed element '{0}'")]
    UnclosedElement(String),

    #[error("mismatched close tag: expected '</{expected}>', found '</{found}>'")]
    MismatchedCloseTag { expected: String, found: String },

    #[error("element 'q:{tag}' is missing required attribute '{attr}'")]
    MissingAttribute { tag: String, attr: String },

    #[error("element 'q:{tag}' is not allowed here: {detail}")]
    MisplacedElement { tag: String, detail: String },

    #[error("invalid value '{value}' for attribute '{attr}'")]
    InvalidAttribute { attr: String, value: String },

    #[error("malformed expression '{text}': {detail}")]
    MalformedExpression { text: String, detail: String },

    #[error("unterminated placeholder expression")]
    UnterminatedPlaceholder,

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("malformed markup: {0}")]
    Malformed(String),
}

/* ===================== Runtime Errors ===================== */

#[derive(Debug, Error)]
#[error("runtime error at {pos}: {kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub pos: Pos,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, pos: Pos) -> Self {
        RuntimeError { kind, pos }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
    #[error("cannot coerce {value} to {ty}")]
    CoercionFailed { value: String, ty: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{func}' has no parameter named '{param}'")]
    UnknownParameter { func: String, param: String },

    #[error("unknown data source '{0}'")]
    UnknownDataSource(String),

    #[error("query '{name}' failed: {detail}")]
    QueryFailed { name: String, detail: String },

    #[error("query parameter '{name}' exceeds max length {max}")]
    ParamTooLong { name: String, max: usize },

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("external call to '{target}' failed: {detail}")]
    ExternalCallFailed { target: String, detail: String },

    #[error("external call to '{target}' returned status {status}")]
    ExternalCallStatus { target: String, status: u16 },

    #[error("external call to '{target}' timed out")]
    ExternalCallTimeout { target: String },

    #[error("loop step must not be zero")]
    ZeroLoopStep,

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,
}

/* ===================== Compatibility Warnings ===================== */

/// Non-fatal notice that a construct was degraded on a target.
///
/// Accumulated by each adapter's `Compat` tracker and carried on the
/// artifact; never affects render success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityWarning {
    /// Construct that could not be mapped faithfully (e.g. a tag name)
    pub construct: String,
    /// Target the warning applies to
    pub target: String,
    /// Human-readable description of the degradation
    pub detail: String,
}

impl std::fmt::Display for CompatibilityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] '{}' degraded: {}",
            self.target, self.construct, self.detail
        )
    }
}
