//! Document parser: tagged-element source → syntax tree
//!
//! Recursive descent over nested elements. Elements in the reserved `q:`
//! namespace dispatch 1:1 to node constructors; everything else becomes a
//! `Literal` node whose attributes and text children are scanned for
//! `{...}` placeholders (extracted, never evaluated here). Sibling order of
//! interleaved literal/control content is preserved exactly.
//!
//! All errors are fatal and carry line/column; there is no partial recovery.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ParseError, ParseErrorKind, Pos};
use crate::syntax::{
    Branch, DeclaredType, Document, Expr, FailMode, LoopMode, ParamSig, QueryParam, ScopeKind,
    Segment, StatementType, SyntaxNode, Template,
};

pub mod expr;


/* ===================== Public API ===================== */

/// Parse a component source document into a syntax tree
pub fn parse(source: &str) -> Result<Document, ParseError> {
    let mut parser = Parser::new(source);
    let roots = parser.parse_nodes(None)?;
    Ok(Document {
        roots,
        source_hash: source_hash(source),
    })
}

/// sha256 of the source text, hex-encoded; parse-cache invalidation key
pub fn source_hash(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest.iter().fold(String::new(), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{:02x}", b);
        acc
    })
}

/// Content-addressed parse cache.
///
/// A cached parse is reused only while the source hash is unchanged; any
/// edit re-parses. Trees are shared via `Arc` so the file watcher can diff
/// fresh parses without touching a tree currently being executed.
#[derive(Default)]
pub struct ParseCache {
    entries: HashMap<String, (String, Arc<Document>)>,
}

impl ParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source` under cache key `id`, reusing the cached tree when the
    /// content hash matches. Returns the tree and whether it was reused.
    pub fn parse_cached(
        &mut self,
        id: &str,
        source: &str,
    ) -> Result<(Arc<Document>, bool), ParseError> {
        let hash = source_hash(source);
        if let Some((cached_hash, doc)) = self.entries.get(id) {
            if *cached_hash == hash {
                return Ok((Arc::clone(doc), true));
            }
            debug!(id, "source changed, invalidating cached parse");
        }
        let doc = Arc::new(parse(source)?);
        self.entries
            .insert(id.to_string(), (hash, Arc::clone(&doc)));
        Ok((doc, false))
    }
}

/* ===================== Scanner ===================== */

const RESERVED_PREFIX: &str = "q:";

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
    /// Depth of enclosing `q:function` bodies; `q:return` is only legal > 0
    fn_depth: usize,
}

/// One raw attribute as scanned: name, raw value text, position
struct RawAttr {
    name: String,
    value: String,
    pos: Pos,
}

struct RawTag {
    name: String,
    attrs: Vec<RawAttr>,
    self_closing: bool,
    pos: Pos,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser {
            src,
            pos: 0,
            line: 1,
            col: 1,
            fn_depth: 0,
        }
    }

    fn here(&self) -> Pos {
        Pos::new(self.line, self.col)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn advance_str(&mut self, s: &str) {
        for _ in s.chars() {
            self.advance();
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(kind, self.here())
    }

    /* ===================== Node parsing ===================== */

    /// Parse sibling nodes until EOF (closing = None) or the matching close
    /// tag for `closing`.
    fn parse_nodes(&mut self, closing: Option<&str>) -> Result<Vec<SyntaxNode>, ParseError> {
        let mut nodes = Vec::new();

        loop {
            if self.rest().is_empty() {
                return match closing {
                    None => Ok(nodes),
                    Some(open) => Err(self.err(ParseErrorKind::UnclosedElement(open.to_string()))),
                };
            }

            if self.starts_with("<!--") {
                self.skip_comment()?;
                continue;
            }

            if self.starts_with("</") {
                let pos = self.here();
                let name = self.read_close_tag()?;
                return match closing {
                    Some(open) if open == name => Ok(nodes),
                    Some(open) => Err(ParseError::new(
                        ParseErrorKind::MismatchedCloseTag {
                            expected: open.to_string(),
                            found: name,
                        },
                        pos,
                    )),
                    None => Err(ParseError::new(
                        ParseErrorKind::Malformed(format!("stray close tag '</{}>'", name)),
                        pos,
                    )),
                };
            }

            if self.starts_with("<") {
                nodes.push(self.parse_element()?);
                continue;
            }

            nodes.push(self.parse_text()?);
        }
    }

    fn skip_comment(&mut self) -> Result<(), ParseError> {
        let start = self.here();
        self.advance_str("<!--");
        while !self.rest().is_empty() {
            if self.starts_with("-->") {
                self.advance_str("-->");
                return Ok(());
            }
            self.advance();
        }
        Err(ParseError::new(
            ParseErrorKind::Malformed("unterminated comment".to_string()),
            start,
        ))
    }

    fn parse_text(&mut self) -> Result<SyntaxNode, ParseError> {
        let pos = self.here();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != '<') {
            self.advance();
        }
        let raw = &self.src[start..self.pos];
        let template = scan_template(raw, pos)?;
        Ok(SyntaxNode::Text {
            raw: raw.to_string(),
            template,
            pos,
        })
    }

    /// Raw text run for query bodies: no placeholder scanning, so statement
    /// text can never pick up interpolated values.
    fn parse_raw_text(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != '<') {
            self.advance();
        }
        self.src[start..self.pos].to_string()
    }

    fn parse_element(&mut self) -> Result<SyntaxNode, ParseError> {
        let tag = self.read_open_tag()?;

        if let Some(control) = tag.name.strip_prefix(RESERVED_PREFIX) {
            let control = control.to_string();
            self.build_control(&control, tag)
        } else {
            self.build_literal(tag)
        }
    }

    fn read_open_tag(&mut self) -> Result<RawTag, ParseError> {
        let pos = self.here();
        self.advance(); // '<'
        let name = self.read_name()?;

        let mut attrs = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.err(ParseErrorKind::UnexpectedEof)),
                Some('/') => {
                    self.advance();
                    if self.peek() != Some('>') {
                        return Err(self.err(ParseErrorKind::Malformed(
                            "expected '>' after '/'".to_string(),
                        )));
                    }
                    self.advance();
                    return Ok(RawTag {
                        name,
                        attrs,
                        self_closing: true,
                        pos,
                    });
                }
                Some('>') => {
                    self.advance();
                    return Ok(RawTag {
                        name,
                        attrs,
                        self_closing: false,
                        pos,
                    });
                }
                Some(_) => attrs.push(self.read_attr()?),
            }
        }
    }

    fn read_close_tag(&mut self) -> Result<String, ParseError> {
        self.advance_str("</");
        let name = self.read_name()?;
        self.skip_ws();
        if self.peek() != Some('>') {
            return Err(self.err(ParseErrorKind::Malformed(format!(
                "malformed close tag '</{}'",
                name
            ))));
        }
        self.advance();
        Ok(name)
    }

    fn read_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_'))
        {
            self.advance();
        }
        if start == self.pos {
            return Err(self.err(ParseErrorKind::Malformed("expected a tag name".to_string())));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn read_attr(&mut self) -> Result<RawAttr, ParseError> {
        let pos = self.here();
        let name = self.read_name()?;
        self.skip_ws();

        // Bare attribute (no value) reads as "true", e.g. `persist`
        if self.peek() != Some('=') {
            return Ok(RawAttr {
                name,
                value: "true".to_string(),
                pos,
            });
        }
        self.advance(); // '='
        self.skip_ws();
        if self.peek() != Some('"') {
            return Err(self.err(ParseErrorKind::Malformed(format!(
                "attribute '{}' value must be double-quoted",
                name
            ))));
        }
        self.advance(); // '"'
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != '"') {
            self.advance();
        }
        if self.peek().is_none() {
            return Err(self.err(ParseErrorKind::UnexpectedEof));
        }
        let value = self.src[start..self.pos].to_string();
        self.advance(); // closing '"'
        Ok(RawAttr { name, value, pos })
    }

    /* ===================== Literal elements ===================== */

    fn build_literal(&mut self, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        let mut attrs = Vec::new();
        for attr in &tag.attrs {
            let template = scan_template(&attr.value, attr.pos)?;
            attrs.push((attr.name.clone(), template));
        }

        let children = if tag.self_closing {
            Vec::new()
        } else {
            self.parse_nodes(Some(&tag.name))?
        };

        Ok(SyntaxNode::Literal {
            tag: tag.name,
            attrs,
            children,
            self_closing: tag.self_closing,
            pos: tag.pos,
        })
    }

    /* ===================== Control dispatch ===================== */

    /// Reserved-namespace constructor table: a closed match, one arm per
    /// control tag. Unknown `q:*` names are fatal.
    fn build_control(&mut self, control: &str, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        match control {
            "set" => self.build_set(tag),
            "if" => self.build_conditional(tag),
            "loop" => self.build_loop(tag),
            "function" => self.build_function(tag),
            "return" => self.build_return(tag),
            "query" => self.build_query(tag),
            "transaction" => self.build_transaction(tag),
            "http" => self.build_http(tag),
            "when" | "otherwise" => Err(ParseError::new(
                ParseErrorKind::MisplacedElement {
                    tag: control.to_string(),
                    detail: "only allowed as a direct child of q:if".to_string(),
                },
                tag.pos,
            )),
            "param" => Err(ParseError::new(
                ParseErrorKind::MisplacedElement {
                    tag: "param".to_string(),
                    detail: "only allowed as a direct child of q:query".to_string(),
                },
                tag.pos,
            )),
            other => Err(ParseError::new(
                ParseErrorKind::UnknownControlTag(other.to_string()),
                tag.pos,
            )),
        }
    }

    fn build_set(&mut self, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        self.expect_empty(&tag, "set")?;
        let name = required_attr(&tag, "set", "name")?.to_string();
        let value_raw = required_attr(&tag, "set", "value")?;
        let value = parse_attr_expr(value_raw, tag.pos)?;

        let ty = match attr(&tag, "type") {
            Some(raw) => Some(DeclaredType::from_name(raw).ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::InvalidAttribute {
                        attr: "type".to_string(),
                        value: raw.to_string(),
                    },
                    tag.pos,
                )
            })?),
            None => None,
        };
        let scope = match attr(&tag, "scope") {
            Some(raw) => Some(ScopeKind::from_name(raw).ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::InvalidAttribute {
                        attr: "scope".to_string(),
                        value: raw.to_string(),
                    },
                    tag.pos,
                )
            })?),
            None => None,
        };
        let persist = attr(&tag, "persist") == Some("true");

        Ok(SyntaxNode::Assign {
            name,
            value,
            ty,
            scope,
            persist,
            pos: tag.pos,
        })
    }

    fn build_conditional(&mut self, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        if tag.self_closing {
            return Err(ParseError::new(
                ParseErrorKind::MisplacedElement {
                    tag: "if".to_string(),
                    detail: "q:if requires q:when children".to_string(),
                },
                tag.pos,
            ));
        }

        let mut branches = Vec::new();
        let mut otherwise = None;

        loop {
            self.skip_ws_and_comments()?;
            if self.starts_with("</") {
                let pos = self.here();
                let name = self.read_close_tag()?;
                if name != "q:if" {
                    return Err(ParseError::new(
                        ParseErrorKind::MismatchedCloseTag {
                            expected: "q:if".to_string(),
                            found: name,
                        },
                        pos,
                    ));
                }
                break;
            }
            if self.rest().is_empty() {
                return Err(self.err(ParseErrorKind::UnclosedElement("q:if".to_string())));
            }

            let child = self.read_open_tag()?;
            match child.name.as_str() {
                "q:when" => {
                    if otherwise.is_some() {
                        return Err(ParseError::new(
                            ParseErrorKind::MisplacedElement {
                                tag: "when".to_string(),
                                detail: "q:when may not follow q:otherwise".to_string(),
                            },
                            child.pos,
                        ));
                    }
                    let guard_raw = required_attr(&child, "when", "test")?;
                    let guard = parse_attr_expr(guard_raw, child.pos)?;
                    let body = if child.self_closing {
                        Vec::new()
                    } else {
                        self.parse_nodes(Some("q:when"))?
                    };
                    branches.push(Branch {
                        guard,
                        body,
                        pos: child.pos,
                    });
                }
                "q:otherwise" => {
                    if otherwise.is_some() {
                        return Err(ParseError::new(
                            ParseErrorKind::MisplacedElement {
                                tag: "otherwise".to_string(),
                                detail: "only one q:otherwise is allowed".to_string(),
                            },
                            child.pos,
                        ));
                    }
                    let body = if child.self_closing {
                        Vec::new()
                    } else {
                        self.parse_nodes(Some("q:otherwise"))?
                    };
                    otherwise = Some(body);
                }
                other => {
                    return Err(ParseError::new(
                        ParseErrorKind::MisplacedElement {
                            tag: other.trim_start_matches(RESERVED_PREFIX).to_string(),
                            detail: "q:if children must be q:when or q:otherwise".to_string(),
                        },
                        child.pos,
                    ));
                }
            }
        }

        if branches.is_empty() {
            return Err(ParseError::new(
                ParseErrorKind::MisplacedElement {
                    tag: "if".to_string(),
                    detail: "q:if requires at least one q:when branch".to_string(),
                },
                tag.pos,
            ));
        }

        Ok(SyntaxNode::Conditional {
            branches,
            otherwise,
            pos: tag.pos,
        })
    }

    fn build_loop(&mut self, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        let mode_name = required_attr(&tag, "loop", "mode")?.to_string();
        let var = required_attr(&tag, "loop", "var")?.to_string();
        let index = attr(&tag, "index").map(|s| s.to_string());

        let mode = match mode_name.as_str() {
            "range" => {
                let from = parse_attr_expr(required_attr(&tag, "loop", "from")?, tag.pos)?;
                let to = parse_attr_expr(required_attr(&tag, "loop", "to")?, tag.pos)?;
                let step = match attr(&tag, "step") {
                    Some(raw) => Some(parse_attr_expr(raw, tag.pos)?),
                    None => None,
                };
                LoopMode::Range { from, to, step }
            }
            "items" => {
                let source = parse_attr_expr(required_attr(&tag, "loop", "source")?, tag.pos)?;
                LoopMode::Items { source }
            }
            "list" => {
                let source = parse_attr_expr(required_attr(&tag, "loop", "source")?, tag.pos)?;
                let delimiter = attr(&tag, "delimiter").map(|s| s.to_string());
                LoopMode::List { source, delimiter }
            }
            other => {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidAttribute {
                        attr: "mode".to_string(),
                        value: other.to_string(),
                    },
                    tag.pos,
                ))
            }
        };

        let body = if tag.self_closing {
            Vec::new()
        } else {
            self.parse_nodes(Some("q:loop"))?
        };

        Ok(SyntaxNode::Loop {
            mode,
            var,
            index,
            body,
            pos: tag.pos,
        })
    }

    fn build_function(&mut self, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        let name = required_attr(&tag, "function", "name")?.to_string();
        let params = match attr(&tag, "params") {
            Some(raw) => parse_param_sigs(raw, tag.pos)?,
            None => Vec::new(),
        };
        let cache = attr(&tag, "cache") == Some("true");

        let body = if tag.self_closing {
            Vec::new()
        } else {
            self.fn_depth += 1;
            let body = self.parse_nodes(Some("q:function"));
            self.fn_depth -= 1;
            body?
        };

        Ok(SyntaxNode::FunctionDef {
            name,
            params,
            body,
            cache,
            pos: tag.pos,
        })
    }

    fn build_return(&mut self, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        if self.fn_depth == 0 {
            return Err(ParseError::new(
                ParseErrorKind::MisplacedElement {
                    tag: "return".to_string(),
                    detail: "only allowed inside q:function".to_string(),
                },
                tag.pos,
            ));
        }
        self.expect_empty(&tag, "return")?;
        let value = match attr(&tag, "value") {
            Some(raw) => Some(parse_attr_expr(raw, tag.pos)?),
            None => None,
        };
        Ok(SyntaxNode::Return {
            value,
            pos: tag.pos,
        })
    }

    fn build_query(&mut self, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        let name = required_attr(&tag, "query", "name")?.to_string();
        let datasource = required_attr(&tag, "query", "datasource")?.to_string();
        let statement_type = match attr(&tag, "statement-type") {
            Some(raw) => StatementType::from_name(raw).ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::InvalidAttribute {
                        attr: "statement-type".to_string(),
                        value: raw.to_string(),
                    },
                    tag.pos,
                )
            })?,
            None => StatementType::Select,
        };
        let cache_ttl = parse_u64_attr(&tag, "cache-ttl")?;

        let mut statement = String::new();
        let mut params = Vec::new();

        if !tag.self_closing {
            loop {
                if self.rest().is_empty() {
                    return Err(self.err(ParseErrorKind::UnclosedElement("q:query".to_string())));
                }
                if self.starts_with("<!--") {
                    self.skip_comment()?;
                    continue;
                }
                if self.starts_with("</") {
                    let pos = self.here();
                    let close = self.read_close_tag()?;
                    if close != "q:query" {
                        return Err(ParseError::new(
                            ParseErrorKind::MismatchedCloseTag {
                                expected: "q:query".to_string(),
                                found: close,
                            },
                            pos,
                        ));
                    }
                    break;
                }
                if self.starts_with("<") {
                    let child = self.read_open_tag()?;
                    if child.name != "q:param" {
                        return Err(ParseError::new(
                            ParseErrorKind::MisplacedElement {
                                tag: child.name.trim_start_matches(RESERVED_PREFIX).to_string(),
                                detail: "q:query children must be statement text or q:param"
                                    .to_string(),
                            },
                            child.pos,
                        ));
                    }
                    self.expect_empty(&child, "param")?;
                    params.push(build_query_param(&child)?);
                    continue;
                }
                // Statement text is taken raw: placeholders are never
                // interpolated into it, parameters are the only way in.
                statement.push_str(&self.parse_raw_text());
            }
        }

        Ok(SyntaxNode::Query {
            name,
            datasource,
            statement: statement.trim().to_string(),
            params,
            statement_type,
            cache_ttl,
            pos: tag.pos,
        })
    }

    fn build_transaction(&mut self, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        let body = if tag.self_closing {
            Vec::new()
        } else {
            self.parse_nodes(Some("q:transaction"))?
        };
        Ok(SyntaxNode::Transaction {
            body,
            pos: tag.pos,
        })
    }

    fn build_http(&mut self, tag: RawTag) -> Result<SyntaxNode, ParseError> {
        self.expect_empty(&tag, "http")?;
        let target = scan_template(required_attr(&tag, "http", "target")?, tag.pos)?;
        let method = required_attr(&tag, "http", "method")?.to_lowercase();

        let mut headers = Vec::new();
        if let Some(raw) = attr(&tag, "headers") {
            // "Name: value; Other: {expr}" pairs
            for part in raw.split(';') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let (hname, hvalue) = part.split_once(':').ok_or_else(|| {
                    ParseError::new(
                        ParseErrorKind::InvalidAttribute {
                            attr: "headers".to_string(),
                            value: part.to_string(),
                        },
                        tag.pos,
                    )
                })?;
                headers.push((
                    hname.trim().to_string(),
                    scan_template(hvalue.trim(), tag.pos)?,
                ));
            }
        }

        let result = attr(&tag, "result").map(|s| s.to_string());
        let timeout_ms = parse_u64_attr(&tag, "timeout")?;
        let on_fail = match attr(&tag, "on-fail") {
            None | Some("abort") => FailMode::Abort,
            Some("ignore") => FailMode::Ignore,
            Some(other) => {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidAttribute {
                        attr: "on-fail".to_string(),
                        value: other.to_string(),
                    },
                    tag.pos,
                ))
            }
        };

        Ok(SyntaxNode::ExternalCall {
            target,
            method,
            headers,
            result,
            timeout_ms,
            on_fail,
            pos: tag.pos,
        })
    }

    /* ===================== Small helpers ===================== */

    /// Consume the body of a control element that must be empty
    /// (`q:set`, `q:return`, `q:param`, `q:http`).
    fn expect_empty(&mut self, tag: &RawTag, control: &str) -> Result<(), ParseError> {
        if tag.self_closing {
            return Ok(());
        }
        let children = self.parse_nodes(Some(&tag.name))?;
        let all_ws = children
            .iter()
            .all(|n| matches!(n, SyntaxNode::Text { raw, .. } if raw.trim().is_empty()));
        if all_ws {
            Ok(())
        } else {
            Err(ParseError::new(
                ParseErrorKind::MisplacedElement {
                    tag: control.to_string(),
                    detail: format!("q:{} does not take children", control),
                },
                tag.pos,
            ))
        }
    }

    fn skip_ws_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_ws();
            if self.starts_with("<!--") {
                self.skip_comment()?;
            } else {
                return Ok(());
            }
        }
    }
}

fn attr<'t>(tag: &'t RawTag, name: &str) -> Option<&'t str> {
    tag.attrs
        .iter()
        .find(|a| a.name == name)
        .map(|a| a.value.as_str())
}

fn required_attr<'t>(tag: &'t RawTag, control: &str, name: &str) -> Result<&'t str, ParseError> {
    attr(tag, name).ok_or_else(|| {
        ParseError::new(
            ParseErrorKind::MissingAttribute {
                tag: control.to_string(),
                attr: name.to_string(),
            },
            tag.pos,
        )
    })
}

fn parse_u64_attr(tag: &RawTag, name: &str) -> Result<Option<u64>, ParseError> {
    match attr(tag, name) {
        None => Ok(None),
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            ParseError::new(
                ParseErrorKind::InvalidAttribute {
                    attr: name.to_string(),
                    value: raw.to_string(),
                },
                tag.pos,
            )
        }),
    }
}

fn build_query_param(tag: &RawTag) -> Result<QueryParam, ParseError> {
    let name = required_attr(tag, "param", "name")?.to_string();
    let value = parse_attr_expr(required_attr(tag, "param", "value")?, tag.pos)?;
    let ty = match attr(tag, "type") {
        Some(raw) => Some(DeclaredType::from_name(raw).ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::InvalidAttribute {
                    attr: "type".to_string(),
                    value: raw.to_string(),
                },
                tag.pos,
            )
        })?),
        None => None,
    };
    let max_length = parse_u64_attr(tag, "max-length")?.map(|v| v as usize);
    Ok(QueryParam {
        name,
        value,
        ty,
        max_length,
        pos: tag.pos,
    })
}

/// Parse an expression-valued attribute. Surrounding braces are permitted
/// and stripped: `test="{x >= 90}"` and `test="x >= 90"` are equivalent.
fn parse_attr_expr(raw: &str, pos: Pos) -> Result<Expr, ParseError> {
    let trimmed = raw.trim();
    let body = match trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(inner) => inner,
        None => trimmed,
    };
    expr::parse_expr(body).map_err(|e| {
        ParseError::new(
            ParseErrorKind::MalformedExpression {
                text: raw.to_string(),
                detail: e.detail,
            },
            pos,
        )
    })
}

/* ===================== Placeholder scanning ===================== */

/// Scan raw text into a template of literal and expression segments.
///
/// `{{` and `}}` escape literal braces. A `'`-quoted string inside a
/// placeholder may contain `}` without closing it.
pub fn scan_template(raw: &str, pos: Pos) -> Result<Template, ParseError> {
    let mut segments = Vec::new();
    let mut lit = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                lit.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                lit.push('}');
            }
            '{' => {
                let mut body = String::new();
                let mut in_str = false;
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        '\'' => {
                            in_str = !in_str;
                            body.push(inner);
                        }
                        '}' if !in_str => {
                            closed = true;
                            break;
                        }
                        _ => body.push(inner),
                    }
                }
                if !closed {
                    return Err(ParseError::new(
                        ParseErrorKind::UnterminatedPlaceholder,
                        pos,
                    ));
                }
                if !lit.is_empty() {
                    segments.push(Segment::Lit {
                        text: std::mem::take(&mut lit),
                    });
                }
                let expr = expr::parse_expr(&body).map_err(|e| {
                    ParseError::new(
                        ParseErrorKind::MalformedExpression {
                            text: body.clone(),
                            detail: e.detail,
                        },
                        pos,
                    )
                })?;
                segments.push(Segment::Expr { expr });
            }
            _ => lit.push(ch),
        }
    }

    if !lit.is_empty() || segments.is_empty() {
        segments.push(Segment::Lit { text: lit });
    }

    Ok(Template { segments })
}

/* ===================== Function parameter lists ===================== */

/// Parse a `params` attribute: `"name:string, times:number, flag"`.
fn parse_param_sigs(raw: &str, pos: Pos) -> Result<Vec<ParamSig>, ParseError> {
    let mut sigs = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (name, ty) = match part.split_once(':') {
            Some((n, t)) => {
                let ty = DeclaredType::from_name(t.trim()).ok_or_else(|| {
                    ParseError::new(
                        ParseErrorKind::InvalidAttribute {
                            attr: "params".to_string(),
                            value: part.to_string(),
                        },
                        pos,
                    )
                })?;
                (n.trim(), Some(ty))
            }
            None => (part, None),
        };
        sigs.push(ParamSig {
            name: name.to_string(),
            ty,
        });
    }
    Ok(sigs)
}
