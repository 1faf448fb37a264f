//! Execution engine: syntax tree + scopes + surfaces → rendered tree
//!
//! Single-pass, depth-first, left-to-right tree walk. Control constructs
//! are resolved away as the walk proceeds: conditionals pick a branch,
//! loops expand, placeholders substitute. The result is a `RenderOutput`
//! that the target adapters consume without evaluating anything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{Pos, RuntimeError, RuntimeErrorKind};
use crate::render::{Binding, BindingSite, RenderOutput, RenderedNode};
use crate::syntax::{
    Document, Expr, FailMode, LoopMode, ParamSig, ScopeKind, Segment, SyntaxNode, Template,
};

pub mod eval;
pub mod http;
pub mod query;
pub mod scope;
pub mod value;

#[cfg(test)]
mod tests;

pub use http::{HttpSurface, NoHttp, OutboundRequest, OutboundResponse, TransportError};
pub use query::{BoundParam, DataSource, DataSourceError, MemoryDataSource, QuerySet};
pub use scope::{ScopeStore, SessionRegistry};
pub use value::{coerce, Val};

/* ===================== Surfaces ===================== */

/// Injected collaborators: named data sources and the external-call
/// transport. Shared across renders; both sides are `Send + Sync`.
pub struct Surfaces {
    datasources: HashMap<String, Arc<dyn DataSource>>,
    http: Arc<dyn HttpSurface>,
}

impl Surfaces {
    pub fn new() -> Self {
        Surfaces {
            datasources: HashMap::new(),
            http: Arc::new(NoHttp),
        }
    }

    pub fn with_datasource(mut self, name: &str, ds: Arc<dyn DataSource>) -> Self {
        self.datasources.insert(name.to_string(), ds);
        self
    }

    pub fn with_http(mut self, http: Arc<dyn HttpSurface>) -> Self {
        self.http = http;
        self
    }

    fn datasource(&self, name: &str) -> Option<&Arc<dyn DataSource>> {
        self.datasources.get(name)
    }
}

impl Default for Surfaces {
    fn default() -> Self {
        Self::new()
    }
}

/* ===================== Public API ===================== */

/// Execute a parsed document against a scope store and surfaces.
pub fn execute(
    doc: &Document,
    scopes: &mut ScopeStore,
    surfaces: &Surfaces,
) -> Result<RenderOutput, RuntimeError> {
    let _span = tracing::info_span!("render", source = %doc.source_hash).entered();

    let mut executor = Executor::new(scopes, surfaces);
    executor.collect_functions(&doc.roots);

    let mut nodes = Vec::new();
    executor.exec_nodes(&doc.roots, &mut nodes)?;

    let mut bindings: Vec<Binding> = executor
        .bindings
        .into_iter()
        .map(|(name, sites)| Binding { name, sites })
        .collect();
    bindings.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(RenderOutput { nodes, bindings })
}

/* ===================== Executor ===================== */

const MAX_CALL_DEPTH: usize = 64;

/// Registered function definition (collected in a prepass so call order
/// does not matter)
#[derive(Clone)]
pub(crate) struct FunctionDef {
    pub params: Vec<ParamSig>,
    pub body: Vec<SyntaxNode>,
    pub cache: bool,
    pub pos: Pos,
}

/// Control flow of a node sequence: `q:return` truncates the remaining
/// body of the enclosing function.
pub(crate) enum Flow {
    Normal,
    Return(Val),
}

pub(crate) struct Executor<'a> {
    pub scopes: &'a mut ScopeStore,
    surfaces: &'a Surfaces,
    pub functions: HashMap<String, FunctionDef>,
    /// Function memo for `cache="true"`, request lifetime
    pub memo: HashMap<String, Val>,
    /// Query result memo for `cache-ttl`, request lifetime
    query_cache: HashMap<String, QuerySet>,
    bindings: HashMap<String, Vec<BindingSite>>,
    /// Index path of the rendered node currently being produced
    path: Vec<usize>,
    pub call_depth: usize,
    /// Data sources with an open transaction, in begin order
    txn: Option<Vec<String>>,
}

impl<'a> Executor<'a> {
    fn new(scopes: &'a mut ScopeStore, surfaces: &'a Surfaces) -> Self {
        Executor {
            scopes,
            surfaces,
            functions: HashMap::new(),
            memo: HashMap::new(),
            query_cache: HashMap::new(),
            bindings: HashMap::new(),
            path: Vec::new(),
            call_depth: 0,
            txn: None,
        }
    }

    /// Prepass: register every function definition in the tree so calls may
    /// precede definitions in source order.
    fn collect_functions(&mut self, nodes: &[SyntaxNode]) {
        for node in nodes {
            match node {
                SyntaxNode::FunctionDef {
                    name,
                    params,
                    body,
                    cache,
                    pos,
                } => {
                    self.functions.insert(
                        name.clone(),
                        FunctionDef {
                            params: params.clone(),
                            body: body.clone(),
                            cache: *cache,
                            pos: *pos,
                        },
                    );
                    self.collect_functions(body);
                }
                SyntaxNode::Literal { children, .. } => self.collect_functions(children),
                SyntaxNode::Conditional {
                    branches,
                    otherwise,
                    ..
                } => {
                    for branch in branches {
                        self.collect_functions(&branch.body);
                    }
                    if let Some(body) = otherwise {
                        self.collect_functions(body);
                    }
                }
                SyntaxNode::Loop { body, .. } | SyntaxNode::Transaction { body, .. } => {
                    self.collect_functions(body)
                }
                _ => {}
            }
        }
    }

    /* ===================== Node execution ===================== */

    pub(crate) fn exec_nodes(
        &mut self,
        nodes: &[SyntaxNode],
        out: &mut Vec<RenderedNode>,
    ) -> Result<Flow, RuntimeError> {
        for node in nodes {
            if let Flow::Return(v) = self.exec_node(node, out)? {
                return Ok(Flow::Return(v));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_node(
        &mut self,
        node: &SyntaxNode,
        out: &mut Vec<RenderedNode>,
    ) -> Result<Flow, RuntimeError> {
        match node {
            SyntaxNode::Literal {
                tag,
                attrs,
                children,
                self_closing,
                pos,
            } => {
                self.path.push(out.len());
                let result = self.exec_literal(tag, attrs, children, *self_closing, *pos);
                self.path.pop();
                let (element, flow) = result?;
                out.push(element);
                Ok(flow)
            }

            SyntaxNode::Text { template, pos, .. } => {
                self.path.push(out.len());
                let content = self.resolve_template(template, *pos, true, None);
                self.path.pop();
                out.push(RenderedNode::Text { content: content? });
                Ok(Flow::Normal)
            }

            SyntaxNode::Assign {
                name,
                value,
                ty,
                scope,
                persist,
                pos,
            } => {
                let mut val = self.eval_expr(value, *pos)?;
                if let Some(ty) = ty {
                    val = coerce(val, *ty).map_err(|detail| {
                        RuntimeError::new(
                            RuntimeErrorKind::CoercionFailed {
                                value: detail,
                                ty: ty.name().to_string(),
                            },
                            *pos,
                        )
                    })?;
                }
                // `persist` without an explicit scope makes the binding
                // session-durable.
                let target = match (scope, persist) {
                    (Some(kind), _) => Some(*kind),
                    (None, true) => Some(ScopeKind::Session),
                    (None, false) => None,
                };
                self.scopes.set(name, val, target);
                Ok(Flow::Normal)
            }

            SyntaxNode::Conditional {
                branches, otherwise, ..
            } => {
                // Guards evaluate in source order; the first true guard's
                // body executes and the rest are skipped.
                for branch in branches {
                    if self.eval_expr(&branch.guard, branch.pos)?.is_truthy() {
                        return self.exec_nodes(&branch.body, out);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_nodes(body, out);
                }
                Ok(Flow::Normal)
            }

            SyntaxNode::Loop {
                mode,
                var,
                index,
                body,
                pos,
            } => self.exec_loop(mode, var, index.as_deref(), body, *pos, out),

            // Registered in the prepass; definitions produce no output
            SyntaxNode::FunctionDef { .. } => Ok(Flow::Normal),

            SyntaxNode::Return { value, pos } => {
                let val = match value {
                    Some(expr) => self.eval_expr(expr, *pos)?,
                    None => Val::Null,
                };
                Ok(Flow::Return(val))
            }

            SyntaxNode::Query {
                name,
                datasource,
                statement,
                params,
                statement_type,
                cache_ttl,
                pos,
            } => {
                self.exec_query(
                    name,
                    datasource,
                    statement,
                    params,
                    statement_type.is_mutation(),
                    cache_ttl.is_some(),
                    *pos,
                )?;
                Ok(Flow::Normal)
            }

            SyntaxNode::Transaction { body, pos } => self.exec_transaction(body, *pos, out),

            SyntaxNode::ExternalCall {
                target,
                method,
                headers,
                result,
                timeout_ms,
                on_fail,
                pos,
            } => {
                self.exec_external_call(
                    target,
                    method,
                    headers,
                    result.as_deref(),
                    *timeout_ms,
                    *on_fail,
                    *pos,
                )?;
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_literal(
        &mut self,
        tag: &str,
        attrs: &[(String, Template)],
        children: &[SyntaxNode],
        self_closing: bool,
        pos: Pos,
    ) -> Result<(RenderedNode, Flow), RuntimeError> {
        let mut resolved_attrs = Vec::with_capacity(attrs.len());
        for (name, template) in attrs {
            let value = self.resolve_template(template, pos, true, Some(name))?;
            resolved_attrs.push((name.clone(), value));
        }

        let mut rendered_children = Vec::new();
        let flow = self.exec_nodes(children, &mut rendered_children)?;

        Ok((
            RenderedNode::Element {
                tag: tag.to_string(),
                attrs: resolved_attrs,
                children: rendered_children,
                self_closing,
            },
            flow,
        ))
    }

    /* ===================== Loops ===================== */

    fn exec_loop(
        &mut self,
        mode: &LoopMode,
        var: &str,
        index: Option<&str>,
        body: &[SyntaxNode],
        pos: Pos,
        out: &mut Vec<RenderedNode>,
    ) -> Result<Flow, RuntimeError> {
        match mode {
            LoopMode::Range { from, to, step } => {
                let from = self.eval_num(from, pos)?;
                let to = self.eval_num(to, pos)?;
                let step = match step {
                    Some(expr) => self.eval_num(expr, pos)?,
                    None => 1.0,
                };
                if step == 0.0 {
                    return Err(RuntimeError::new(RuntimeErrorKind::ZeroLoopStep, pos));
                }

                let mut v = from;
                // Inclusive of the upper bound in either direction
                while (step > 0.0 && v <= to) || (step < 0.0 && v >= to) {
                    let seed = HashMap::from([(var.to_string(), Val::Num(v))]);
                    if let Flow::Return(rv) = self.run_iteration(seed, body, out)? {
                        return Ok(Flow::Return(rv));
                    }
                    v += step;
                }
                Ok(Flow::Normal)
            }

            LoopMode::Items { source } => {
                let items = match self.eval_expr(source, pos)? {
                    Val::List(items) => items,
                    Val::Null => Vec::new(),
                    other => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::TypeMismatch(format!(
                                "items loop source must be an array, got {}",
                                other.type_name()
                            )),
                            pos,
                        ))
                    }
                };
                for (i, item) in items.into_iter().enumerate() {
                    let mut seed = HashMap::from([(var.to_string(), item)]);
                    if let Some(index_var) = index {
                        seed.insert(index_var.to_string(), Val::Num(i as f64));
                    }
                    if let Flow::Return(rv) = self.run_iteration(seed, body, out)? {
                        return Ok(Flow::Return(rv));
                    }
                }
                Ok(Flow::Normal)
            }

            LoopMode::List { source, delimiter } => {
                let text = self.eval_expr(source, pos)?.to_display();
                let delimiter = delimiter.as_deref().unwrap_or(",");
                let mut i = 0usize;
                for part in text.split(delimiter) {
                    // Empty list items are skipped
                    if part.is_empty() {
                        continue;
                    }
                    let mut seed =
                        HashMap::from([(var.to_string(), Val::Str(part.to_string()))]);
                    if let Some(index_var) = index {
                        seed.insert(index_var.to_string(), Val::Num(i as f64));
                    }
                    i += 1;
                    if let Flow::Return(rv) = self.run_iteration(seed, body, out)? {
                        return Ok(Flow::Return(rv));
                    }
                }
                Ok(Flow::Normal)
            }
        }
    }

    /// One loop iteration in a private child scope; the frame is discarded
    /// whether the body completes or fails.
    fn run_iteration(
        &mut self,
        seed: HashMap<String, Val>,
        body: &[SyntaxNode],
        out: &mut Vec<RenderedNode>,
    ) -> Result<Flow, RuntimeError> {
        self.scopes.push_frame(seed);
        let result = self.exec_nodes(body, out);
        self.scopes.pop_frame();
        result
    }

    /* ===================== Queries & transactions ===================== */

    #[allow(clippy::too_many_arguments)]
    fn exec_query(
        &mut self,
        name: &str,
        datasource: &str,
        statement: &str,
        params: &[crate::syntax::QueryParam],
        is_mutation: bool,
        cacheable: bool,
        pos: Pos,
    ) -> Result<(), RuntimeError> {
        let ds = self
            .surfaces
            .datasource(datasource)
            .ok_or_else(|| {
                RuntimeError::new(
                    RuntimeErrorKind::UnknownDataSource(datasource.to_string()),
                    pos,
                )
            })?
            .clone();

        // Bind parameters: evaluated, coerced, length-checked values. They
        // travel beside the statement text, never inside it.
        let mut bound = Vec::with_capacity(params.len());
        for param in params {
            let mut val = self.eval_expr(&param.value, param.pos)?;
            if let Some(ty) = param.ty {
                val = coerce(val, ty).map_err(|detail| {
                    RuntimeError::new(
                        RuntimeErrorKind::CoercionFailed {
                            value: detail,
                            ty: ty.name().to_string(),
                        },
                        param.pos,
                    )
                })?;
            }
            if let Some(max) = param.max_length {
                if val.to_display().chars().count() > max {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::ParamTooLong {
                            name: param.name.clone(),
                            max,
                        },
                        param.pos,
                    ));
                }
            }
            bound.push(BoundParam {
                name: param.name.clone(),
                value: val,
            });
        }

        let cache_key = if cacheable {
            let param_key: Vec<String> = bound.iter().map(|p| p.value.canonical_key()).collect();
            Some(format!("{}|{}", statement, param_key.join("\u{1f}")))
        } else {
            None
        };
        if let Some(key) = &cache_key {
            if let Some(cached) = self.query_cache.get(key) {
                debug!(query = name, "query cache hit");
                let cached = cached.clone();
                self.bind_query_result(name, &cached, is_mutation);
                return Ok(());
            }
        }

        // Join an open transaction lazily on first member execution
        if let Some(touched) = &mut self.txn {
            if !touched.iter().any(|n| n == datasource) {
                ds.begin().map_err(|e| {
                    RuntimeError::new(
                        RuntimeErrorKind::QueryFailed {
                            name: name.to_string(),
                            detail: e.to_string(),
                        },
                        pos,
                    )
                })?;
                touched.push(datasource.to_string());
            }
        }

        let started = Instant::now();
        let mut result = ds.execute(statement, &bound).map_err(|e| {
            RuntimeError::new(
                RuntimeErrorKind::QueryFailed {
                    name: name.to_string(),
                    detail: e.to_string(),
                },
                pos,
            )
        })?;
        result.exec_time_ms = started.elapsed().as_millis() as u64;

        info!(
            query = name,
            datasource,
            rows = result.row_count(),
            ms = result.exec_time_ms,
            "query executed"
        );

        if let Some(key) = cache_key {
            self.query_cache.insert(key, result.clone());
        }
        self.bind_query_result(name, &result, is_mutation);
        Ok(())
    }

    /// Bind rows under the query name and metadata under the companion
    /// `<name>_meta` name, both in local scope.
    fn bind_query_result(&mut self, name: &str, result: &QuerySet, is_mutation: bool) {
        let rows = Val::List(result.rows.iter().map(|r| Val::Obj(r.clone())).collect());

        let mut meta = HashMap::new();
        meta.insert(
            "recordcount".to_string(),
            Val::Num(result.row_count() as f64),
        );
        meta.insert(
            "columns".to_string(),
            Val::List(
                result
                    .columns
                    .iter()
                    .map(|c| Val::Str(c.clone()))
                    .collect(),
            ),
        );
        meta.insert(
            "executiontime".to_string(),
            Val::Num(result.exec_time_ms as f64),
        );
        if is_mutation {
            meta.insert(
                "generatedkey".to_string(),
                match result.last_insert_id {
                    Some(id) => Val::Num(id as f64),
                    None => Val::Null,
                },
            );
        }

        self.scopes.set(name, rows, Some(ScopeKind::Local));
        self.scopes
            .set(&format!("{}_meta", name), Val::Obj(meta), Some(ScopeKind::Local));
    }

    fn exec_transaction(
        &mut self,
        body: &[SyntaxNode],
        pos: Pos,
        out: &mut Vec<RenderedNode>,
    ) -> Result<Flow, RuntimeError> {
        // A nested transaction joins the enclosing one
        if self.txn.is_some() {
            return self.exec_nodes(body, out);
        }

        self.txn = Some(Vec::new());
        let result = self.exec_nodes(body, out);
        let touched = self.txn.take().unwrap_or_default();

        match result {
            Ok(flow) => {
                for ds_name in &touched {
                    if let Some(ds) = self.surfaces.datasource(ds_name) {
                        ds.commit().map_err(|e| {
                            RuntimeError::new(
                                RuntimeErrorKind::TransactionAborted(e.to_string()),
                                pos,
                            )
                        })?;
                    }
                }
                Ok(flow)
            }
            Err(err) => {
                // Roll back every statement the group executed, then let
                // the member failure propagate.
                for ds_name in &touched {
                    if let Some(ds) = self.surfaces.datasource(ds_name) {
                        if let Err(rb) = ds.rollback() {
                            warn!(datasource = ds_name.as_str(), error = %rb, "rollback failed");
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /* ===================== External calls ===================== */

    #[allow(clippy::too_many_arguments)]
    fn exec_external_call(
        &mut self,
        target: &Template,
        method: &str,
        headers: &[(String, Template)],
        result_name: Option<&str>,
        timeout_ms: Option<u64>,
        on_fail: FailMode,
        pos: Pos,
    ) -> Result<(), RuntimeError> {
        let url = self.resolve_template(target, pos, false, None)?;
        let mut resolved_headers = Vec::with_capacity(headers.len());
        for (name, template) in headers {
            resolved_headers.push((
                name.clone(),
                self.resolve_template(template, pos, false, None)?,
            ));
        }

        let request = OutboundRequest {
            method: method.to_uppercase(),
            url: url.clone(),
            headers: resolved_headers,
            timeout_ms,
        };

        match self.surfaces.http.send(&request) {
            Ok(response) => {
                let success = response.is_success();
                if !success && on_fail == FailMode::Abort {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::ExternalCallStatus {
                            target: url,
                            status: response.status,
                        },
                        pos,
                    ));
                }
                if let Some(name) = result_name {
                    let val = response_to_val(&response);
                    self.scopes.set(name, val, Some(ScopeKind::Local));
                }
                Ok(())
            }
            Err(TransportError::Timeout) => match on_fail {
                FailMode::Abort => Err(RuntimeError::new(
                    RuntimeErrorKind::ExternalCallTimeout { target: url },
                    pos,
                )),
                FailMode::Ignore => {
                    self.store_failed_call(result_name, "timeout");
                    Ok(())
                }
            },
            Err(TransportError::Transport(detail)) => match on_fail {
                FailMode::Abort => Err(RuntimeError::new(
                    RuntimeErrorKind::ExternalCallFailed {
                        target: url,
                        detail,
                    },
                    pos,
                )),
                FailMode::Ignore => {
                    self.store_failed_call(result_name, &detail);
                    Ok(())
                }
            },
        }
    }

    fn store_failed_call(&mut self, result_name: Option<&str>, detail: &str) {
        if let Some(name) = result_name {
            let mut obj = HashMap::new();
            obj.insert("status".to_string(), Val::Num(0.0));
            obj.insert("body".to_string(), Val::Str(String::new()));
            obj.insert("error".to_string(), Val::Str(detail.to_string()));
            self.scopes.set(name, Val::Obj(obj), Some(ScopeKind::Local));
        }
    }

    /* ===================== Templates & bindings ===================== */

    /// Substitute a template into its final string. When `bind` is set the
    /// referenced variables are recorded against the current node path for
    /// the reactive-binding side table; `attr` names the attribute the
    /// template came from, `None` for text content.
    pub(crate) fn resolve_template(
        &mut self,
        template: &Template,
        pos: Pos,
        bind: bool,
        attr: Option<&str>,
    ) -> Result<String, RuntimeError> {
        if bind && self.call_depth == 0 {
            let mut refs = Vec::new();
            template.collect_idents(&mut refs);
            let path = self.path.clone();
            for name in refs {
                // Loop variables are transient, not reactive state
                if self.scopes.in_transient_frame(&name) {
                    continue;
                }
                self.bindings.entry(name).or_default().push(BindingSite {
                    path: path.clone(),
                    attr: attr.map(str::to_string),
                });
            }
        }

        let mut out = String::new();
        for segment in &template.segments {
            match segment {
                Segment::Lit { text } => out.push_str(text),
                Segment::Expr { expr } => {
                    let val = self.eval_expr(expr, pos)?;
                    out.push_str(&val.to_display());
                }
            }
        }
        Ok(out)
    }

    fn eval_num(&mut self, expr: &Expr, pos: Pos) -> Result<f64, RuntimeError> {
        let val = self.eval_expr(expr, pos)?;
        val.as_num().ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::TypeMismatch(format!(
                    "expected a number, got {}",
                    val.type_name()
                )),
                pos,
            )
        })
    }
}

fn response_to_val(response: &OutboundResponse) -> Val {
    let mut obj = HashMap::new();
    obj.insert("status".to_string(), Val::Num(response.status as f64));
    obj.insert("body".to_string(), Val::Str(response.body.clone()));
    let headers: HashMap<String, Val> = response
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), Val::Str(v.clone())))
        .collect();
    obj.insert("headers".to_string(), Val::Obj(headers));
    Val::Obj(obj)
}
