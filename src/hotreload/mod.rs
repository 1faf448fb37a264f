//! Hot-reload diff engine
//!
//! Compares two rendered trees of the same source in lockstep by structural
//! position and classifies the change: text or attribute value changes on a
//! structurally identical node are patchable; anything structural forces a
//! full reload. Control-flow shape and function signatures are compared on
//! the syntax trees, before execution, so a reshaped conditional or a
//! changed parameter list reloads even when the rendered output happens to
//! coincide. Pushing the resulting messages over a transport is the
//! caller's concern.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ParseError, RuntimeError};
use crate::render::{NodePath, RenderOutput, RenderedNode};
use crate::syntax::{Document, LoopMode, SyntaxNode};

/* ===================== Messages ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Targeted, non-structural update
    Patch {
        path: NodePath,
        prop: String,
        value: String,
    },
    FullReload {
        reason: String,
    },
    Error {
        line: u32,
        col: u32,
        message: String,
    },
}

impl ReloadMessage {
    pub fn from_parse_error(err: &ParseError) -> ReloadMessage {
        ReloadMessage::Error {
            line: err.pos.line,
            col: err.pos.col,
            message: err.to_string(),
        }
    }

    pub fn from_runtime_error(err: &RuntimeError) -> ReloadMessage {
        ReloadMessage::Error {
            line: err.pos.line,
            col: err.pos.col,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub messages: Vec<ReloadMessage>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Every message is a targeted patch
    pub fn is_patchable(&self) -> bool {
        self.messages
            .iter()
            .all(|m| matches!(m, ReloadMessage::Patch { .. }))
    }
}

/* ===================== Tree diff ===================== */

/// Diff two rendered trees of the same source.
pub fn diff(old: &RenderOutput, new: &RenderOutput) -> ChangeSet {
    let mut patches = Vec::new();
    let mut path = Vec::new();
    match diff_nodes(&old.nodes, &new.nodes, &mut path, &mut patches) {
        Ok(()) => {
            debug!(patches = patches.len(), "diff classified patchable");
            ChangeSet { messages: patches }
        }
        Err(reason) => ChangeSet {
            messages: vec![ReloadMessage::FullReload { reason }],
        },
    }
}

fn diff_nodes(
    old: &[RenderedNode],
    new: &[RenderedNode],
    path: &mut NodePath,
    patches: &mut Vec<ReloadMessage>,
) -> Result<(), String> {
    if old.len() != new.len() {
        return Err(format!(
            "children added or removed at {}",
            path_label(path)
        ));
    }
    for (i, (old_node, new_node)) in old.iter().zip(new).enumerate() {
        path.push(i);
        let result = diff_node(old_node, new_node, path, patches);
        path.pop();
        result?;
    }
    Ok(())
}

fn diff_node(
    old: &RenderedNode,
    new: &RenderedNode,
    path: &mut NodePath,
    patches: &mut Vec<ReloadMessage>,
) -> Result<(), String> {
    match (old, new) {
        (RenderedNode::Text { content: old_text }, RenderedNode::Text { content: new_text }) => {
            if old_text != new_text {
                patches.push(ReloadMessage::Patch {
                    path: path.clone(),
                    prop: "text".to_string(),
                    value: new_text.clone(),
                });
            }
            Ok(())
        }

        (
            RenderedNode::Element {
                tag: old_tag,
                attrs: old_attrs,
                children: old_children,
                ..
            },
            RenderedNode::Element {
                tag: new_tag,
                attrs: new_attrs,
                children: new_children,
                ..
            },
        ) => {
            if old_tag != new_tag {
                return Err(format!(
                    "tag changed from <{}> to <{}> at {}",
                    old_tag,
                    new_tag,
                    path_label(path)
                ));
            }
            // A changed attribute value is patchable; a changed attribute
            // set is a structural change.
            let old_names: Vec<&String> = old_attrs.iter().map(|(n, _)| n).collect();
            let new_names: Vec<&String> = new_attrs.iter().map(|(n, _)| n).collect();
            if old_names != new_names {
                return Err(format!(
                    "attribute set changed on <{}> at {}",
                    old_tag,
                    path_label(path)
                ));
            }
            for ((name, old_value), (_, new_value)) in old_attrs.iter().zip(new_attrs) {
                if old_value != new_value {
                    patches.push(ReloadMessage::Patch {
                        path: path.clone(),
                        prop: name.clone(),
                        value: new_value.clone(),
                    });
                }
            }
            diff_nodes(old_children, new_children, path, patches)
        }

        _ => Err(format!("node kind changed at {}", path_label(path))),
    }
}

fn path_label(path: &NodePath) -> String {
    if path.is_empty() {
        return "root".to_string();
    }
    let parts: Vec<String> = path.iter().map(|i| i.to_string()).collect();
    parts.join(".")
}

/* ===================== Control shape ===================== */

/// Compare control-flow shape and function signatures of two parses.
/// Returns a full-reload reason when they differ.
pub fn shape_change(old: &Document, new: &Document) -> Option<String> {
    let old_shape = control_shape(&old.roots);
    let new_shape = control_shape(&new.roots);
    if old_shape == new_shape {
        None
    } else {
        Some("control flow or function signature changed".to_string())
    }
}

/// Structural fingerprint of the control constructs in a tree. Literal
/// content and expression details are deliberately excluded; those changes
/// surface through the rendered-tree diff instead.
fn control_shape(nodes: &[SyntaxNode]) -> String {
    let mut shape = String::new();
    write_shape(nodes, &mut shape);
    shape
}

fn write_shape(nodes: &[SyntaxNode], out: &mut String) {
    for node in nodes {
        match node {
            SyntaxNode::Literal { children, .. } => {
                out.push_str("lit(");
                write_shape(children, out);
                out.push(')');
            }
            SyntaxNode::Text { .. } | SyntaxNode::Assign { .. } => {}
            SyntaxNode::Conditional {
                branches,
                otherwise,
                ..
            } => {
                out.push_str("if[");
                for branch in branches {
                    out.push_str("when(");
                    write_shape(&branch.body, out);
                    out.push(')');
                }
                if let Some(body) = otherwise {
                    out.push_str("else(");
                    write_shape(body, out);
                    out.push(')');
                }
                out.push(']');
            }
            SyntaxNode::Loop { mode, body, .. } => {
                let label = match mode {
                    LoopMode::Range { .. } => "range",
                    LoopMode::Items { .. } => "items",
                    LoopMode::List { .. } => "list",
                };
                out.push_str(&format!("loop:{}(", label));
                write_shape(body, out);
                out.push(')');
            }
            SyntaxNode::FunctionDef {
                name, params, body, ..
            } => {
                let sig: Vec<String> = params
                    .iter()
                    .map(|p| match p.ty {
                        Some(ty) => format!("{}:{}", p.name, ty.name()),
                        None => p.name.clone(),
                    })
                    .collect();
                out.push_str(&format!("fn {}({})(", name, sig.join(",")));
                write_shape(body, out);
                out.push(')');
            }
            SyntaxNode::Return { .. } => out.push_str("ret;"),
            SyntaxNode::Query { .. } => out.push_str("query;"),
            SyntaxNode::Transaction { body, .. } => {
                out.push_str("txn(");
                write_shape(body, out);
                out.push(')');
            }
            SyntaxNode::ExternalCall { .. } => out.push_str("http;"),
        }
    }
}

/* ===================== Debounce ===================== */

/// Collapses change notifications for the same source arriving within the
/// window into a single diff. A notification arms (or re-arms) the source's
/// timer; the source comes due once the window elapses with no further
/// notification, so the diff taken then sees the burst's final content.
/// Time is passed in explicitly so tests never sleep.
pub struct Debouncer {
    window: Duration,
    pending: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            pending: HashMap::new(),
        }
    }

    /// Record a change notification for a source
    pub fn observe(&mut self, source: &str, at: Instant) {
        self.pending.insert(source.to_string(), at);
    }

    /// Sources whose window has elapsed since their most recent
    /// notification. Each due source fires exactly once; sorted for a
    /// deterministic diff order.
    pub fn due(&mut self, now: Instant) -> Vec<String> {
        let mut ready: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, armed)| now.duration_since(**armed) >= self.window)
            .map(|(source, _)| source.clone())
            .collect();
        ready.sort();
        for source in &ready {
            self.pending.remove(source);
        }
        ready
    }
}

/* ===================== Tests ===================== */

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::engine::{execute, ScopeStore, Surfaces};
    use crate::parser::parse;
    use crate::render::RenderOutput;

    use super::{diff, shape_change, Debouncer, ReloadMessage};

    fn rendered(source: &str) -> RenderOutput {
        let doc = parse(source).expect("source should parse");
        execute(&doc, &mut ScopeStore::new(), &Surfaces::new()).expect("source should execute")
    }

    #[test]
    fn test_identical_trees_produce_no_messages() {
        let a = rendered("<view><text>hi</text></view>");
        let b = rendered("<view><text>hi</text></view>");
        let changes = diff(&a, &b);
        assert!(changes.is_empty());
        assert!(changes.is_patchable());
    }

    #[test]
    fn test_text_only_change_is_patchable() {
        let a = rendered("<view><text>hello</text></view>");
        let b = rendered("<view><text>goodbye</text></view>");
        let changes = diff(&a, &b);
        assert!(changes.is_patchable());
        assert_eq!(
            changes.messages,
            vec![ReloadMessage::Patch {
                path: vec![0, 0, 0],
                prop: "text".to_string(),
                value: "goodbye".to_string(),
            }]
        );
    }

    #[test]
    fn test_attribute_value_change_is_patchable() {
        let a = rendered(r#"<view class="old">x</view>"#);
        let b = rendered(r#"<view class="new">x</view>"#);
        let changes = diff(&a, &b);
        assert_eq!(
            changes.messages,
            vec![ReloadMessage::Patch {
                path: vec![0],
                prop: "class".to_string(),
                value: "new".to_string(),
            }]
        );
    }

    #[test]
    fn test_added_child_forces_full_reload() {
        let a = rendered("<view><text>one</text></view>");
        let b = rendered("<view><text>one</text><text>two</text></view>");
        let changes = diff(&a, &b);
        assert!(!changes.is_patchable());
        assert!(matches!(
            changes.messages[0],
            ReloadMessage::FullReload { .. }
        ));
    }

    #[test]
    fn test_tag_change_forces_full_reload() {
        let a = rendered("<view>x</view>");
        let b = rendered("<item>x</item>");
        assert!(!diff(&a, &b).is_patchable());
    }

    #[test]
    fn test_attribute_set_change_forces_full_reload() {
        let a = rendered(r#"<view class="c">x</view>"#);
        let b = rendered(r#"<view class="c" hidden>x</view>"#);
        assert!(!diff(&a, &b).is_patchable());
    }

    #[test]
    fn test_diff_classification_is_deterministic() {
        let a = rendered("<view><text>one</text><text>two</text></view>");
        let b = rendered("<view><text>uno</text><text>dos</text></view>");
        assert_eq!(diff(&a, &b), diff(&a, &b));
        assert_eq!(diff(&a, &b).messages.len(), 2);
    }

    #[test]
    fn test_reshaped_conditional_changes_control_shape() {
        let old = parse(r#"<q:if><q:when test="{1 == 1}">a</q:when></q:if>"#).unwrap();
        let new = parse(
            r#"<q:if><q:when test="{1 == 1}">a</q:when><q:otherwise>b</q:otherwise></q:if>"#,
        )
        .unwrap();
        assert!(shape_change(&old, &new).is_some());
    }

    #[test]
    fn test_changed_function_signature_changes_control_shape() {
        let old = parse(r#"<q:function name="f" params="a"><q:return value="{a}"/></q:function>"#)
            .unwrap();
        let new =
            parse(r#"<q:function name="f" params="a, b"><q:return value="{a}"/></q:function>"#)
                .unwrap();
        assert!(shape_change(&old, &new).is_some());
    }

    #[test]
    fn test_text_edit_does_not_change_control_shape() {
        let old = parse(r#"<q:loop mode="range" var="i" from="1" to="3">old {i}</q:loop>"#).unwrap();
        let new = parse(r#"<q:loop mode="range" var="i" from="1" to="9">new {i}</q:loop>"#).unwrap();
        assert!(shape_change(&old, &new).is_none());
    }

    #[test]
    fn test_debouncer_fires_once_after_a_burst_settles() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let start = Instant::now();
        debouncer.observe("a.q", start);
        debouncer.observe("a.q", start + Duration::from_millis(30));
        debouncer.observe("a.q", start + Duration::from_millis(60));
        // The last edit of the burst keeps the timer armed
        assert!(debouncer.due(start + Duration::from_millis(120)).is_empty());
        // One trigger, after the window elapses past the final edit, so the
        // diff taken now reflects the burst's last state
        assert_eq!(
            debouncer.due(start + Duration::from_millis(160)),
            vec!["a.q".to_string()]
        );
        assert!(debouncer.due(start + Duration::from_millis(300)).is_empty());
    }

    #[test]
    fn test_debouncer_tracks_sources_independently() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let start = Instant::now();
        debouncer.observe("a.q", start);
        debouncer.observe("b.q", start + Duration::from_millis(80));
        assert_eq!(
            debouncer.due(start + Duration::from_millis(110)),
            vec!["a.q".to_string()]
        );
        assert_eq!(
            debouncer.due(start + Duration::from_millis(200)),
            vec!["b.q".to_string()]
        );
    }

    #[test]
    fn test_messages_serialize_with_type_tags() {
        let patch = ReloadMessage::Patch {
            path: vec![0, 1],
            prop: "text".to_string(),
            value: "v".to_string(),
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert!(json.contains(r#""type":"patch""#));

        let reload = ReloadMessage::FullReload {
            reason: "tag changed".to_string(),
        };
        assert!(serde_json::to_string(&reload)
            .unwrap()
            .contains(r#""type":"full_reload""#));
    }
}
