//! Rendered tree: the post-execution value tree consumed by adapters
//!
//! Isomorphic to the syntax tree but with every control construct resolved
//! away: conditionals are replaced by the selected branch's output, loops by
//! their expanded iterations, and every placeholder substituted. No
//! executable constructs remain; adapters never evaluate expressions.

use serde::{Deserialize, Serialize};

/// A node in the rendered tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RenderedNode {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<RenderedNode>,
        self_closing: bool,
    },
    Text {
        content: String,
    },
}

impl RenderedNode {
    pub fn text(content: impl Into<String>) -> Self {
        RenderedNode::Text {
            content: content.into(),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            RenderedNode::Element { tag, .. } => Some(tag),
            RenderedNode::Text { .. } => None,
        }
    }

    pub fn children(&self) -> &[RenderedNode] {
        match self {
            RenderedNode::Element { children, .. } => children,
            RenderedNode::Text { .. } => &[],
        }
    }
}

/// Index path from the root node list down to one node
pub type NodePath = Vec<usize>;

/// One place a variable is observed: the node path, plus the attribute the
/// placeholder lives in (`None` for text content).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingSite {
    pub path: NodePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
}

/// Reactive-variable binding: which rendered nodes observe a variable.
///
/// Each adapter turns this into its single canonical update path for the
/// variable (rebinding callback, host-bridge notification, or re-render
/// trigger).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub sites: Vec<BindingSite>,
}

/// Execution result: the rendered tree plus the binding side table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutput {
    pub nodes: Vec<RenderedNode>,
    pub bindings: Vec<Binding>,
}

impl RenderOutput {
    /// Node at an index path, if present
    pub fn node_at(&self, path: &[usize]) -> Option<&RenderedNode> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.nodes.get(first)?;
        for &idx in rest {
            node = node.children().get(idx)?;
        }
        Some(node)
    }

    /// Concatenated text content of the whole tree, in document order
    pub fn text_content(&self) -> String {
        fn walk(node: &RenderedNode, out: &mut String) {
            match node {
                RenderedNode::Text { content } => out.push_str(content),
                RenderedNode::Element { children, .. } => {
                    for child in children {
                        walk(child, out);
                    }
                }
            }
        }
        let mut out = String::new();
        for node in &self.nodes {
            walk(node, &mut out);
        }
        out
    }
}
