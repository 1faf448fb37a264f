//! Native target: component-tree description for a hooks-style runtime
//!
//! The artifact is a JSON component tree plus reactive-state declarations.
//! Each reactive variable declares exactly one setter; the runtime rebinds
//! every component listed under the declaration when the setter fires.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::render::{RenderOutput, RenderedNode};

use super::{Adapter, AdapterConfig, ColorToken, Compat, IdAlloc, SpaceToken, TargetOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeArtifact {
    pub root: Vec<NativeNode>,
    pub state: Vec<StateDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeNode {
    pub id: String,
    pub component: String,
    /// Sorted for stable serialization
    pub props: BTreeMap<String, String>,
    pub children: Vec<NativeNode>,
}

/// One reactive variable: its setter name and the components it rebinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDecl {
    pub name: String,
    pub setter: String,
    pub rebinds: Vec<Vec<usize>>,
}

pub struct NativeAdapter;

const TARGET: &str = "native";

/// Literal tag → native component. Unknown tags degrade to a plain View.
fn map_component(tag: &str) -> Option<&'static str> {
    match tag {
        "view" | "div" => Some("View"),
        "text" | "span" | "p" => Some("Text"),
        "heading" | "h1" | "h2" | "h3" => Some("Heading"),
        "button" => Some("Pressable"),
        "image" | "img" => Some("Image"),
        "input" => Some("TextInput"),
        "link" | "a" => Some("Link"),
        "list" | "ul" => Some("ScrollList"),
        "item" | "li" => Some("ListItem"),
        _ => None,
    }
}

fn space_units(token: SpaceToken) -> u32 {
    match token {
        SpaceToken::Xs => 1,
        SpaceToken::Sm => 2,
        SpaceToken::Md => 4,
        SpaceToken::Lg => 8,
        SpaceToken::Xl => 16,
    }
}

fn color_name(token: ColorToken, dark: bool) -> &'static str {
    match (token, dark) {
        (ColorToken::Primary, false) => "blue600",
        (ColorToken::Primary, true) => "blue400",
        (ColorToken::Surface, false) => "white",
        (ColorToken::Surface, true) => "gray900",
        (ColorToken::Text, false) => "gray900",
        (ColorToken::Text, true) => "gray50",
        (ColorToken::Muted, false) => "gray500",
        (ColorToken::Muted, true) => "gray400",
        (ColorToken::Danger, false) => "red600",
        (ColorToken::Danger, true) => "red400",
    }
}

impl Adapter for NativeAdapter {
    type Artifact = NativeArtifact;

    fn target(&self) -> &'static str {
        TARGET
    }

    fn render(&self, output: &RenderOutput, config: &AdapterConfig) -> TargetOutput<NativeArtifact> {
        let mut compat = Compat::new();
        let mut ids = IdAlloc::default();

        let root = output
            .nodes
            .iter()
            .map(|node| build_node(node, &mut ids, &mut compat, config))
            .collect();

        // One state declaration and setter per reactive variable; the
        // binding side-table already lists every bound element path.
        let state = output
            .bindings
            .iter()
            .map(|binding| StateDecl {
                name: binding.name.clone(),
                setter: setter_name(&binding.name),
                rebinds: binding.sites.iter().map(|s| s.path.clone()).collect(),
            })
            .collect();

        TargetOutput {
            artifact: NativeArtifact { root, state },
            warnings: compat.into_warnings(),
        }
    }
}

fn build_node(
    node: &RenderedNode,
    ids: &mut IdAlloc,
    compat: &mut Compat,
    config: &AdapterConfig,
) -> NativeNode {
    match node {
        RenderedNode::Text { content } => NativeNode {
            id: ids.next_id(),
            component: "Text".to_string(),
            props: BTreeMap::from([("content".to_string(), content.clone())]),
            children: Vec::new(),
        },
        RenderedNode::Element {
            tag,
            attrs,
            children,
            ..
        } => {
            let component = match map_component(tag) {
                Some(component) => component,
                None => {
                    compat.degrade(
                        tag,
                        TARGET,
                        "no native component mapping, rendered as View",
                    );
                    "View"
                }
            };

            let mut props = BTreeMap::new();
            for (name, value) in attrs {
                match name.as_str() {
                    "space" => match SpaceToken::from_name(value) {
                        Some(token) => {
                            props.insert("padding".to_string(), space_units(token).to_string());
                        }
                        None => compat.degrade(
                            tag,
                            TARGET,
                            &format!("unknown space token '{}' dropped", value),
                        ),
                    },
                    "color" => match ColorToken::from_name(value) {
                        Some(token) => {
                            props.insert(
                                "color".to_string(),
                                color_name(token, config.dark).to_string(),
                            );
                        }
                        None => compat.degrade(
                            tag,
                            TARGET,
                            &format!("unknown color token '{}' dropped", value),
                        ),
                    },
                    _ => {
                        props.insert(name.clone(), value.clone());
                    }
                }
            }

            NativeNode {
                id: ids.next_id(),
                component: component.to_string(),
                props,
                children: children
                    .iter()
                    .map(|child| build_node(child, ids, compat, config))
                    .collect(),
            }
        }
    }
}

/// `cart_total` → `setCartTotal`
fn setter_name(var: &str) -> String {
    let mut out = String::from("set");
    let mut upper = true;
    for ch in var.chars() {
        if ch == '_' || ch == '.' {
            upper = true;
            continue;
        }
        if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod setter_tests {
    use super::setter_name;

    #[test]
    fn test_setter_name_camel_cases() {
        assert_eq!(setter_name("cart_total"), "setCartTotal");
        assert_eq!(setter_name("x"), "setX");
        assert_eq!(setter_name("session.count"), "setSessionCount");
    }
}
