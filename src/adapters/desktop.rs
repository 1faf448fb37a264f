//! Desktop target: embeddable-window description with a host bridge
//!
//! The artifact describes a window (title, size, root view tree) plus the
//! state surface the embedding host script talks to. Each reactive variable
//! is exposed as one state key with one notification topic; the host
//! observes changes by subscribing to the topic, never by polling the tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::render::{RenderOutput, RenderedNode};

use super::{Adapter, AdapterConfig, ColorToken, Compat, SpaceToken, TargetOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesktopArtifact {
    pub window: WindowDesc,
    pub root: Vec<ViewNode>,
    pub bridge: HostBridge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowDesc {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub dark: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewNode {
    pub view: String,
    pub props: BTreeMap<String, String>,
    pub children: Vec<ViewNode>,
}

/// State surface exposed to the embedding host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostBridge {
    pub state_keys: Vec<String>,
    /// One notification topic per reactive variable
    pub topics: Vec<String>,
    pub script_api: Vec<String>,
}

pub struct DesktopAdapter;

const TARGET: &str = "desktop";

fn map_view(tag: &str) -> Option<&'static str> {
    match tag {
        "view" | "div" => Some("Panel"),
        "text" | "span" | "p" => Some("Label"),
        "heading" | "h1" | "h2" | "h3" => Some("TitleLabel"),
        "button" => Some("PushButton"),
        "image" | "img" => Some("ImageView"),
        "input" => Some("TextField"),
        "link" | "a" => Some("LinkLabel"),
        "list" | "ul" => Some("ListView"),
        "item" | "li" => Some("ListRow"),
        _ => None,
    }
}

fn space_points(token: SpaceToken) -> u32 {
    match token {
        SpaceToken::Xs => 2,
        SpaceToken::Sm => 4,
        SpaceToken::Md => 8,
        SpaceToken::Lg => 12,
        SpaceToken::Xl => 24,
    }
}

impl Adapter for DesktopAdapter {
    type Artifact = DesktopArtifact;

    fn target(&self) -> &'static str {
        TARGET
    }

    fn render(
        &self,
        output: &RenderOutput,
        config: &AdapterConfig,
    ) -> TargetOutput<DesktopArtifact> {
        let mut compat = Compat::new();
        let root = output
            .nodes
            .iter()
            .map(|node| build_view(node, &mut compat))
            .collect();

        let state_keys: Vec<String> =
            output.bindings.iter().map(|b| b.name.clone()).collect();
        let topics = state_keys
            .iter()
            .map(|name| format!("quill.state.{}", name))
            .collect();

        let artifact = DesktopArtifact {
            window: WindowDesc {
                title: config.title.clone(),
                width: 800,
                height: 600,
                dark: config.dark,
            },
            root,
            bridge: HostBridge {
                state_keys,
                topics,
                script_api: vec![
                    "getState".to_string(),
                    "setState".to_string(),
                    "subscribe".to_string(),
                ],
            },
        };

        TargetOutput {
            artifact,
            warnings: compat.into_warnings(),
        }
    }
}

fn build_view(node: &RenderedNode, compat: &mut Compat) -> ViewNode {
    match node {
        RenderedNode::Text { content } => ViewNode {
            view: "Label".to_string(),
            props: BTreeMap::from([("text".to_string(), content.clone())]),
            children: Vec::new(),
        },
        RenderedNode::Element {
            tag,
            attrs,
            children,
            ..
        } => {
            let view = match map_view(tag) {
                Some(view) => view,
                None => {
                    compat.degrade(tag, TARGET, "no view mapping, rendered as Panel");
                    "Panel"
                }
            };

            let mut props = BTreeMap::new();
            for (name, value) in attrs {
                match name.as_str() {
                    "space" => match SpaceToken::from_name(value) {
                        Some(token) => {
                            props.insert(
                                "padding".to_string(),
                                space_points(token).to_string(),
                            );
                        }
                        None => compat.degrade(
                            tag,
                            TARGET,
                            &format!("unknown space token '{}' dropped", value),
                        ),
                    },
                    "color" => match ColorToken::from_name(value) {
                        // Desktop theming resolves tokens at draw time;
                        // the token name itself travels in the artifact.
                        Some(_) => {
                            props.insert("colorToken".to_string(), value.clone());
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

            ViewNode {
                view: view.to_string(),
                props,
                children: children
                    .iter()
                    .map(|child| build_view(child, compat))
                    .collect(),
            }
        }
    }
}
