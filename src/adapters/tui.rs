//! Terminal target: widget-tree description for a text-cell runtime
//!
//! Spacing maps to whole terminal cells and colors to the 16-color
//! palette. Constructs a terminal cannot express degrade with a warning:
//! an image becomes a placeholder label, a link renders as underlined
//! text. Reactive variables each get one re-render trigger entry.

use serde::{Deserialize, Serialize};

use crate::render::{RenderOutput, RenderedNode};

use super::{Adapter, AdapterConfig, ColorToken, Compat, SpaceToken, TargetOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuiArtifact {
    pub root: Vec<Widget>,
    pub redraw: Vec<RedrawTrigger>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub kind: WidgetKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub style: WidgetStyle,
    pub children: Vec<Widget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    Block,
    Paragraph,
    Heading,
    Button,
    List,
    ListItem,
    Field,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fg: Option<String>,
    pub underline: bool,
}

/// One re-render trigger per reactive variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedrawTrigger {
    pub variable: String,
    pub paths: Vec<Vec<usize>>,
}

pub struct TuiAdapter;

const TARGET: &str = "tui";

fn space_cells(token: SpaceToken) -> u16 {
    match token {
        SpaceToken::Xs | SpaceToken::Sm => 0,
        SpaceToken::Md => 1,
        SpaceToken::Lg => 2,
        SpaceToken::Xl => 4,
    }
}

fn palette_color(token: ColorToken, dark: bool) -> &'static str {
    match (token, dark) {
        (ColorToken::Primary, _) => "cyan",
        (ColorToken::Surface, false) => "white",
        (ColorToken::Surface, true) => "black",
        (ColorToken::Text, false) => "black",
        (ColorToken::Text, true) => "white",
        (ColorToken::Muted, _) => "dark_gray",
        (ColorToken::Danger, _) => "red",
    }
}

impl Adapter for TuiAdapter {
    type Artifact = TuiArtifact;

    fn target(&self) -> &'static str {
        TARGET
    }

    fn render(&self, output: &RenderOutput, config: &AdapterConfig) -> TargetOutput<TuiArtifact> {
        let mut compat = Compat::new();
        let root = output
            .nodes
            .iter()
            .map(|node| build_widget(node, &mut compat, config))
            .collect();

        let redraw = output
            .bindings
            .iter()
            .map(|binding| RedrawTrigger {
                variable: binding.name.clone(),
                paths: binding.sites.iter().map(|s| s.path.clone()).collect(),
            })
            .collect();

        TargetOutput {
            artifact: TuiArtifact { root, redraw },
            warnings: compat.into_warnings(),
        }
    }
}

fn build_widget(node: &RenderedNode, compat: &mut Compat, config: &AdapterConfig) -> Widget {
    match node {
        RenderedNode::Text { content } => Widget {
            kind: WidgetKind::Paragraph,
            text: Some(content.clone()),
            style: WidgetStyle::default(),
            children: Vec::new(),
        },
        RenderedNode::Element {
            tag,
            attrs,
            children,
            ..
        } => {
            let mut style = WidgetStyle::default();
            for (name, value) in attrs {
                match name.as_str() {
                    "space" => match SpaceToken::from_name(value) {
                        Some(token) => style.padding = Some(space_cells(token)),
                        None => compat.degrade(
                            tag,
                            TARGET,
                            &format!("unknown space token '{}' dropped", value),
                        ),
                    },
                    "color" => match ColorToken::from_name(value) {
                        Some(token) => {
                            style.fg = Some(palette_color(token, config.dark).to_string())
                        }
                        None => compat.degrade(
                            tag,
                            TARGET,
                            &format!("unknown color token '{}' dropped", value),
                        ),
                    },
                    // Remaining attributes have no terminal meaning
                    _ => {}
                }
            }

            let kids = |compat: &mut Compat| {
                children
                    .iter()
                    .map(|child| build_widget(child, compat, config))
                    .collect::<Vec<Widget>>()
            };

            match tag.as_str() {
                "view" | "div" => Widget {
                    kind: WidgetKind::Block,
                    text: None,
                    style,
                    children: kids(compat),
                },
                "text" | "span" | "p" => Widget {
                    kind: WidgetKind::Paragraph,
                    text: None,
                    style,
                    children: kids(compat),
                },
                "heading" | "h1" | "h2" | "h3" => Widget {
                    kind: WidgetKind::Heading,
                    text: None,
                    style,
                    children: kids(compat),
                },
                "button" => Widget {
                    kind: WidgetKind::Button,
                    text: None,
                    style,
                    children: kids(compat),
                },
                "input" => Widget {
                    kind: WidgetKind::Field,
                    text: None,
                    style,
                    children: kids(compat),
                },
                "list" | "ul" => Widget {
                    kind: WidgetKind::List,
                    text: None,
                    style,
                    children: kids(compat),
                },
                "item" | "li" => Widget {
                    kind: WidgetKind::ListItem,
                    text: None,
                    style,
                    children: kids(compat),
                },
                "image" | "img" => {
                    // Text cells cannot show pixels
                    let src = attrs
                        .iter()
                        .find(|(n, _)| n == "src")
                        .map(|(_, v)| v.as_str())
                        .unwrap_or("unknown");
                    compat.degrade(tag, TARGET, "image rendered as placeholder label");
                    Widget {
                        kind: WidgetKind::Paragraph,
                        text: Some(format!("[image: {}]", src)),
                        style,
                        children: Vec::new(),
                    }
                }
                "link" | "a" => {
                    compat.degrade(tag, TARGET, "link rendered as underlined text");
                    style.underline = true;
                    Widget {
                        kind: WidgetKind::Paragraph,
                        text: None,
                        style,
                        children: kids(compat),
                    }
                }
                _ => {
                    compat.degrade(tag, TARGET, "no widget mapping, rendered as block");
                    Widget {
                        kind: WidgetKind::Block,
                        text: None,
                        style,
                        children: kids(compat),
                    }
                }
            }
        }
    }
}
