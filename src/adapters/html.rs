//! Markup target: a single self-contained HTML document
//!
//! Inline `<style>` for the token-derived base styles, the rendered body
//! markup, and a minimal refresh script. Reactive variables get exactly one
//! update path: `__quill.update(name, value)` patches every element
//! carrying that variable's `data-q-bind` attribute — text content for text
//! placeholders, the named attribute for attribute placeholders.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::render::{NodePath, RenderOutput, RenderedNode};

use super::{Adapter, AdapterConfig, ColorToken, Compat, IdAlloc, SpaceToken, TargetOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlArtifact {
    pub document: String,
}

pub struct HtmlAdapter;

const TARGET: &str = "html";

/// Literal tag → HTML element
fn map_tag(tag: &str) -> &str {
    match tag {
        "view" => "div",
        "text" => "span",
        "heading" => "h1",
        "button" => "button",
        "image" => "img",
        "input" => "input",
        "link" => "a",
        "list" => "ul",
        "item" => "li",
        // HTML hosts arbitrary elements; unknown tags pass through
        other => other,
    }
}

fn space_px(token: SpaceToken) -> u32 {
    match token {
        SpaceToken::Xs => 2,
        SpaceToken::Sm => 4,
        SpaceToken::Md => 8,
        SpaceToken::Lg => 16,
        SpaceToken::Xl => 32,
    }
}

fn color_hex(token: ColorToken, dark: bool) -> &'static str {
    match (token, dark) {
        (ColorToken::Primary, false) => "#2563eb",
        (ColorToken::Primary, true) => "#60a5fa",
        (ColorToken::Surface, false) => "#ffffff",
        (ColorToken::Surface, true) => "#111827",
        (ColorToken::Text, false) => "#111827",
        (ColorToken::Text, true) => "#f9fafb",
        (ColorToken::Muted, false) => "#6b7280",
        (ColorToken::Muted, true) => "#9ca3af",
        (ColorToken::Danger, false) => "#dc2626",
        (ColorToken::Danger, true) => "#f87171",
    }
}

impl Adapter for HtmlAdapter {
    type Artifact = HtmlArtifact;

    fn target(&self) -> &'static str {
        TARGET
    }

    fn render(&self, output: &RenderOutput, config: &AdapterConfig) -> TargetOutput<HtmlArtifact> {
        let mut compat = Compat::new();
        let targets = binding_targets(output);

        let mut body = String::new();
        let mut ids = IdAlloc::default();
        let mut script_binds: ScriptBinds = BTreeMap::new();
        let mut path = Vec::new();
        for (i, node) in output.nodes.iter().enumerate() {
            path.push(i);
            write_node(
                node,
                &mut path,
                &targets,
                &mut ids,
                &mut script_binds,
                &mut compat,
                config,
                &mut body,
            );
            path.pop();
        }

        let mut script = String::from(
            "window.__quill={bindings:{},bind(n,sites){this.bindings[n]=sites},\
update(n,v){for(const [id,prop] of this.bindings[n]||[]){const el=document.getElementById(id);\
if(!el)continue;if(prop===\"text\"){el.textContent=v}else{el.setAttribute(prop,v)}}}};\n",
        );
        for (name, sites) in &script_binds {
            let quoted: Vec<String> = sites
                .iter()
                .map(|(id, prop)| format!("[\"{}\",\"{}\"]", id, prop))
                .collect();
            script.push_str(&format!(
                "__quill.bind(\"{}\",[{}]);\n",
                name,
                quoted.join(",")
            ));
        }

        let document = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
<style>\nbody{{font-family:sans-serif;background:{};color:{}}}\n</style>\n</head>\n<body>\n\
{}\n<script>\n{}</script>\n</body>\n</html>\n",
            escape_text(&config.title),
            color_hex(ColorToken::Surface, config.dark),
            color_hex(ColorToken::Text, config.dark),
            body.trim_end(),
            script,
        );

        TargetOutput {
            artifact: HtmlArtifact { document },
            warnings: compat.into_warnings(),
        }
    }
}

/// Variable name → `(element id, DOM property)` pairs for the refresh
/// script; "text" stands for text content.
type ScriptBinds = BTreeMap<String, Vec<(String, String)>>;

/// Bound variables and their DOM properties, keyed by node path
type BindTargets = BTreeMap<NodePath, BTreeMap<String, BTreeSet<String>>>;

/// Resolve binding sites to the node that should carry `data-q-bind`: an
/// attribute site patches that attribute on its element, a nested text site
/// patches its parent element's text, and a root-level text site keeps its
/// own path — `write_node` wraps it in a generated `<span>` so the variable
/// still has an element to patch.
fn binding_targets(output: &RenderOutput) -> BindTargets {
    let mut targets: BindTargets = BTreeMap::new();
    for binding in &output.bindings {
        for site in &binding.sites {
            let (path, prop) = match output.node_at(&site.path) {
                Some(RenderedNode::Element { .. }) => (
                    site.path.clone(),
                    site.attr.clone().unwrap_or_else(|| "text".to_string()),
                ),
                Some(RenderedNode::Text { .. }) if site.path.len() > 1 => (
                    site.path[..site.path.len() - 1].to_vec(),
                    "text".to_string(),
                ),
                Some(RenderedNode::Text { .. }) => (site.path.clone(), "text".to_string()),
                None => continue,
            };
            targets
                .entry(path)
                .or_default()
                .entry(binding.name.clone())
                .or_default()
                .insert(prop);
        }
    }
    targets
}

fn record_binds(
    vars: &BTreeMap<String, BTreeSet<String>>,
    id: &str,
    script_binds: &mut ScriptBinds,
) {
    for (name, props) in vars {
        for prop in props {
            script_binds
                .entry(name.clone())
                .or_default()
                .push((id.to_string(), prop.clone()));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn write_node(
    node: &RenderedNode,
    path: &mut NodePath,
    targets: &BindTargets,
    ids: &mut IdAlloc,
    script_binds: &mut ScriptBinds,
    compat: &mut Compat,
    config: &AdapterConfig,
    out: &mut String,
) {
    match node {
        RenderedNode::Text { content } => {
            // Bound root-level text has no parent element; generate one
            if let Some(vars) = targets.get(path) {
                let id = ids.next_id();
                let names: Vec<&str> = vars.keys().map(|s| s.as_str()).collect();
                out.push_str(&format!(
                    "<span id=\"{}\" data-q-bind=\"{}\">{}</span>",
                    id,
                    names.join(" "),
                    escape_text(content)
                ));
                record_binds(vars, &id, script_binds);
            } else {
                out.push_str(&escape_text(content));
            }
        }
        RenderedNode::Element {
            tag,
            attrs,
            children,
            self_closing,
        } => {
            let html_tag = map_tag(tag);
            out.push('<');
            out.push_str(html_tag);

            let mut style = String::new();
            for (name, value) in attrs {
                match name.as_str() {
                    "space" => match SpaceToken::from_name(value) {
                        Some(token) => {
                            style.push_str(&format!("padding:{}px;", space_px(token)))
                        }
                        None => compat.degrade(
                            tag,
                            TARGET,
                            &format!("unknown space token '{}' dropped", value),
                        ),
                    },
                    "color" => match ColorToken::from_name(value) {
                        Some(token) => style.push_str(&format!(
                            "color:{};",
                            color_hex(token, config.dark)
                        )),
                        None => compat.degrade(
                            tag,
                            TARGET,
                            &format!("unknown color token '{}' dropped", value),
                        ),
                    },
                    _ => {
                        out.push_str(&format!(" {}=\"{}\"", name, escape_attr(value)));
                    }
                }
            }
            if !style.is_empty() {
                out.push_str(&format!(" style=\"{}\"", style));
            }

            if let Some(vars) = targets.get(path) {
                let id = ids.next_id();
                let names: Vec<&str> = vars.keys().map(|s| s.as_str()).collect();
                out.push_str(&format!(
                    " id=\"{}\" data-q-bind=\"{}\"",
                    id,
                    names.join(" ")
                ));
                record_binds(vars, &id, script_binds);
            }

            if *self_closing && children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for (i, child) in children.iter().enumerate() {
                path.push(i);
                write_node(child, path, targets, ids, script_binds, compat, config, out);
                path.pop();
            }
            out.push_str(&format!("</{}>", html_tag));
        }
    }
}

fn escape_text(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(raw: &str) -> String {
    escape_text(raw).replace('"', "&quot;")
}
