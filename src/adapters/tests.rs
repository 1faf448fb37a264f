//! Adapter tests: determinism, token mapping, degradation, update paths

use crate::engine::{execute, ScopeStore, Surfaces};
use crate::parser::parse;
use crate::render::RenderOutput;

use super::{
    Adapter, AdapterConfig, DesktopAdapter, HtmlAdapter, NativeAdapter, TuiAdapter,
};

fn rendered(source: &str) -> RenderOutput {
    let doc = parse(source).expect("source should parse");
    execute(&doc, &mut ScopeStore::new(), &Surfaces::new()).expect("source should execute")
}

#[test]
fn test_html_maps_tags_and_tokens() {
    let output = rendered(r#"<view space="md" color="primary"><text>hi</text></view>"#);
    let result = HtmlAdapter.render(&output, &AdapterConfig::default());
    assert!(result.warnings.is_empty());
    assert!(result.artifact.document.contains("<div"));
    assert!(result.artifact.document.contains("padding:8px;"));
    assert!(result.artifact.document.contains("color:#2563eb;"));
    assert!(result.artifact.document.contains("<span>hi</span>"));
}

#[test]
fn test_html_escapes_text_and_attributes() {
    let output = rendered(r#"<q:set name="v" value="'<b>&'"/><text title="{v}">{v}</text>"#);
    let document = HtmlAdapter
        .render(&output, &AdapterConfig::default())
        .artifact
        .document;
    assert!(document.contains("&lt;b&gt;&amp;"));
    assert!(document.contains(r#"title="&lt;b&gt;&amp;""#));
    assert!(!document.contains("<b>&"));
}

#[test]
fn test_html_bound_elements_carry_data_q_bind() {
    let output = rendered(r#"<q:set name="total" value="9"/><text>{total}</text>"#);
    let document = HtmlAdapter
        .render(&output, &AdapterConfig::default())
        .artifact
        .document;
    assert!(document.contains(r#"id="q0" data-q-bind="total""#));
    assert!(document.contains(r#"__quill.bind("total",[["q0","text"]]);"#));
}

#[test]
fn test_html_root_level_bound_text_gets_a_wrapper() {
    // Root-level text has no parent element; the variable still needs an
    // element to patch
    let output = rendered(r#"<q:set name="x" value="1"/>{x}"#);
    let document = HtmlAdapter
        .render(&output, &AdapterConfig::default())
        .artifact
        .document;
    assert!(document.contains(r#"<span id="q0" data-q-bind="x">1</span>"#));
    assert!(document.contains(r#"__quill.bind("x",[["q0","text"]]);"#));
}

#[test]
fn test_html_attribute_binding_patches_the_attribute() {
    // An attribute placeholder must not clobber the element's text
    let output = rendered(r#"<q:set name="url" value="'/home'"/><link href="{url}">go</link>"#);
    let document = HtmlAdapter
        .render(&output, &AdapterConfig::default())
        .artifact
        .document;
    assert!(document.contains(r#"href="/home""#));
    assert!(document.contains(r#"__quill.bind("url",[["q0","href"]]);"#));
    assert!(document.contains("el.setAttribute(prop,v)"));
}

#[test]
fn test_html_rendering_is_deterministic() {
    let output = rendered(
        r#"<q:set name="n" value="3"/><q:loop mode="range" var="i" from="1" to="3"><item>{i}/{n}</item></q:loop>"#,
    );
    let config = AdapterConfig::default();
    let first = HtmlAdapter.render(&output, &config).artifact;
    let second = HtmlAdapter.render(&output, &config).artifact;
    assert_eq!(first, second);
}

#[test]
fn test_native_declares_one_setter_per_variable() {
    let output = rendered(
        r#"<q:set name="a" value="1"/><q:set name="b" value="2"/><text>{a}{b}</text><view title="{a}"/>"#,
    );
    let artifact = NativeAdapter.render(&output, &AdapterConfig::default()).artifact;
    let names: Vec<&str> = artifact.state.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(artifact.state[0].setter, "setA");
    // `a` is bound in two places, but there is still exactly one declaration
    assert_eq!(artifact.state[0].rebinds.len(), 2);
}

#[test]
fn test_native_unknown_tag_degrades_to_view() {
    let output = rendered("<marquee>zoom</marquee>");
    let result = NativeAdapter.render(&output, &AdapterConfig::default());
    assert_eq!(result.artifact.root[0].component, "View");
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].construct, "marquee");
    assert_eq!(result.warnings[0].target, "native");
}

#[test]
fn test_native_rendering_is_deterministic() {
    let output = rendered(r#"<q:set name="x" value="1"/><view space="lg"><text>{x}</text></view>"#);
    let config = AdapterConfig::default();
    assert_eq!(
        NativeAdapter.render(&output, &config).artifact,
        NativeAdapter.render(&output, &config).artifact
    );
}

#[test]
fn test_tui_degrades_image_to_placeholder_label() {
    let output = rendered(r#"<image src="logo.png"/>"#);
    let result = TuiAdapter.render(&output, &AdapterConfig::default());
    assert_eq!(
        result.artifact.root[0].text.as_deref(),
        Some("[image: logo.png]")
    );
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].target, "tui");
}

#[test]
fn test_tui_spacing_maps_to_whole_cells() {
    let output = rendered(r#"<view space="xl">x</view>"#);
    let artifact = TuiAdapter.render(&output, &AdapterConfig::default()).artifact;
    assert_eq!(artifact.root[0].style.padding, Some(4));
}

#[test]
fn test_tui_one_redraw_trigger_per_variable() {
    let output = rendered(r#"<q:set name="x" value="1"/><text>{x}</text><text>{x}</text>"#);
    let artifact = TuiAdapter.render(&output, &AdapterConfig::default()).artifact;
    assert_eq!(artifact.redraw.len(), 1);
    assert_eq!(artifact.redraw[0].variable, "x");
    assert_eq!(artifact.redraw[0].paths.len(), 2);
}

#[test]
fn test_desktop_bridge_exposes_topics_and_api() {
    let output = rendered(r#"<q:set name="count" value="0"/><text>{count}</text>"#);
    let config = AdapterConfig {
        title: "Counter".to_string(),
        dark: true,
    };
    let artifact = DesktopAdapter.render(&output, &config).artifact;
    assert_eq!(artifact.window.title, "Counter");
    assert!(artifact.window.dark);
    assert_eq!(artifact.bridge.state_keys, vec!["count"]);
    assert_eq!(artifact.bridge.topics, vec!["quill.state.count"]);
    assert!(artifact.bridge.script_api.contains(&"subscribe".to_string()));
}

#[test]
fn test_artifacts_serialize_to_json() {
    let output = rendered(r#"<view><text>hi</text></view>"#);
    let config = AdapterConfig::default();
    let native = NativeAdapter.render(&output, &config).artifact;
    let json = serde_json::to_string(&native).expect("serializable artifact");
    assert!(json.contains("\"component\":\"View\""));
    let tui = TuiAdapter.render(&output, &config).artifact;
    assert!(serde_json::to_string(&tui).is_ok());
    let desktop = DesktopAdapter.render(&output, &config).artifact;
    assert!(serde_json::to_string(&desktop).is_ok());
}
