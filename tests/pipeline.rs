//! End-to-end pipeline tests: parse → execute → adapt → diff

use std::sync::Arc;

use maplit::hashmap;

use quill::adapters::{Adapter, AdapterConfig, HtmlAdapter, NativeAdapter};
use quill::engine::MemoryDataSource;
use quill::hotreload;
use quill::{execute, parse, ScopeStore, SessionRegistry, Surfaces, Val};

fn render(source: &str, scopes: &mut ScopeStore, surfaces: &Surfaces) -> quill::RenderOutput {
    let doc = parse(source).expect("source should parse");
    execute(&doc, scopes, surfaces).expect("source should execute")
}

#[test]
fn test_assignment_renders_substituted_text() {
    let output = render(
        r#"<q:set name="x" value="10" type="number"/>x = {x}"#,
        &mut ScopeStore::new(),
        &Surfaces::new(),
    );
    assert_eq!(output.text_content().trim(), "x = 10");
}

#[test]
fn test_range_loop_expands_markup() {
    let output = render(
        r#"<q:loop mode="range" var="i" from="1" to="3"><item>Number {i}</item></q:loop>"#,
        &mut ScopeStore::new(),
        &Surfaces::new(),
    );
    assert_eq!(output.nodes.len(), 3);
    assert_eq!(output.text_content(), "Number 1Number 2Number 3");
}

#[test]
fn test_full_html_pipeline() {
    let source = r#"<q:set name="user" value="'Ada'"/><view space="md"><heading>Hello {user}</heading><q:loop mode="range" var="i" from="1" to="2"><text>row {i}</text></q:loop></view>"#;
    let output = render(source, &mut ScopeStore::new(), &Surfaces::new());
    let result = HtmlAdapter.render(&output, &AdapterConfig::default());

    assert!(result.warnings.is_empty());
    let document = &result.artifact.document;
    assert!(document.starts_with("<!DOCTYPE html>"));
    assert!(document.contains("Hello Ada</h1>"));
    assert!(document.contains("<span>row 1</span><span>row 2</span>"));
    assert!(document.contains("data-q-bind=\"user\""));
}

#[test]
fn test_session_scope_survives_across_renders_per_caller() {
    let registry = SessionRegistry::new();
    let surfaces = Surfaces::new();

    let mut scopes = ScopeStore::with_layers(Default::default(), registry.checkout("caller-1"));
    render(
        r#"<q:set name="session.cart" value="'widget'"/>"#,
        &mut scopes,
        &surfaces,
    );
    registry.commit("caller-1", scopes.into_session());

    // Same caller sees the binding; a different caller does not
    let mut scopes = ScopeStore::with_layers(Default::default(), registry.checkout("caller-1"));
    let output = render(r#"[{session.cart}]"#, &mut scopes, &surfaces);
    assert_eq!(output.text_content(), "[widget]");

    let mut scopes = ScopeStore::with_layers(Default::default(), registry.checkout("caller-2"));
    let output = render(r#"[{session.cart}]"#, &mut scopes, &surfaces);
    assert_eq!(output.text_content(), "[]");
}

#[test]
fn test_query_pipeline_binds_rows_and_commits() {
    let ds = Arc::new(MemoryDataSource::new());
    let surfaces = Surfaces::new().with_datasource("main", ds.clone());
    let source = r#"<q:transaction><q:query name="add" datasource="main" statement-type="insert">insert into items (name) values (:name)<q:param name="name" value="'ada'"/></q:query></q:transaction><q:query name="items" datasource="main">select * from items</q:query>{items_meta.recordcount}:{items[0].name}"#;
    let output = render(source, &mut ScopeStore::new(), &surfaces);
    assert_eq!(output.text_content(), "1:ada");

    assert_eq!(
        ds.committed_rows(),
        vec![hashmap! {
            "id".to_string() => Val::Num(1.0),
            "name".to_string() => Val::Str("ada".to_string()),
        }]
    );
}

#[test]
fn test_edit_flows_through_diff_as_patch() {
    let surfaces = Surfaces::new();
    let old = render(
        r#"<view><text>Hello world</text></view>"#,
        &mut ScopeStore::new(),
        &surfaces,
    );
    let new = render(
        r#"<view><text>Hello quill</text></view>"#,
        &mut ScopeStore::new(),
        &surfaces,
    );
    let changes = hotreload::diff(&old, &new);
    assert!(changes.is_patchable());
    assert_eq!(changes.messages.len(), 1);
}

#[test]
fn test_structural_edit_flows_through_diff_as_full_reload() {
    let old_doc = parse(r#"<view><text>one</text></view>"#).unwrap();
    let new_doc =
        parse(r#"<q:if><q:when test="{1 == 1}"><view><text>one</text></view></q:when></q:if>"#)
            .unwrap();
    assert!(hotreload::shape_change(&old_doc, &new_doc).is_some());
}

#[test]
fn test_native_pipeline_declares_state() {
    let output = render(
        r#"<q:set name="count" value="1" type="number"/><text>{count}</text>"#,
        &mut ScopeStore::new(),
        &Surfaces::new(),
    );
    let artifact = NativeAdapter
        .render(&output, &AdapterConfig::default())
        .artifact;
    assert_eq!(artifact.state.len(), 1);
    assert_eq!(artifact.state[0].setter, "setCount");
}
