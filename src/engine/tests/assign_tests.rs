//! Assignment and coercion tests

use super::helpers::{run, run_with, text_of};
use crate::engine::{ScopeStore, Surfaces, Val};
use crate::error::RuntimeErrorKind;

#[test]
fn test_assign_then_substitute() {
    let output = run(r#"<q:set name="x" value="10" type="number"/>x = {x}"#);
    assert_eq!(text_of(&output), "x = 10");
}

#[test]
fn test_declared_type_coercion_applies_on_write() {
    let mut scopes = ScopeStore::new();
    run_with(
        r#"<q:set name="n" value="'42'" type="number"/>"#,
        &mut scopes,
        &Surfaces::new(),
    )
    .unwrap();
    assert_eq!(scopes.get("n"), Some(&Val::Num(42.0)));
}

#[test]
fn test_coercion_failure_is_fatal_with_position() {
    let err = run_with(
        "\n  <q:set name=\"n\" value=\"'nope'\" type=\"number\"/>",
        &mut ScopeStore::new(),
        &Surfaces::new(),
    )
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::CoercionFailed { .. }));
    assert_eq!(err.pos.line, 2);
}

#[test]
fn test_persist_defaults_to_session_layer() {
    let mut scopes = ScopeStore::new();
    run_with(
        r#"<q:set name="cart" value="'widget'" persist="true"/>"#,
        &mut scopes,
        &Surfaces::new(),
    )
    .unwrap();
    assert_eq!(
        scopes.session().get("cart"),
        Some(&Val::Str("widget".to_string()))
    );
}

#[test]
fn test_arithmetic_and_string_concat() {
    assert_eq!(
        text_of(&run(r#"<q:set name="a" value="2 * 3 + 4"/>{a}"#)),
        "10"
    );
    assert_eq!(
        text_of(&run(r#"<q:set name="who" value="'world'"/>{'hello ' + who}"#)),
        "hello world"
    );
}

#[test]
fn test_division_by_zero_is_fatal() {
    let err = run_with(
        "{1 / 0}",
        &mut ScopeStore::new(),
        &Surfaces::new(),
    )
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::DivisionByZero));
}

#[test]
fn test_member_and_index_access() {
    let output = run(
        r#"<q:set name="tags" value="'a,b,c'" type="array"/>{tags[1]}"#,
    );
    assert_eq!(text_of(&output), "b");
}

#[test]
fn test_attribute_placeholders_resolve() {
    let output = run(r#"<q:set name="cls" value="'hero'"/><div class="card {cls}">x</div>"#);
    match &output.nodes[0] {
        crate::render::RenderedNode::Element { attrs, .. } => {
            assert_eq!(attrs[0].1, "card hero");
        }
        other => panic!("expected element, got {:?}", other),
    }
}

#[test]
fn test_bindings_record_referenced_variables() {
    let output = run(r#"<q:set name="x" value="1"/><span>{x}</span><b title="{x}">y</b>"#);
    let binding = output
        .bindings
        .iter()
        .find(|b| b.name == "x")
        .expect("binding for x");
    assert_eq!(binding.sites.len(), 2);
    // Text placeholders carry no attribute; attribute placeholders name it
    assert_eq!(binding.sites[0].attr, None);
    assert_eq!(binding.sites[1].attr.as_deref(), Some("title"));
}
