//! Scope-resolution tests: qualified symmetry, unqualified precedence

use maplit::hashmap;

use super::helpers::{run_with, text_of};
use crate::engine::{ScopeStore, Surfaces, Val};

#[test]
fn test_qualified_write_then_read_is_symmetric() {
    // write(session.x, v); read(session.x) == v
    let mut scopes = ScopeStore::new();
    let output = run_with(
        r#"<q:set name="session.x" value="'persisted'"/>{session.x}"#,
        &mut scopes,
        &Surfaces::new(),
    )
    .unwrap();
    assert_eq!(text_of(&output), "persisted");
    assert_eq!(
        scopes.session().get("x"),
        Some(&Val::Str("persisted".to_string()))
    );
}

#[test]
fn test_qualified_symmetry_for_every_layer() {
    for layer in ["local", "declared", "session"] {
        let source = format!(
            r#"<q:set name="{layer}.q" value="42" type="number"/>{{{layer}.q}}"#
        );
        let output = run_with(&source, &mut ScopeStore::new(), &Surfaces::new()).unwrap();
        assert_eq!(text_of(&output), "42", "layer {}", layer);
    }
}

#[test]
fn test_unqualified_read_precedence_local_declared_session() {
    let declared = hashmap! { "x".to_string() => Val::Str("declared".to_string()) };
    let session = hashmap! { "x".to_string() => Val::Str("session".to_string()) };

    // No local binding: declared wins over session
    let mut scopes = ScopeStore::with_layers(declared.clone(), session.clone());
    let output = run_with("{x}", &mut scopes, &Surfaces::new()).unwrap();
    assert_eq!(text_of(&output), "declared");

    // Local write shadows both
    let mut scopes = ScopeStore::with_layers(declared, session);
    let output = run_with(
        r#"<q:set name="x" value="'local'"/>{x}"#,
        &mut scopes,
        &Surfaces::new(),
    )
    .unwrap();
    assert_eq!(text_of(&output), "local");
}

#[test]
fn test_session_only_binding_is_readable_unqualified() {
    let session = hashmap! { "user".to_string() => Val::Str("ada".to_string()) };
    let mut scopes = ScopeStore::with_layers(Default::default(), session);
    let output = run_with("{user}", &mut scopes, &Surfaces::new()).unwrap();
    assert_eq!(text_of(&output), "ada");
}

#[test]
fn test_unqualified_write_goes_to_local_not_session() {
    let session = hashmap! { "x".to_string() => Val::Str("old".to_string()) };
    let mut scopes = ScopeStore::with_layers(Default::default(), session);
    run_with(
        r#"<q:set name="x" value="'new'"/>"#,
        &mut scopes,
        &Surfaces::new(),
    )
    .unwrap();
    // The session layer is untouched by an unqualified write
    assert_eq!(scopes.session().get("x"), Some(&Val::Str("old".to_string())));
}

#[test]
fn test_scope_attribute_overrides_write_target() {
    let mut scopes = ScopeStore::new();
    run_with(
        r#"<q:set name="theme" value="'dark'" scope="session"/>"#,
        &mut scopes,
        &Surfaces::new(),
    )
    .unwrap();
    assert_eq!(
        scopes.session().get("theme"),
        Some(&Val::Str("dark".to_string()))
    );
}

#[test]
fn test_unresolved_reference_is_empty_not_fatal() {
    let output = run_with("[{missing}]", &mut ScopeStore::new(), &Surfaces::new()).unwrap();
    assert_eq!(text_of(&output), "[]");
}

#[test]
fn test_session_registry_isolates_callers() {
    use crate::engine::SessionRegistry;

    let registry = SessionRegistry::new();
    registry.commit(
        "alice",
        hashmap! { "count".to_string() => Val::Num(1.0) },
    );
    registry.commit("bob", hashmap! { "count".to_string() => Val::Num(7.0) });

    assert_eq!(
        registry.checkout("alice").get("count"),
        Some(&Val::Num(1.0))
    );
    assert_eq!(registry.checkout("bob").get("count"), Some(&Val::Num(7.0)));
    assert!(registry.checkout("carol").is_empty());
}
