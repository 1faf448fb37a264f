//! Function definition, invocation, return truncation and memoization

use super::helpers::{run, run_with, text_of};
use crate::engine::{ScopeStore, Surfaces};
use crate::error::RuntimeErrorKind;

#[test]
fn test_call_by_position() {
    let output = run(
        r#"<q:function name="add" params="a:number, b:number"><q:return value="{a + b}"/></q:function>{add(2, 3)}"#,
    );
    assert_eq!(text_of(&output), "5");
}

#[test]
fn test_call_by_name() {
    let output = run(
        r#"<q:function name="repeat" params="word:string, times:number"><q:return value="{word + times}"/></q:function>{repeat(times=2, word='ha')}"#,
    );
    assert_eq!(text_of(&output), "ha2");
}

#[test]
fn test_call_before_definition_in_source_order() {
    let output = run(
        r#"{double(4)}<q:function name="double" params="n:number"><q:return value="{n * 2}"/></q:function>"#,
    );
    assert_eq!(text_of(&output), "8");
}

#[test]
fn test_return_truncates_remaining_body() {
    let mut scopes = ScopeStore::new();
    run_with(
        r#"<q:function name="f"><q:return value="1"/><q:set name="session.leak" value="'ran'"/></q:function>{f()}"#,
        &mut scopes,
        &Surfaces::new(),
    )
    .unwrap();
    // The assignment after q:return must not have executed
    assert!(scopes.session().get("leak").is_none());
}

#[test]
fn test_function_scope_is_fresh() {
    // The caller's locals are invisible inside the body; parameters are
    // the only local bindings.
    let output = run(
        r#"<q:set name="secret" value="'outer'"/><q:function name="peek"><q:return value="{secret}"/></q:function>[{peek()}]"#,
    );
    assert_eq!(text_of(&output), "[]");
}

#[test]
fn test_function_body_output_is_discarded_for_expression_calls() {
    let output = run(
        r#"<q:function name="noisy"><div>side output</div><q:return value="'v'"/></q:function>{noisy()}"#,
    );
    assert_eq!(output.nodes.len(), 1);
    assert_eq!(text_of(&output), "v");
}

#[test]
fn test_unknown_function_is_fatal() {
    let err = run_with("{nope()}", &mut ScopeStore::new(), &Surfaces::new()).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::UnknownFunction(ref n) if n == "nope"));
}

#[test]
fn test_unknown_named_parameter_is_fatal() {
    // The error points at the definition whose signature lacks the name
    let err = run_with(
        "{f(b=1)}\n\n<q:function name=\"f\" params=\"a\"><q:return value=\"{a}\"/></q:function>",
        &mut ScopeStore::new(),
        &Surfaces::new(),
    )
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::UnknownParameter { .. }));
    assert_eq!(err.pos.line, 3);
}

#[test]
fn test_parameter_type_coercion() {
    let output = run(
        r#"<q:function name="inc" params="n:number"><q:return value="{n + 1}"/></q:function>{inc('41')}"#,
    );
    assert_eq!(text_of(&output), "42");
}

#[test]
fn test_cached_function_memoizes_by_argument_values() {
    // The session counter increments once per distinct argument value:
    // the second f(1) reuses the memoized result.
    let source = r#"<q:function name="f" params="n:number" cache="true"><q:set name="session.calls" value="{session.calls + 1}"/><q:return value="{n * 10}"/></q:function>{f(1)}{f(1)}{f(2)}"#;
    let mut scopes = ScopeStore::new();
    let output = run_with(source, &mut scopes, &Surfaces::new()).unwrap();
    assert_eq!(text_of(&output), "101020");
    assert_eq!(
        scopes.session().get("calls").and_then(|v| v.as_num()),
        Some(2.0)
    );
}

#[test]
fn test_recursion_depth_is_bounded() {
    let err = run_with(
        r#"<q:function name="f"><q:return value="{f()}"/></q:function>{f()}"#,
        &mut ScopeStore::new(),
        &Surfaces::new(),
    )
    .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::TypeMismatch(_)));
}
