//! Conditional tests: first-match exclusivity, default branch

use super::helpers::{run, text_of};

fn grade_source(score: u32) -> String {
    format!(
        r#"<q:set name="score" value="{score}" type="number"/><q:if><q:when test="{{score >= 90}}">A</q:when><q:when test="{{score >= 80}}">B</q:when><q:when test="{{score >= 70}}">C</q:when><q:otherwise>F</q:otherwise></q:if>"#
    )
}

#[test]
fn test_first_true_guard_wins_exclusively() {
    // 92 satisfies every guard; only the first branch may execute
    let output = run(&grade_source(92));
    assert_eq!(text_of(&output), "A");
}

#[test]
fn test_later_branch_selected_in_source_order() {
    assert_eq!(text_of(&run(&grade_source(85))), "B");
    assert_eq!(text_of(&run(&grade_source(71))), "C");
}

#[test]
fn test_default_branch_when_no_guard_matches() {
    assert_eq!(text_of(&run(&grade_source(12))), "F");
}

#[test]
fn test_no_branch_and_no_default_renders_nothing() {
    let output = run(
        r#"<q:if><q:when test="{1 > 2}">never</q:when></q:if>ok"#,
    );
    assert_eq!(text_of(&output), "ok");
}

#[test]
fn test_guard_sees_current_scope() {
    let output = run(
        r#"<q:set name="logged_in" value="true" type="boolean"/><q:if><q:when test="{logged_in}">hello</q:when><q:otherwise>login</q:otherwise></q:if>"#,
    );
    assert_eq!(text_of(&output), "hello");
}

#[test]
fn test_conditional_branch_may_contain_markup_and_control() {
    let output = run(
        r#"<q:if><q:when test="{1 == 1}"><q:loop mode="range" var="i" from="1" to="2"><b>{i}</b></q:loop></q:when></q:if>"#,
    );
    assert_eq!(output.nodes.len(), 2);
    assert_eq!(output.nodes[0].tag(), Some("b"));
}
