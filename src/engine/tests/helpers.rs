//! Shared helpers for engine tests

use crate::engine::{execute, ScopeStore, Surfaces};
use crate::error::RuntimeError;
use crate::parser;
use crate::render::RenderOutput;

/// Parse and execute a source against fresh scopes and empty surfaces
pub fn run(source: &str) -> RenderOutput {
    run_with(source, &mut ScopeStore::new(), &Surfaces::new()).expect("execution failed")
}

/// Parse and execute with caller-provided scopes/surfaces
pub fn run_with(
    source: &str,
    scopes: &mut ScopeStore,
    surfaces: &Surfaces,
) -> Result<RenderOutput, RuntimeError> {
    let doc = parser::parse(source).expect("parse failed");
    execute(&doc, scopes, surfaces)
}

/// Trimmed text content of the rendered tree
pub fn text_of(output: &RenderOutput) -> String {
    output.text_content().trim().to_string()
}
