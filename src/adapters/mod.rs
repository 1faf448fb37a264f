//! Target adapters: rendered tree → self-contained target artifact
//!
//! Adapters are stateless transforms. Given the same rendered tree and
//! config they produce identical artifacts; anonymous identifiers are
//! allocated in visit order, so determinism holds across runs. Nothing
//! here evaluates expressions — the engine already resolved every
//! placeholder and control construct.

use serde::Serialize;
use tracing::warn;

use crate::error::CompatibilityWarning;
use crate::render::RenderOutput;

pub mod desktop;
pub mod html;
pub mod native;
pub mod tui;

#[cfg(test)]
mod tests;

pub use desktop::{DesktopAdapter, DesktopArtifact};
pub use html::{HtmlAdapter, HtmlArtifact};
pub use native::{NativeAdapter, NativeArtifact};
pub use tui::{TuiAdapter, TuiArtifact};

/* ===================== Contract ===================== */

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Component title, used where the target has a document/window title
    pub title: String,
    pub dark: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            title: "quill component".to_string(),
            dark: false,
        }
    }
}

/// Artifact plus the compatibility warnings accumulated while producing it.
/// Warnings never fail a render; callers inspect them after the fact.
#[derive(Debug)]
pub struct TargetOutput<A> {
    pub artifact: A,
    pub warnings: Vec<CompatibilityWarning>,
}

pub trait Adapter {
    type Artifact: Serialize;

    /// Target name used in warnings and CLI dispatch
    fn target(&self) -> &'static str;

    fn render(&self, output: &RenderOutput, config: &AdapterConfig)
        -> TargetOutput<Self::Artifact>;
}

/* ===================== Design tokens ===================== */

/// Enumerated spacing scale. Each adapter maps a token to a concrete value
/// appropriate for its medium (pixels, terminal cells, layout units).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceToken {
    Xs,
    Sm,
    Md,
    Lg,
    Xl,
}

impl SpaceToken {
    pub fn from_name(name: &str) -> Option<SpaceToken> {
        match name {
            "xs" => Some(SpaceToken::Xs),
            "sm" => Some(SpaceToken::Sm),
            "md" => Some(SpaceToken::Md),
            "lg" => Some(SpaceToken::Lg),
            "xl" => Some(SpaceToken::Xl),
            _ => None,
        }
    }
}

/// Enumerated color scale, resolved per target and light/dark mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorToken {
    Primary,
    Surface,
    Text,
    Muted,
    Danger,
}

impl ColorToken {
    pub fn from_name(name: &str) -> Option<ColorToken> {
        match name {
            "primary" => Some(ColorToken::Primary),
            "surface" => Some(ColorToken::Surface),
            "text" => Some(ColorToken::Text),
            "muted" => Some(ColorToken::Muted),
            "danger" => Some(ColorToken::Danger),
            _ => None,
        }
    }
}

/* ===================== Compatibility tracker ===================== */

/// Accumulates degraded-construct notices during one adapter pass
#[derive(Debug, Default)]
pub struct Compat {
    warnings: Vec<CompatibilityWarning>,
}

impl Compat {
    pub fn new() -> Self {
        Compat::default()
    }

    pub fn degrade(&mut self, construct: &str, target: &str, detail: &str) {
        warn!(construct, target, detail, "construct degraded for target");
        self.warnings.push(CompatibilityWarning {
            construct: construct.to_string(),
            target: target.to_string(),
            detail: detail.to_string(),
        });
    }

    pub fn into_warnings(self) -> Vec<CompatibilityWarning> {
        self.warnings
    }
}

/// Visit-order id allocator shared by the adapters (`q0`, `q1`, ...)
#[derive(Debug, Default)]
pub(crate) struct IdAlloc {
    next: usize,
}

impl IdAlloc {
    pub(crate) fn next_id(&mut self) -> String {
        let id = format!("q{}", self.next);
        self.next += 1;
        id
    }
}
