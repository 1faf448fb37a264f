pub mod adapters;
pub mod cli;
pub mod engine;
pub mod error;
pub mod hotreload;
pub mod parser;
pub mod render;
pub mod syntax;

// Re-export the pipeline entry points
pub use engine::{execute, ScopeStore, SessionRegistry, Surfaces, Val};
pub use error::{CompatibilityWarning, ParseError, RuntimeError};
pub use parser::{parse, ParseCache};
pub use render::{RenderOutput, RenderedNode};
