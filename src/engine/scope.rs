//! Layered variable store: local / declared / session
//!
//! Resolution rules:
//! - A scope-qualified name (`session.x`, `local.x`, `declared.x`) resolves
//!   directly against that layer with the prefix stripped, for both reads
//!   and writes. Qualified write-then-read of the same name always observes
//!   the written value.
//! - An unqualified read resolves local → declared → session.
//! - An unqualified write goes to local unless a scope attribute overrides.
//!
//! The local layer is a frame stack: loops push a private frame seeded with
//! their bound variable(s) and pop it after each iteration, so loop
//! variables never leak across iterations or into the parent scope.
//! Function calls swap in a fresh frame stack entirely.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use super::value::Val;
use crate::syntax::ScopeKind;

pub struct ScopeStore {
    /// Local frames, innermost last. Frame 0 is the render's base scope.
    frames: Vec<HashMap<String, Val>>,
    declared: HashMap<String, Val>,
    session: HashMap<String, Val>,
}

impl ScopeStore {
    pub fn new() -> Self {
        ScopeStore {
            frames: vec![HashMap::new()],
            declared: HashMap::new(),
            session: HashMap::new(),
        }
    }

    pub fn with_layers(declared: HashMap<String, Val>, session: HashMap<String, Val>) -> Self {
        ScopeStore {
            frames: vec![HashMap::new()],
            declared,
            session,
        }
    }

    /// Split a possibly scope-qualified name into (layer, bare name)
    fn split_qualified(name: &str) -> (Option<ScopeKind>, &str) {
        match name.split_once('.') {
            Some((prefix, rest)) if !rest.is_empty() => match ScopeKind::from_name(prefix) {
                Some(kind) => (Some(kind), rest),
                None => (None, name),
            },
            _ => (None, name),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Val> {
        let (qualified, bare) = Self::split_qualified(name);
        match qualified {
            Some(ScopeKind::Local) => self.get_local(bare),
            Some(ScopeKind::Declared) => self.declared.get(bare),
            Some(ScopeKind::Session) => self.session.get(bare),
            None => self
                .get_local(name)
                .or_else(|| self.declared.get(name))
                .or_else(|| self.session.get(name)),
        }
    }

    fn get_local(&self, name: &str) -> Option<&Val> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }

    /// Write a value. `scope_attr` is the authored `scope=` override; a
    /// qualified name wins over it.
    pub fn set(&mut self, name: &str, value: Val, scope_attr: Option<ScopeKind>) {
        let (qualified, bare) = Self::split_qualified(name);
        let target = qualified.or(scope_attr).unwrap_or(ScopeKind::Local);
        debug!(name = bare, scope = ?target, "scope write");
        match target {
            ScopeKind::Local => self.set_local(bare, value),
            ScopeKind::Declared => {
                self.declared.insert(bare.to_string(), value);
            }
            ScopeKind::Session => {
                self.session.insert(bare.to_string(), value);
            }
        }
    }

    /// Unqualified local writes update an existing binding in the nearest
    /// frame that has one (so a loop body can update an accumulator in the
    /// base scope), otherwise bind in the base frame. Loop/function seed
    /// variables live in their own frame and shadow outer bindings.
    fn set_local(&mut self, name: &str, value: Val) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(slot) = frame.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.frames[0].insert(name.to_string(), value);
    }

    /// True when the name is currently bound in an iteration frame. Such
    /// bindings are transient and excluded from the reactive-binding table.
    pub fn in_transient_frame(&self, name: &str) -> bool {
        self.frames.iter().skip(1).any(|f| f.contains_key(name))
    }

    /// Push a private frame seeded with loop variable(s)
    pub fn push_frame(&mut self, seed: HashMap<String, Val>) {
        self.frames.push(seed);
    }

    pub fn pop_frame(&mut self) {
        debug_assert!(self.frames.len() > 1, "cannot pop the base frame");
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Swap in a fresh local frame stack for a function invocation.
    /// Returns the caller's frames; `restore_frames` puts them back.
    pub fn take_frames(&mut self, params: HashMap<String, Val>) -> Vec<HashMap<String, Val>> {
        std::mem::replace(&mut self.frames, vec![params])
    }

    pub fn restore_frames(&mut self, frames: Vec<HashMap<String, Val>>) {
        self.frames = frames;
    }

    /// Session layer contents, for persisting back to the caller's registry
    /// at render end.
    pub fn into_session(self) -> HashMap<String, Val> {
        self.session
    }

    pub fn session(&self) -> &HashMap<String, Val> {
        &self.session
    }
}

impl Default for ScopeStore {
    fn default() -> Self {
        Self::new()
    }
}

/* ===================== Session registry ===================== */

/// Session maps keyed per caller identity.
///
/// Independent renders for different callers never share mutable scope
/// state: each render checks out a clone of its caller's map and commits it
/// back when the render succeeds. The registry mutex is the only shared
/// point and is held only for the copy.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, HashMap<String, Val>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkout(&self, caller: &str) -> HashMap<String, Val> {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .get(caller)
            .cloned()
            .unwrap_or_default()
    }

    pub fn commit(&self, caller: &str, session: HashMap<String, Val>) {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .insert(caller.to_string(), session);
    }
}
