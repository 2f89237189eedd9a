//! Explicit lexical scopes.
//!
//! Scopes live in an arena and refer to their parent by [`ScopeId`]. Closures
//! hold a `ScopeId` rather than a pointer, which is what makes a captured scope
//! serializable and lets capture re-parent a closure by rewriting one id.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub bindings: BTreeMap<String, Value>,
    pub parent: Option<ScopeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeArena {
    frames: Vec<Frame>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.frames.len() as u32);
        self.frames.push(Frame {
            bindings: BTreeMap::new(),
            parent,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, scope: ScopeId) -> bool {
        scope.index() < self.frames.len()
    }

    pub fn frame(&self, scope: ScopeId) -> Option<&Frame> {
        self.frames.get(scope.index())
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.frame(scope).and_then(|f| f.parent)
    }

    pub fn set_parent(&mut self, scope: ScopeId, parent: Option<ScopeId>) {
        if let Some(frame) = self.frames.get_mut(scope.index()) {
            frame.parent = parent;
        }
    }

    /// Bind `name` in exactly this frame, shadowing any outer binding
    pub fn define(&mut self, scope: ScopeId, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.get_mut(scope.index()) {
            frame.bindings.insert(name.into(), value);
        }
    }

    /// Lexical lookup along the parent chain starting at `scope`
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        self.resolve(scope, name).map(|(_, value)| value)
    }

    /// Like [`lookup`](Self::lookup) but also reports the frame that binds the name
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, &Value)> {
        self.chain(scope).find_map(|id| {
            self.frame(id)
                .and_then(|f| f.bindings.get(name))
                .map(|v| (id, v))
        })
    }

    /// Lookup that stops after visiting `last` (inclusive)
    pub fn resolve_until(&self, scope: ScopeId, last: ScopeId, name: &str) -> Option<(ScopeId, &Value)> {
        for id in self.chain(scope) {
            if let Some(value) = self.frame(id).and_then(|f| f.bindings.get(name)) {
                return Some((id, value));
            }
            if id == last {
                break;
            }
        }
        None
    }

    /// Frame ids from `scope` outwards to the root
    pub fn chain(&self, scope: ScopeId) -> ScopeChain<'_> {
        ScopeChain {
            arena: self,
            next: self.contains(scope).then_some(scope),
            remaining: self.frames.len(),
        }
    }

    /// Drop every frame created after `len` frames existed.
    ///
    /// Callers must guarantee that no surviving value refers to a dropped frame.
    pub fn truncate(&mut self, len: usize) {
        self.frames.truncate(len);
    }
}

/// Iterator over a parent chain. Bounded by the arena size so a malformed
/// (cyclic) payload cannot loop forever.
pub struct ScopeChain<'a> {
    arena: &'a ScopeArena,
    next: Option<ScopeId>,
    remaining: usize,
}

impl Iterator for ScopeChain<'_> {
    type Item = ScopeId;

    fn next(&mut self) -> Option<ScopeId> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next?;
        self.next = self.arena.parent(current);
        Some(current)
    }
}
