//! The caller's lexical environment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::Result;
use crate::expr::{parse_expression, Interpreter, ScopeArena, ScopeId, Value};
use crate::packages::PackageRegistry;

/// One `name = expression` definition of a loop file's `scope:` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeDefinition {
    pub name: String,
    pub value: String,
}

/// The scope a loop is invoked from.
///
/// Frames run from `current` outwards to `global`. Above `global` sits a frame
/// with every registered package, which lets definitions call any builtin but
/// is never searched when capturing.
#[derive(Debug, Clone)]
pub struct CallerScope {
    arena: ScopeArena,
    global: ScopeId,
    current: ScopeId,
}

impl CallerScope {
    /// Empty caller scope whose builtins come from `registry`
    pub fn new(registry: &PackageRegistry) -> Result<Self> {
        let mut arena = ScopeArena::new();
        let all: Vec<String> = registry.names().map(str::to_string).collect();
        let packages = registry.attach(&mut arena, &all)?;
        let global = arena.push_frame(Some(packages));
        Ok(Self {
            arena,
            global,
            current: global,
        })
    }

    /// Evaluate `definitions` in order into the global frame
    pub fn from_definitions(definitions: &[ScopeDefinition], registry: &PackageRegistry) -> Result<Self> {
        let mut scope = Self::new(registry)?;
        for definition in definitions {
            scope.define_source(&definition.name, &definition.value, registry)?;
        }
        Ok(scope)
    }

    pub fn arena(&self) -> &ScopeArena {
        &self.arena
    }

    pub fn global(&self) -> ScopeId {
        self.global
    }

    /// Bind a value in the current frame
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.arena.define(self.current, name, value);
    }

    /// Evaluate `source` in the current frame and bind the result there.
    ///
    /// A function defined this way closes over the current frame, so it can
    /// call anything defined in it before or after.
    pub fn define_source(&mut self, name: &str, source: &str, registry: &PackageRegistry) -> Result<()> {
        let expr = parse_expression(source).map_err(|e| e.with_context(format!("in definition of '{}'", name)))?;
        let current = self.current;
        let value = Interpreter::new(&mut self.arena, registry)
            .eval(&expr, current)
            .map_err(|e| e.with_context(format!("in definition of '{}'", name)))?;
        debug!(name, kind = value.type_name(), "defined caller binding");
        self.arena.define(current, name, value);
        Ok(())
    }

    /// Enter a nested local frame (as a function body would)
    pub fn push_local(&mut self) -> ScopeId {
        self.current = self.arena.push_frame(Some(self.current));
        self.current
    }

    /// Look a name up lexically, stopping at the global frame
    pub fn resolve(&self, name: &str) -> Option<(ScopeId, &Value)> {
        self.arena.resolve_until(self.current, self.global, name)
    }

    /// The frames from `current` up to and including `global`
    pub fn frames(&self) -> BTreeSet<ScopeId> {
        let mut frames = BTreeSet::new();
        for id in self.arena.chain(self.current) {
            frames.insert(id);
            if id == self.global {
                break;
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, value: &str) -> ScopeDefinition {
        ScopeDefinition {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_definitions_see_each_other() {
        let registry = PackageRegistry::standard();
        let scope = CallerScope::from_definitions(
            &[def("base_rate", "3"), def("scaled", "base_rate * 2")],
            &registry,
        )
        .unwrap();
        assert_eq!(scope.resolve("scaled").map(|(_, v)| v), Some(&Value::Int(6)));
    }

    #[test]
    fn test_packages_are_not_caller_bindings() {
        let registry = PackageRegistry::standard();
        let scope = CallerScope::new(&registry).unwrap();
        assert!(scope.resolve("length").is_none());
        assert!(scope.arena().lookup(scope.global(), "length").is_some());
    }

    #[test]
    fn test_local_frames_shadow_global() {
        let registry = PackageRegistry::standard();
        let mut scope = CallerScope::new(&registry).unwrap();
        scope.define("x", Value::Int(1));
        let global = scope.global();
        let local = scope.push_local();
        scope.define("x", Value::Int(2));

        assert_eq!(scope.resolve("x").map(|(id, _)| id), Some(local));
        let frames = scope.frames();
        assert!(frames.contains(&global));
        assert!(frames.contains(&local));
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_definition_errors_name_the_binding() {
        let registry = PackageRegistry::standard();
        let err = CallerScope::from_definitions(&[def("broken", "missing + 1")], &registry)
            .unwrap_err();
        assert!(err.to_string().contains("'broken'"));
    }
}
