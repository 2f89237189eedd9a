//! Closure-scope capture.
//!
//! Builds the minimal, self-contained scope a work expression needs so it can
//! be shipped to a worker that has no access to the caller's environment.
//!
//! Capture happens once per loop:
//!
//! 1. Every free variable of the expression (minus loop variables and
//!    `no_export` names) is looked up in the caller's frames and copied into a
//!    fresh isolated root frame. Names the caller does not bind but a package
//!    exports turn into a package requirement instead.
//! 2. Packages referenced as `pkg::name`, declared on the loop, or named by the
//!    parent-namespace hint are unioned into the package list.
//! 3. Explicit exports not already captured must resolve in the caller's
//!    frames, otherwise capture fails before anything is dispatched.
//!
//! Closures whose enclosing frame is one of the caller's frames are re-parented
//! onto the isolated root, so exported helpers can call each other on the
//! worker. Closures over other frames get those frames copied along with them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, warn};

use crate::error::{ChunkloopError, Result};
use crate::expr::{free_variables, package_references, Closure, Expr, ScopeArena, ScopeId, Value};
use crate::loop_spec::PreparedLoop;
use crate::packages::{PackageRegistry, BASE_PACKAGE};

mod caller;

pub use caller::{CallerScope, ScopeDefinition};

/// The isolated scope embedded into every task closure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedScope {
    arena: ScopeArena,
    root: ScopeId,
    names: Vec<String>,
    packages: Vec<String>,
    parent_namespace: Option<String>,
}

impl CapturedScope {
    pub fn arena(&self) -> &ScopeArena {
        &self.arena
    }

    /// The isolated frame holding the captured bindings
    pub fn root(&self) -> ScopeId {
        self.root
    }

    /// Captured names, in capture order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Packages the worker must load, sorted
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn parent_namespace(&self) -> Option<&str> {
        self.parent_namespace.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.arena.frame(self.root).and_then(|f| f.bindings.get(name))
    }
}

/// Configures and runs a scope capture
pub struct ScopeCapture<'a> {
    caller: &'a CallerScope,
    registry: &'a PackageRegistry,
    loop_variables: BTreeSet<String>,
    export: Vec<String>,
    no_export: BTreeSet<String>,
    packages: Vec<String>,
    parent_namespace: Option<String>,
}

impl<'a> ScopeCapture<'a> {
    pub fn new(caller: &'a CallerScope, registry: &'a PackageRegistry) -> Self {
        Self {
            caller,
            registry,
            loop_variables: BTreeSet::new(),
            export: Vec::new(),
            no_export: BTreeSet::new(),
            packages: Vec::new(),
            parent_namespace: None,
        }
    }

    /// Capture configured from a prepared loop's options
    pub fn for_loop(caller: &'a CallerScope, registry: &'a PackageRegistry, prepared: &PreparedLoop) -> Self {
        Self::new(caller, registry)
            .loop_variables(&prepared.loop_variables)
            .export(&prepared.spec.export)
            .no_export(&prepared.spec.no_export)
            .packages(&prepared.spec.packages)
            .parent_namespace(prepared.spec.parent_namespace.as_deref())
    }

    pub fn loop_variables(mut self, names: &[String]) -> Self {
        self.loop_variables.extend(names.iter().cloned());
        self
    }

    pub fn export(mut self, names: &[String]) -> Self {
        self.export.extend(names.iter().cloned());
        self
    }

    pub fn no_export(mut self, names: &[String]) -> Self {
        self.no_export.extend(names.iter().cloned());
        self
    }

    pub fn packages(mut self, names: &[String]) -> Self {
        self.packages.extend(names.iter().cloned());
        self
    }

    pub fn parent_namespace(mut self, namespace: Option<&str>) -> Self {
        self.parent_namespace = namespace.map(str::to_string);
        self
    }

    /// Capture the scope of `expr`. The caller's scope is never modified.
    pub fn capture(&self, expr: &Expr) -> Result<CapturedScope> {
        let mut run = CaptureRun::new(self);

        for name in free_variables(expr) {
            if !self.is_excluded(&name) {
                run.require(&name, Requirement::FreeVariable)?;
            }
        }
        run.packages.extend(package_references(expr));
        run.drain_references()?;

        for name in &self.export {
            if self.no_export.contains(name) {
                warn!(name = %name, "name is both exported and excluded; not exporting it");
                continue;
            }
            if self.loop_variables.contains(name) {
                warn!(name = %name, "loop variables cannot be exported; ignoring");
                continue;
            }
            if !run.captured.contains(name) {
                run.require(name, Requirement::Export)?;
            }
        }
        run.drain_references()?;

        run.packages.extend(self.packages.iter().cloned());
        run.packages.extend(self.parent_namespace.iter().cloned());
        run.packages.remove(BASE_PACKAGE);

        let captured = CapturedScope {
            arena: run.target,
            root: run.root,
            names: run.names,
            packages: run.packages.into_iter().collect(),
            parent_namespace: self.parent_namespace.clone(),
        };
        debug!(
            names = ?captured.names,
            packages = ?captured.packages,
            frames = captured.arena.len(),
            "captured scope"
        );
        Ok(captured)
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.loop_variables.contains(name) || self.no_export.contains(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requirement {
    /// Free in the work expression; must resolve somewhere
    FreeVariable,
    /// Named by `export`; must resolve in the caller's frames
    Export,
    /// Free in a captured closure's body; captured if it can be
    Reference,
}

struct CaptureRun<'c> {
    request: &'c ScopeCapture<'c>,
    caller_frames: BTreeSet<ScopeId>,
    target: ScopeArena,
    root: ScopeId,
    copied: BTreeMap<ScopeId, ScopeId>,
    captured: BTreeSet<String>,
    names: Vec<String>,
    packages: BTreeSet<String>,
    references: VecDeque<String>,
}

impl<'c> CaptureRun<'c> {
    fn new(request: &'c ScopeCapture<'c>) -> Self {
        let caller_frames = request.caller.frames();
        let mut target = ScopeArena::new();
        let root = target.push_frame(None);
        Self {
            request,
            caller_frames,
            target,
            root,
            copied: BTreeMap::new(),
            captured: BTreeSet::new(),
            names: Vec::new(),
            packages: BTreeSet::new(),
            references: VecDeque::new(),
        }
    }

    fn require(&mut self, name: &str, requirement: Requirement) -> Result<()> {
        if let Some((_, value)) = self.request.caller.resolve(name) {
            let value = self.import(value.clone())?;
            self.target.define(self.root, name, value);
            self.captured.insert(name.to_string());
            self.names.push(name.to_string());
            return Ok(());
        }

        if requirement == Requirement::Export {
            return Err(ChunkloopError::unresolved_export(name));
        }

        let registry = self.request.registry;
        if registry.is_base_function(name) {
            return Ok(());
        }
        if let Some(package) = registry.providers(name).first() {
            debug!(name, package, "free name provided by package");
            self.packages.insert(package.to_string());
            return Ok(());
        }

        match requirement {
            Requirement::FreeVariable => Err(ChunkloopError::unresolved_variable(name)),
            _ => {
                debug!(name, "closure reference left unresolved");
                Ok(())
            }
        }
    }

    fn drain_references(&mut self) -> Result<()> {
        while let Some(name) = self.references.pop_front() {
            if self.captured.contains(&name) || self.request.is_excluded(&name) {
                continue;
            }
            self.require(&name, Requirement::Reference)?;
        }
        Ok(())
    }

    fn import(&mut self, value: Value) -> Result<Value> {
        match value {
            Value::Closure(closure) => {
                let scope = self.copy_frame(closure.scope)?;
                self.note_references(&closure);
                Ok(Value::Closure(Closure { scope, ..closure }))
            }
            Value::List(items) => items
                .into_iter()
                .map(|item| self.import(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Value::Builtin(builtin) => {
                self.packages.insert(builtin.package.clone());
                Ok(Value::Builtin(builtin))
            }
            other => Ok(other),
        }
    }

    /// Queue the names a closure body needs from the caller's frames
    fn note_references(&mut self, closure: &Closure) {
        self.packages.extend(package_references(&closure.body));
        for name in free_variables(&closure.body) {
            if closure.params.contains(&name) || self.bound_below_caller(closure.scope, &name) {
                continue;
            }
            self.references.push_back(name);
        }
    }

    /// Whether `name` is bound in a non-caller frame between `scope` and the
    /// caller's frames
    fn bound_below_caller(&self, scope: ScopeId, name: &str) -> bool {
        let arena = self.request.caller.arena();
        for id in arena.chain(scope) {
            if self.caller_frames.contains(&id) {
                return false;
            }
            if arena.frame(id).is_some_and(|f| f.bindings.contains_key(name)) {
                return true;
            }
        }
        false
    }

    /// Map a caller-side frame into the captured arena
    fn copy_frame(&mut self, source: ScopeId) -> Result<ScopeId> {
        if self.caller_frames.contains(&source) {
            return Ok(self.root);
        }
        if let Some(&copy) = self.copied.get(&source) {
            return Ok(copy);
        }
        let frame = self
            .request
            .caller
            .arena()
            .frame(source)
            .cloned()
            .ok_or_else(|| ChunkloopError::other(format!("closure refers to unknown {}", source)))?;

        let copy = self.target.push_frame(None);
        self.copied.insert(source, copy);
        for (name, value) in frame.bindings {
            let value = self.import(value)?;
            self.target.define(copy, name, value);
        }
        let parent = match frame.parent {
            Some(parent) => self.copy_frame(parent)?,
            None => self.root,
        };
        self.target.set_parent(copy, Some(parent));
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::expr::{parse_expression, Interpreter};

    fn caller(definitions: &[(&str, &str)]) -> (CallerScope, PackageRegistry) {
        let registry = PackageRegistry::standard();
        let defs: Vec<_> = definitions
            .iter()
            .map(|(name, value)| ScopeDefinition {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect();
        let scope = CallerScope::from_definitions(&defs, &registry).unwrap();
        (scope, registry)
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_captures_only_free_variables() {
        let (scope, registry) = caller(&[("a", "1"), ("b", "2"), ("unused", "3")]);
        let expr = parse_expression("a + b + x").unwrap();
        let captured = ScopeCapture::new(&scope, &registry)
            .loop_variables(&strings(&["x"]))
            .capture(&expr)
            .unwrap();

        assert_eq!(captured.names(), &["a", "b"]);
        assert_eq!(captured.get("a"), Some(&Value::Int(1)));
        assert!(captured.get("unused").is_none());
        assert!(captured.get("x").is_none());
    }

    #[test]
    fn test_no_export_is_never_captured() {
        let (scope, registry) = caller(&[("a", "1"), ("secret", "2")]);
        let expr = parse_expression("a + secret").unwrap();
        let captured = ScopeCapture::new(&scope, &registry)
            .no_export(&strings(&["secret"]))
            .export(&strings(&["secret"]))
            .capture(&expr)
            .unwrap();
        assert_eq!(captured.names(), &["a"]);
    }

    #[test]
    fn test_unresolved_export_names_symbol() {
        let (scope, registry) = caller(&[]);
        let expr = parse_expression("1").unwrap();
        let err = ScopeCapture::new(&scope, &registry)
            .export(&strings(&["helper"]))
            .capture(&expr)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CAPTURE_UNRESOLVED_EXPORT);
        assert_eq!(err.symbol(), Some("helper"));
    }

    #[test]
    fn test_unresolved_free_variable() {
        let (scope, registry) = caller(&[]);
        let expr = parse_expression("nowhere + 1").unwrap();
        let err = ScopeCapture::new(&scope, &registry).capture(&expr).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CAPTURE_UNRESOLVED_VARIABLE);
    }

    #[test]
    fn test_package_discovery() {
        let (scope, registry) = caller(&[]);
        let expr = parse_expression("sqrt(x) + length(text::split(s, \",\"))").unwrap();
        let captured = ScopeCapture::new(&scope, &registry)
            .loop_variables(&strings(&["x", "s"]))
            .packages(&strings(&["sys"]))
            .parent_namespace(Some("sys"))
            .capture(&expr)
            .unwrap();
        assert_eq!(captured.packages(), &["math", "sys", "text"]);
        assert!(captured.names().is_empty());
    }

    #[test]
    fn test_captured_builtin_brings_its_package() {
        let (scope, registry) = caller(&[("sq", "math::sqrt"), ("fns", "[text::upper]")]);
        let expr = parse_expression("sq(x) + length(fns)").unwrap();
        let captured = ScopeCapture::new(&scope, &registry)
            .loop_variables(&strings(&["x"]))
            .capture(&expr)
            .unwrap();
        assert_eq!(captured.names(), &["sq", "fns"]);
        assert_eq!(captured.packages(), &["math", "text"]);
    }

    #[test]
    fn test_caller_binding_shadows_builtin() {
        let (scope, registry) = caller(&[("length", "fn(xs) { 42 }")]);
        let expr = parse_expression("length(x)").unwrap();
        let captured = ScopeCapture::new(&scope, &registry)
            .loop_variables(&strings(&["x"]))
            .capture(&expr)
            .unwrap();
        assert_eq!(captured.names(), &["length"]);
    }

    #[test]
    fn test_sibling_exports_are_reparented() {
        let (scope, registry) = caller(&[("g", "fn(v) { v * 2 }"), ("h", "fn(v) { g(v) + 1 }")]);
        let expr = parse_expression("h(x)").unwrap();
        let captured = ScopeCapture::new(&scope, &registry)
            .loop_variables(&strings(&["x"]))
            .export(&strings(&["h", "g"]))
            .capture(&expr)
            .unwrap();

        let root = captured.root();
        for name in ["g", "h"] {
            match captured.get(name) {
                Some(Value::Closure(c)) => assert_eq!(c.scope, root),
                other => panic!("expected closure for {}, got {:?}", name, other),
            }
        }

        // Evaluate against the captured arena alone
        let mut arena = captured.arena().clone();
        let packages = registry.attach(&mut arena, captured.packages()).unwrap();
        arena.set_parent(root, Some(packages));
        arena.define(root, "x", Value::Int(5));
        let result = Interpreter::new(&mut arena, &registry).eval(&expr, root).unwrap();
        assert_eq!(result, Value::Int(11));
    }

    #[test]
    fn test_helper_dependencies_follow_without_export() {
        let (scope, registry) = caller(&[
            ("rate", "3"),
            ("g", "fn(v) { v * rate }"),
            ("h", "fn(v) { g(v) + 1 }"),
        ]);
        let expr = parse_expression("h(x)").unwrap();
        let captured = ScopeCapture::new(&scope, &registry)
            .loop_variables(&strings(&["x"]))
            .capture(&expr)
            .unwrap();
        assert_eq!(captured.names(), &["h", "g", "rate"]);
    }

    #[test]
    fn test_closure_over_local_frame_is_copied() {
        let (scope, registry) = caller(&[
            ("offset", "100"),
            ("make", "fn(k) { fn(v) { v + k + offset } }"),
            ("add7", "make(7)"),
        ]);
        let expr = parse_expression("add7(x)").unwrap();
        let captured = ScopeCapture::new(&scope, &registry)
            .loop_variables(&strings(&["x"]))
            .capture(&expr)
            .unwrap();

        assert_eq!(captured.names(), &["add7", "offset"]);
        let add7 = match captured.get("add7") {
            Some(Value::Closure(c)) => c.clone(),
            other => panic!("expected closure, got {:?}", other),
        };
        assert_ne!(add7.scope, captured.root());
        assert_eq!(captured.arena().lookup(add7.scope, "k"), Some(&Value::Int(7)));
        assert_eq!(captured.arena().parent(add7.scope), Some(captured.root()));
    }

    #[test]
    fn test_capture_does_not_touch_caller() {
        let (scope, registry) = caller(&[("g", "fn(v) { v }")]);
        let before = scope.arena().clone();
        let expr = parse_expression("g(1)").unwrap();
        ScopeCapture::new(&scope, &registry).capture(&expr).unwrap();
        assert_eq!(scope.arena(), &before);
    }
}
