//! Packages of builtin functions.
//!
//! A package is a named table of native functions. The `base` package is
//! attached everywhere; every other package is attached only when a loop
//! needs it, and a worker refuses to run a task whose packages it cannot load.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ChunkloopError, ErrorCode, Result};
use crate::expr::{BuiltinRef, Interpreter, ScopeArena, ScopeId, Value};

mod base;
mod math;
mod sys;
mod text;

pub use sys::worker_token;

/// Name of the package attached to every scope
pub const BASE_PACKAGE: &str = "base";

/// Largest list (in elements) or string (in bytes) a builtin will build
pub const MAX_BUILT_LEN: usize = 1 << 24;

pub type BuiltinFn = for<'a> fn(&mut Interpreter<'a>, Vec<Value>) -> Result<Value>;

#[derive(Clone)]
pub struct Package {
    name: String,
    functions: BTreeMap<&'static str, BuiltinFn>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &'static str, function: BuiltinFn) -> Self {
        self.functions.insert(name, function);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn function(&self, name: &str) -> Option<BuiltinFn> {
        self.functions.get(name).copied()
    }

    pub fn exports(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("exports", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PackageRegistry {
    packages: BTreeMap<String, Package>,
}

impl PackageRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every package that ships with chunkloop
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.insert(base::package());
        registry.insert(math::package());
        registry.insert(text::package());
        registry.insert(sys::package());
        registry
    }

    pub fn insert(&mut self, package: Package) {
        self.packages.insert(package.name.clone(), package);
    }

    /// Remove a package, returning it if it was present
    pub fn remove(&mut self, name: &str) -> Option<Package> {
        self.packages.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn function(&self, package: &str, name: &str) -> Result<BuiltinFn> {
        let pkg = self
            .get(package)
            .ok_or_else(|| ChunkloopError::package_not_found(package))?;
        pkg.function(name).ok_or_else(|| {
            ChunkloopError::package_with_code(
                ErrorCode::PACKAGE_FUNCTION_NOT_FOUND,
                package,
                format!("package '{}' has no function '{}'", package, name),
            )
        })
    }

    /// Whether `name` is exported by the always-attached base package
    pub fn is_base_function(&self, name: &str) -> bool {
        self.get(BASE_PACKAGE)
            .is_some_and(|base| base.function(name).is_some())
    }

    /// Non-base packages exporting `name`, in name order
    pub fn providers(&self, name: &str) -> Vec<&str> {
        self.packages
            .values()
            .filter(|p| p.name != BASE_PACKAGE && p.function(name).is_some())
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Build a root frame binding the base package plus `names`.
    ///
    /// Later packages shadow earlier ones on name clashes. Fails on the first
    /// package that is not registered.
    pub fn attach(&self, arena: &mut ScopeArena, names: &[String]) -> Result<ScopeId> {
        let frame = arena.push_frame(None);
        let base = self.get(BASE_PACKAGE).into_iter();
        let requested = names
            .iter()
            .filter(|n| n.as_str() != BASE_PACKAGE)
            .map(|n| self.get(n).ok_or_else(|| ChunkloopError::package_not_found(n.as_str())))
            .collect::<Result<Vec<_>>>()?;
        for package in base.chain(requested) {
            bind_exports(arena, frame, package);
        }
        Ok(frame)
    }

    /// Frame exposing a single package's functions, placed under `parent`
    pub fn namespace_frame(
        &self,
        arena: &mut ScopeArena,
        package: &str,
        parent: ScopeId,
    ) -> Result<ScopeId> {
        let pkg = self
            .get(package)
            .ok_or_else(|| ChunkloopError::package_not_found(package))?;
        let frame = arena.push_frame(Some(parent));
        bind_exports(arena, frame, pkg);
        Ok(frame)
    }
}

fn bind_exports(arena: &mut ScopeArena, frame: ScopeId, package: &Package) {
    for name in package.exports() {
        arena.define(
            frame,
            name,
            Value::Builtin(BuiltinRef {
                package: package.name.clone(),
                name: name.to_string(),
            }),
        );
    }
}

/// Fail unless exactly `expected` arguments were passed
pub(crate) fn expect_args(name: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(crate::error::common::arity(name, expected, args.len()));
    }
    Ok(())
}

/// Take the single argument of a one-argument builtin
/// Reject a builtin result of `len` elements or bytes above [`MAX_BUILT_LEN`]
pub(crate) fn check_built_len(name: &str, len: Option<usize>) -> Result<usize> {
    match len {
        Some(len) if len <= MAX_BUILT_LEN => Ok(len),
        _ => Err(ChunkloopError::evaluation_with_code(
            ErrorCode::EVAL_SIZE_LIMIT,
            format!("{} would build more than {} elements", name, MAX_BUILT_LEN),
        )),
    }
}

pub(crate) fn single(name: &str, args: Vec<Value>) -> Result<Value> {
    expect_args(name, &args, 1)?;
    Ok(args.into_iter().next().unwrap_or(Value::Null))
}

/// Take both arguments of a two-argument builtin
pub(crate) fn pair(name: &str, args: Vec<Value>) -> Result<(Value, Value)> {
    expect_args(name, &args, 2)?;
    let mut args = args.into_iter();
    let first = args.next().unwrap_or(Value::Null);
    let second = args.next().unwrap_or(Value::Null);
    Ok((first, second))
}
