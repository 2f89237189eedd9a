//! Declarative loop specifications.
//!
//! A [`LoopSpec`] is plain data as written in a loop file. [`LoopSpec::prepare`]
//! validates it and parses every embedded expression, producing a
//! [`PreparedLoop`] that the backend can run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

use crate::error::{ChunkloopError, ErrorCode, Result};
use crate::expr::{parse_expression, Expr, Value};

fn default_in_order() -> bool {
    true
}

fn default_step() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpec {
    /// Zipped iteration sources; the loop runs as long as the shortest one
    pub iterators: Vec<IteratorSpec>,
    /// Work expression evaluated once per iteration
    pub expression: String,
    /// Names to capture in addition to the expression's free variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export: Vec<String>,
    /// Names never captured, even when free in the expression
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub no_export: Vec<String>,
    /// Packages the workers must load, on top of the discovered ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    /// Package whose namespace becomes the captured scope's direct parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_namespace: Option<String>,
    #[serde(default)]
    pub combine: CombinePolicy,
    /// Starting value for pairwise combine policies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<serde_json::Value>,
    /// Post-processing function applied to the combined value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize: Option<String>,
    /// Apply chunk results strictly in global iteration order
    #[serde(default = "default_in_order")]
    pub in_order: bool,
    #[serde(default)]
    pub error_handling: ErrorHandling,
}

/// One named iteration variable and the values it takes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeSpec>,
}

impl IteratorSpec {
    pub fn values(name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            values: Some(values),
            range: None,
        }
    }

    pub fn range(name: impl Into<String>, from: i64, to: i64) -> Self {
        Self {
            name: name.into(),
            values: None,
            range: Some(RangeSpec { from, to, by: 1 }),
        }
    }

    /// The single configured source of this iterator
    pub fn source(&self) -> Result<IteratorSource<'_>> {
        match (&self.values, &self.range) {
            (Some(values), None) => Ok(IteratorSource::Values(values)),
            (None, Some(range)) if range.by == 0 => Err(invalid_iterator(
                &self.name,
                "range step 'by' must not be zero",
            )),
            (None, Some(range)) => Ok(IteratorSource::Range(*range)),
            (Some(_), Some(_)) => Err(invalid_iterator(
                &self.name,
                "specify either 'values' or 'range', not both",
            )),
            (None, None) => Err(invalid_iterator(
                &self.name,
                "missing 'values' or 'range'",
            )),
        }
    }
}

fn invalid_iterator(name: &str, message: &str) -> ChunkloopError {
    ChunkloopError::invalid_input_with_code(
        ErrorCode::INPUT_INVALID_ITERATOR,
        format!("iterator '{}': {}", name, message),
        Some(format!("iterators.{}", name)),
    )
}

#[derive(Debug, Clone, Copy)]
pub enum IteratorSource<'a> {
    Values(&'a [serde_json::Value]),
    Range(RangeSpec),
}

/// Half-open integer range `[from, to)` stepping by `by`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub from: i64,
    pub to: i64,
    #[serde(default = "default_step")]
    pub by: i64,
}

/// How per-iteration results are combined into the loop's value
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "CombineValue", into = "CombineValue")]
pub enum CombinePolicy {
    /// Ordered list of every iteration's value
    #[default]
    Collect,
    Builtin(BuiltinCombine),
    /// Source of a two-argument function `fn(acc, x) { ... }`
    Function(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCombine {
    Sum,
    Product,
    Concat,
    Append,
    Min,
    Max,
}

impl BuiltinCombine {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinCombine::Sum => "sum",
            BuiltinCombine::Product => "product",
            BuiltinCombine::Concat => "concat",
            BuiltinCombine::Append => "append",
            BuiltinCombine::Min => "min",
            BuiltinCombine::Max => "max",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "sum" => BuiltinCombine::Sum,
            "product" => BuiltinCombine::Product,
            "concat" => BuiltinCombine::Concat,
            "append" => BuiltinCombine::Append,
            "min" => BuiltinCombine::Min,
            "max" => BuiltinCombine::Max,
            _ => return None,
        })
    }
}

/// Accepted spellings of a combine policy: `collect`, `sum`,
/// `{ builtin: sum }` or `{ function: "fn(a, x) { a + x }" }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CombineValue {
    Named(String),
    Builtin { builtin: BuiltinCombine },
    Function { function: String },
}

impl TryFrom<CombineValue> for CombinePolicy {
    type Error = String;

    fn try_from(value: CombineValue) -> std::result::Result<Self, Self::Error> {
        match value {
            CombineValue::Named(name) if name == "collect" => Ok(CombinePolicy::Collect),
            CombineValue::Named(name) => BuiltinCombine::parse(&name)
                .map(CombinePolicy::Builtin)
                .ok_or_else(|| format!("unknown combine policy '{}'", name)),
            CombineValue::Builtin { builtin } => Ok(CombinePolicy::Builtin(builtin)),
            CombineValue::Function { function } => Ok(CombinePolicy::Function(function)),
        }
    }
}

impl From<CombinePolicy> for CombineValue {
    fn from(policy: CombinePolicy) -> Self {
        match policy {
            CombinePolicy::Collect => CombineValue::Named("collect".to_string()),
            CombinePolicy::Builtin(builtin) => CombineValue::Builtin { builtin },
            CombinePolicy::Function(function) => CombineValue::Function { function },
        }
    }
}

impl fmt::Display for CombinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombinePolicy::Collect => f.write_str("collect"),
            CombinePolicy::Builtin(b) => f.write_str(b.name()),
            CombinePolicy::Function(_) => f.write_str("function"),
        }
    }
}

/// Failure policy. Stopping on the first failure is the only one supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    #[default]
    Stop,
}

/// The parsed, validated form of a combine policy
#[derive(Debug, Clone, PartialEq)]
pub enum Combine {
    Collect,
    Builtin(BuiltinCombine),
    Function(Expr),
}

/// A validated loop, ready for capture and dispatch
#[derive(Debug, Clone)]
pub struct PreparedLoop {
    pub spec: LoopSpec,
    pub expression: Expr,
    pub loop_variables: Vec<String>,
    pub combine: Combine,
    pub init: Option<Value>,
    pub finalize: Option<Expr>,
}

impl LoopSpec {
    /// Loop over `iterators` evaluating `expression`, collecting the results
    pub fn new(iterators: Vec<IteratorSpec>, expression: impl Into<String>) -> Self {
        Self {
            iterators,
            expression: expression.into(),
            export: Vec::new(),
            no_export: Vec::new(),
            packages: Vec::new(),
            parent_namespace: None,
            combine: CombinePolicy::Collect,
            init: None,
            finalize: None,
            in_order: true,
            error_handling: ErrorHandling::Stop,
        }
    }

    pub fn with_export(mut self, names: &[&str]) -> Self {
        self.export = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_no_export(mut self, names: &[&str]) -> Self {
        self.no_export = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_packages(mut self, names: &[&str]) -> Self {
        self.packages = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_combine(mut self, combine: CombinePolicy) -> Self {
        self.combine = combine;
        self
    }

    pub fn with_init(mut self, init: serde_json::Value) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_finalize(mut self, finalize: impl Into<String>) -> Self {
        self.finalize = Some(finalize.into());
        self
    }

    /// Validate the specification and parse its expressions
    pub fn prepare(&self) -> Result<PreparedLoop> {
        if self.iterators.is_empty() {
            return Err(ChunkloopError::invalid_input_with_code(
                ErrorCode::INPUT_INVALID_ITERATOR,
                "a loop needs at least one iterator",
                Some("iterators".to_string()),
            ));
        }

        let mut seen = BTreeSet::new();
        for iterator in &self.iterators {
            if iterator.name.is_empty() {
                return Err(invalid_iterator("", "iterator names must not be empty"));
            }
            if !seen.insert(iterator.name.as_str()) {
                return Err(ChunkloopError::invalid_input_with_code(
                    ErrorCode::INPUT_DUPLICATE_ITERATOR,
                    format!("iterator '{}' is declared more than once", iterator.name),
                    Some(format!("iterators.{}", iterator.name)),
                ));
            }
            iterator.source()?;
        }

        let expression = parse_field("expression", &self.expression)?;

        let combine = match &self.combine {
            CombinePolicy::Collect => Combine::Collect,
            CombinePolicy::Builtin(b) => Combine::Builtin(*b),
            CombinePolicy::Function(source) => Combine::Function(parse_field("combine", source)?),
        };

        if self.init.is_some() && combine == Combine::Collect {
            warn!("'init' has no effect with the collect policy");
        }

        let init = self
            .init
            .as_ref()
            .map(|json| {
                Value::from_json(json).map_err(|e| {
                    ChunkloopError::invalid_input_with_code(
                        ErrorCode::INPUT_GENERIC,
                        format!("invalid init value: {}", e.message()),
                        Some("init".to_string()),
                    )
                })
            })
            .transpose()?;

        let finalize = self
            .finalize
            .as_deref()
            .map(|source| parse_field("finalize", source))
            .transpose()?;

        Ok(PreparedLoop {
            spec: self.clone(),
            expression,
            loop_variables: self.iterators.iter().map(|i| i.name.clone()).collect(),
            combine,
            init,
            finalize,
        })
    }
}

fn parse_field(field: &str, source: &str) -> Result<Expr> {
    parse_expression(source).map_err(|e| {
        ChunkloopError::invalid_input_with_code(
            ErrorCode::INPUT_PARSE_ERROR,
            format!("cannot parse {}: {}", field, e.message()),
            Some(field.to_string()),
        )
    })
}
