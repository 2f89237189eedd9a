//! Loop files: a loop specification plus the caller scope it runs in.
//!
//! ```yaml
//! scope:
//!   - name: rate
//!     value: "3"
//!   - name: scale
//!     value: "fn(x) { x * rate }"
//! loop:
//!   iterators:
//!     - name: i
//!       range: { from: 0, to: 10 }
//!   expression: "scale(i)"
//!   combine: sum
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::capture::{CallerScope, ScopeDefinition};
use crate::error::{ChunkloopError, ErrorCode, Result};
use crate::loop_spec::LoopSpec;
use crate::packages::PackageRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopFile {
    #[serde(rename = "loop")]
    pub spec: LoopSpec,
    /// Definitions evaluated in order into the caller's global frame
    #[serde(default)]
    pub scope: Vec<ScopeDefinition>,
}

impl LoopFile {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            ChunkloopError::invalid_input_with_code(
                ErrorCode::INPUT_INVALID_YAML,
                format!("invalid loop file: {}", e),
                None,
            )
            .with_source(e)
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChunkloopError::invalid_input(format!("cannot read loop file {}", path.display())).with_source(e)
        })?;
        Self::from_yaml(&content).map_err(|e| e.with_context(path.display()))
    }

    /// Build the caller scope described by the `scope` section
    pub fn caller_scope(&self, registry: &PackageRegistry) -> Result<CallerScope> {
        CallerScope::from_definitions(&self.scope, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use crate::loop_spec::CombinePolicy;

    const SAMPLE: &str = r#"
scope:
  - name: rate
    value: "3"
  - name: scale
    value: "fn(x) { x * rate }"
loop:
  iterators:
    - name: i
      range: { from: 0, to: 10 }
  expression: "scale(i)"
  combine: sum
"#;

    #[test]
    fn test_parse_loop_file() {
        let file = LoopFile::from_yaml(SAMPLE).unwrap();
        assert_eq!(file.scope.len(), 2);
        assert!(matches!(file.spec.combine, CombinePolicy::Builtin(_)));

        let caller = file.caller_scope(&PackageRegistry::standard()).unwrap();
        assert!(matches!(caller.resolve("rate"), Some((_, Value::Int(3)))));
        assert!(matches!(caller.resolve("scale"), Some((_, Value::Closure(_)))));
    }

    #[test]
    fn test_scope_is_optional() {
        let file = LoopFile::from_yaml("loop:\n  iterators: [{ name: i, values: [1] }]\n  expression: i\n").unwrap();
        assert!(file.scope.is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        let err = LoopFile::from_yaml("loop: [unclosed").unwrap_err();
        assert_eq!(err.code(), ErrorCode::INPUT_INVALID_YAML);
        assert_eq!(err.exit_code(), 3);
    }
}
