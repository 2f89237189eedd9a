//! The work-expression language: parsing, analysis and evaluation.

pub mod analysis;
pub mod ast;
pub mod interpreter;
pub mod parser;
pub mod scope;
pub mod value;

pub use analysis::{free_variables, package_references};
pub use ast::{BinaryOp, Expr, Lambda, Literal, UnaryOp};
pub use interpreter::Interpreter;
pub use parser::parse_expression;
pub use scope::{Frame, ScopeArena, ScopeId};
pub use value::{arithmetic, BuiltinRef, Closure, Value};
