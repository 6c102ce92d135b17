//! Workflow definition format: schema, parsing and validation.

pub mod parser;
pub mod schema;
pub mod validation;

pub use parser::{parse_definition, DslFormat};
pub use schema::*;
pub use validation::{validate_definition, Diagnostic, DiagnosticLevel, ValidationReport};
