//! Converts raw JSON/YAML text into a [`WorkflowDefinition`].

use std::path::Path;

use super::schema::WorkflowDefinition;
use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DslFormat {
    Json,
    Yaml,
}

impl DslFormat {
    /// Pick a format from a file extension, defaulting to JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => DslFormat::Yaml,
            _ => DslFormat::Json,
        }
    }
}

pub fn parse_definition(content: &str, format: DslFormat) -> Result<WorkflowDefinition, WorkflowError> {
    match format {
        DslFormat::Json => {
            serde_json::from_str(content).map_err(|e| WorkflowError::DslParseError(e.to_string()))
        }
        DslFormat::Yaml => {
            // Go through serde_json::Value so `data` maps keep JSON semantics.
            let value: serde_json::Value = serde_yaml::from_str(content)
                .map_err(|e| WorkflowError::DslParseError(e.to_string()))?;
            serde_json::from_value(value).map_err(|e| WorkflowError::DslParseError(e.to_string()))
        }
    }
}
