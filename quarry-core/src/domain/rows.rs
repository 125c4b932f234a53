//! Result row types
//!
//! Rows are kept as opaque JSON values; interpreting them against the schema
//! is left to the caller.

use serde::{Deserialize, Serialize};

/// Column description returned alongside result rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: String,
}

/// One result row, one value per schema field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<serde_json::Value>,
}

impl Row {
    pub fn new(values: Vec<serde_json::Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
