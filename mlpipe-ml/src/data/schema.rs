//! Expected dataset schema and column type inference.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Column data type, named the way `schema.yaml` spells dtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Int64,
    Float64,
    Bool,
    Object,
    Unknown,
}

impl ColumnType {
    /// Parse a dtype name. Unrecognized names map to `Unknown`.
    pub fn from_dtype(dtype: &str) -> Self {
        match dtype.trim().to_ascii_lowercase().as_str() {
            "int" | "int32" | "int64" | "integer" => Self::Int64,
            "float" | "float32" | "float64" | "double" => Self::Float64,
            "bool" | "boolean" => Self::Bool,
            "object" | "str" | "string" => Self::Object,
            _ => Self::Unknown,
        }
    }

    pub fn as_dtype(&self) -> &'static str {
        match self {
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::Unknown => "unknown",
        }
    }
}

/// Schema for a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
}

/// Expected schema for a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
}

/// Result of comparing a table header against the expected schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaComparison {
    /// Expected columns absent from the table.
    pub missing: Vec<String>,
    /// Table columns the schema does not list.
    pub unexpected: Vec<String>,
    /// Header names that occur more than once.
    #[serde(default)]
    pub duplicated: Vec<String>,
}

impl SchemaComparison {
    /// Exact, order-independent match.
    pub fn is_match(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.duplicated.is_empty()
    }
}

impl SchemaDefinition {
    /// Build from the `columns` mapping of `schema.yaml`.
    pub fn from_dtype_map(columns: &BTreeMap<String, String>) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, dtype)| ColumnSchema {
                    name: name.clone(),
                    dtype: ColumnType::from_dtype(dtype),
                })
                .collect(),
        }
    }

    pub fn column_names(&self) -> BTreeSet<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn dtype_of(&self, name: &str) -> Option<ColumnType> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.dtype)
    }

    /// Compare column names only; dtypes play no part.
    ///
    /// A repeated header name never matches, even when the set of names does.
    pub fn compare(&self, actual: &[String]) -> SchemaComparison {
        let expected = self.column_names();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for name in actual {
            *counts.entry(name.as_str()).or_default() += 1;
        }
        let actual_set: BTreeSet<&str> = counts.keys().copied().collect();
        SchemaComparison {
            duplicated: counts
                .iter()
                .filter(|(_, n)| **n > 1)
                .map(|(name, _)| name.to_string())
                .collect(),
            missing: expected
                .difference(&actual_set)
                .map(|s| s.to_string())
                .collect(),
            unexpected: actual_set
                .difference(&expected)
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Infer a column type from a sample of raw cell values.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let mut has_int = false;
    let mut has_float = false;
    let mut has_bool = false;
    let mut has_string = false;
    let mut seen = false;

    for raw in values {
        let v = raw.trim();
        if v.is_empty() {
            continue;
        }
        seen = true;
        if v.parse::<i64>().is_ok() {
            has_int = true;
        } else if v.parse::<f64>().is_ok() {
            has_float = true;
        } else if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false") {
            has_bool = true;
        } else {
            has_string = true;
        }
    }

    if !seen {
        return ColumnType::Unknown;
    }
    if has_string || (has_bool && (has_int || has_float)) {
        return ColumnType::Object;
    }
    if has_float {
        return ColumnType::Float64;
    }
    if has_int {
        return ColumnType::Int64;
    }
    ColumnType::Bool
}
