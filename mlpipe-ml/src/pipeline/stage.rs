//! The five pipeline stages, in execution order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Ingestion,
    Validation,
    Transformation,
    Training,
    Evaluation,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        Self::Ingestion,
        Self::Validation,
        Self::Transformation,
        Self::Training,
        Self::Evaluation,
    ];

    /// Name used in log banners.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ingestion => "Data Ingestion Stage",
            Self::Validation => "Data Validation Stage",
            Self::Transformation => "Data Transformation Stage",
            Self::Training => "Model Trainer Stage",
            Self::Evaluation => "Model Evaluation Stage",
        }
    }

    /// Short name accepted on the command line.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Ingestion => "ingest",
            Self::Validation => "validate",
            Self::Transformation => "transform",
            Self::Training => "train",
            Self::Evaluation => "evaluate",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.command_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|k| k.command_name()).collect();
                format!("unknown stage '{s}', expected one of: {}", names.join(", "))
            })
    }
}
