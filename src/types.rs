// src/types.rs

use std::fmt;

use serde::Deserialize;

/// Format of the files staged from the object store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    #[serde(alias = "JSON")]
    Json,
    #[serde(alias = "CSV")]
    Csv,
    #[serde(alias = "PARQUET")]
    Parquet,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileFormat::Json => "JSON",
            FileFormat::Csv => "CSV",
            FileFormat::Parquet => "PARQUET",
        };
        f.write_str(s)
    }
}
