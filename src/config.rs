// Tunable knobs for ingestion and schema inference.
//
// Every heuristic threshold lives here instead of in the code that uses it,
// so a JSON file can override a single field and leave the rest at their
// defaults (`#[serde(default)]` on both structs).
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y-%m-%d %H:%M:%S",
    "%d-%m-%Y",
];

pub const DEFAULT_DATE_KEYWORDS: &[&str] = &["data", "date", "dt", "periodo", "mes", "ano"];

pub const DEFAULT_VALUE_KEYWORDS: &[&str] = &[
    "valor",
    "value",
    "total",
    "montante",
    "receita",
    "despesa",
    "custo",
    "preco",
    "quantidade",
];

pub const DEFAULT_CATEGORY_KEYWORDS: &[&str] = &[
    "categoria",
    "category",
    "tipo",
    "status",
    "segmento",
    "grupo",
    "classe",
    "classificacao",
];

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Substrings of a normalized column name that make it a date candidate.
    pub date_keywords: Vec<String>,
    /// Substrings of a normalized column name that make it a measure candidate.
    pub value_keywords: Vec<String>,
    pub category_keywords: Vec<String>,
    /// `chrono` format strings, tried in order.
    pub date_formats: Vec<String>,
    pub date_sample_size: usize,
    pub date_success_ratio: f64,
    pub numeric_sample_size: usize,
    pub numeric_success_ratio: f64,
    pub category_max_unique: usize,
    pub category_unique_ratio: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            date_keywords: owned(DEFAULT_DATE_KEYWORDS),
            value_keywords: owned(DEFAULT_VALUE_KEYWORDS),
            category_keywords: owned(DEFAULT_CATEGORY_KEYWORDS),
            date_formats: owned(DEFAULT_DATE_FORMATS),
            date_sample_size: 10,
            date_success_ratio: 0.5,
            numeric_sample_size: 20,
            numeric_success_ratio: 0.7,
            category_max_unique: 50,
            category_unique_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub inference: InferenceConfig,
    /// Text cells longer than this (in characters) are truncated.
    pub max_text_len: usize,
    /// Normalized column names dropped after coercion.
    pub noise_columns: Vec<String>,
    pub max_file_size_mb: u64,
    /// Most calendar buckets a temporal aggregation fills in before it
    /// falls back to populated buckets only.
    pub max_buckets: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig::default(),
            max_text_len: 1000,
            noise_columns: vec!["rota".to_string()],
            max_file_size_mb: 50,
            max_buckets: 10_000,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg = PipelineConfig::from_json_str(
            r#"{ "max_text_len": 20, "inference": { "date_success_ratio": 0.8 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.max_text_len, 20);
        assert_eq!(cfg.inference.date_success_ratio, 0.8);
        assert_eq!(cfg.inference.numeric_success_ratio, 0.7);
        assert_eq!(cfg.noise_columns, vec!["rota".to_string()]);
        assert_eq!(cfg.inference.date_formats.len(), 5);
        assert_eq!(cfg.max_buckets, 10_000);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            PipelineConfig::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
