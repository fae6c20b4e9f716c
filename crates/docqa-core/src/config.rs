//! Engine configuration from YAML/JSON.
//!
//! ```yaml
//! weights:
//!   ocr_confidence: 0.3
//!   validation: 0.4
//! default_ocr_confidence: 0.8
//! required_fields:
//!   invoice: ["Invoice Number", "Date", "Total Amount"]
//! rules:
//!   - id: date_format
//!     field_contains: date
//!     pattern: '^\d{4}-\d{2}-\d{2}$'
//!     penalty: 0.8
//! parser:
//!   lenient: true
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

use regex::Regex;

use crate::payload::ParserOptions;
use crate::rules::{FieldPredicate, Rule, RuleRegistry, REQUIRED_RULE_ID};
use crate::scorer::{ScoreWeights, DEFAULT_OCR_CONFIDENCE};

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid pattern for rule {rule_id}: {source}")]
    InvalidPattern {
        rule_id: String,
        #[source]
        source: regex::Error,
    },
}

/// A pattern rule declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// Unique identifier reported in the QA report
    pub id: String,

    /// Target fields whose name contains this (case-insensitive)
    #[serde(default)]
    pub field_contains: Option<String>,

    /// Target fields whose name equals this (case-insensitive)
    #[serde(default)]
    pub field_equals: Option<String>,

    /// Regex the value must match
    pub pattern: String,

    /// Confidence multiplier on failure
    #[serde(default = "default_penalty")]
    pub penalty: f64,
}

fn default_penalty() -> f64 {
    0.7
}

fn default_ocr_confidence() -> f64 {
    DEFAULT_OCR_CONFIDENCE
}

fn default_true() -> bool {
    true
}

impl RuleSpec {
    fn predicate(&self) -> FieldPredicate {
        match (&self.field_contains, &self.field_equals) {
            (Some(needle), _) => FieldPredicate::name_contains(needle.as_str()),
            (None, Some(name)) => FieldPredicate::name_equals(name.as_str()),
            (None, None) => FieldPredicate::Any,
        }
    }

    /// Compile into a registry rule.
    pub fn to_rule(&self) -> Result<Rule, ConfigError> {
        let pattern = Regex::new(&self.pattern).map_err(|source| ConfigError::InvalidPattern {
            rule_id: self.id.clone(),
            source,
        })?;
        Ok(Rule::pattern(self.id.clone(), self.predicate(), pattern, self.penalty))
    }
}

/// Everything the engine is configured with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Component weights, clamped to [0, 1] on load
    #[serde(default)]
    pub weights: ScoreWeights,

    /// Extraction confidence assumed when a record's metadata has none
    #[serde(default = "default_ocr_confidence")]
    pub default_ocr_confidence: f64,

    /// Required fields per document type
    #[serde(default)]
    pub required_fields: BTreeMap<String, Vec<String>>,

    /// Include the built-in rules (amount format)
    #[serde(default = "default_true")]
    pub builtin_rules: bool,

    /// Extra pattern rules, evaluated after the built-ins
    #[serde(default)]
    pub rules: Vec<RuleSpec>,

    #[serde(default)]
    pub parser: ParserOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            default_ocr_confidence: DEFAULT_OCR_CONFIDENCE,
            required_fields: BTreeMap::new(),
            builtin_rules: true,
            rules: Vec::new(),
            parser: ParserOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults plus required fields for the common document types.
    pub fn standard_document_types() -> Self {
        let mut required_fields = BTreeMap::new();
        let mut add = |doc_type: &str, fields: &[&str]| {
            required_fields.insert(
                doc_type.to_string(),
                fields.iter().map(|f| f.to_string()).collect(),
            );
        };

        add(
            "invoice",
            &["Invoice Number", "Date", "Vendor Name", "Total Amount", "Tax Amount"],
        );
        add(
            "medical_bill",
            &["Patient Name", "Bill Date", "Hospital Name", "Total Amount", "Insurance"],
        );
        add(
            "prescription",
            &["Patient Name", "Doctor Name", "Prescription Date", "Medications"],
        );
        add("other", &["Date", "Amount", "Key Information"]);

        Self {
            required_fields,
            ..Self::default()
        }
    }

    /// Parse a config from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.normalized()
    }

    /// Parse a config from JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.normalized()
    }

    /// Parse a config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a config file, choosing the format by extension (`.json` or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    /// Required fields configured for a document type.
    pub fn required_fields_for(&self, doc_type: &str) -> Option<&[String]> {
        let doc_type = doc_type.trim();
        self.required_fields
            .iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case(doc_type))
            .map(|(_, fields)| fields.as_slice())
    }

    /// Build the rule registry this config describes.
    pub fn build_registry(&self) -> Result<RuleRegistry, ConfigError> {
        let mut registry = if self.builtin_rules {
            RuleRegistry::builtin()
        } else {
            RuleRegistry::empty()
        };

        for spec in &self.rules {
            registry.register(spec.to_rule()?);
        }

        Ok(registry)
    }

    fn normalized(mut self) -> Result<Self, ConfigError> {
        let clamped = self.weights.clamped();
        if clamped != self.weights {
            tracing::warn!("configured weights outside [0, 1] were clamped");
            self.weights = clamped;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the config structure.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.default_ocr_confidence) {
            return Err(ConfigError::ValidationError(format!(
                "default_ocr_confidence must be within [0, 1], got {}",
                self.default_ocr_confidence
            )));
        }

        let mut seen = HashSet::new();
        for spec in &self.rules {
            if spec.id.trim().is_empty() {
                return Err(ConfigError::ValidationError("Rule id must not be empty".to_string()));
            }

            if spec.id == REQUIRED_RULE_ID {
                return Err(ConfigError::ValidationError(format!(
                    "Rule id {} is reserved",
                    REQUIRED_RULE_ID
                )));
            }

            if !seen.insert(spec.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate rule ID: {}",
                    spec.id
                )));
            }

            if spec.field_contains.is_some() && spec.field_equals.is_some() {
                return Err(ConfigError::ValidationError(format!(
                    "Rule {} sets both field_contains and field_equals",
                    spec.id
                )));
            }

            if !(0.0..=1.0).contains(&spec.penalty) {
                return Err(ConfigError::ValidationError(format!(
                    "Rule {} penalty must be within [0, 1], got {}",
                    spec.id, spec.penalty
                )));
            }

            spec.to_rule()?;
        }

        Ok(())
    }
}
