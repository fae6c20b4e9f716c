//! The full pipeline: parse → validate → score.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::config::{ConfigError, EngineConfig};
use crate::payload::{ParseError, RecordParser};
use crate::rules::Rule;
use crate::scorer::{ConfidenceScorer, ScoreWeights, ScoredRecord};
use crate::types::{ExtractionRecord, RecordMetadata};
use crate::validator::FieldValidator;

/// Result of processing one payload.
///
/// Serializes to the scored record, or to `{"error": ..., "raw": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Scored(ScoredRecord),
    Failed(ParseError),
}

impl Outcome {
    pub fn is_scored(&self) -> bool {
        matches!(self, Outcome::Scored(_))
    }

    pub fn scored(&self) -> Option<&ScoredRecord> {
        match self {
            Outcome::Scored(scored) => Some(scored),
            Outcome::Failed(_) => None,
        }
    }

    pub fn record(&self) -> Option<&ExtractionRecord> {
        self.scored().map(ScoredRecord::record)
    }

    pub fn error(&self) -> Option<&ParseError> {
        match self {
            Outcome::Scored(_) => None,
            Outcome::Failed(err) => Some(err),
        }
    }

    pub fn to_json_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Scored(scored) => scored.record().serialize(serializer),
            Outcome::Failed(err) => err.to_payload().serialize(serializer),
        }
    }
}

/// Parser, validator and scorer configured together.
///
/// The engine keeps no per-record state; one instance can serve any number of
/// records, including concurrently.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    parser: RecordParser,
    validator: FieldValidator,
    scorer: ConfidenceScorer,
    required_fields: BTreeMap<String, Vec<String>>,
}

impl Engine {
    /// Engine with built-in rules and default weights.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            parser: RecordParser::new(config.parser.clone()),
            validator: FieldValidator::new(config.build_registry()?),
            scorer: ConfidenceScorer::new(config.weights)
                .with_default_ocr_confidence(config.default_ocr_confidence),
            required_fields: config
                .required_fields
                .iter()
                .map(|(doc_type, fields)| (normalize_doc_type(doc_type), fields.clone()))
                .collect(),
        })
    }

    pub fn parser(&self) -> &RecordParser {
        &self.parser
    }

    pub fn validator(&self) -> &FieldValidator {
        &self.validator
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    pub fn weights(&self) -> &ScoreWeights {
        self.scorer.weights()
    }

    /// Adjust named weights, clamping each to [0, 1].
    pub fn adjust_weights<I, S>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        self.scorer.adjust_weights(updates);
    }

    pub fn set_weights(&mut self, weights: ScoreWeights) {
        self.scorer.set_weights(weights);
    }

    /// Add a rule to the registry, replacing one with the same id.
    pub fn register_rule(&mut self, rule: Rule) {
        self.validator.registry_mut().register(rule);
    }

    /// Metadata with the required-field list filled in from configuration when
    /// the caller supplied none.
    pub fn resolve_metadata(&self, doc_type: &str, metadata: &RecordMetadata) -> RecordMetadata {
        let mut resolved = metadata.clone();
        if resolved.required().is_none() {
            if let Some(fields) = self.required_fields.get(&normalize_doc_type(doc_type)) {
                resolved.required_fields = Some(fields.clone());
            }
        }
        resolved
    }

    /// Parse, validate and score a raw payload.
    pub fn process(&self, raw: &str, metadata: &RecordMetadata) -> Outcome {
        match self.parser.parse(raw) {
            Ok(record) => Outcome::Scored(self.process_record(&record, metadata)),
            Err(err) => {
                tracing::warn!(error = %err, raw_len = raw.len(), "payload could not be parsed");
                Outcome::Failed(err)
            }
        }
    }

    /// Validate and score an already parsed record.
    pub fn process_record(&self, record: &ExtractionRecord, metadata: &RecordMetadata) -> ScoredRecord {
        let metadata = self.resolve_metadata(&record.doc_type, metadata);
        let validated = self.validator.validate(record, &metadata);
        let scored = self.scorer.apply(validated, &metadata);

        tracing::debug!(
            doc_type = %scored.record().doc_type,
            fields = scored.record().fields.len(),
            failed_rules = scored.record().qa.failed_rules.len(),
            overall = scored.overall_confidence(),
            "processed record"
        );

        scored
    }
}

fn normalize_doc_type(doc_type: &str) -> String {
    doc_type.trim().to_lowercase()
}
