//! # docqa-core
//!
//! Deterministic validation and confidence scoring for extracted document records.
//!
//! An upstream extractor (usually an LLM) turns document text into a loosely
//! structured JSON payload. This crate answers:
//! - Can the payload be trusted as a record at all?
//! - Which fields break their rules?
//! - How confident should a reviewer be in the result?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **Never faults**: Every payload yields a scored record or a structured error
//! 3. **Raw preserved**: A failed payload keeps its raw text for re-extraction
//! 4. **Stateless**: No state is kept between records
//!
//! ## Example
//!
//! ```rust
//! use docqa_core::{process, Outcome, RecordMetadata};
//!
//! let raw = r#"{"doc_type": "invoice",
//!               "fields": [{"name": "Total Amount", "value": "12.50", "confidence": 0.9}]}"#;
//!
//! match process(raw, &RecordMetadata::new()) {
//!     Outcome::Scored(scored) => println!("confidence {:.2}", scored.overall_confidence()),
//!     Outcome::Failed(err) => eprintln!("unparseable: {}", err),
//! }
//! ```

pub mod config;
pub mod engine;
pub mod payload;
pub mod rules;
pub mod scorer;
pub mod types;
pub mod validator;

// Re-export main types at crate root
pub use config::{ConfigError, EngineConfig, RuleSpec};
pub use engine::{Engine, Outcome};
pub use payload::{ErrorPayload, ParseError, ParseFailure, ParserOptions, RecordParser};
pub use rules::{Check, FieldPredicate, Rule, RuleError, RuleOutcome, RuleRegistry};
pub use scorer::{
    composite, ComponentKind, ConfidenceScorer, Score, ScoreComponent, ScoreWeights, ScoredRecord,
};
pub use types::{
    ExtractionRecord, Field, IssueKind, QaReport, RecordMetadata, Source, ValidationIssue,
    ValueKind,
};
pub use validator::{FieldValidator, ValidatedRecord};

/// Process a payload with the default engine.
///
/// Built-in rules, default weights, no configured required fields.
pub fn process(raw: &str, metadata: &RecordMetadata) -> Outcome {
    Engine::new().process(raw, metadata)
}
