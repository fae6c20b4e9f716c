//! Payload parsing from extractor output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{clamp_unit, ExtractionRecord, Field, Source, ValueKind};

use super::schema::validate_payload_schema;

/// Why a payload could not be turned into a record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseFailure {
    #[error("payload is not valid JSON: {0}")]
    Syntax(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing required key: {0}")]
    MissingKey(&'static str),

    #[error("payload does not match the extraction schema: {0}")]
    Schema(String),

    #[error("payload has an unexpected shape: {0}")]
    Shape(String),
}

/// A payload that could not be parsed. The raw text is kept verbatim.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}")]
pub struct ParseError {
    pub kind: ParseFailure,
    pub raw: String,
}

impl ParseError {
    fn new(kind: ParseFailure, raw: &str) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
        }
    }

    /// The `{"error", "raw"}` shape returned across the boundary.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: self.kind.to_string(),
            raw: self.raw.clone(),
        }
    }
}

/// Serialized form of a [`ParseError`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub error: String,
    pub raw: String,
}

/// Parser behaviour switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParserOptions {
    /// Retry on the outermost `{...}` slice when the whole text is not JSON
    #[serde(default = "default_lenient")]
    pub lenient: bool,
}

fn default_lenient() -> bool {
    true
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self { lenient: true }
    }
}

#[derive(Deserialize)]
struct RawPayload {
    doc_type: String,
    fields: Vec<RawField>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    source: Option<RawSource>,
}

#[derive(Deserialize)]
struct RawSource {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    bbox: Option<[f64; 4]>,
}

impl RawField {
    fn into_field(self) -> Field {
        let (value, kind) = match self.value {
            Value::Null => (None, ValueKind::Text),
            Value::String(s) => (Some(s), ValueKind::Text),
            Value::Number(n) => (Some(n.to_string()), ValueKind::Number),
            Value::Bool(b) => (Some(b.to_string()), ValueKind::Boolean),
            other => (Some(other.to_string()), ValueKind::Structured),
        };

        let source = self
            .source
            .map(|s| Source {
                page: s.page.unwrap_or(1).max(1),
                bbox: s.bbox.unwrap_or([0.0; 4]),
            })
            .unwrap_or_default();

        let confidence = clamp_unit(self.confidence.unwrap_or(0.0));
        let mut field = Field::new(self.name, None, confidence)
            .with_kind(kind)
            .with_source(source);
        field.value = value;
        field
    }
}

/// Turns extractor output into an [`ExtractionRecord`].
#[derive(Debug, Clone, Default)]
pub struct RecordParser {
    options: ParserOptions,
}

impl RecordParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parse a raw payload.
    ///
    /// Defaults: missing `confidence` is 0.0, missing `source` is page 1 with
    /// a zeroed box. A reported `overall_confidence` is ignored and
    /// recomputed from the fields.
    pub fn parse(&self, raw: &str) -> Result<ExtractionRecord, ParseError> {
        let value = self.decode(raw).map_err(|kind| ParseError::new(kind, raw))?;
        self.build(value).map_err(|kind| ParseError::new(kind, raw))
    }

    fn decode(&self, raw: &str) -> Result<Value, ParseFailure> {
        let first_error = match serde_json::from_str::<Value>(raw) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if self.options.lenient {
            if let Some(slice) = outer_object(raw) {
                if let Ok(value) = serde_json::from_str::<Value>(slice) {
                    tracing::debug!("recovered JSON object from surrounding text");
                    return Ok(value);
                }
            }
        }

        Err(ParseFailure::Syntax(first_error.to_string()))
    }

    fn build(&self, value: Value) -> Result<ExtractionRecord, ParseFailure> {
        let object = value.as_object().ok_or(ParseFailure::NotAnObject)?;

        for key in ["doc_type", "fields"] {
            if !object.contains_key(key) {
                return Err(ParseFailure::MissingKey(key));
            }
        }

        validate_payload_schema(&value).map_err(|errors| ParseFailure::Schema(errors.join("; ")))?;

        let payload: RawPayload =
            serde_json::from_value(value).map_err(|e| ParseFailure::Shape(e.to_string()))?;

        let fields = payload.fields.into_iter().map(RawField::into_field).collect();
        Ok(ExtractionRecord::new(payload.doc_type, fields))
    }
}

/// The slice from the first `{` to the last `}`, if any.
fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_PAYLOAD: &str = r#"{
        "doc_type": "invoice",
        "fields": [
            {"name": "Total Amount", "value": "12.50", "confidence": 0.9},
            {"name": "Date", "value": "2024-01-01", "confidence": 0.8}
        ],
        "overall_confidence": 0.2
    }"#;

    #[test]
    fn test_parse_valid_payload() {
        let record = RecordParser::default().parse(VALID_PAYLOAD).unwrap();
        assert_eq!(record.doc_type, "invoice");
        assert_eq!(record.fields.len(), 2);
        assert_eq!(record.fields[0].value.as_deref(), Some("12.50"));
        // Reported overall confidence is replaced by the field mean.
        assert!((record.overall_confidence - 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_defaults_applied() {
        let raw = r#"{"doc_type": "invoice", "fields": [{"name": "Date"}]}"#;
        let record = RecordParser::default().parse(raw).unwrap();
        let field = &record.fields[0];

        assert_eq!(field.confidence, 0.0);
        assert_eq!(field.value, None);
        assert_eq!(field.source, Source::default());
    }

    #[test]
    fn test_not_json_keeps_raw() {
        let err = RecordParser::default().parse("not json").unwrap_err();
        assert!(matches!(err.kind, ParseFailure::Syntax(_)));
        assert_eq!(err.raw, "not json");

        let payload = err.to_payload();
        assert_eq!(payload.raw, "not json");
        assert!(!payload.error.is_empty());
    }

    #[test]
    fn test_missing_fields_key() {
        let raw = r#"{"doc_type": "invoice"}"#;
        let err = RecordParser::default().parse(raw).unwrap_err();
        assert_eq!(err.kind, ParseFailure::MissingKey("fields"));
        assert_eq!(err.raw, raw);
    }

    #[test]
    fn test_array_is_not_an_object() {
        let err = RecordParser::default().parse("[1, 2, 3]").unwrap_err();
        assert_eq!(err.kind, ParseFailure::NotAnObject);
    }

    #[test]
    fn test_schema_violation() {
        let raw = r#"{"doc_type": "invoice", "fields": [{"value": "x"}]}"#;
        let err = RecordParser::default().parse(raw).unwrap_err();
        assert!(matches!(err.kind, ParseFailure::Schema(_)));
    }

    #[test]
    fn test_lenient_recovers_fenced_json() {
        let raw = format!("Here is the extraction:\n```json\n{}\n```", VALID_PAYLOAD);
        let record = RecordParser::default().parse(&raw).unwrap();
        assert_eq!(record.fields.len(), 2);
    }

    #[test]
    fn test_strict_rejects_fenced_json() {
        let raw = format!("```json\n{}\n```", VALID_PAYLOAD);
        let parser = RecordParser::new(ParserOptions { lenient: false });
        let err = parser.parse(&raw).unwrap_err();
        assert!(matches!(err.kind, ParseFailure::Syntax(_)));
        assert_eq!(err.raw, raw);
    }

    #[test]
    fn test_non_string_values() {
        let raw = r#"{"doc_type": "invoice", "fields": [
            {"name": "Total Amount", "value": 12.5, "confidence": 0.9},
            {"name": "Paid", "value": true, "confidence": 0.9},
            {"name": "Lines", "value": {"a": 1}, "confidence": 0.9}
        ]}"#;
        let record = RecordParser::default().parse(raw).unwrap();

        assert_eq!(record.fields[0].value.as_deref(), Some("12.5"));
        assert_eq!(record.fields[0].kind(), ValueKind::Number);
        assert_eq!(record.fields[1].value.as_deref(), Some("true"));
        assert_eq!(record.fields[2].kind(), ValueKind::Structured);
        assert_eq!(record.fields[2].value.as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_confidence_clamped() {
        let raw = r#"{"doc_type": "x", "fields": [
            {"name": "A", "value": "1", "confidence": 1.7},
            {"name": "B", "value": "1", "confidence": -3}
        ]}"#;
        let record = RecordParser::default().parse(raw).unwrap();
        assert_eq!(record.fields[0].confidence, 1.0);
        assert_eq!(record.fields[1].confidence, 0.0);
    }

    #[test]
    fn test_source_carried() {
        let raw = r#"{"doc_type": "x", "fields": [
            {"name": "A", "value": "1", "confidence": 0.5,
             "source": {"page": 3, "bbox": [1, 2, 3, 4]}}
        ]}"#;
        let record = RecordParser::default().parse(raw).unwrap();
        assert_eq!(record.fields[0].source.page, 3);
        assert_eq!(record.fields[0].source.bbox, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let parser = RecordParser::default();
        assert_eq!(parser.parse(VALID_PAYLOAD), parser.parse(VALID_PAYLOAD));
        assert_eq!(parser.parse("{oops"), parser.parse("{oops"));
    }
}
