//! Core types for docqa records.

use serde::{Deserialize, Serialize};

/// Clamp a confidence-like value into `[0.0, 1.0]`.
///
/// NaN maps to 0.0 so that no downstream arithmetic ever sees it.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Where a field was found in the source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    /// 1-based page number
    pub page: u32,

    /// Bounding box as `[x1, y1, x2, y2]`
    pub bbox: [f64; 4],
}

impl Default for Source {
    fn default() -> Self {
        Self {
            page: 1,
            bbox: [0.0; 4],
        }
    }
}

/// JSON kind of the value the extractor produced for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// A JSON string (or null)
    #[default]
    Text,
    /// A JSON number, carried as its JSON text
    Number,
    /// A JSON boolean, carried as its JSON text
    Boolean,
    /// A JSON object or array, carried as compact JSON text
    Structured,
}

impl ValueKind {
    /// Whether value-checking rules can interpret this kind.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, ValueKind::Structured)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ValueKind::Text)
    }
}

/// A single extracted key/value pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    /// Field name as reported by the extractor (non-empty)
    pub name: String,

    /// Extracted value; `None` means "not found"
    #[serde(default)]
    pub value: Option<String>,

    /// Confidence in [0, 1], discounted by failing rules
    #[serde(default)]
    pub confidence: f64,

    /// Location in the source document
    #[serde(default)]
    pub source: Source,

    /// Confidence as reported by the extractor, before any penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) extracted_confidence: Option<f64>,

    /// Omitted for plain text values
    #[serde(default, rename = "value_kind", skip_serializing_if = "ValueKind::is_text")]
    pub(crate) kind: ValueKind,
}

impl Field {
    /// Create a text field.
    pub fn new(name: impl Into<String>, value: Option<&str>, confidence: f64) -> Self {
        let confidence = clamp_unit(confidence);
        Self {
            name: name.into(),
            value: value.map(str::to_string),
            confidence,
            source: Source::default(),
            extracted_confidence: Some(confidence),
            kind: ValueKind::Text,
        }
    }

    /// Set the value kind (used by the parser for non-string JSON values).
    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the source location.
    pub fn with_source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    /// JSON kind of the raw value.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Confidence the extractor reported, before validation penalties.
    ///
    /// A field without a recorded extracted confidence (for example one built
    /// by hand as JSON) treats its current confidence as the extracted one.
    pub fn extracted_confidence(&self) -> f64 {
        self.extracted_confidence.unwrap_or(self.confidence)
    }

    /// Whether the field carries a non-blank value.
    pub fn has_value(&self) -> bool {
        self.value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    /// Case-insensitive, trimmed name comparison.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.trim().eq_ignore_ascii_case(name.trim())
    }
}

/// Category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PatternMismatch,
    TypeMismatch,
    MissingRequired,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::PatternMismatch => "pattern_mismatch",
            IssueKind::TypeMismatch => "type_mismatch",
            IssueKind::MissingRequired => "missing_required",
        }
    }
}

/// A field-level, non-fatal validation finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    /// Field the issue refers to
    pub field_name: String,

    /// Position of the field instance, absent when the field is missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_index: Option<usize>,

    /// Rule that produced the issue
    pub rule_id: String,

    pub issue_kind: IssueKind,

    pub message: String,
}

/// Which rules passed and failed for a record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QaReport {
    #[serde(default)]
    pub passed_rules: Vec<String>,

    #[serde(default)]
    pub failed_rules: Vec<String>,

    #[serde(default)]
    pub notes: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
}

impl QaReport {
    /// Issues attached to the field at `index`.
    pub fn issues_for(&self, index: usize) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.field_index == Some(index))
    }

    /// Whether the field at `index` has an issue of the given kind.
    pub fn field_has(&self, index: usize, kind: IssueKind) -> bool {
        self.issues_for(index).any(|issue| issue.issue_kind == kind)
    }

    /// Count issues of a kind, across all fields.
    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.issue_kind == kind).count()
    }
}

/// The canonical record threaded through parsing, validation and scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionRecord {
    /// Document category supplied by the classifier
    pub doc_type: String,

    /// Extracted fields, in extractor order (duplicates allowed)
    pub fields: Vec<Field>,

    /// Overall confidence in [0, 1]
    #[serde(default)]
    pub overall_confidence: f64,

    #[serde(default)]
    pub qa: QaReport,
}

impl ExtractionRecord {
    /// Create a record and derive its overall confidence from the fields.
    pub fn new(doc_type: impl Into<String>, fields: Vec<Field>) -> Self {
        let mut record = Self {
            doc_type: doc_type.into(),
            fields,
            overall_confidence: 0.0,
            qa: QaReport::default(),
        };
        record.overall_confidence = record.mean_field_confidence();
        record
    }

    /// Mean of the field confidences, 0.0 when there are no fields.
    pub fn mean_field_confidence(&self) -> f64 {
        if self.fields.is_empty() {
            return 0.0;
        }
        let total: f64 = self.fields.iter().map(|f| f.confidence).sum();
        clamp_unit(total / self.fields.len() as f64)
    }

    /// All field instances whose name matches `name`.
    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = (usize, &'a Field)> {
        self.fields
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.name_matches(name))
    }

    /// Serialize to the output JSON shape.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Per-record metadata supplied by the caller alongside the payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordMetadata {
    /// Confidence of the upstream text extraction (OCR / PDF)
    #[serde(default)]
    pub ocr_confidence: Option<f64>,

    /// Fields that must be present for this record
    #[serde(default)]
    pub required_fields: Option<Vec<String>>,
}

impl RecordMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ocr_confidence(mut self, confidence: f64) -> Self {
        self.ocr_confidence = Some(confidence);
        self
    }

    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// The required-field list, if one was supplied and is non-empty.
    pub fn required(&self) -> Option<&[String]> {
        self.required_fields
            .as_deref()
            .filter(|fields| !fields.is_empty())
    }
}
