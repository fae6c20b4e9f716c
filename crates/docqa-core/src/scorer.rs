//! ConfidenceScorer: blends independent score components into one confidence.
//!
//! Up to five components are computed; each is only included when the data it
//! needs exists. The final score is the weighted mean over the included
//! components, so weights need not sum to 1:
//!
//! | component | default weight | included when |
//! |---|---|---|
//! | `ocr_confidence` | 0.3 | always |
//! | `field_presence` | 0.2 | a non-empty required-field list is supplied |
//! | `validation` | 0.3 | the record has fields |
//! | `data_type` | 0.1 | the record has fields |
//! | `pattern_match` | 0.1 | the record has fields |
//!
//! When nothing qualifies, or the included weights sum to zero, the score is
//! 0.0. That is a degenerate score, not an error.

use serde::{Deserialize, Serialize};

use crate::types::{clamp_unit, ExtractionRecord, IssueKind, QaReport, RecordMetadata};
use crate::validator::ValidatedRecord;

/// Extraction confidence assumed when the metadata carries none.
pub const DEFAULT_OCR_CONFIDENCE: f64 = 0.8;

/// The score components, in breakdown order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    OcrConfidence,
    FieldPresence,
    Validation,
    DataType,
    PatternMatch,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::OcrConfidence,
        ComponentKind::FieldPresence,
        ComponentKind::Validation,
        ComponentKind::DataType,
        ComponentKind::PatternMatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::OcrConfidence => "ocr_confidence",
            ComponentKind::FieldPresence => "field_presence",
            ComponentKind::Validation => "validation",
            ComponentKind::DataType => "data_type",
            ComponentKind::PatternMatch => "pattern_match",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            ComponentKind::OcrConfidence => "Confidence of the upstream text extraction",
            ComponentKind::FieldPresence => "Proportion of required fields that were extracted",
            ComponentKind::Validation => "Proportion of fields that passed validation",
            ComponentKind::DataType => "Proportion of fields with correct data types",
            ComponentKind::PatternMatch => "Proportion of fields that matched expected patterns",
        }
    }
}

/// Weight per component. Each weight lies in [0, 1]; the table as a whole is
/// renormalized at scoring time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreWeights {
    pub ocr_confidence: f64,
    pub field_presence: f64,
    pub validation: f64,
    pub data_type: f64,
    pub pattern_match: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            ocr_confidence: 0.3,
            field_presence: 0.2,
            validation: 0.3,
            data_type: 0.1,
            pattern_match: 0.1,
        }
    }
}

impl ScoreWeights {
    pub fn get(&self, kind: ComponentKind) -> f64 {
        match kind {
            ComponentKind::OcrConfidence => self.ocr_confidence,
            ComponentKind::FieldPresence => self.field_presence,
            ComponentKind::Validation => self.validation,
            ComponentKind::DataType => self.data_type,
            ComponentKind::PatternMatch => self.pattern_match,
        }
    }

    /// Set one weight, clamped to [0, 1].
    pub fn set(&mut self, kind: ComponentKind, weight: f64) {
        let weight = clamp_unit(weight);
        match kind {
            ComponentKind::OcrConfidence => self.ocr_confidence = weight,
            ComponentKind::FieldPresence => self.field_presence = weight,
            ComponentKind::Validation => self.validation = weight,
            ComponentKind::DataType => self.data_type = weight,
            ComponentKind::PatternMatch => self.pattern_match = weight,
        }
    }

    /// Apply named updates. Unknown names are ignored.
    pub fn adjust<I, S>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        for (name, weight) in updates {
            match ComponentKind::from_name(name.as_ref()) {
                Some(kind) => self.set(kind, weight),
                None => tracing::debug!(component = name.as_ref(), "ignoring unknown weight"),
            }
        }
    }

    /// Every weight clamped to [0, 1].
    pub fn clamped(mut self) -> Self {
        for kind in ComponentKind::ALL {
            let weight = self.get(kind);
            self.set(kind, weight);
        }
        self
    }
}

/// One weighted sub-measure of the overall confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub name: ComponentKind,
    pub weight: f64,
    /// Raw sub-score before weighting
    pub value: f64,
    pub weighted_value: f64,
    pub description: String,
}

impl ScoreComponent {
    pub fn new(name: ComponentKind, weight: f64, value: f64) -> Self {
        let weight = clamp_unit(weight);
        let value = clamp_unit(value);
        Self {
            name,
            weight,
            value,
            weighted_value: weight * value,
            description: name.description().to_string(),
        }
    }
}

/// Weighted mean of the components, clamped to [0, 1]; 0.0 when the total
/// weight is zero.
pub fn composite(components: &[ScoreComponent]) -> f64 {
    let total_weight: f64 = components.iter().map(|c| c.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted_sum: f64 = components.iter().map(|c| c.weight * c.value).sum();
    clamp_unit(weighted_sum / total_weight)
}

/// Result of a scoring call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub overall_confidence: f64,
    pub breakdown: Vec<ScoreComponent>,
}

/// A record that has been scored. Terminal stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    record: ExtractionRecord,
    breakdown: Vec<ScoreComponent>,
}

impl ScoredRecord {
    pub fn record(&self) -> &ExtractionRecord {
        &self.record
    }

    pub fn overall_confidence(&self) -> f64 {
        self.record.overall_confidence
    }

    pub fn breakdown(&self) -> &[ScoreComponent] {
        &self.breakdown
    }

    pub fn into_record(self) -> ExtractionRecord {
        self.record
    }

    pub fn into_parts(self) -> (ExtractionRecord, Vec<ScoreComponent>) {
        (self.record, self.breakdown)
    }
}

/// Computes composite confidence scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceScorer {
    weights: ScoreWeights,
    default_ocr_confidence: f64,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(ScoreWeights::default())
    }
}

impl ConfidenceScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self {
            weights: weights.clamped(),
            default_ocr_confidence: DEFAULT_OCR_CONFIDENCE,
        }
    }

    /// Override the extraction confidence assumed when metadata has none.
    pub fn with_default_ocr_confidence(mut self, confidence: f64) -> Self {
        self.default_ocr_confidence = clamp_unit(confidence);
        self
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Replace the weight table. Each weight is clamped independently.
    pub fn set_weights(&mut self, weights: ScoreWeights) {
        self.weights = weights.clamped();
    }

    /// Adjust named weights. Each weight is clamped independently; unknown
    /// names are ignored.
    pub fn adjust_weights<I, S>(&mut self, updates: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        self.weights.adjust(updates);
    }

    /// Score a record against its QA report.
    pub fn score(&self, record: &ExtractionRecord, qa: &QaReport, metadata: &RecordMetadata) -> Score {
        let mut breakdown = Vec::with_capacity(ComponentKind::ALL.len());

        let ocr = metadata.ocr_confidence.unwrap_or(self.default_ocr_confidence);
        breakdown.push(self.component(ComponentKind::OcrConfidence, ocr));

        if let Some(required) = metadata.required() {
            let present = required
                .iter()
                .filter(|name| record.fields_named(name).any(|(_, f)| f.has_value()))
                .count();
            let presence = present as f64 / required.len() as f64;
            breakdown.push(self.component(ComponentKind::FieldPresence, presence));
        }

        let total = record.fields.len();
        if total > 0 {
            let clean = (0..total).filter(|&i| qa.issues_for(i).next().is_none()).count();
            let type_errors = (0..total)
                .filter(|&i| qa.field_has(i, IssueKind::TypeMismatch))
                .count();
            let pattern_errors = (0..total)
                .filter(|&i| qa.field_has(i, IssueKind::PatternMismatch))
                .count();

            let total = total as f64;
            breakdown.push(self.component(ComponentKind::Validation, clean as f64 / total));
            breakdown.push(self.component(ComponentKind::DataType, 1.0 - type_errors as f64 / total));
            breakdown.push(self.component(ComponentKind::PatternMatch, 1.0 - pattern_errors as f64 / total));
        }

        let overall_confidence = composite(&breakdown);
        tracing::debug!(
            doc_type = %record.doc_type,
            components = breakdown.len(),
            overall = overall_confidence,
            "scored record"
        );

        Score {
            overall_confidence,
            breakdown,
        }
    }

    /// Score a validated record, producing the terminal stage.
    pub fn apply(&self, validated: ValidatedRecord, metadata: &RecordMetadata) -> ScoredRecord {
        let mut record = validated.into_record();
        let score = self.score(&record, &record.qa, metadata);
        record.overall_confidence = score.overall_confidence;

        ScoredRecord {
            record,
            breakdown: score.breakdown,
        }
    }

    fn component(&self, kind: ComponentKind, value: f64) -> ScoreComponent {
        ScoreComponent::new(kind, self.weights.get(kind), value)
    }
}
