//! FieldValidator: applies the rule registry to a parsed record.
//!
//! Every rule is evaluated against every field it targets; a failure on one
//! field never stops evaluation of the others. Failures discount the field's
//! confidence multiplicatively, check errors become `type_mismatch` issues and
//! leave confidence alone. Nothing here returns an error.

use crate::rules::{RuleOutcome, RuleRegistry, REQUIRED_RULE_ID};
use crate::types::{
    clamp_unit, ExtractionRecord, IssueKind, QaReport, RecordMetadata, ValidationIssue,
};

/// A record that has been through validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    record: ExtractionRecord,
}

impl ValidatedRecord {
    pub fn record(&self) -> &ExtractionRecord {
        &self.record
    }

    pub fn qa(&self) -> &QaReport {
        &self.record.qa
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.record.qa.issues
    }

    pub fn into_record(self) -> ExtractionRecord {
        self.record
    }
}

/// Applies a [`RuleRegistry`] to records.
#[derive(Debug, Clone, Default)]
pub struct FieldValidator {
    registry: RuleRegistry,
}

impl FieldValidator {
    pub fn new(registry: RuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RuleRegistry {
        &mut self.registry
    }

    /// Validate a record.
    ///
    /// Confidences are recomputed from each field's extracted confidence and
    /// the QA report is rebuilt, so validating an already-validated record
    /// with the same rules and metadata yields the same result.
    pub fn validate(&self, record: &ExtractionRecord, metadata: &RecordMetadata) -> ValidatedRecord {
        let mut record = record.clone();
        let mut qa = QaReport::default();

        for (index, field) in record.fields.iter_mut().enumerate() {
            let base = field.extracted_confidence();
            field.extracted_confidence = Some(base);
            let mut confidence = base;

            for rule in self.registry.iter().filter(|r| r.applies(field)) {
                match rule.evaluate(field) {
                    RuleOutcome::Passed => qa.passed_rules.push(rule.id.clone()),
                    RuleOutcome::Failed { kind, message } => {
                        tracing::debug!(rule = %rule.id, field = %field.name, "rule failed");
                        confidence *= rule.penalty();
                        qa.failed_rules.push(rule.id.clone());
                        qa.issues.push(ValidationIssue {
                            field_name: field.name.clone(),
                            field_index: Some(index),
                            rule_id: rule.id.clone(),
                            issue_kind: kind,
                            message,
                        });
                    }
                    RuleOutcome::Errored(e) => {
                        tracing::debug!(rule = %rule.id, field = %field.name, error = %e, "rule could not be evaluated");
                        qa.failed_rules.push(rule.id.clone());
                        qa.issues.push(ValidationIssue {
                            field_name: field.name.clone(),
                            field_index: Some(index),
                            rule_id: rule.id.clone(),
                            issue_kind: IssueKind::TypeMismatch,
                            message: format!("{}: {}", field.name, e),
                        });
                    }
                }
            }

            field.confidence = clamp_unit(confidence);
        }

        if let Some(required) = metadata.required() {
            check_presence(&record, required, &mut qa);
        }

        qa.notes = if qa.issues.is_empty() {
            "all rules passed".to_string()
        } else {
            qa.issues
                .iter()
                .map(|i| i.message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        };

        record.overall_confidence = record.mean_field_confidence();
        record.qa = qa;

        ValidatedRecord { record }
    }
}

/// Presence rule: each required name needs at least one field with a value.
fn check_presence(record: &ExtractionRecord, required: &[String], qa: &mut QaReport) {
    for name in required {
        let instances: Vec<_> = record.fields_named(name).collect();

        if instances.iter().any(|(_, f)| f.has_value()) {
            qa.passed_rules.push(REQUIRED_RULE_ID.to_string());
            continue;
        }

        qa.failed_rules.push(REQUIRED_RULE_ID.to_string());

        if instances.is_empty() {
            qa.issues.push(ValidationIssue {
                field_name: name.clone(),
                field_index: None,
                rule_id: REQUIRED_RULE_ID.to_string(),
                issue_kind: IssueKind::MissingRequired,
                message: format!("{}: required field is missing", name),
            });
        } else {
            for (index, field) in instances {
                qa.issues.push(ValidationIssue {
                    field_name: field.name.clone(),
                    field_index: Some(index),
                    rule_id: REQUIRED_RULE_ID.to_string(),
                    issue_kind: IssueKind::MissingRequired,
                    message: format!("{}: required field has no value", field.name),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::AMOUNT_RULE_ID;
    use crate::types::{Field, ValueKind};

    fn invoice(fields: Vec<Field>) -> ExtractionRecord {
        ExtractionRecord::new("invoice", fields)
    }

    #[test]
    fn test_valid_amount_unmodified() {
        let record = invoice(vec![Field::new("Total Amount", Some("12.5"), 0.9)]);
        let validated = FieldValidator::default().validate(&record, &RecordMetadata::new());

        assert_eq!(validated.record().fields[0].confidence, 0.9);
        assert_eq!(validated.qa().passed_rules, vec![AMOUNT_RULE_ID]);
        assert!(validated.qa().failed_rules.is_empty());
        assert_eq!(validated.qa().notes, "all rules passed");
    }

    #[test]
    fn test_invalid_amount_penalized_once() {
        let record = invoice(vec![Field::new("Total Amount", Some("12.500"), 0.9)]);
        let validated = FieldValidator::default().validate(&record, &RecordMetadata::new());

        assert!((validated.record().fields[0].confidence - 0.63).abs() < 1e-12);
        assert_eq!(validated.issues().len(), 1);
        assert_eq!(validated.issues()[0].issue_kind, IssueKind::PatternMismatch);
        assert_eq!(validated.qa().failed_rules, vec![AMOUNT_RULE_ID]);
    }

    #[test]
    fn test_non_amount_fields_untouched() {
        let record = invoice(vec![Field::new("Vendor Name", Some("ACME"), 0.6)]);
        let validated = FieldValidator::default().validate(&record, &RecordMetadata::new());

        assert_eq!(validated.record().fields[0].confidence, 0.6);
        assert!(validated.qa().passed_rules.is_empty());
        assert!(validated.issues().is_empty());
    }

    #[test]
    fn test_failure_does_not_short_circuit() {
        let record = invoice(vec![
            Field::new("Total Amount", Some("abc"), 1.0),
            Field::new("Tax Amount", Some("1.20"), 1.0),
        ]);
        let validated = FieldValidator::default().validate(&record, &RecordMetadata::new());

        assert!((validated.record().fields[0].confidence - 0.7).abs() < 1e-12);
        assert_eq!(validated.record().fields[1].confidence, 1.0);
        assert_eq!(validated.qa().passed_rules.len(), 1);
        assert_eq!(validated.qa().failed_rules.len(), 1);
    }

    #[test]
    fn test_duplicate_names_validated_independently() {
        let record = invoice(vec![
            Field::new("Amount", Some("10.00"), 0.8),
            Field::new("Amount", Some("ten"), 0.8),
        ]);
        let validated = FieldValidator::default().validate(&record, &RecordMetadata::new());

        assert_eq!(validated.record().fields[0].confidence, 0.8);
        assert!((validated.record().fields[1].confidence - 0.56).abs() < 1e-12);
        assert_eq!(validated.issues()[0].field_index, Some(1));
    }

    #[test]
    fn test_structured_value_is_type_mismatch() {
        let record = invoice(vec![
            Field::new("Total Amount", Some(r#"{"v":1}"#), 0.9).with_kind(ValueKind::Structured),
        ]);
        let validated = FieldValidator::default().validate(&record, &RecordMetadata::new());

        assert_eq!(validated.record().fields[0].confidence, 0.9);
        assert_eq!(validated.issues()[0].issue_kind, IssueKind::TypeMismatch);
    }

    #[test]
    fn test_missing_required_field() {
        let record = invoice(vec![Field::new("Date", Some("2024-01-01"), 0.8)]);
        let metadata = RecordMetadata::new().with_required_fields(["date", "Invoice Number"]);
        let validated = FieldValidator::default().validate(&record, &metadata);

        let issues = validated.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_kind, IssueKind::MissingRequired);
        assert_eq!(issues[0].field_name, "Invoice Number");
        assert_eq!(issues[0].field_index, None);
        assert_eq!(validated.qa().passed_rules, vec![REQUIRED_RULE_ID]);
        assert_eq!(validated.qa().failed_rules, vec![REQUIRED_RULE_ID]);
        // Presence does not touch confidence.
        assert_eq!(validated.record().fields[0].confidence, 0.8);
    }

    #[test]
    fn test_required_field_without_value() {
        let record = invoice(vec![Field::new("Invoice Number", None, 0.4)]);
        let metadata = RecordMetadata::new().with_required_fields(["Invoice Number"]);
        let validated = FieldValidator::default().validate(&record, &metadata);

        assert_eq!(validated.issues()[0].field_index, Some(0));
        assert!(validated.qa().notes.contains("has no value"));
    }

    #[test]
    fn test_revalidation_is_noop() {
        let record = invoice(vec![
            Field::new("Total Amount", Some("12.500"), 0.9),
            Field::new("Date", None, 0.5),
        ]);
        let metadata = RecordMetadata::new().with_required_fields(["Date"]);
        let validator = FieldValidator::default();

        let once = validator.validate(&record, &metadata);
        let twice = validator.validate(once.record(), &metadata);

        assert_eq!(once, twice);
        assert!((twice.record().fields[0].confidence - 0.63).abs() < 1e-12);
    }

    #[test]
    fn test_overall_tracks_field_confidences() {
        let record = invoice(vec![
            Field::new("Total Amount", Some("x"), 1.0),
            Field::new("Date", Some("2024-01-01"), 0.5),
        ]);
        let validated = FieldValidator::default().validate(&record, &RecordMetadata::new());
        assert!((validated.record().overall_confidence - 0.6).abs() < 1e-12);
    }
}
