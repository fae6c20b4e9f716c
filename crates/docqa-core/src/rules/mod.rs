//! Field validation rules.
//!
//! A rule is a plain data record: which fields it targets, what it checks and
//! how much a failure discounts the field's confidence. The validator walks the
//! registry in order; rules never see each other.

pub mod patterns;

use std::fmt;

use regex::Regex;
use thiserror::Error;

use crate::types::{clamp_unit, Field, IssueKind, ValueKind};

/// Identifier of the built-in amount rule.
pub const AMOUNT_RULE_ID: &str = "amount_format";

/// Identifier of the presence rule derived from the required-field list.
pub const REQUIRED_RULE_ID: &str = "required_field";

/// Confidence multiplier applied when an amount fails its pattern.
pub const AMOUNT_PENALTY: f64 = 0.7;

/// A check that could not be carried out.
///
/// The validator records these as `type_mismatch` issues and leaves the
/// field's confidence untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("{kind:?} value cannot be checked by rule {rule_id}")]
    UnsupportedValue { rule_id: String, kind: ValueKind },

    #[error("rule {rule_id} failed: {reason}")]
    CheckFailed { rule_id: String, reason: String },
}

/// Which fields a rule applies to. Name comparisons ignore case.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPredicate {
    Any,
    NameContains(String),
    NameEquals(String),
}

impl FieldPredicate {
    pub fn name_contains(needle: impl Into<String>) -> Self {
        FieldPredicate::NameContains(needle.into().to_lowercase())
    }

    pub fn name_equals(name: impl Into<String>) -> Self {
        FieldPredicate::NameEquals(name.into().trim().to_lowercase())
    }

    pub fn matches(&self, field_name: &str) -> bool {
        match self {
            FieldPredicate::Any => true,
            FieldPredicate::NameContains(needle) => {
                field_name.to_lowercase().contains(needle.to_lowercase().as_str())
            }
            FieldPredicate::NameEquals(name) => {
                field_name.trim().to_lowercase() == name.trim().to_lowercase()
            }
        }
    }
}

/// Signature of a custom check: `Ok(true)` passes, `Ok(false)` fails.
pub type CheckFn = fn(&Field) -> Result<bool, RuleError>;

/// What a rule checks.
#[derive(Clone)]
pub enum Check {
    /// The value must match the regex; failures are `pattern_mismatch`.
    Pattern(Regex),

    /// Arbitrary check; failures are reported with `kind`.
    Custom { kind: IssueKind, check: CheckFn },
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Check::Custom { kind, .. } => f.debug_struct("Custom").field("kind", kind).finish(),
        }
    }
}

/// Result of evaluating one rule against one field.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Passed,
    Failed { kind: IssueKind, message: String },
    Errored(RuleError),
}

/// A named, field-targeted check with a confidence penalty.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub applies_to: FieldPredicate,
    pub check: Check,
    penalty: f64,
}

impl Rule {
    /// Create a rule. The penalty multiplier is clamped to [0, 1].
    pub fn new(id: impl Into<String>, applies_to: FieldPredicate, check: Check, penalty: f64) -> Self {
        Self {
            id: id.into(),
            applies_to,
            check,
            penalty: clamp_unit(penalty),
        }
    }

    /// A pattern rule.
    pub fn pattern(
        id: impl Into<String>,
        applies_to: FieldPredicate,
        pattern: Regex,
        penalty: f64,
    ) -> Self {
        Self::new(id, applies_to, Check::Pattern(pattern), penalty)
    }

    /// The built-in numeric-amount rule.
    pub fn amount_format() -> Self {
        Self::pattern(
            AMOUNT_RULE_ID,
            FieldPredicate::name_contains("amount"),
            patterns::AMOUNT_PATTERN.clone(),
            AMOUNT_PENALTY,
        )
    }

    /// Confidence multiplier applied on failure.
    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    pub fn applies(&self, field: &Field) -> bool {
        self.applies_to.matches(&field.name)
    }

    /// Evaluate this rule against a single field.
    pub fn evaluate(&self, field: &Field) -> RuleOutcome {
        match &self.check {
            Check::Pattern(re) => {
                if !field.kind().is_scalar() {
                    return RuleOutcome::Errored(RuleError::UnsupportedValue {
                        rule_id: self.id.clone(),
                        kind: field.kind(),
                    });
                }

                let value = field.value.as_deref().unwrap_or("");
                if re.is_match(value) {
                    RuleOutcome::Passed
                } else {
                    RuleOutcome::Failed {
                        kind: IssueKind::PatternMismatch,
                        message: match &field.value {
                            Some(v) => format!(
                                "{}: value {:?} does not match {}",
                                field.name,
                                v,
                                re.as_str()
                            ),
                            None => format!("{}: no value to match against {}", field.name, re.as_str()),
                        },
                    }
                }
            }
            Check::Custom { kind, check } => match check(field) {
                Ok(true) => RuleOutcome::Passed,
                Ok(false) => RuleOutcome::Failed {
                    kind: *kind,
                    message: format!("{}: failed {}", field.name, self.id),
                },
                Err(e) => RuleOutcome::Errored(e),
            },
        }
    }
}

/// Ordered set of rules, unique by id.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    /// A registry with no rules.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The built-in rules.
    pub fn builtin() -> Self {
        Self {
            rules: vec![Rule::amount_format()],
        }
    }

    /// Add a rule, replacing any rule with the same id in place.
    pub fn register(&mut self, rule: Rule) {
        if let Some(existing) = self.rules.iter_mut().find(|r| r.id == rule.id) {
            *existing = rule;
        } else {
            self.rules.push(rule);
        }
    }

    /// Remove a rule by id, returning it.
    pub fn remove(&mut self, id: &str) -> Option<Rule> {
        let index = self.rules.iter().position(|r| r.id == id)?;
        Some(self.rules.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
