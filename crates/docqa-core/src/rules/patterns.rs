//! Shared value patterns for built-in rules.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Monetary amount: digits, optionally a decimal point and 1-2 digits.
    /// Matches `12`, `12.5`, `12.50`; rejects `12.500`, `1,200`, `$12`.
    pub static ref AMOUNT_PATTERN: Regex = Regex::new(
        r"^[0-9]+(\.[0-9]{1,2})?$"
    ).unwrap();
}

/// Check if a value is a well-formed amount.
pub fn is_amount(value: &str) -> bool {
    AMOUNT_PATTERN.is_match(value)
}
