//! Extraction payload parsing.
//!
//! Payloads come from an external extractor and are treated as untrusted text.
//! This module decodes them, checks them against the embedded JSON Schema of
//! the input boundary and builds an [`ExtractionRecord`](crate::ExtractionRecord).

mod parser;
mod schema;

pub use parser::{ErrorPayload, ParseError, ParseFailure, ParserOptions, RecordParser};
pub use schema::validate_payload_schema;
