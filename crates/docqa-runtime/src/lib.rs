//! # docqa-runtime
//!
//! Caller-side concurrency for the docqa engine.
//!
//! `docqa-core` is a pure, per-record transformation. This crate adds the two
//! things a service needs around it:
//!
//! - [`SharedEngine`]: one engine shared by many tasks, with weights and
//!   configuration that can be swapped at runtime without stopping readers
//! - [`BatchProcessor`]: bounded-concurrency processing of many payloads on
//!   the tokio blocking pool, results in input order
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_runtime::{BatchItem, BatchProcessor, SharedEngine};
//!
//! let engine = Arc::new(SharedEngine::default());
//! let processor = BatchProcessor::new(Arc::clone(&engine)).with_concurrency(8);
//!
//! let report = processor.process(vec![BatchItem::new("a.json", raw)]).await?;
//! println!("{} scored, {} failed", report.summary.scored, report.summary.failed);
//! ```

pub mod batch;
pub mod shared;

pub use batch::{BatchItem, BatchProcessor, BatchReport, BatchResult, BatchSummary};
pub use shared::SharedEngine;

use docqa_core::ConfigError;
use thiserror::Error;

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Engine configuration failed: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing task failed: {0}")]
    TaskFailed(String),
}
