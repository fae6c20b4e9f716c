//! Concurrent batch processing.
//!
//! Each payload is processed on the tokio blocking pool. At most
//! `concurrency` payloads are in flight; results come back in input order.
//! Every item in a batch sees the same engine snapshot.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;

use docqa_core::{Outcome, RecordMetadata};

use crate::shared::SharedEngine;
use crate::RuntimeError;

/// One payload to process.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Caller-chosen identifier (file name, message id, ...)
    pub id: String,
    pub raw: String,
    pub metadata: RecordMetadata,
}

impl BatchItem {
    pub fn new(id: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw: raw.into(),
            metadata: RecordMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Outcome for one item.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub id: String,
    pub outcome: Outcome,
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub scored: usize,
    pub failed: usize,
    /// Mean overall confidence of the scored records
    pub mean_confidence: Option<f64>,
}

impl BatchSummary {
    fn from_results(results: &[BatchResult]) -> Self {
        let confidences: Vec<f64> = results
            .iter()
            .filter_map(|r| r.outcome.scored())
            .map(|s| s.overall_confidence())
            .collect();

        let mean_confidence = if confidences.is_empty() {
            None
        } else {
            Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
        };

        Self {
            total: results.len(),
            scored: confidences.len(),
            failed: results.len() - confidences.len(),
            mean_confidence,
        }
    }
}

/// Results plus summary.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<BatchResult>,
    pub summary: BatchSummary,
}

/// Processes batches of payloads concurrently.
pub struct BatchProcessor {
    engine: Arc<SharedEngine>,
    concurrency: usize,
}

impl BatchProcessor {
    pub fn new(engine: Arc<SharedEngine>) -> Self {
        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self { engine, concurrency }
    }

    /// Limit the number of payloads in flight (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Process every item, returning results in input order.
    pub async fn process(&self, items: Vec<BatchItem>) -> Result<BatchReport, RuntimeError> {
        let engine = self.engine.snapshot();
        let total = items.len();

        let joined: Vec<_> = stream::iter(items.into_iter().map(|item| {
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || BatchResult {
                outcome: engine.process(&item.raw, &item.metadata),
                id: item.id,
            })
        }))
        .buffered(self.concurrency)
        .collect()
        .await;

        let results = joined
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RuntimeError::TaskFailed(e.to_string()))?;

        let summary = BatchSummary::from_results(&results);
        tracing::info!(
            total,
            scored = summary.scored,
            failed = summary.failed,
            concurrency = self.concurrency,
            "batch processed"
        );

        Ok(BatchReport { results, summary })
    }
}
