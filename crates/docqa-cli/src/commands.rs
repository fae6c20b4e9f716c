//! Command implementations.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docqa_core::{ComponentKind, Engine, EngineConfig, Outcome, RecordMetadata, ScoreComponent, ScoreWeights};
use docqa_runtime::{BatchItem, BatchProcessor, BatchSummary, SharedEngine};

use crate::cli::{BatchArgs, Cli, MetadataArgs, ProcessArgs};

/// Resolve the engine configuration from the global flags.
///
/// An explicit `--config` wins over `--standard-types`.
pub fn load_config(cli: &Cli) -> Result<EngineConfig> {
    match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None if cli.standard_types => Ok(EngineConfig::standard_document_types()),
        None => Ok(EngineConfig::default()),
    }
}

impl MetadataArgs {
    pub fn to_metadata(&self) -> RecordMetadata {
        let mut metadata = RecordMetadata::new();
        if !self.required.is_empty() {
            metadata = metadata.with_required_fields(self.required.iter().map(|s| s.trim()));
        }
        if let Some(confidence) = self.ocr_confidence {
            metadata = metadata.with_ocr_confidence(confidence);
        }
        metadata
    }
}

/// Read a payload from a file, or stdin for `-` or no path.
pub fn read_payload(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => {
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read payload from stdin")?;
            Ok(buf)
        }
    }
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

/// Render the score breakdown as a fixed-width table.
pub fn format_breakdown(overall: f64, breakdown: &[ScoreComponent]) -> String {
    let mut out = format!("{:<16} {:>7} {:>7} {:>9}\n", "COMPONENT", "WEIGHT", "VALUE", "WEIGHTED");
    for component in breakdown {
        out.push_str(&format!(
            "{:<16} {:>7.3} {:>7.3} {:>9.3}\n",
            component.name.as_str(),
            component.weight,
            component.value,
            component.weighted_value
        ));
    }
    out.push_str(&format!("{:<16} {:>25.3}\n", "overall", overall));
    out
}

pub fn format_weights(weights: &ScoreWeights) -> String {
    ComponentKind::ALL
        .iter()
        .map(|kind| format!("{:<16} {:.3}\n", kind.as_str(), weights.get(*kind)))
        .collect()
}

/// Process one payload. Returns the outcome so the caller can pick the exit code.
pub fn execute_process(args: &ProcessArgs, engine: &Engine) -> Result<Outcome> {
    let raw = read_payload(args.payload.as_deref())?;
    let outcome = engine.process(&raw, &args.metadata.to_metadata());

    let json = outcome.to_json_pretty().context("Failed to serialize result")?;
    match &args.output {
        Some(path) => {
            write_output(path, &json)?;
            tracing::info!(path = %path.display(), "result written");
        }
        None => println!("{}", json),
    }

    if args.breakdown {
        if let Some(scored) = outcome.scored() {
            eprint!("{}", format_breakdown(scored.overall_confidence(), scored.breakdown()));
        }
    }

    Ok(outcome)
}

fn batch_line(id: &str, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Scored(scored) => format!(
            "{}\tscored\t{:.3}\t{} failed rule(s)",
            id,
            scored.overall_confidence(),
            scored.record().qa.failed_rules.len()
        ),
        Outcome::Failed(err) => format!("{}\terror\t{}", id, err),
    }
}

fn output_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "payload".to_string());
    dir.join(format!("{}.json", stem))
}

/// One output path per input. Inputs sharing a file stem would overwrite
/// each other, so they are rejected.
fn output_paths(dir: &Path, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen: HashMap<PathBuf, &Path> = HashMap::new();
    let mut paths = Vec::with_capacity(inputs.len());

    for input in inputs {
        let path = output_path(dir, input);
        if let Some(previous) = seen.insert(path.clone(), input.as_path()) {
            bail!(
                "{} and {} would both be written to {}",
                previous.display(),
                input.display(),
                path.display()
            );
        }
        paths.push(path);
    }

    Ok(paths)
}

/// Process many payload files through the runtime.
pub async fn execute_batch(args: &BatchArgs, engine: Arc<SharedEngine>) -> Result<BatchSummary> {
    let outputs = match &args.output_dir {
        Some(dir) => Some(output_paths(dir, &args.files)?),
        None => None,
    };

    let metadata = args.metadata.to_metadata();
    let items = args
        .files
        .iter()
        .map(|path| {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok::<_, anyhow::Error>(
                BatchItem::new(path.display().to_string(), raw).with_metadata(metadata.clone()),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let mut processor = BatchProcessor::new(engine);
    if let Some(concurrency) = args.concurrency {
        processor = processor.with_concurrency(concurrency);
    }
    let report = processor.process(items).await?;

    for (index, result) in report.results.iter().enumerate() {
        println!("{}", batch_line(&result.id, &result.outcome));

        if let Some(outputs) = &outputs {
            let json = result.outcome.to_json_pretty().context("Failed to serialize result")?;
            write_output(&outputs[index], &json)?;
        }
    }

    let summary = report.summary;
    match summary.mean_confidence {
        Some(mean) => println!(
            "{} payload(s): {} scored, {} failed, mean confidence {:.3}",
            summary.total, summary.scored, summary.failed, mean
        ),
        None => println!(
            "{} payload(s): {} scored, {} failed",
            summary.total, summary.scored, summary.failed
        ),
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    const INVOICE: &str = r#"{"doc_type": "invoice", "fields": [
        {"name": "Total Amount", "value": "12.50", "confidence": 0.9},
        {"name": "Date", "value": "2024-01-01", "confidence": 0.8}
    ]}"#;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_load_config_precedence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("engine.yaml");
        fs::write(&path, "default_ocr_confidence: 0.5\n").unwrap();
        let path = path.to_str().unwrap();

        let config = load_config(&cli(&["docqa", "--standard-types", "--config", path, "weights"])).unwrap();
        assert_eq!(config.default_ocr_confidence, 0.5);
        assert!(config.required_fields.is_empty());

        let config = load_config(&cli(&["docqa", "--standard-types", "weights"])).unwrap();
        assert!(config.required_fields_for("invoice").is_some());
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(&cli(&["docqa", "--config", "/nonexistent/engine.yaml", "weights"])).is_err());
    }

    #[test]
    fn test_process_writes_output_creating_dirs() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("invoice.json");
        fs::write(&input, INVOICE).unwrap();
        let output = dir.path().join("nested/out/result.json");

        let args = ProcessArgs {
            payload: Some(input),
            metadata: MetadataArgs {
                required: vec!["Total Amount".into()],
                ocr_confidence: Some(0.8),
            },
            breakdown: false,
            output: Some(output.clone()),
        };

        let outcome = execute_process(&args, &Engine::new()).unwrap();
        assert!(outcome.is_scored());

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(written["doc_type"], "invoice");
        assert_eq!(written["qa"]["passed_rules"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_process_parse_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("broken.json");
        fs::write(&input, "no json here").unwrap();
        let output = dir.path().join("broken.out.json");

        let args = ProcessArgs {
            payload: Some(input),
            metadata: MetadataArgs { required: vec![], ocr_confidence: None },
            breakdown: true,
            output: Some(output.clone()),
        };

        let outcome = execute_process(&args, &Engine::new()).unwrap();
        assert!(!outcome.is_scored());

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(written["raw"], "no json here");
    }

    #[test]
    fn test_format_breakdown() {
        let outcome = Engine::new().process(INVOICE, &RecordMetadata::new());
        let scored = outcome.scored().unwrap();
        let table = format_breakdown(scored.overall_confidence(), scored.breakdown());

        assert!(table.starts_with("COMPONENT"));
        assert!(table.contains("ocr_confidence"));
        assert!(!table.contains("field_presence"));
        assert!(table.trim_end().ends_with("0.925"));
    }

    #[test]
    fn test_format_weights_lists_every_component() {
        let text = format_weights(&ScoreWeights::default());
        assert_eq!(text.lines().count(), 5);
        assert!(text.contains("validation       0.300"));
    }

    #[tokio::test]
    async fn test_batch_writes_per_input_files() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        fs::write(&good, INVOICE).unwrap();
        fs::write(&bad, "{").unwrap();
        let out_dir = dir.path().join("results");

        let args = BatchArgs {
            files: vec![good, bad],
            metadata: MetadataArgs { required: vec![], ocr_confidence: None },
            concurrency: Some(2),
            output_dir: Some(out_dir.clone()),
        };

        let summary = execute_batch(&args, Arc::new(SharedEngine::default())).await.unwrap();
        assert_eq!(summary.scored, 1);
        assert_eq!(summary.failed, 1);

        assert!(out_dir.join("good.json").exists());
        let failed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out_dir.join("bad.json")).unwrap()).unwrap();
        assert_eq!(failed["raw"], "{");
    }

    #[tokio::test]
    async fn test_batch_rejects_colliding_output_names() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        let first = dir.path().join("a/x.json");
        let second = dir.path().join("b/x.json");
        fs::write(&first, INVOICE).unwrap();
        fs::write(&second, INVOICE).unwrap();
        let out_dir = dir.path().join("results");

        let args = BatchArgs {
            files: vec![first, second],
            metadata: MetadataArgs { required: vec![], ocr_confidence: None },
            concurrency: None,
            output_dir: Some(out_dir.clone()),
        };

        let err = execute_batch(&args, Arc::new(SharedEngine::default())).await.unwrap_err();
        assert!(err.to_string().contains("x.json"));
        assert!(!out_dir.join("x.json").exists());
    }

    #[tokio::test]
    async fn test_batch_same_stem_allowed_without_output_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        let first = dir.path().join("a/x.json");
        let second = dir.path().join("b/x.json");
        fs::write(&first, INVOICE).unwrap();
        fs::write(&second, INVOICE).unwrap();

        let args = BatchArgs {
            files: vec![first, second],
            metadata: MetadataArgs { required: vec![], ocr_confidence: None },
            concurrency: None,
            output_dir: None,
        };

        let summary = execute_batch(&args, Arc::new(SharedEngine::default())).await.unwrap();
        assert_eq!(summary.scored, 2);
    }

    #[tokio::test]
    async fn test_batch_missing_file_fails_early() {
        let args = BatchArgs {
            files: vec![PathBuf::from("/nonexistent/payload.json")],
            metadata: MetadataArgs { required: vec![], ocr_confidence: None },
            concurrency: None,
            output_dir: None,
        };
        assert!(execute_batch(&args, Arc::new(SharedEngine::default())).await.is_err());
    }
}
