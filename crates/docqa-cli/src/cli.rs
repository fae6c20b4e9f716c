//! CLI command definitions and argument parsing.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// docqa - validate and score LLM-extracted document records.
#[derive(Debug, Parser)]
#[command(name = "docqa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Engine configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the built-in required fields per document type when no config is given
    #[arg(long, global = true)]
    pub standard_types: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate and score one payload
    Process(ProcessArgs),

    /// Validate and score many payload files concurrently
    Batch(BatchArgs),

    /// Print the effective score weights
    Weights,
}

/// Metadata supplied alongside a payload.
#[derive(Debug, Clone, Args)]
pub struct MetadataArgs {
    /// Required field names (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub required: Vec<String>,

    /// Confidence of the upstream text extraction (0.0-1.0)
    #[arg(long)]
    pub ocr_confidence: Option<f64>,
}

/// Arguments for the process command.
#[derive(Debug, Parser)]
pub struct ProcessArgs {
    /// Payload file; `-` or omitted reads stdin
    pub payload: Option<PathBuf>,

    #[command(flatten)]
    pub metadata: MetadataArgs,

    /// Print the score breakdown to stderr
    #[arg(short, long)]
    pub breakdown: bool,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the batch command.
#[derive(Debug, Parser)]
pub struct BatchArgs {
    /// Payload files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub metadata: MetadataArgs,

    /// Maximum payloads processed at once
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Write `<stem>.json` per input into this directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_args() {
        let cli = Cli::try_parse_from([
            "docqa",
            "-vv",
            "process",
            "invoice.json",
            "--required",
            "Total Amount,Date",
            "--ocr-confidence",
            "0.6",
            "--breakdown",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Process(args) => {
                assert_eq!(args.payload, Some(PathBuf::from("invoice.json")));
                assert_eq!(args.metadata.required, vec!["Total Amount", "Date"]);
                assert_eq!(args.metadata.ocr_confidence, Some(0.6));
                assert!(args.breakdown);
                assert!(args.output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_batch_requires_files() {
        assert!(Cli::try_parse_from(["docqa", "batch"]).is_err());

        let cli = Cli::try_parse_from(["docqa", "--standard-types", "batch", "a.json", "b.json", "-j", "3"])
            .unwrap();
        assert!(cli.standard_types);
        match cli.command {
            Command::Batch(args) => {
                assert_eq!(args.files.len(), 2);
                assert_eq!(args.concurrency, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
