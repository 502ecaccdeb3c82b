use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::text_index::SearchScope;

#[derive(Debug, Parser)]
#[command(
    name = "faceseek",
    about = "Face similarity and full-text search for identity-document archives"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest a JSON batch export from the detection pipeline
    Ingest(IngestArgs),
    /// Remove a document and all its indexed data
    Remove(RemoveArgs),
    /// Search for similar faces by probe embedding
    Face(FaceArgs),
    /// Full-text search over OCR text and MRZ fields
    Text(TextArgs),
    /// Show system status and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Batch file to ingest, or "-" for stdin
    pub input: String,

    /// Embedding dimension, fixed when the face index is first created
    #[arg(long, default_value = "512")]
    pub dimension: u32,
}

// -- Remove --

#[derive(Debug, Parser)]
pub struct RemoveArgs {
    /// Document ID to remove
    pub document_id: u64,
}

// -- Face search --

#[derive(Debug, Parser)]
pub struct FaceArgs {
    /// File containing the probe embedding as a JSON float array, or "-"
    /// for stdin
    #[arg(long, default_value = "-")]
    pub probe: String,

    /// Minimum similarity confidence in [0, 1]
    #[arg(short = 't', long, default_value = "0.6")]
    pub threshold: f32,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Text search --

#[derive(Debug, Parser)]
pub struct TextArgs {
    /// The search query
    pub query: String,

    /// Which fields to search
    #[arg(long, value_enum, default_value = "all")]
    pub scope: SearchScope,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "20")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "faceseek",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_face_defaults() {
        let cli = Cli::parse_from(["faceseek", "face"]);
        match cli.command {
            Command::Face(args) => {
                assert_eq!(args.probe, "-");
                assert_eq!(args.threshold, 0.6);
                assert_eq!(args.count, 10);
                assert!(!args.json);
            }
            _ => panic!("expected face command"),
        }
    }

    #[test]
    fn parse_text_defaults() {
        let cli = Cli::parse_from(["faceseek", "text", "doe"]);
        match cli.command {
            Command::Text(args) => {
                assert_eq!(args.query, "doe");
                assert_eq!(args.scope, SearchScope::All);
                assert_eq!(args.count, 20);
            }
            _ => panic!("expected text command"),
        }
    }

    #[test]
    fn parse_ingest_dimension() {
        let cli = Cli::parse_from([
            "faceseek", "ingest", "batch.json", "--dimension", "128",
        ]);
        match cli.command {
            Command::Ingest(args) => {
                assert_eq!(args.input, "batch.json");
                assert_eq!(args.dimension, 128);
            }
            _ => panic!("expected ingest command"),
        }
    }
}
