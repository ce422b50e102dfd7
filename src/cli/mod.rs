//! CLI module for Rabbithole.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rabbithole - study material in, study plan out
///
/// Feed it documents, slides, photos of notes, lectures and videos. Every file is
/// turned into text, tagged with topical keywords from a reference index, and
/// summarised; the results are combined into a single study plan.
#[derive(Parser, Debug)]
#[command(name = "rabbithole")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "RABBITHOLE_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process files concurrently and build a study plan
    Dive {
        /// Files to process (text, PDF, DOCX, images, audio, video)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Keywords kept per document (defaults to the configured count)
        #[arg(short, long)]
        keywords: Option<usize>,

        /// Skip the study plan
        #[arg(long)]
        no_plan: bool,

        /// Also write the results and plan as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Ask follow-up questions about a run saved with `dive --json`
    Chat {
        /// JSON file written by `dive --json`
        results: PathBuf,
    },

    /// Manage the reference topic index
    Reference {
        #[command(subcommand)]
        action: ReferenceAction,
    },

    /// Check system requirements and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReferenceAction {
    /// Replace the index with topics from a JSON lines file
    Import {
        /// File with one {"id", "title", "url", "emb"} object per line
        file: PathBuf,

        /// Topics written per transaction
        #[arg(long, default_value_t = crate::reference::DEFAULT_IMPORT_BATCH)]
        batch_size: usize,
    },

    /// Show index size and location
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dive() {
        let cli = Cli::try_parse_from([
            "rabbithole",
            "-v",
            "dive",
            "notes.pdf",
            "lecture.mp4",
            "--keywords",
            "5",
            "--no-plan",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Dive { files, keywords, no_plan, json } => {
                assert_eq!(files.len(), 2);
                assert_eq!(keywords, Some(5));
                assert!(no_plan);
                assert!(json.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_chat() {
        let cli = Cli::try_parse_from(["rabbithole", "chat", "run.json"]).unwrap();
        match cli.command {
            Commands::Chat { results } => assert_eq!(results, PathBuf::from("run.json")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_dive_requires_files() {
        assert!(Cli::try_parse_from(["rabbithole", "dive"]).is_err());
    }

    #[test]
    fn test_parse_reference_import_default_batch() {
        let cli = Cli::try_parse_from(["rabbithole", "reference", "import", "wiki.jsonl"]).unwrap();
        match cli.command {
            Commands::Reference {
                action: ReferenceAction::Import { batch_size, .. },
            } => assert_eq!(batch_size, 10_000),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
