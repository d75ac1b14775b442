use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::batch::BatchMode;
use crate::config::BatchConfig;
use crate::layout::SectionKind;

#[derive(Parser)]
#[command(name = "deckscan")]
#[command(about = "Turns decklist screenshots into canonical card lists", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: config.json next to the executable)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Card catalog CSV, overrides `catalog_path`
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Recognize one or more screenshots and stream events to stdout
    Process {
        /// Screenshot files (PNG or JPEG)
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Process one image at a time
        #[arg(long, conflicts_with = "concurrency")]
        sequential: bool,

        /// Worker count for parallel mode
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Create each recognized deck through the deck API
        #[arg(long)]
        save: bool,

        /// Stream framing (sse/jsonl)
        #[arg(short, long, default_value = "sse")]
        format: OutputFormat,
    },

    /// Print the detected layout of a screenshot as JSON
    Segment {
        /// Screenshot file
        #[arg(required = true)]
        image: PathBuf,

        /// Write a copy with the detected regions drawn on it
        #[arg(short, long)]
        overlay: Option<PathBuf>,
    },

    /// Resolve a recognized name against the catalog
    Match {
        /// Name as recognized from the screenshot
        #[arg(required = true)]
        name: String,

        /// Section the name came from (legend, main_deck, battlefield, rune, side_deck)
        #[arg(short, long)]
        section: Option<SectionKind>,
    },

    /// Download traineddata and check that Tesseract can be found
    Setup,
}

/// Framing of the `process` event stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `event: <kind>\ndata: <json>\n\n`
    #[default]
    Sse,
    /// One `{"event": ..., "data": ...}` object per line
    JsonLines,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sse" => Ok(OutputFormat::Sse),
            "jsonl" | "json" | "ndjson" => Ok(OutputFormat::JsonLines),
            _ => Err(format!("Unknown format: {}. Use sse or jsonl", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Sse => write!(f, "sse"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// Command line flags win over the `batch` config section.
pub fn batch_mode(sequential: bool, concurrency: Option<usize>, cfg: &BatchConfig) -> BatchMode {
    if sequential {
        return BatchMode::Sequential;
    }
    match concurrency {
        Some(n) if n > 1 => BatchMode::Parallel { concurrency: n },
        Some(_) => BatchMode::Sequential,
        None => BatchMode::from_config(cfg),
    }
}
