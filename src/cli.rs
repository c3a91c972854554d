// Command-line interface definitions for tokpass
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tokpass")]
#[command(author, version, about = "Token-passing beam-search speech decoder")]
#[command(long_about = "
tokpass decodes per-frame acoustic state scores into word sequences.
It searches a precompiled network with a backoff n-gram language model,
keeping the hypothesis population bounded with beam and histogram pruning.

SETUP:
  1. Run: tokpass config --init (writes ~/.config/tokpass/config.toml)
  2. Point [models] and [lm] at your graph, vocabulary and ARPA files
  3. Run: tokpass check (to load and validate every model)

USAGE:
  List one acoustic score file per line in LIST, then run
  tokpass decode LIST
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Number of utterances decoded in parallel
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Override the language model scale
    #[arg(long, value_name = "SCALE")]
    pub lm_scale: Option<f32>,

    /// Override the global beam
    #[arg(long, value_name = "BEAM")]
    pub global_beam: Option<f32>,

    /// Override the approximate per-frame token limit
    #[arg(long, value_name = "N")]
    pub token_limit: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode every acoustic score file listed in LIST (one path per line)
    Decode {
        /// File listing the acoustic score files
        list: std::path::PathBuf,

        /// Write alternate hypotheses to FILE (enables n-best tracking)
        #[arg(long, value_name = "FILE")]
        nbest: Option<std::path::PathBuf>,

        /// Print one JSON object per utterance instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Load and validate all configured models
    Check,

    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,

        /// Save the effective configuration, overrides included, to FILE
        #[arg(long, value_name = "FILE")]
        save: Option<std::path::PathBuf>,
    },
}
