//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "apkmend",
    version,
    about = "Scan decompiled Android packages for risky patterns, capture evidence, patch and rebuild"
)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the tool configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the full pipeline: inspect, decompile, scan, remediate, rebuild, sign.
    Run {
        /// Target APK to process.
        apk: PathBuf,

        /// Override the configured report directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the configured patch policy (redact, flip, delete).
        #[arg(long)]
        policy: Option<String>,
    },

    /// Scan an already-decompiled source tree and report findings.
    Scan {
        /// Root of the source tree.
        path: PathBuf,

        /// Output format (text, json).
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Write the report to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also render evidence images into this directory.
        #[arg(long)]
        evidence_dir: Option<PathBuf>,
    },

    /// List the pattern tokens the scanner looks for.
    Patterns {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write a starter configuration file.
    Init {
        /// Where to write the configuration.
        #[arg(short, long, default_value = "apkmend.toml")]
        output: PathBuf,
    },
}
