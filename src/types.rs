//! Core types shared across the scan-and-remediate pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// A single pattern match produced by the tree scanner.
///
/// Findings are immutable snapshots of the tree as it looked at scan time;
/// remediation never rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// The pattern token that matched.
    pub pattern: String,
    /// Position of the token in the pattern set, used for canonical ordering
    /// and evidence-filename disambiguation.
    pub pattern_index: usize,
    /// Path of the file containing the match.
    pub path: PathBuf,
    /// 1-based line number of the match.
    pub line: usize,
    /// The full matched line, without its trailing newline.
    pub text: String,
}

/// A rendered evidence image for one finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceArtifact {
    /// Where the image was written.
    pub path: PathBuf,
}

/// One discrete phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Inspect,
    Decompile,
    Scan,
    Remediate,
    Repackage,
    Sign,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Inspect => "inspect",
            Stage::Decompile => "decompile",
            Stage::Scan => "scan",
            Stage::Remediate => "remediate",
            Stage::Repackage => "repackage",
            Stage::Sign => "sign",
        };
        f.write_str(name)
    }
}

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Stages still executing.
    Running,
    /// All stages completed.
    Done,
    /// The named stage failed; no later stage ran.
    Failed(Stage),
}

/// How a stage ended, as recorded in the run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    Completed,
    /// Non-fatal failure; the pipeline continued.
    Warned(String),
    /// Fatal failure; the pipeline halted here.
    Failed(String),
}

/// History entry for one executed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
}

/// Failure of an external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}")]
    ExitStatus {
        tool: String,
        status: std::process::ExitStatus,
    },
    #[error("{tool} produced undecodable output")]
    BadOutput { tool: String },
}

/// Failure to load or parse the tool configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file found (searched {searched})")]
    NotFound { searched: String },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("signing password not available: set `signing.password` or ${env}")]
    MissingPassword { env: String },
}

/// Failure to render one evidence image. Never fatal to the pipeline.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read source file {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create evidence directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write evidence image {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Failure to rewrite a matched file. Fatal to the run: repackaging a
/// partially patched tree would defeat the pattern set's purpose.
#[derive(Debug, Error)]
#[error("failed to rewrite {path}: {source}")]
pub struct RemediateError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Startup failure raised before any pipeline stage runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("target package not found: {0}")]
    MissingTarget(PathBuf),
    #[error("failed to prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
