//! Run reporting: a pluggable progress reporter plus findings report output.
//!
//! The pipeline never talks to a process-wide console; everything it has to
//! say goes through a [`Reporter`] handle owned by the run context.

use crate::types::{Finding, Stage};
use chrono::{DateTime, Utc};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Progress sink for one pipeline run.
pub trait Reporter: Send + Sync {
    fn stage_started(&self, stage: Stage);
    fn stage_completed(&self, stage: Stage, detail: &str);
    /// Non-fatal stage failure; the pipeline continues.
    fn stage_warned(&self, stage: Stage, message: &str);
    /// Fatal stage failure; the pipeline halts here.
    fn stage_failed(&self, stage: Stage, message: &str);
    fn package_summary(&self, summary: &str);
    fn findings(&self, findings: &[Finding]);
    fn note(&self, message: &str);
}

/// Reporter that swallows everything. Default for library callers and tests.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_completed(&self, _stage: Stage, _detail: &str) {}
    fn stage_warned(&self, _stage: Stage, _message: &str) {}
    fn stage_failed(&self, _stage: Stage, _message: &str) {}
    fn package_summary(&self, _summary: &str) {}
    fn findings(&self, _findings: &[Finding]) {}
    fn note(&self, _message: &str) {}
}

/// Console reporter with a spinner around the blocking external-tool stages.
#[derive(Default)]
pub struct ConsoleReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn clear_spinner(&self) {
        if let Some(spinner) = self.spinner.lock().unwrap().take() {
            spinner.finish_and_clear();
        }
    }

    fn is_external(stage: Stage) -> bool {
        matches!(stage, Stage::Decompile | Stage::Repackage | Stage::Sign)
    }
}

impl Reporter for ConsoleReporter {
    fn stage_started(&self, stage: Stage) {
        if Self::is_external(stage) {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.set_message(format!("{stage} running, please wait..."));
            spinner.enable_steady_tick(Duration::from_millis(100));
            *self.spinner.lock().unwrap() = Some(spinner);
        } else {
            println!("{} {}...", "[+]".cyan(), stage.to_string().bold());
        }
    }

    fn stage_completed(&self, stage: Stage, detail: &str) {
        self.clear_spinner();
        if detail.is_empty() {
            println!("{} {} completed", "[+]".green(), stage);
        } else {
            println!("{} {} completed: {}", "[+]".green(), stage, detail);
        }
    }

    fn stage_warned(&self, stage: Stage, message: &str) {
        self.clear_spinner();
        eprintln!("{} {} skipped: {}", "[!]".yellow(), stage, message);
    }

    fn stage_failed(&self, stage: Stage, message: &str) {
        self.clear_spinner();
        eprintln!(
            "{} {} {}",
            "[-]".red(),
            format!("{stage} failed:").bold().red(),
            message
        );
    }

    fn package_summary(&self, summary: &str) {
        for line in summary.lines().take(40) {
            println!("  {}", line.dimmed());
        }
    }

    fn findings(&self, findings: &[Finding]) {
        if findings.is_empty() {
            println!("{} no risky patterns found", "[!]".yellow());
            return;
        }
        println!(
            "{} {} risky {} found:",
            "[*]".magenta(),
            findings.len(),
            if findings.len() == 1 { "pattern" } else { "patterns" }
        );
        for finding in findings {
            println!(
                "  \\_ {} in {} at line {}",
                finding.pattern.yellow(),
                finding.path.display().to_string().cyan(),
                finding.line.to_string().green()
            );
        }
    }

    fn note(&self, message: &str) {
        println!("{} {}", "[+]".cyan(), message);
    }
}

/// Findings report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Serializable findings report, also persisted per run for auditability.
#[derive(Debug, Clone, Serialize)]
pub struct FindingsReport {
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_sha256: Option<String>,
    pub scanned_root: PathBuf,
    pub total: usize,
    pub findings: Vec<Finding>,
}

impl FindingsReport {
    pub fn new(scanned_root: PathBuf, findings: Vec<Finding>) -> Self {
        Self {
            generated_at: Utc::now(),
            target: None,
            target_sha256: None,
            scanned_root,
            total: findings.len(),
            findings,
        }
    }

    pub fn with_target(mut self, target: PathBuf, sha256: Option<String>) -> Self {
        self.target = Some(target);
        self.target_sha256 = sha256;
        self
    }
}

/// Write a findings report in the requested format.
pub fn report(
    findings_report: &FindingsReport,
    format: OutputFormat,
    writer: &mut dyn Write,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, findings_report)?;
            writeln!(writer)?;
        }
        OutputFormat::Text => {
            writeln!(
                writer,
                "Scanned {}: {} finding(s)",
                findings_report.scanned_root.display(),
                findings_report.total
            )?;
            for finding in &findings_report.findings {
                writeln!(
                    writer,
                    "  {}  {}:{}",
                    finding.pattern,
                    finding.path.display(),
                    finding.line
                )?;
            }
        }
    }
    Ok(())
}
