//! apkmend: scan-and-remediate pipeline for packaged Android applications.
//!
//! The core walks a decompiled source tree for known-risky configuration and
//! code patterns, captures per-finding image evidence, neutralizes the
//! offending lines in place, and sequences the external decompile, rebuild
//! and sign tools around that work.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod evidence;
pub mod patterns;
pub mod pipeline;
pub mod remediate;
pub mod reporters;
pub mod scanner;
pub mod types;

pub use config::{generate_default_config, Config};
pub use evidence::{EvidenceConfig, EvidenceRenderer};
pub use patterns::PatternSet;
pub use pipeline::{Pipeline, PipelineRun};
pub use remediate::{PatchPolicy, RemediationEngine};
pub use reporters::{ConsoleReporter, NullReporter, OutputFormat, Reporter};
pub use scanner::Scanner;
pub use types::{EvidenceArtifact, Finding, PipelineError, RunStatus, Stage};
