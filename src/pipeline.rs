//! Pipeline orchestrator: sequences inspect, decompile, scan, remediate,
//! repackage and sign around the core engines, isolating failures per stage.

use crate::adapters::{
    AaptInspector, ApktoolAdapter, Decompiler, Inspector, JarsignerAdapter, Repackager, Signer,
};
use crate::config::Config;
use crate::evidence::EvidenceRenderer;
use crate::patterns::PatternSet;
use crate::remediate::RemediationEngine;
use crate::reporters::{FindingsReport, NullReporter, Reporter};
use crate::scanner::Scanner;
use crate::types::{
    EvidenceArtifact, Finding, PipelineError, RunStatus, Stage, StageOutcome, StageRecord,
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Top-level aggregate for one target package. Created at orchestration
/// start, mutated only as stages complete, and discarded at process end;
/// its on-disk side effects (tree, evidence, rebuilt package) remain.
#[derive(Debug)]
pub struct PipelineRun {
    pub target: PathBuf,
    pub target_sha256: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Base directory holding everything this run produces.
    pub report_dir: PathBuf,
    /// Decompiled source tree root.
    pub tree_root: PathBuf,
    pub evidence_dir: PathBuf,
    /// Rebuilt package written by the repackage stage.
    pub rebuilt: PathBuf,
    /// Findings in canonical order, reflecting the pre-remediation snapshot.
    pub findings: Vec<Finding>,
    pub artifacts: Vec<EvidenceArtifact>,
    pub files_patched: usize,
    pub history: Vec<StageRecord>,
    pub status: RunStatus,
}

impl PipelineRun {
    fn new(target: &Path, report_dir: &Path) -> Self {
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string());

        Self {
            target: target.to_path_buf(),
            target_sha256: None,
            started_at: Utc::now(),
            report_dir: report_dir.to_path_buf(),
            tree_root: report_dir.join(&stem),
            evidence_dir: report_dir.join(format!("{stem}_evidence")),
            rebuilt: report_dir.join(format!("new_{stem}.apk")),
            findings: Vec::new(),
            artifacts: Vec::new(),
            files_patched: 0,
            history: Vec::new(),
            status: RunStatus::Running,
        }
    }

    /// Path of the persisted audit report for this run.
    pub fn findings_report_path(&self) -> PathBuf {
        let stem = self
            .tree_root
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string());
        self.report_dir.join(format!("{stem}_findings.json"))
    }

    fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        self.history.push(StageRecord { stage, outcome });
    }
}

struct StageFailure {
    stage: Stage,
    message: String,
}

fn fail(stage: Stage, err: impl std::fmt::Display) -> StageFailure {
    StageFailure {
        stage,
        message: err.to_string(),
    }
}

/// Orchestrates one scan-and-remediate pipeline.
pub struct Pipeline {
    config: Config,
    patterns: PatternSet,
    decompiler: Box<dyn Decompiler>,
    repackager: Box<dyn Repackager>,
    signer: Box<dyn Signer>,
    inspector: Box<dyn Inspector>,
    reporter: Box<dyn Reporter>,
}

impl Pipeline {
    /// Wire the real external tools from configuration. Reporting defaults
    /// to silent; see [`Pipeline::with_reporter`].
    pub fn new(config: Config) -> Self {
        let apktool = ApktoolAdapter::new(&config.tools.java, &config.tools.apktool);
        let signer = JarsignerAdapter::new(&config.tools.jarsigner);
        let inspector = AaptInspector::new(&config.tools.aapt);

        Self::with_adapters(
            config,
            Box::new(apktool.clone()),
            Box::new(apktool),
            Box::new(signer),
            Box::new(inspector),
        )
    }

    /// Wire explicit adapters. This is the seam integration tests use to
    /// exercise the state machine without apktool or jarsigner installed.
    pub fn with_adapters(
        config: Config,
        decompiler: Box<dyn Decompiler>,
        repackager: Box<dyn Repackager>,
        signer: Box<dyn Signer>,
        inspector: Box<dyn Inspector>,
    ) -> Self {
        let patterns = PatternSet::builtin_with_extra(&config.extra_patterns);
        Self {
            config,
            patterns,
            decompiler,
            repackager,
            signer,
            inspector,
            reporter: Box::new(NullReporter),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Run every stage against `target`.
    ///
    /// `Err` is returned only for startup failures, before any stage runs.
    /// A stage failure terminates the run and is reported through the
    /// returned [`PipelineRun`]: its status names the failing stage, its
    /// history the underlying cause. Failed runs are not retryable; rerun
    /// the whole pipeline.
    pub async fn run(&self, target: &Path) -> Result<PipelineRun, PipelineError> {
        if !target.exists() {
            return Err(PipelineError::MissingTarget(target.to_path_buf()));
        }
        std::fs::create_dir_all(&self.config.report_dir).map_err(|source| {
            PipelineError::OutputDir {
                path: self.config.report_dir.clone(),
                source,
            }
        })?;

        let mut run = PipelineRun::new(target, &self.config.report_dir);
        run.target_sha256 = digest_file(target);

        match self.execute(&mut run).await {
            Ok(()) => {
                run.status = RunStatus::Done;
                self.reporter.note("process completed successfully");
            }
            Err(failure) => {
                self.reporter.stage_failed(failure.stage, &failure.message);
                run.record(failure.stage, StageOutcome::Failed(failure.message));
                run.status = RunStatus::Failed(failure.stage);
            }
        }
        Ok(run)
    }

    async fn execute(&self, run: &mut PipelineRun) -> Result<(), StageFailure> {
        self.inspect(run).await;
        self.decompile(run).await?;
        self.scan(run);
        self.remediate(run)?;
        self.repackage(run).await?;
        self.sign(run).await
    }

    /// Metadata extraction surfaces package info for the operator. It
    /// produces no pipeline state, so failure is logged and skipped.
    async fn inspect(&self, run: &mut PipelineRun) {
        self.reporter.stage_started(Stage::Inspect);
        match self.inspector.inspect(&run.target).await {
            Ok(summary) => {
                self.reporter.package_summary(&summary);
                self.reporter.stage_completed(Stage::Inspect, "");
                run.record(Stage::Inspect, StageOutcome::Completed);
            }
            Err(err) => {
                tracing::warn!("package inspection failed: {err}");
                self.reporter.stage_warned(Stage::Inspect, &err.to_string());
                run.record(Stage::Inspect, StageOutcome::Warned(err.to_string()));
            }
        }
    }

    async fn decompile(&self, run: &mut PipelineRun) -> Result<(), StageFailure> {
        self.reporter.stage_started(Stage::Decompile);
        self.decompiler
            .decompile(&run.target, &run.tree_root)
            .await
            .map_err(|err| fail(Stage::Decompile, err))?;
        ensure_populated(&run.tree_root).map_err(|message| StageFailure {
            stage: Stage::Decompile,
            message,
        })?;
        self.reporter
            .stage_completed(Stage::Decompile, &run.tree_root.display().to_string());
        run.record(Stage::Decompile, StageOutcome::Completed);
        Ok(())
    }

    /// Scanning never fails the run; unreadable files are per-file warnings
    /// inside the scanner.
    fn scan(&self, run: &mut PipelineRun) {
        self.reporter.stage_started(Stage::Scan);
        let scanner = Scanner::new(self.patterns.clone());
        run.findings = scanner.scan_tree(&run.tree_root);
        self.reporter.findings(&run.findings);
        run.record(Stage::Scan, StageOutcome::Completed);

        // Audit copy of the findings list; losing it does not lose the run.
        let report_path = run.findings_report_path();
        if let Err(err) = self.save_findings(run, &report_path) {
            tracing::warn!("could not persist findings report: {err}");
        } else {
            self.reporter
                .note(&format!("findings saved to {}", report_path.display()));
        }
    }

    fn save_findings(&self, run: &PipelineRun, path: &Path) -> anyhow::Result<()> {
        let report = FindingsReport::new(run.tree_root.clone(), run.findings.clone())
            .with_target(run.target.clone(), run.target_sha256.clone());
        let mut file = std::fs::File::create(path)?;
        crate::reporters::report(&report, crate::reporters::OutputFormat::Json, &mut file)
    }

    /// Evidence rendering is best-effort; the patching that follows is not.
    fn remediate(&self, run: &mut PipelineRun) -> Result<(), StageFailure> {
        self.reporter.stage_started(Stage::Remediate);

        if !run.findings.is_empty() {
            let renderer = EvidenceRenderer::new(&self.config.evidence);
            run.artifacts = renderer.render_all(&run.findings, &run.evidence_dir);
            self.reporter.note(&format!(
                "{} evidence image(s) in {}",
                run.artifacts.len(),
                run.evidence_dir.display()
            ));
        }

        if !run.tree_root.is_dir() {
            return Err(StageFailure {
                stage: Stage::Remediate,
                message: format!("decompiled tree missing: {}", run.tree_root.display()),
            });
        }

        let engine = RemediationEngine::new(self.patterns.clone(), self.config.patch_policy);
        run.files_patched = engine
            .remediate(&run.tree_root)
            .map_err(|err| fail(Stage::Remediate, err))?;
        self.reporter.stage_completed(
            Stage::Remediate,
            &format!("{} file(s) patched", run.files_patched),
        );
        run.record(Stage::Remediate, StageOutcome::Completed);
        Ok(())
    }

    async fn repackage(&self, run: &mut PipelineRun) -> Result<(), StageFailure> {
        ensure_populated(&run.tree_root).map_err(|message| StageFailure {
            stage: Stage::Repackage,
            message,
        })?;
        self.reporter.stage_started(Stage::Repackage);
        self.repackager
            .repackage(&run.tree_root, &run.rebuilt)
            .await
            .map_err(|err| fail(Stage::Repackage, err))?;
        self.reporter
            .stage_completed(Stage::Repackage, &run.rebuilt.display().to_string());
        run.record(Stage::Repackage, StageOutcome::Completed);
        Ok(())
    }

    async fn sign(&self, run: &mut PipelineRun) -> Result<(), StageFailure> {
        let signing = &self.config.signing;

        // Preconditions are checked here; the external tool is never invoked
        // when either file is missing.
        if !run.rebuilt.exists() {
            return Err(StageFailure {
                stage: Stage::Sign,
                message: format!("rebuilt package not found: {}", run.rebuilt.display()),
            });
        }
        if !signing.keystore.exists() {
            return Err(StageFailure {
                stage: Stage::Sign,
                message: format!("keystore not found: {}", signing.keystore.display()),
            });
        }
        let password = signing.password().map_err(|err| fail(Stage::Sign, err))?;

        self.reporter.stage_started(Stage::Sign);
        self.signer
            .sign(&run.rebuilt, &signing.keystore, &signing.alias, &password)
            .await
            .map_err(|err| fail(Stage::Sign, err))?;
        self.reporter
            .stage_completed(Stage::Sign, &run.rebuilt.display().to_string());
        run.record(Stage::Sign, StageOutcome::Completed);
        Ok(())
    }
}

/// A stage may only run once its predecessor's output directory exists and
/// is non-empty.
fn ensure_populated(dir: &Path) -> Result<(), String> {
    if !dir.is_dir() {
        return Err(format!("expected output directory missing: {}", dir.display()));
    }
    match std::fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_none() {
                Err(format!("output directory is empty: {}", dir.display()))
            } else {
                Ok(())
            }
        }
        Err(err) => Err(format!("cannot read {}: {err}", dir.display())),
    }
}

fn digest_file(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    Some(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_populated() {
        let tmp = TempDir::new().unwrap();
        assert!(ensure_populated(tmp.path()).is_err());

        fs::write(tmp.path().join("a.xml"), "x").unwrap();
        assert!(ensure_populated(tmp.path()).is_ok());

        assert!(ensure_populated(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn test_run_layout_derived_from_target_stem() {
        let run = PipelineRun::new(Path::new("builds/demo.apk"), Path::new("report"));
        assert_eq!(run.tree_root, PathBuf::from("report/demo"));
        assert_eq!(run.evidence_dir, PathBuf::from("report/demo_evidence"));
        assert_eq!(run.rebuilt, PathBuf::from("report/new_demo.apk"));
        assert_eq!(
            run.findings_report_path(),
            PathBuf::from("report/demo_findings.json")
        );
        assert_eq!(run.status, RunStatus::Running);
    }

    #[test]
    fn test_digest_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("demo.apk");
        fs::write(&path, b"not really an apk").unwrap();
        let digest = digest_file(&path).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest_file(&tmp.path().join("gone.apk")).is_none());
    }
}
