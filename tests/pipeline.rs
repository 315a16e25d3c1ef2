//! State-machine tests for the pipeline orchestrator, using fake tool
//! adapters so no decompiler, repackager or signer needs to be installed.

use apkmend::adapters::{Decompiler, Inspector, Repackager, Signer};
use apkmend::types::{StageOutcome, ToolError};
use apkmend::{Config, Pipeline, RunStatus, Stage};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn tool_failure(tool: &str) -> ToolError {
    ToolError::Spawn {
        tool: tool.to_string(),
        source: std::io::Error::other("simulated tool failure"),
    }
}

/// Decompiler that materializes a fixed source tree.
struct FakeDecompiler {
    files: Vec<(&'static str, &'static str)>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Decompiler for FakeDecompiler {
    async fn decompile(&self, _target: &Path, out_dir: &Path) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (name, content) in &self.files {
            let path = out_dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        Ok(())
    }
}

struct FailingDecompiler;

#[async_trait]
impl Decompiler for FailingDecompiler {
    async fn decompile(&self, _target: &Path, _out_dir: &Path) -> Result<(), ToolError> {
        Err(tool_failure("apktool"))
    }
}

/// Repackager that writes a placeholder artifact.
struct FakeRepackager {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl Repackager for FakeRepackager {
    async fn repackage(&self, _tree_root: &Path, dest: &Path) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(tool_failure("apktool"));
        }
        fs::write(dest, b"rebuilt package").unwrap();
        Ok(())
    }
}

struct FakeSigner {
    calls: Arc<AtomicUsize>,
    seen_password: Arc<std::sync::Mutex<Option<String>>>,
}

#[async_trait]
impl Signer for FakeSigner {
    async fn sign(
        &self,
        artifact: &Path,
        keystore: &Path,
        _alias: &str,
        password: &str,
    ) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(artifact.exists());
        assert!(keystore.exists());
        *self.seen_password.lock().unwrap() = Some(password.to_string());
        Ok(())
    }
}

struct FakeInspector {
    fail: bool,
}

#[async_trait]
impl Inspector for FakeInspector {
    async fn inspect(&self, _target: &Path) -> Result<String, ToolError> {
        if self.fail {
            Err(tool_failure("aapt"))
        } else {
            Ok("package: name='com.example.demo'".to_string())
        }
    }
}

struct Harness {
    _tmp: TempDir,
    target: PathBuf,
    report_dir: PathBuf,
    decompile_calls: Arc<AtomicUsize>,
    repackage_calls: Arc<AtomicUsize>,
    sign_calls: Arc<AtomicUsize>,
    seen_password: Arc<std::sync::Mutex<Option<String>>>,
    pipeline: Pipeline,
}

fn harness(files: Vec<(&'static str, &'static str)>, fail_repackage: bool) -> Harness {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("demo.apk");
    fs::write(&target, b"fake apk bytes").unwrap();

    let keystore = tmp.path().join("sign_key.jks");
    fs::write(&keystore, b"fake keystore").unwrap();

    let mut config = Config::default();
    config.report_dir = tmp.path().join("report");
    config.signing.keystore = keystore;
    config.signing.password = Some("pw".to_string());
    config.evidence.canvas_width = 300;
    config.evidence.canvas_height = 120;
    config.evidence.font_size = 10.0;

    let decompile_calls = Arc::new(AtomicUsize::new(0));
    let repackage_calls = Arc::new(AtomicUsize::new(0));
    let sign_calls = Arc::new(AtomicUsize::new(0));
    let seen_password = Arc::new(std::sync::Mutex::new(None));

    let report_dir = config.report_dir.clone();
    let pipeline = Pipeline::with_adapters(
        config,
        Box::new(FakeDecompiler {
            files,
            calls: decompile_calls.clone(),
        }),
        Box::new(FakeRepackager {
            calls: repackage_calls.clone(),
            fail: fail_repackage,
        }),
        Box::new(FakeSigner {
            calls: sign_calls.clone(),
            seen_password: seen_password.clone(),
        }),
        Box::new(FakeInspector { fail: false }),
    );

    Harness {
        _tmp: tmp,
        target,
        report_dir,
        decompile_calls,
        repackage_calls,
        sign_calls,
        seen_password,
        pipeline,
    }
}

fn risky_tree() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "AndroidManifest.xml",
            "<manifest>\n  <application android:debuggable=\"true\">\n</manifest>\n",
        ),
        (
            "res/values/strings.xml",
            "<resources>\n  <string name=\"google_api_key\">\"google_api_key\"</string>\n</resources>\n",
        ),
        ("smali/Main.smali", "const-string v0, \"google_api_key\"\n"),
    ]
}

#[tokio::test]
async fn full_pipeline_reaches_done() {
    let h = harness(risky_tree(), false);
    let run = h.pipeline.run(&h.target).await.unwrap();

    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(h.decompile_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.repackage_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.sign_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.seen_password.lock().unwrap().as_deref(), Some("pw"));

    // Findings reflect the pre-remediation snapshot; the .smali file never
    // contributes.
    assert_eq!(run.findings.len(), 2);
    assert!(run
        .findings
        .iter()
        .all(|f| !f.path.to_string_lossy().ends_with(".smali")));

    // The tree was patched before repackaging.
    let manifest = fs::read_to_string(run.tree_root.join("AndroidManifest.xml")).unwrap();
    assert!(!manifest.contains("android:debuggable=\"true\""));
    assert_eq!(run.files_patched, 2);

    // On-disk side effects.
    assert!(run.rebuilt.exists());
    assert!(run.findings_report_path().exists());
    assert_eq!(run.artifacts.len(), 2);
    for artifact in &run.artifacts {
        assert!(artifact.path.exists());
    }

    // Every stage is in the history exactly once.
    assert_eq!(run.history.len(), 6);
    assert!(run
        .history
        .iter()
        .all(|r| r.outcome == StageOutcome::Completed));
}

#[tokio::test]
async fn failed_decompile_halts_before_scanning() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("demo.apk");
    fs::write(&target, b"fake apk bytes").unwrap();

    let mut config = Config::default();
    config.report_dir = tmp.path().join("report");

    let repackage_calls = Arc::new(AtomicUsize::new(0));
    let sign_calls = Arc::new(AtomicUsize::new(0));

    let pipeline = Pipeline::with_adapters(
        config,
        Box::new(FailingDecompiler),
        Box::new(FakeRepackager {
            calls: repackage_calls.clone(),
            fail: false,
        }),
        Box::new(FakeSigner {
            calls: sign_calls.clone(),
            seen_password: Arc::new(std::sync::Mutex::new(None)),
        }),
        Box::new(FakeInspector { fail: false }),
    );

    let run = pipeline.run(&target).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed(Stage::Decompile));
    // The scanner never ran and no evidence was written.
    assert!(run.findings.is_empty());
    assert!(!run.evidence_dir.exists());
    assert!(!run.findings_report_path().exists());
    assert_eq!(repackage_calls.load(Ordering::SeqCst), 0);
    assert_eq!(sign_calls.load(Ordering::SeqCst), 0);

    let failure = run.history.last().unwrap();
    assert_eq!(failure.stage, Stage::Decompile);
    assert!(matches!(failure.outcome, StageOutcome::Failed(_)));
}

#[tokio::test]
async fn failed_repackage_halts_before_signing() {
    let h = harness(risky_tree(), true);
    let run = h.pipeline.run(&h.target).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed(Stage::Repackage));
    assert_eq!(h.repackage_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.sign_calls.load(Ordering::SeqCst), 0);
    // Scan and remediation completed before the failure.
    assert_eq!(run.findings.len(), 2);
    assert_eq!(run.files_patched, 2);
}

#[tokio::test]
async fn missing_keystore_short_circuits_signing() {
    let h = harness(risky_tree(), false);
    // Remove the keystore the harness created.
    let keystore = h.report_dir.parent().unwrap().join("sign_key.jks");
    fs::remove_file(keystore).unwrap();

    let run = h.pipeline.run(&h.target).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed(Stage::Sign));
    // Precondition failed; the external tool was never invoked.
    assert_eq!(h.sign_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_target_fails_at_startup() {
    let h = harness(risky_tree(), false);
    let err = h
        .pipeline
        .run(Path::new("no/such/package.apk"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        apkmend::PipelineError::MissingTarget(_)
    ));
    assert_eq!(h.decompile_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn inspection_failure_is_nonfatal() {
    let tmp = TempDir::new().unwrap();
    let target = tmp.path().join("demo.apk");
    fs::write(&target, b"fake apk bytes").unwrap();
    let keystore = tmp.path().join("sign_key.jks");
    fs::write(&keystore, b"fake keystore").unwrap();

    let mut config = Config::default();
    config.report_dir = tmp.path().join("report");
    config.signing.keystore = keystore;
    config.signing.password = Some("pw".to_string());

    let pipeline = Pipeline::with_adapters(
        config,
        Box::new(FakeDecompiler {
            files: vec![("ok.xml", "nothing risky\n")],
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Box::new(FakeRepackager {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }),
        Box::new(FakeSigner {
            calls: Arc::new(AtomicUsize::new(0)),
            seen_password: Arc::new(std::sync::Mutex::new(None)),
        }),
        Box::new(FakeInspector { fail: true }),
    );

    let run = pipeline.run(&target).await.unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert!(matches!(
        run.history[0].outcome,
        StageOutcome::Warned(_)
    ));
}

#[tokio::test]
async fn example_scenario_smali_excluded_single_artifact() {
    // A.xml has the token at line 12, B.smali at line 3: exactly one
    // finding and one evidence image, named from the sanitized token,
    // A.xml, and 12.
    let mut a_xml = String::new();
    for _ in 0..11 {
        a_xml.push_str("<padding/>\n");
    }
    a_xml.push_str("android:debuggable=\"true\"\n");
    let a_xml: &'static str = Box::leak(a_xml.into_boxed_str());

    let h = harness(
        vec![
            ("A.xml", a_xml),
            ("B.smali", "line one\nline two\nandroid:debuggable=\"true\"\n"),
        ],
        false,
    );
    let run = h.pipeline.run(&h.target).await.unwrap();

    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.findings.len(), 1);
    assert_eq!(run.findings[0].pattern, "android:debuggable=\"true\"");
    assert!(run.findings[0].path.ends_with("A.xml"));
    assert_eq!(run.findings[0].line, 12);

    assert_eq!(run.artifacts.len(), 1);
    let name = run.artifacts[0]
        .path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    assert!(name.contains("android_debuggable"));
    assert!(name.contains("A.xml"));
    assert!(name.ends_with("_12.png"));

    // Remediation neutralized A.xml; re-scanning the tree finds nothing.
    let rescan =
        apkmend::Scanner::new(apkmend::PatternSet::builtin()).scan_tree(&run.tree_root);
    assert!(rescan.is_empty());
}
