//! Adapters for the external tools the pipeline drives.
//!
//! Each adapter wraps one tool behind a trait so the orchestrator can be
//! exercised against fakes. Invocations pass explicit argument vectors, never
//! a shell string, and stage outcome is determined solely by exit status;
//! tool output is discarded rather than parsed.

mod aapt;
mod apktool;
mod jarsigner;

pub use aapt::AaptInspector;
pub use apktool::ApktoolAdapter;
pub use jarsigner::JarsignerAdapter;

use crate::types::ToolError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Materializes a readable source tree from a packaged target.
#[async_trait]
pub trait Decompiler: Send + Sync {
    async fn decompile(&self, target: &Path, out_dir: &Path) -> Result<(), ToolError>;
}

/// Rebuilds one package artifact from a (possibly patched) source tree.
#[async_trait]
pub trait Repackager: Send + Sync {
    async fn repackage(&self, tree_root: &Path, dest: &Path) -> Result<(), ToolError>;
}

/// Signs a rebuilt package with keystore material.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        artifact: &Path,
        keystore: &Path,
        alias: &str,
        password: &str,
    ) -> Result<(), ToolError>;
}

/// Read-only package metadata extraction, consumed only for reporting.
#[async_trait]
pub trait Inspector: Send + Sync {
    async fn inspect(&self, target: &Path) -> Result<String, ToolError>;
}

/// Run a tool to completion, discarding its output. Success is a zero exit
/// status; anything else is total failure.
pub(crate) async fn run_status(tool: &str, command: &mut Command) -> Result<(), ToolError> {
    let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ToolError::ExitStatus {
            tool: tool.to_string(),
            status,
        })
    }
}

/// Run a tool and capture its stdout as UTF-8 text.
pub(crate) async fn run_capture(tool: &str, command: &mut Command) -> Result<String, ToolError> {
    let output = command
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|source| ToolError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ToolError::ExitStatus {
            tool: tool.to_string(),
            status: output.status,
        });
    }

    String::from_utf8(output.stdout).map_err(|_| ToolError::BadOutput {
        tool: tool.to_string(),
    })
}
