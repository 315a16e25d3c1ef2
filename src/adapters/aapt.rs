//! aapt-based package inspection.

use super::{run_capture, Inspector};
use crate::types::ToolError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Surfaces package identity, components and permissions via
/// `aapt dump badging`. The output is an opaque human-readable summary;
/// pipeline logic never depends on it.
#[derive(Debug, Clone)]
pub struct AaptInspector {
    aapt: PathBuf,
}

impl AaptInspector {
    pub fn new(aapt: impl Into<PathBuf>) -> Self {
        Self { aapt: aapt.into() }
    }
}

#[async_trait]
impl Inspector for AaptInspector {
    async fn inspect(&self, target: &Path) -> Result<String, ToolError> {
        let mut command = Command::new(&self.aapt);
        command.arg("dump").arg("badging").arg(target);
        run_capture("aapt", &mut command).await
    }
}
