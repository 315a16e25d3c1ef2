//! apktool invocation for decompiling and rebuilding packages.

use super::{run_status, Decompiler, Repackager};
use crate::types::ToolError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Drives `apktool.jar` through the configured `java` binary.
#[derive(Debug, Clone)]
pub struct ApktoolAdapter {
    java: PathBuf,
    jar: PathBuf,
}

impl ApktoolAdapter {
    pub fn new(java: impl Into<PathBuf>, jar: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            jar: jar.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.java);
        command.arg("-jar").arg(&self.jar);
        command
    }
}

#[async_trait]
impl Decompiler for ApktoolAdapter {
    async fn decompile(&self, target: &Path, out_dir: &Path) -> Result<(), ToolError> {
        let mut command = self.command();
        command
            .arg("d")
            .arg(target)
            .arg("-f")
            .arg("-o")
            .arg(out_dir);
        run_status("apktool", &mut command).await
    }
}

#[async_trait]
impl Repackager for ApktoolAdapter {
    async fn repackage(&self, tree_root: &Path, dest: &Path) -> Result<(), ToolError> {
        let mut command = self.command();
        command.arg("b").arg(tree_root).arg("-o").arg(dest);
        run_status("apktool", &mut command).await
    }
}
