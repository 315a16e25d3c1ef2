//! jarsigner invocation for the signing stage.

use super::{run_status, Signer};
use crate::types::ToolError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Signs rebuilt packages with `jarsigner`.
///
/// The keystore password travels as one argv element; it is never
/// interpolated into a shell string.
#[derive(Debug, Clone)]
pub struct JarsignerAdapter {
    jarsigner: PathBuf,
}

impl JarsignerAdapter {
    pub fn new(jarsigner: impl Into<PathBuf>) -> Self {
        Self {
            jarsigner: jarsigner.into(),
        }
    }
}

#[async_trait]
impl Signer for JarsignerAdapter {
    async fn sign(
        &self,
        artifact: &Path,
        keystore: &Path,
        alias: &str,
        password: &str,
    ) -> Result<(), ToolError> {
        let mut command = Command::new(&self.jarsigner);
        command
            .arg("-keystore")
            .arg(keystore)
            .arg("-storepass")
            .arg(password)
            .arg(artifact)
            .arg(alias);
        run_status("jarsigner", &mut command).await
    }
}
