//! Remediation engine: rewrites matched lines in place so the tree no longer
//! contains any pattern token.

use crate::patterns::PatternSet;
use crate::scanner::is_skipped;
use crate::types::RemediateError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Neutralization applied to a matching line.
///
/// Every policy guarantees that a patched file re-scanned with the same
/// pattern set yields zero findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchPolicy {
    /// Strip every token occurrence from the line.
    #[default]
    Redact,
    /// Rewrite boolean payloads inside the token (`"true"` becomes `"false"`,
    /// `(true)` becomes `(false)`); tokens without one are redacted.
    Flip,
    /// Drop the matching line entirely.
    Delete,
}

impl std::fmt::Display for PatchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PatchPolicy::Redact => "redact",
            PatchPolicy::Flip => "flip",
            PatchPolicy::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Rewrites files containing pattern tokens.
#[derive(Debug, Clone)]
pub struct RemediationEngine {
    patterns: PatternSet,
    policy: PatchPolicy,
}

impl RemediationEngine {
    pub fn new(patterns: PatternSet, policy: PatchPolicy) -> Self {
        Self { patterns, policy }
    }

    /// Walk `root` and patch every file with at least one matching line.
    /// Returns the number of files rewritten.
    ///
    /// The walk is independent of any earlier scan and applies the same
    /// exclusion filter, so disassembled bytecode is never touched. A file is
    /// either fully rewritten or left untouched: patched content is built in
    /// memory and swapped in atomically. Running twice is a no-op on the
    /// second pass.
    pub fn remediate(&self, root: &Path) -> Result<usize, RemediateError> {
        let mut touched = 0;

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("skipping unreadable directory entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() || is_skipped(entry.path()) {
                continue;
            }

            let path = entry.path();
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    // An unreadable file produced no findings at scan time
                    // either; skipping keeps the two walks consistent.
                    tracing::warn!("skipping unreadable file {}: {err}", path.display());
                    continue;
                }
            };

            let text = String::from_utf8_lossy(&bytes);
            if !text.lines().any(|line| self.patterns.matches(line)) {
                continue;
            }

            let patched = self.patch_content(&text);
            write_atomic(path, &patched).map_err(|source| RemediateError {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::debug!("patched {}", path.display());
            touched += 1;
        }

        Ok(touched)
    }

    /// Apply the policy to every matching line of `content`.
    fn patch_content(&self, content: &str) -> String {
        let mut out = String::with_capacity(content.len());
        for line in content.lines() {
            if !self.patterns.matches(line) {
                out.push_str(line);
                out.push('\n');
            } else if let Some(patched) = self.patch_line(line) {
                out.push_str(&patched);
                out.push('\n');
            }
            // Dropped lines contribute nothing, newline included.
        }
        if !content.ends_with('\n') && out.ends_with('\n') {
            out.pop();
        }
        out
    }

    /// Neutralize one matching line. `None` drops the line.
    fn patch_line(&self, line: &str) -> Option<String> {
        if self.policy == PatchPolicy::Delete {
            return None;
        }

        let mut out = line.to_string();
        for token in self.patterns.iter() {
            // Replacement can expose a new occurrence through adjacency;
            // bounded re-check instead of trusting a single pass.
            for _ in 0..4 {
                if !out.contains(token) {
                    break;
                }
                let replacement = match self.policy {
                    PatchPolicy::Flip => flip_token(token),
                    _ => String::new(),
                };
                out = out.replace(token, &replacement);
            }
        }

        if self.patterns.matches(&out) {
            // Could not neutralize in place; dropping the line still honors
            // the contract.
            return None;
        }
        Some(out)
    }
}

/// Flip the boolean payload of a token, or erase the token when it has none.
fn flip_token(token: &str) -> String {
    if token.contains("\"true\"") {
        token.replace("\"true\"", "\"false\"")
    } else if token.contains("(true)") {
        token.replace("(true)", "(false)")
    } else {
        String::new()
    }
}

/// Write `content` next to `path` and rename it into place, so an
/// interrupted rewrite never leaves a half-written file.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}
