//! Tree scanner: walks a decompiled source tree and yields line-indexed
//! pattern matches as a lazy finding stream.

use crate::patterns::PatternSet;
use crate::types::Finding;
use std::collections::VecDeque;
use std::path::Path;
use walkdir::WalkDir;

/// Disassembled bytecode files are never scanned; their contents duplicate
/// what the readable sources already show.
pub const SKIPPED_EXTENSION: &str = ".smali";

/// Scans a source tree for pattern tokens.
#[derive(Debug, Clone)]
pub struct Scanner {
    patterns: PatternSet,
}

impl Scanner {
    pub fn new(patterns: PatternSet) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Lazily scan every regular file under `root`.
    ///
    /// Traversal sorts directory entries by name, so a fixed tree snapshot
    /// always yields the same finding sequence. Unreadable files are logged
    /// and skipped; they never abort the scan.
    pub fn scan<'a>(&'a self, root: &Path) -> FindingStream<'a> {
        FindingStream {
            patterns: &self.patterns,
            walker: WalkDir::new(root).sort_by_file_name().into_iter(),
            buffer: VecDeque::new(),
        }
    }

    /// Scan `root` and collect the findings in canonical order:
    /// (file path, line number, pattern index).
    pub fn scan_tree(&self, root: &Path) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self.scan(root).collect();
        sort_canonical(&mut findings);
        findings
    }
}

/// Canonical finding order, independent of collection order.
pub fn sort_canonical(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then(a.line.cmp(&b.line))
            .then(a.pattern_index.cmp(&b.pattern_index))
    });
}

/// Whether a file is excluded from scanning by name.
pub fn is_skipped(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().ends_with(SKIPPED_EXTENSION))
        .unwrap_or(false)
}

/// Lazy iterator over the findings of one tree walk.
///
/// Files are read one at a time; the whole tree's content is never held in
/// memory at once.
pub struct FindingStream<'a> {
    patterns: &'a PatternSet,
    walker: walkdir::IntoIter,
    buffer: VecDeque<Finding>,
}

impl FindingStream<'_> {
    fn scan_file(&mut self, path: &Path) {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!("skipping unreadable file {}: {err}", path.display());
                return;
            }
        };

        // Permissive decode: undecodable bytes are substituted, never fatal.
        let text = String::from_utf8_lossy(&bytes);
        for (offset, line) in text.lines().enumerate() {
            for (pattern_index, token) in self.patterns.matches_in(line) {
                self.buffer.push_back(Finding {
                    pattern: token.to_string(),
                    pattern_index,
                    path: path.to_path_buf(),
                    line: offset + 1,
                    text: line.to_string(),
                });
            }
        }
    }
}

impl Iterator for FindingStream<'_> {
    type Item = Finding;

    fn next(&mut self) -> Option<Finding> {
        loop {
            if let Some(finding) = self.buffer.pop_front() {
                return Some(finding);
            }

            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("skipping unreadable directory entry: {err}");
                    continue;
                }
            };

            if !entry.file_type().is_file() || is_skipped(entry.path()) {
                continue;
            }

            self.scan_file(entry.path());
        }
    }
}
