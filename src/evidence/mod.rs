//! Evidence renderer: captures the source context around a finding as a
//! standalone image artifact.

pub mod font;

use crate::types::{EvidenceArtifact, Finding, RenderError};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lines captured on each side of the matched line.
const CONTEXT_LINES: usize = 5;

/// Well-known monospace font locations, tried after the configured path.
const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "C:\\Windows\\Fonts\\consola.ttf",
];

/// Rendering options for evidence images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Preferred font file; tried before the system fallback chain.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    /// Body text size in pixels.
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,
    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,
}

fn default_font_size() -> f32 {
    20.0
}

fn default_canvas_width() -> u32 {
    3000
}

fn default_canvas_height() -> u32 {
    600
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: default_font_size(),
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
        }
    }
}

enum ResolvedFont {
    TrueType(FontVec),
    /// Built-in 5x7 renderer; the terminal fallback, never fails.
    Builtin,
}

/// Renders findings into per-target evidence images.
pub struct EvidenceRenderer {
    config: EvidenceConfig,
    font: ResolvedFont,
}

impl EvidenceRenderer {
    /// Resolve the font chain once; rendering itself never fails over fonts.
    pub fn new(config: &EvidenceConfig) -> Self {
        Self {
            font: resolve_font(config.font_path.as_deref()),
            config: config.clone(),
        }
    }

    /// Render one finding into `evidence_dir`.
    ///
    /// The image holds a header naming the source file and a context window of
    /// up to [`CONTEXT_LINES`] lines on each side of the match, clamped at
    /// file bounds. A failure reports the artifact as lost; the finding
    /// itself stays valid.
    pub fn render(
        &self,
        finding: &Finding,
        evidence_dir: &Path,
    ) -> Result<EvidenceArtifact, RenderError> {
        std::fs::create_dir_all(evidence_dir).map_err(|source| RenderError::Directory {
            path: evidence_dir.to_path_buf(),
            source,
        })?;

        let bytes = std::fs::read(&finding.path).map_err(|source| RenderError::Source {
            path: finding.path.clone(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.lines().collect();

        let start = finding.line.saturating_sub(CONTEXT_LINES).min(lines.len());
        let end = (finding.line + CONTEXT_LINES).min(lines.len());
        let window = &lines[start..end];

        let path = self.artifact_path(finding, evidence_dir);
        let image = self.draw(finding, window);
        image.save(&path).map_err(|source| RenderError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(EvidenceArtifact { path })
    }

    /// Render every finding, keeping going past individual failures.
    /// Lost artifacts are logged; the findings they belong to survive.
    pub fn render_all(&self, findings: &[Finding], evidence_dir: &Path) -> Vec<EvidenceArtifact> {
        let mut artifacts = Vec::with_capacity(findings.len());
        for finding in findings {
            match self.render(finding, evidence_dir) {
                Ok(artifact) => artifacts.push(artifact),
                Err(err) => {
                    tracing::warn!(
                        "evidence lost for {} line {}: {err}",
                        finding.path.display(),
                        finding.line
                    );
                }
            }
        }
        artifacts
    }

    /// Deterministic artifact name from (sanitized token, file basename,
    /// line). Distinct tokens that sanitize identically fall back to the
    /// pattern index for disambiguation.
    fn artifact_path(&self, finding: &Finding, evidence_dir: &Path) -> PathBuf {
        let token = sanitize_token(&finding.pattern, finding.pattern_index);
        let basename = finding
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        let plain = evidence_dir.join(format!("{token}_{basename}_{}.png", finding.line));
        if !plain.exists() {
            return plain;
        }
        evidence_dir.join(format!(
            "{token}_{basename}_{}_{}.png",
            finding.line, finding.pattern_index
        ))
    }

    fn draw(&self, finding: &Finding, window: &[&str]) -> RgbImage {
        let mut canvas = RgbImage::from_pixel(
            self.config.canvas_width,
            self.config.canvas_height,
            Rgb([255, 255, 255]),
        );

        let header = format!("File location: {}", finding.path.display());
        let black = Rgb([0, 0, 0]);

        match &self.font {
            ResolvedFont::TrueType(font) => {
                let body = PxScale::from(self.config.font_size);
                let header_scale = PxScale::from(self.config.font_size * 1.5);
                let line_height = (self.config.font_size * 1.2) as i32;

                imageproc::drawing::draw_text_mut(&mut canvas, black, 5, 40, header_scale, font, &header);
                let mut y = 100;
                for line in window {
                    imageproc::drawing::draw_text_mut(&mut canvas, black, 5, y, body, font, line);
                    y += line_height;
                }
            }
            ResolvedFont::Builtin => {
                let scale = (self.config.font_size / 10.0).max(1.0) as u32;
                font::draw_text(&mut canvas, black, 5, 40, scale + 1, &header);
                let mut y = 100;
                for line in window {
                    font::draw_text(&mut canvas, black, 5, y, scale, line);
                    y += font::line_height(scale);
                }
            }
        }

        canvas
    }
}

/// Configured path first, then well-known system fonts, then the built-in
/// renderer. Font unavailability never fails a render.
fn resolve_font(configured: Option<&Path>) -> ResolvedFont {
    let candidates = configured
        .into_iter()
        .map(Path::to_path_buf)
        .chain(SYSTEM_FONT_PATHS.iter().map(PathBuf::from));

    for candidate in candidates {
        let Ok(bytes) = std::fs::read(&candidate) else {
            continue;
        };
        match FontVec::try_from_vec_and_index(bytes, 0) {
            Ok(font) => {
                tracing::debug!("evidence font: {}", candidate.display());
                return ResolvedFont::TrueType(font);
            }
            Err(err) => {
                tracing::warn!("unusable font {}: {err}", candidate.display());
            }
        }
    }

    tracing::debug!("no usable font found, using built-in renderer");
    ResolvedFont::Builtin
}

/// Strip characters unsafe for filenames from a pattern token.
fn sanitize_token(token: &str, index: usize) -> String {
    let cleaned: String = token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('_').to_string();
    if cleaned.is_empty() {
        format!("pattern{index}")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn finding_at(path: PathBuf, line: usize) -> Finding {
        Finding {
            pattern: "android:debuggable=\"true\"".to_string(),
            pattern_index: 0,
            path,
            line,
            text: "android:debuggable=\"true\"".to_string(),
        }
    }

    fn renderer() -> EvidenceRenderer {
        // Small canvas keeps tests quick; font falls back to built-in when
        // the host has no system fonts.
        EvidenceRenderer::new(&EvidenceConfig {
            font_path: None,
            font_size: 10.0,
            canvas_width: 400,
            canvas_height: 160,
        })
    }

    #[test]
    fn test_renders_artifact_named_from_token_file_line() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("AndroidManifest.xml");
        fs::write(&src, "<manifest>\nandroid:debuggable=\"true\"\n</manifest>\n").unwrap();

        let evidence = tmp.path().join("evidence");
        let artifact = renderer()
            .render(&finding_at(src, 2), &evidence)
            .unwrap();

        let name = artifact.path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("android_debuggable"));
        assert!(name.contains("AndroidManifest.xml"));
        assert!(name.ends_with("_2.png"));
        assert!(artifact.path.exists());
    }

    #[test]
    fn test_short_file_never_errors() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("one_liner.xml");
        fs::write(&src, "android:debuggable=\"true\"").unwrap();

        let artifact = renderer()
            .render(&finding_at(src, 1), &tmp.path().join("ev"))
            .unwrap();
        assert!(artifact.path.exists());
    }

    #[test]
    fn test_missing_source_reports_error_without_panicking() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("deleted.xml");
        let err = renderer()
            .render(&finding_at(gone, 1), &tmp.path().join("ev"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Source { .. }));
    }

    #[test]
    fn test_render_all_survives_one_failure() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("good.xml");
        fs::write(&good, "android:debuggable=\"true\"\n").unwrap();
        let findings = vec![
            finding_at(tmp.path().join("missing.xml"), 1),
            finding_at(good, 1),
        ];

        let artifacts = renderer().render_all(&findings, &tmp.path().join("ev"));
        assert_eq!(artifacts.len(), 1);
    }

    #[test]
    fn test_colliding_names_disambiguated_by_index() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.xml");
        fs::write(&src, "x\n").unwrap();
        let evidence = tmp.path().join("ev");

        let first = finding_at(src.clone(), 1);
        let mut second = finding_at(src, 1);
        second.pattern_index = 3;

        let r = renderer();
        let a = r.render(&first, &evidence).unwrap();
        let b = r.render(&second, &evidence).unwrap();
        assert_ne!(a.path, b.path);
        assert!(b
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_1_3.png"));
    }

    #[test]
    fn test_sanitize_token() {
        assert_eq!(
            sanitize_token("android:debuggable=\"true\"", 0),
            "android_debuggable__true"
        );
        assert_eq!(sanitize_token("\"\"", 4), "pattern4");
        assert_eq!(sanitize_token(".firebaseio.com", 10), ".firebaseio.com");
    }
}
