//! Tool configuration: external tool paths, signing material, evidence
//! rendering options, and extra pattern tokens.

use crate::evidence::EvidenceConfig;
use crate::remediate::PatchPolicy;
use crate::types::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "apkmend.toml";

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base directory for per-target output (decompiled tree, evidence,
    /// rebuilt package).
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    /// How matched lines are neutralized.
    #[serde(default)]
    pub patch_policy: PatchPolicy,
    /// Tokens scanned in addition to the builtin set.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("report")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            patch_policy: PatchPolicy::default(),
            extra_patterns: Vec::new(),
            tools: ToolPaths::default(),
            signing: SigningConfig::default(),
            evidence: EvidenceConfig::default(),
        }
    }
}

/// Locations of the external tools the pipeline drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolPaths {
    #[serde(default = "default_java")]
    pub java: PathBuf,
    #[serde(default = "default_apktool")]
    pub apktool: PathBuf,
    #[serde(default = "default_jarsigner")]
    pub jarsigner: PathBuf,
    #[serde(default = "default_aapt")]
    pub aapt: PathBuf,
}

fn default_java() -> PathBuf {
    PathBuf::from("java")
}

fn default_apktool() -> PathBuf {
    PathBuf::from("tools/apktool/apktool.jar")
}

fn default_jarsigner() -> PathBuf {
    PathBuf::from("jarsigner")
}

fn default_aapt() -> PathBuf {
    PathBuf::from("aapt")
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            java: default_java(),
            apktool: default_apktool(),
            jarsigner: default_jarsigner(),
            aapt: default_aapt(),
        }
    }
}

/// Keystore material for the signing stage.
///
/// The password is read from `password_env` unless an inline `password` is
/// set; credentials never appear on a shell command line either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningConfig {
    #[serde(default = "default_keystore")]
    pub keystore: PathBuf,
    #[serde(default = "default_alias")]
    pub alias: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

fn default_keystore() -> PathBuf {
    PathBuf::from("sign_key.jks")
}

fn default_alias() -> String {
    "release".to_string()
}

fn default_password_env() -> String {
    "APKMEND_KEYSTORE_PASSWORD".to_string()
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            keystore: default_keystore(),
            alias: default_alias(),
            password: None,
            password_env: default_password_env(),
        }
    }
}

impl SigningConfig {
    /// Resolve the keystore password: inline value first, then the
    /// configured environment variable.
    pub fn password(&self) -> Result<String, ConfigError> {
        if let Some(ref password) = self.password {
            return Ok(password.clone());
        }
        std::env::var(&self.password_env).map_err(|_| ConfigError::MissingPassword {
            env: self.password_env.clone(),
        })
    }
}

impl Config {
    /// Load configuration from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from the default search path: `./apkmend.toml`, then the user
    /// config directory. Missing configuration is an error; the pipeline
    /// cannot run without tool paths.
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut searched = Vec::new();

        let cwd_config = PathBuf::from(CONFIG_FILE);
        searched.push(cwd_config.clone());
        if cwd_config.exists() {
            return Self::load(&cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("apkmend").join(CONFIG_FILE);
            searched.push(user_config.clone());
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        Err(ConfigError::NotFound {
            searched: searched
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Starter configuration written by `apkmend init`.
pub fn generate_default_config() -> String {
    r#"# apkmend configuration

# Base directory for per-target output.
report_dir = "report"

# How matched lines are neutralized: "redact", "flip", or "delete".
patch_policy = "redact"

# Tokens scanned in addition to the builtin set.
extra_patterns = []

[tools]
java = "java"
apktool = "tools/apktool/apktool.jar"
jarsigner = "jarsigner"
aapt = "aapt"

[signing]
keystore = "sign_key.jks"
alias = "release"
# Prefer the environment variable; an inline `password` also works.
password_env = "APKMEND_KEYSTORE_PASSWORD"

[evidence]
# font_path = "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf"
font_size = 20.0
canvas_width = 3000
canvas_height = 600
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.report_dir, PathBuf::from("report"));
        assert_eq!(config.patch_policy, PatchPolicy::Redact);
        assert_eq!(config.signing.alias, "release");
        assert_eq!(config.evidence.canvas_width, 3000);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("patch_policy = \"flip\"\n").unwrap();
        assert_eq!(config.patch_policy, PatchPolicy::Flip);
        assert_eq!(config.tools.java, PathBuf::from("java"));
        assert_eq!(config.signing.password_env, "APKMEND_KEYSTORE_PASSWORD");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("no_such_key = 1\n").is_err());
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = Config::load(&tmp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("apkmend.toml");
        fs::write(&path, generate_default_config()).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.tools.apktool, PathBuf::from("tools/apktool/apktool.jar"));
    }

    #[test]
    fn test_inline_password_wins_over_env() {
        let signing = SigningConfig {
            password: Some("hunter2".to_string()),
            ..Default::default()
        };
        assert_eq!(signing.password().unwrap(), "hunter2");
    }

    #[test]
    fn test_missing_password_is_error() {
        let signing = SigningConfig {
            password_env: "APKMEND_TEST_UNSET_VAR".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            signing.password().unwrap_err(),
            ConfigError::MissingPassword { .. }
        ));
    }
}
