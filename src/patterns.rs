//! Risky-construct pattern tokens and the ordered set they form.
//!
//! Matching is purely lexical: a pattern matches a line when it occurs in it
//! as a substring. There are no wildcards and no language awareness.

/// Builtin tokens covering insecure manifest flags, permissive WebView
/// settings, and hardcoded service keys.
///
/// Order is fixed: it never affects matching, but it keys canonical finding
/// order and evidence filenames.
pub fn builtin_patterns() -> Vec<String> {
    [
        "android:debuggable=\"true\"",
        "android:allowBackup=\"true\"",
        "android:usesCleartextTraffic=\"true\"",
        "android:exported=\"true\"",
        ".setJavaScriptEnabled(true)",
        "\"google_api_key\"",
        "\"Google_Api_Key\"",
        "\"google_crash_reporting_api_key\"",
        "websettings.setAllowFileAccess(true)",
        "setPluginState()",
        ".firebaseio.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// An ordered, immutable collection of pattern tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSet {
    tokens: Vec<String>,
}

impl PatternSet {
    /// Build a set from explicit tokens. Empty tokens are ignored; they would
    /// match every line.
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }

    /// The builtin token set.
    pub fn builtin() -> Self {
        Self::new(builtin_patterns())
    }

    /// The builtin set followed by caller-supplied extra tokens.
    pub fn builtin_with_extra(extra: &[String]) -> Self {
        let mut tokens = builtin_patterns();
        for token in extra {
            if !token.is_empty() && !tokens.contains(token) {
                tokens.push(token.clone());
            }
        }
        Self::new(tokens)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// All tokens contained in `line`, with their pattern indices.
    /// A line holding two tokens yields two entries.
    pub fn matches_in<'a>(&'a self, line: &'a str) -> impl Iterator<Item = (usize, &'a str)> + 'a {
        self.tokens
            .iter()
            .enumerate()
            .filter(move |(_, token)| line.contains(token.as_str()))
            .map(|(index, token)| (index, token.as_str()))
    }

    /// Whether any token occurs in `line`.
    pub fn matches(&self, line: &str) -> bool {
        self.tokens.iter().any(|token| line.contains(token.as_str()))
    }
}
