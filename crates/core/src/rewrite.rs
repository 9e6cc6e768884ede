//! The URL rewrite engine applied to a request's path before it is forwarded
//! to the backend (see §4.D, "Rewrite rules").
//!
//! Rules are tried in configuration order; the first whose pattern matches
//! the whole origin path wins and no further rules are tried. A pattern with
//! more than [`MAX_CAPTURE_GROUPS`] capturing groups is rejected at load time
//! rather than silently truncated.

use regex::Regex;

use crate::error::{Error, Result};

/// Capture groups beyond this count are rejected when a rule is added.
pub const MAX_CAPTURE_GROUPS: usize = 16;

/// A single `(pattern, replacement)` rewrite rule.
///
/// `replacement` may reference capture groups from `pattern` as `$1`..`$16`.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    raw_pattern: String,
    pattern: Regex,
    replacement: String,
}

impl RewriteRule {
    /// Compile a rule, anchoring `pattern` to match the whole path.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let anchored = format!("^(?:{pattern})$");
        let compiled = Regex::new(&anchored)
            .map_err(|e| Error::InvalidUrl(format!("bad rewrite pattern {pattern:?}: {e}")))?;
        let group_count = compiled.captures_len() - 1;
        if group_count > MAX_CAPTURE_GROUPS {
            return Err(Error::InvalidUrl(format!(
                "rewrite pattern {pattern:?} has {group_count} capture groups, max is {MAX_CAPTURE_GROUPS}"
            )));
        }
        Ok(Self {
            raw_pattern: pattern.to_owned(),
            pattern: compiled,
            replacement: replacement.into(),
        })
    }

    /// The original, unanchored pattern text, for diagnostics.
    pub fn pattern(&self) -> &str {
        &self.raw_pattern
    }

    fn apply(&self, path: &str) -> Option<String> {
        let captures = self.pattern.captures(path)?;
        let mut out = String::with_capacity(self.replacement.len());
        captures.expand(&self.replacement, &mut out);
        Some(out)
    }
}

/// An ordered set of [`RewriteRule`]s, tried in order.
#[derive(Debug, Clone, Default)]
pub struct RewriteSet {
    rules: Vec<RewriteRule>,
}

impl RewriteSet {
    /// An empty rewrite set; every path passes through unchanged.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build a set from `(pattern, replacement)` pairs, in priority order.
    pub fn from_rules<I, P, R>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, R)>,
        P: AsRef<str>,
        R: Into<String>,
    {
        let rules = rules
            .into_iter()
            .map(|(pattern, replacement)| RewriteRule::new(pattern.as_ref(), replacement))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Append a rule to the end of the priority order.
    pub fn push(&mut self, rule: RewriteRule) {
        self.rules.push(rule);
    }

    /// Apply the first matching rule to `origin_path`.
    ///
    /// Returns `None` when no rule matches, in which case the caller forwards
    /// `origin_path` unchanged (see §4.D).
    pub fn rewrite(&self, origin_path: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.apply(origin_path))
    }
}
