//! Ordered ignore/notice rules.
//!
//! Rules are evaluated against paths relative to the monitored root with a
//! leading `/`. For a root `/srv/data` and an event on `/srv/data/some/file`
//! the tested path is `/some/file`. The last matching rule decides, so a later
//! `notice` can carve an exception out of an earlier, broader `ignore`.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::{MonitorError, Result};

/// Predicate deciding whether a rule applies to a path.
pub trait PathMatcher {
    fn is_match(&self, path: &str) -> bool;
}

impl PathMatcher for Regex {
    fn is_match(&self, path: &str) -> bool {
        Regex::is_match(self, path)
    }
}

/// A compiled rule pattern.
pub struct Pattern {
    source: String,
    matcher: Box<dyn PathMatcher>,
}

impl Pattern {
    /// Compile a case-insensitive regular expression.
    pub fn new(expression: &str) -> Result<Self> {
        let regex = RegexBuilder::new(expression)
            .case_insensitive(true)
            .build()
            .map_err(|e| MonitorError::InvalidPattern(format!("{expression}: {e}")))?;

        Ok(Self::from(regex))
    }

    /// Wrap a custom matching engine.
    pub fn with_matcher(source: impl Into<String>, matcher: impl PathMatcher + 'static) -> Self {
        Self {
            source: source.into(),
            matcher: Box::new(matcher),
        }
    }

    /// The expression this pattern was built from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Self::with_matcher(regex.as_str().to_string(), regex)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

/// Anything accepted by `ignore`/`notice`: plain strings are compiled,
/// compiled expressions are used as-is.
pub trait IntoPattern {
    fn into_pattern(self) -> Result<Pattern>;
}

impl IntoPattern for Pattern {
    fn into_pattern(self) -> Result<Pattern> {
        Ok(self)
    }
}

impl IntoPattern for Regex {
    fn into_pattern(self) -> Result<Pattern> {
        Ok(Pattern::from(self))
    }
}

impl IntoPattern for &str {
    fn into_pattern(self) -> Result<Pattern> {
        Pattern::new(self)
    }
}

impl IntoPattern for String {
    fn into_pattern(self) -> Result<Pattern> {
        Pattern::new(&self)
    }
}

impl IntoPattern for &String {
    fn into_pattern(self) -> Result<Pattern> {
        Pattern::new(self)
    }
}

/// A single ignore or notice rule.
#[derive(Debug)]
pub struct Rule {
    pub pattern: Pattern,
    pub ignored: bool,
}

/// Ordered rule list.
#[derive(Debug, Default)]
pub struct PathFilter {
    rules: Vec<Rule>,
}

impl PathFilter {
    /// Create an empty filter; nothing is ignored.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore events whose path matches `pattern`.
    pub fn ignore(&mut self, pattern: impl IntoPattern) -> Result<()> {
        self.push(pattern, true)
    }

    /// Notice events whose path matches `pattern`. The opposite of `ignore`.
    pub fn notice(&mut self, pattern: impl IntoPattern) -> Result<()> {
        self.push(pattern, false)
    }

    fn push(&mut self, pattern: impl IntoPattern, ignored: bool) -> Result<()> {
        let pattern = pattern.into_pattern()?;
        tracing::debug!(
            "Added {} rule: {}",
            if ignored { "ignore" } else { "notice" },
            pattern.as_str()
        );
        self.rules.push(Rule { pattern, ignored });
        Ok(())
    }

    /// Whether events for `path` are suppressed.
    pub fn test(&self, path: &str) -> bool {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.pattern.is_match(path))
            .is_some_and(|rule| rule.ignored)
    }

    /// Rules in insertion order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
