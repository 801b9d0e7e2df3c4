//! Join announcement matching
//!
//! Patterns are tried in order and the first one that matches wins, so the
//! table is a priority ranking. Extraction per match:
//! - second group made only of digits: `"User ID: <digits>"`
//! - otherwise the second group if the pattern has one
//! - otherwise the first group
//!
//! Matching is case-insensitive.

use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};

/// Built-in pattern table, most specific first
///
/// Mention-bearing system messages come before the generic "welcome X"
/// phrasing, which would otherwise capture the word after "welcome".
/// Keyword groups that are not the identity are non-capturing.
pub const DEFAULT_JOIN_PATTERNS: &[&str] = &[
    r"welcome to \*([^*]+)\* <@!?(\d+)>!",
    r"(welcome) <@!?(\d+)> to [^!]+!",
    r"(welcome|joined|just arrived|say hi to|new member|hey everyone welcome) @?([^\s#@]+)",
    r"(please welcome|introduce yourself to) @?([^\s#@]+)",
    r"@?([^\s#@]+) (?:has joined|is here|just arrived)",
    r"everyone welcome @?([^\s#@]+)",
    r"(new validator|validator joined|staking node|node operator) @?([^\s#@]+)",
    r"(welcome|joined) @?([^\s#@]+) (?:validator|node|staking|infrastructure)",
    r"@?([^\s#@]+) (?:joined|arrived) (?:validator|node|staking) (?:community|network)",
    r"(?:ethereum|eth) (validator|node|operator) @?([^\s#@]+) (?:joined|welcome)",
    r"(new member|welcome) @?([^\s#@]+) (?:ethereum|eth|blockchain) (?:community|network)",
    r"([^!]+) joined the server",
];

static DEFAULT_MATCHER: Lazy<PatternMatcher> = Lazy::new(|| {
    PatternMatcher::new(DEFAULT_JOIN_PATTERNS).expect("built-in join patterns compile")
});

/// Ordered set of join patterns
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<Regex>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        DEFAULT_MATCHER.clone()
    }
}

impl PatternMatcher {
    /// Compile `patterns` in priority order
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Identity announced by `text`, from the first pattern that matches
    pub fn find_join_identity(&self, text: &str) -> Option<String> {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.captures(text))
            .and_then(|caps| extract_identity(&caps))
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn extract_identity(caps: &Captures<'_>) -> Option<String> {
    match caps.get(2) {
        Some(m) if is_digits(m.as_str()) => Some(format!("User ID: {}", m.as_str())),
        Some(m) => Some(m.as_str().to_string()),
        None => caps
            .get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string()),
    }
}
