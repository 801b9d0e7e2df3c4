//! Identity forms
//!
//! An identity is whatever string an extraction path produced: a display
//! name, an `@handle`, or `User ID: <digits>`. The ledger and the reported
//! event set compare identities after passing them through a [`Normalizer`].
//! The default keeps plain string equality, so `alice`, `@alice` and
//! `User ID: 1` are three different participants.

use joinwatch_common::config::IdentityNormalization;
use once_cell::sync::Lazy;
use regex::Regex;

static HANDLE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._]{2,32}$").expect("handle pattern compiles"));

/// Maps a raw identity to the key used for novelty checks
pub trait Normalizer: Send + Sync {
    fn canonical(&self, raw: &str) -> String;
}

/// String equality
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl Normalizer for Verbatim {
    fn canonical(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Trim, drop a leading `@`, lowercase
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseFold;

impl Normalizer for CaseFold {
    fn canonical(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        trimmed
            .strip_prefix('@')
            .unwrap_or(trimmed)
            .to_lowercase()
    }
}

pub fn normalizer_for(mode: IdentityNormalization) -> Box<dyn Normalizer> {
    match mode {
        IdentityNormalization::Verbatim => Box::new(Verbatim),
        IdentityNormalization::CaseFold => Box::new(CaseFold),
    }
}

/// Prefix `@` to a bare handle-shaped name
///
/// Names with spaces or other characters outside `[A-Za-z0-9._]` are
/// returned trimmed but otherwise unchanged.
pub fn normalize_handle(raw: &str) -> String {
    let cleaned = raw.trim();
    if !cleaned.is_empty() && !cleaned.starts_with('@') && HANDLE_SHAPE.is_match(cleaned) {
        format!("@{}", cleaned)
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_handle_prefixes_bare_handle() {
        assert_eq!(normalize_handle("alice"), "@alice");
        assert_eq!(normalize_handle("  j.doe_99 "), "@j.doe_99");
    }

    #[test]
    fn test_normalize_handle_keeps_prefixed() {
        assert_eq!(normalize_handle("@bob"), "@bob");
    }

    #[test]
    fn test_normalize_handle_leaves_display_names() {
        assert_eq!(normalize_handle("Alice Smith"), "Alice Smith");
        assert_eq!(normalize_handle("x"), "x");
        assert_eq!(normalize_handle("bob#1234"), "bob#1234");
    }

    #[test]
    fn test_verbatim_keeps_forms_distinct() {
        let n = Verbatim;
        assert_ne!(n.canonical("alice"), n.canonical("@alice"));
        assert_ne!(n.canonical("alice"), n.canonical("Alice"));
    }

    #[test]
    fn test_casefold_merges_handle_and_case() {
        let n = CaseFold;
        assert_eq!(n.canonical("@Alice"), "alice");
        assert_eq!(n.canonical(" alice "), "alice");
        assert_eq!(n.canonical("User ID: 12"), "user id: 12");
    }
}
