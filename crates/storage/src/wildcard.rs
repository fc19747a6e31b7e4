//! Shell-style wildcard filters for blob names
//!
//! `*` matches any run of characters (including none), `?` matches exactly
//! one character, everything else is literal. Matching is case-sensitive and
//! covers the whole name.
//!
//! A pattern ending in `.*` also accepts names without any `.` when the part
//! before `.*` matches, the way `dir *.*` lists every file. So `*.*` matches
//! `bio` as well as `bio.txt`.

use regex::Regex;

use crate::error::BlobError;

/// Compiled wildcard pattern
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    pattern: String,
    full: Regex,
    // stem of a trailing `.*`, tried only for names without a dot
    stem: Option<Regex>,
}

impl WildcardPattern {
    /// Compile `pattern`
    pub fn new(pattern: &str) -> Result<Self, BlobError> {
        let full = compile(pattern)?;
        let stem = match pattern.strip_suffix(".*") {
            Some(stem) => Some(compile(stem)?),
            None => None,
        };

        Ok(Self {
            pattern: pattern.to_string(),
            full,
            stem,
        })
    }

    /// Original pattern text
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether `name` matches
    pub fn matches(&self, name: &str) -> bool {
        if self.full.is_match(name) {
            return true;
        }

        match &self.stem {
            Some(stem) if !name.contains('.') => stem.is_match(name),
            _ => false,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, BlobError> {
    let mut source = String::with_capacity(pattern.len() * 2 + 6);
    source.push_str("(?s)^");

    let mut literal = [0u8; 4];
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut literal))),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| BlobError::InvalidFilter {
        filter: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// One-shot match of `name` against `pattern`
///
/// Invalid patterns match nothing.
pub fn matches_wildcard(name: &str, pattern: &str) -> bool {
    WildcardPattern::new(pattern).is_ok_and(|p| p.matches(name))
}
