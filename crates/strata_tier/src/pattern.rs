// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key patterns for bulk invalidation.

use std::fmt;

use regex::Regex;

use crate::{Error, ErrorKind};

const MAX_PATTERN_LEN: usize = 512;

/// A parsed invalidation pattern.
///
/// Patterns without `*` match any key that contains them as a substring.
/// Patterns with `*` are globs anchored at both ends, where `*` matches any run
/// of characters (including none).
///
/// # Examples
///
/// ```
/// use strata_tier::KeyPattern;
///
/// let substring = KeyPattern::parse("donor").unwrap();
/// assert!(substring.matches("api:donor-list:v2"));
///
/// let glob = KeyPattern::parse("api:donor-*").unwrap();
/// assert!(glob.matches("api:donor-list"));
/// assert!(!glob.matches("cache:api:donor-list"));
/// ```
#[derive(Clone)]
pub struct KeyPattern {
    source: String,
    matcher: Matcher,
}

#[derive(Clone)]
enum Matcher {
    Substring,
    Glob(Regex),
}

impl KeyPattern {
    /// Parses a pattern, rejecting empty, oversized or control-character input.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`ErrorKind::InvalidPattern`] when the pattern is rejected.
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        if pattern.trim().is_empty() {
            return Err(Error::with_kind(ErrorKind::InvalidPattern, "pattern must not be empty"));
        }

        if pattern.len() > MAX_PATTERN_LEN {
            return Err(Error::with_kind(
                ErrorKind::InvalidPattern,
                format!("pattern is longer than {MAX_PATTERN_LEN} bytes"),
            ));
        }

        if pattern.chars().any(char::is_control) {
            return Err(Error::with_kind(ErrorKind::InvalidPattern, "pattern contains control characters"));
        }

        let matcher = if pattern.contains('*') {
            let body = pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
            let regex = Regex::new(&format!("^{body}$")).map_err(|e| Error::with_kind(ErrorKind::InvalidPattern, e))?;
            Matcher::Glob(regex)
        } else {
            Matcher::Substring
        };

        Ok(Self {
            source: pattern.to_owned(),
            matcher,
        })
    }

    /// Returns `true` if `key` matches this pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match &self.matcher {
            Matcher::Substring => key.contains(&self.source),
            Matcher::Glob(regex) => regex.is_match(key),
        }
    }

    /// Returns the pattern as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns an equivalent glob for stores that scan with Redis glob syntax.
    ///
    /// Substring patterns become `*pattern*`. Characters other than the
    /// pattern's own `*` wildcards are escaped, so `?`, `[` and `\` match
    /// literally.
    #[must_use]
    pub fn to_glob(&self) -> String {
        match self.matcher {
            Matcher::Substring => format!("*{}*", escape_glob(&self.source)),
            Matcher::Glob(_) => self.source.split('*').map(escape_glob).collect::<Vec<_>>().join("*"),
        }
    }
}

/// Escapes `literal` so a Redis-style glob matches it verbatim.
///
/// # Examples
///
/// ```
/// assert_eq!(strata_tier::escape_glob("region=[NG]?"), r"region=\[NG\]\?");
/// ```
#[must_use]
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Debug for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyPattern").field(&self.source).finish()
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_matches_anywhere() {
        let pattern = KeyPattern::parse("inventory").expect("valid pattern");
        assert!(pattern.matches("blood-inventory:lagos"));
        assert!(pattern.matches("inventory"));
        assert!(!pattern.matches("donor-list"));
        assert_eq!(pattern.to_glob(), "*inventory*");
    }

    #[test]
    fn glob_is_anchored() {
        let pattern = KeyPattern::parse("donor-*:NG").expect("valid pattern");
        assert!(pattern.matches("donor-list:NG"));
        assert!(pattern.matches("donor-:NG"));
        assert!(!pattern.matches("donor-list:NGA"));
        assert!(!pattern.matches("x:donor-list:NG"));
        assert_eq!(pattern.to_glob(), "donor-*:NG");
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let pattern = KeyPattern::parse("a.b*").expect("valid pattern");
        assert!(pattern.matches("a.b:1"));
        assert!(!pattern.matches("axb:1"));
    }

    #[test]
    fn store_globs_escape_metacharacters() {
        let substring = KeyPattern::parse("region=[NG]").expect("valid pattern");
        assert_eq!(substring.to_glob(), r"*region=\[NG\]*");

        let glob = KeyPattern::parse(r"donor?\*").expect("valid pattern");
        assert_eq!(glob.to_glob(), r"donor\?\\*");
    }

    #[test]
    fn lone_star_matches_everything() {
        let pattern = KeyPattern::parse("*").expect("valid pattern");
        assert!(pattern.matches(""));
        assert!(pattern.matches("anything:at:all"));
    }

    #[test]
    fn rejects_invalid_patterns() {
        for input in ["", "   ", "bad\npattern"] {
            let err = KeyPattern::parse(input).expect_err("pattern should be rejected");
            assert_eq!(err.kind(), ErrorKind::InvalidPattern, "input {input:?}");
        }

        let long = "x".repeat(MAX_PATTERN_LEN + 1);
        let err = KeyPattern::parse(&long).expect_err("pattern should be rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidPattern);
    }
}
