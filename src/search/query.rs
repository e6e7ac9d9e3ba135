//! Search queries
//!
//! A [`Query`] is a literal substring or a regular expression plus the flags
//! selecting what it is tested against. Queries are immutable for the
//! lifetime of a search and are cloned into each delegated worker call.

use crate::error::ConfigError;
use crate::store::ValueData;
use regex::{Regex, RegexBuilder};

/// What a query is tested against, and how
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchFlags {
    /// Test key names
    pub keys: bool,
    /// Test value names
    pub values: bool,
    /// Test rendered value data
    pub data: bool,
    /// Compare case-sensitively
    pub case_sensitive: bool,
    /// Require the whole name to match
    pub exact: bool,
}

impl Default for MatchFlags {
    fn default() -> Self {
        Self {
            keys: true,
            values: true,
            data: false,
            case_sensitive: false,
            exact: false,
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Needle, lowercased when matching case-insensitively
    Literal(String),
    Regex(Regex),
}

/// Compiled search query
#[derive(Debug, Clone)]
pub struct Query {
    pattern: String,
    matcher: Matcher,
    flags: MatchFlags,
}

impl Query {
    /// Literal substring (or whole-name, with `exact`) query
    pub fn literal(text: impl Into<String>, flags: MatchFlags) -> Self {
        let pattern = text.into();
        let needle = if flags.case_sensitive {
            pattern.clone()
        } else {
            pattern.to_lowercase()
        };
        Self {
            pattern,
            matcher: Matcher::Literal(needle),
            flags,
        }
    }

    /// Regular expression query; `exact` anchors it to the whole name
    pub fn regex(pattern: impl Into<String>, flags: MatchFlags) -> Result<Self, ConfigError> {
        let pattern = pattern.into();
        let source = if flags.exact {
            format!("^(?:{})$", pattern)
        } else {
            pattern.clone()
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(!flags.case_sensitive)
            .build()
            .map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            pattern,
            matcher: Matcher::Regex(regex),
            flags,
        })
    }

    /// The pattern as given
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Active flags
    pub fn flags(&self) -> MatchFlags {
        self.flags
    }

    /// Test arbitrary text against the pattern
    pub fn is_match(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(re) => re.is_match(text),
            Matcher::Literal(needle) => {
                if self.flags.case_sensitive {
                    self.literal_match(text, needle)
                } else {
                    self.literal_match(&text.to_lowercase(), needle)
                }
            }
        }
    }

    fn literal_match(&self, text: &str, needle: &str) -> bool {
        if self.flags.exact {
            text == needle
        } else {
            text.contains(needle)
        }
    }

    /// True if the key name should be reported
    pub fn matches_key(&self, name: &str) -> bool {
        self.flags.keys && self.is_match(name)
    }

    /// True if the value should be reported, by name or by data
    pub fn matches_value(&self, name: &str, data: &ValueData) -> bool {
        (self.flags.values && self.is_match(name))
            || (self.flags.data && self.is_match(&data.to_string()))
    }

    /// True if a node's values need to be read at all
    pub fn scans_values(&self) -> bool {
        self.flags.values || self.flags.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_case_insensitive() {
        let q = Query::literal("Foo", MatchFlags::default());
        assert!(q.is_match("myFOObar"));
        assert!(q.is_match("foo"));
        assert!(!q.is_match("fo"));
    }

    #[test]
    fn test_literal_case_sensitive_exact() {
        let flags = MatchFlags {
            case_sensitive: true,
            exact: true,
            ..MatchFlags::default()
        };
        let q = Query::literal("Foo", flags);
        assert!(q.is_match("Foo"));
        assert!(!q.is_match("foo"));
        assert!(!q.is_match("Foobar"));
    }

    #[test]
    fn test_regex_exact_is_anchored() {
        let flags = MatchFlags {
            exact: true,
            ..MatchFlags::default()
        };
        let q = Query::regex("run|runonce", flags).unwrap();
        assert!(q.is_match("RunOnce"));
        assert!(!q.is_match("RunOnceEx"));
    }

    #[test]
    fn test_invalid_regex() {
        let err = Query::regex("(unclosed", MatchFlags::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_value_matching_flags() {
        let q = Query::literal("dark", MatchFlags::default());
        let data = ValueData::Sz("dark".into());
        assert!(!q.matches_value("Theme", &data));

        let q = Query::literal(
            "dark",
            MatchFlags {
                data: true,
                ..MatchFlags::default()
            },
        );
        assert!(q.matches_value("Theme", &data));
        assert!(q.matches_value("darkMode", &ValueData::None));
    }

    #[test]
    fn test_data_matches_numbers() {
        let q = Query::literal(
            "2a",
            MatchFlags {
                keys: false,
                values: false,
                data: true,
                ..MatchFlags::default()
            },
        );
        assert!(q.scans_values());
        assert!(!q.matches_key("2a"));
        assert!(q.matches_value("Count", &ValueData::Dword(42)));
    }
}
