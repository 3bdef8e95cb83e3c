//! Label matchers - predicates selecting which series qualify for a scan
//!
//! A label that is absent from a series is treated as having the empty
//! value. That rule is what makes the degenerate `""=""` matcher select
//! every series, so no special casing is needed at call sites.
//!
//! # Example
//! ```ignore
//! let m = LabelMatcher::parse(r#"job=~"ingester|querier""#)?;
//! assert!(m.matches(&Labels::from_pairs([("job", "querier")])));
//! ```

use crate::storage::{Labels, StorageError, StorageResult};
use regex::Regex;
use std::fmt;

/// Comparison operator of a matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

impl MatchType {
    fn symbol(&self) -> &'static str {
        match self {
            MatchType::Equal => "=",
            MatchType::NotEqual => "!=",
            MatchType::Regex => "=~",
            MatchType::NotRegex => "!~",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Immutable (name, operator, value) predicate over label sets
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    name: String,
    match_type: MatchType,
    value: String,
    /// Anchored pattern, present only for regex operators
    regex: Option<Regex>,
}

impl LabelMatcher {
    /// Create a matcher; fails only if a regex value does not compile
    pub fn new(
        match_type: MatchType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> StorageResult<Self> {
        let name = name.into();
        let value = value.into();

        let regex = match match_type {
            MatchType::Regex | MatchType::NotRegex => {
                let anchored = format!("^(?:{})$", value);
                Some(Regex::new(&anchored).map_err(|e| {
                    StorageError::InvalidMatcher(format!("{}{}{:?}: {}", name, match_type, value, e))
                })?)
            }
            MatchType::Equal | MatchType::NotEqual => None,
        };

        Ok(Self {
            name,
            match_type,
            value,
            regex,
        })
    }

    /// The matcher that selects every series
    pub fn match_all() -> Self {
        Self {
            name: String::new(),
            match_type: MatchType::Equal,
            value: String::new(),
            regex: None,
        }
    }

    /// Parse the text form `name<op>"value"`
    pub fn parse(input: &str) -> StorageResult<Self> {
        let op_start = input
            .find(|c: char| c == '=' || c == '!')
            .ok_or_else(|| StorageError::InvalidMatcher(format!("no operator in {:?}", input)))?;

        let name = input[..op_start].trim();
        if !is_valid_label_name(name) {
            return Err(StorageError::InvalidMatcher(format!(
                "invalid label name {:?}",
                name
            )));
        }

        let rest = &input[op_start..];
        let match_type = [
            MatchType::Regex,
            MatchType::NotRegex,
            MatchType::NotEqual,
            MatchType::Equal,
        ]
        .into_iter()
        .find(|op| rest.starts_with(op.symbol()))
        .ok_or_else(|| StorageError::InvalidMatcher(format!("unknown operator in {:?}", input)))?;

        let raw_value = rest[match_type.symbol().len()..].trim();
        let value = unquote(raw_value).ok_or_else(|| {
            StorageError::InvalidMatcher(format!("unterminated value in {:?}", input))
        })?;

        Self::new(match_type, name, value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Check if this is the degenerate select-everything matcher
    pub fn is_match_all(&self) -> bool {
        self.match_type == MatchType::Equal && self.name.is_empty() && self.value.is_empty()
    }

    /// Test a single label value (absent labels are passed as "")
    pub fn matches_value(&self, value: &str) -> bool {
        match (&self.match_type, &self.regex) {
            (MatchType::Equal, _) => value == self.value,
            (MatchType::NotEqual, _) => value != self.value,
            (MatchType::Regex, Some(re)) => re.is_match(value),
            (MatchType::NotRegex, Some(re)) => !re.is_match(value),
            (MatchType::Regex | MatchType::NotRegex, None) => false,
        }
    }

    /// Test a label set
    pub fn matches(&self, labels: &Labels) -> bool {
        self.matches_value(labels.get(&self.name).unwrap_or(""))
    }
}

impl Default for LabelMatcher {
    fn default() -> Self {
        Self::match_all()
    }
}

impl fmt::Display for LabelMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{:?}", self.name, self.match_type, self.value)
    }
}

/// Check that every matcher accepts the label set (empty slice accepts all)
pub fn matches_all(matchers: &[LabelMatcher], labels: &Labels) -> bool {
    matchers.iter().all(|m| m.matches(labels))
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => true,
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        Some(_) => false,
    }
}

fn unquote(raw: &str) -> Option<String> {
    for quote in ['"', '\''] {
        if let Some(inner) = raw.strip_prefix(quote) {
            return inner.strip_suffix(quote).map(str::to_string);
        }
    }
    Some(raw.to_string())
}
