//! Pattern matching primitives shared by every rule.
//!
//! - [`Glob`]: anchored, case-insensitive `*`/`?` wildcard pattern
//! - [`AddressFilter`]: constrains one address field (`to`, `cc`, ...)
//! - [`HeaderFilter`]: constrains one header by name
//! - [`LabelFilter`]: included/excluded label sets
//!
//! An absent filter never constrains; that case is handled by the rule
//! holding an `Option` of the filter, not by the filter itself.

use regex::Regex;
use serde::{Deserialize, Deserializer};

use mailtriage_mime::{Address, Headers};

use crate::error::{Error, Result};
use crate::label::{Label, Labels};

/// A compiled wildcard pattern.
///
/// `*` matches any run of characters, `?` exactly one; everything else is
/// literal. Matching is case-insensitive and anchored to the whole input.
#[derive(Debug, Clone)]
pub struct Glob {
    source: String,
    regex: Regex,
}

impl Glob {
    /// Compiles a glob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] if the translated expression is rejected
    /// (for instance when it exceeds the regex size limit).
    pub fn new(pattern: &str) -> Result<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push_str("(?is)^");
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                _ => expr.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|source| Error::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Returns true if the whole of `text` matches.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Glob {}

impl TryFrom<String> for Glob {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl<'de> Deserialize<'de> for Glob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Returns true if any pattern matches `text`.
#[must_use]
pub fn any_match(patterns: &[Glob], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Either a single value or a list, as accepted in config files.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Constraint on one address field.
///
/// An empty pattern list requires the field to hold no address at all;
/// otherwise at least one address must match at least one pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    /// Globs matched against the bare `local@domain` form.
    pub patterns: Vec<Glob>,
}

impl AddressFilter {
    /// Builds a filter from raw glob strings.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob fails to compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Glob::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Filter that only accepts an empty field.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Evaluates the filter against the addresses of one field.
    #[must_use]
    pub fn matches(&self, addresses: &[Address]) -> bool {
        if self.patterns.is_empty() {
            return addresses.is_empty();
        }
        addresses
            .iter()
            .any(|addr| any_match(&self.patterns, &addr.email))
    }
}

impl<'de> Deserialize<'de> for AddressFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let patterns: Vec<Glob> = OneOrMany::deserialize(deserializer)?.into();
        Ok(Self { patterns })
    }
}

/// Constraint on one header.
///
/// An empty pattern list requires the header to be absent; otherwise the
/// header must be present and one of its values must match one pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFilter {
    /// Header name, matched case-insensitively.
    pub name: String,
    /// Globs matched against each header value.
    pub patterns: Vec<Glob>,
}

impl HeaderFilter {
    /// Builds a filter from raw glob strings.
    ///
    /// # Errors
    ///
    /// Returns an error if any glob fails to compile.
    pub fn new<S: AsRef<str>>(name: impl Into<String>, patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Glob::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: name.into(),
            patterns,
        })
    }

    /// Evaluates the filter against a header map.
    #[must_use]
    pub fn matches(&self, headers: &Headers) -> bool {
        if self.patterns.is_empty() {
            return !headers.contains(&self.name);
        }
        headers
            .get_all(&self.name)
            .into_iter()
            .any(|value| any_match(&self.patterns, value))
    }
}

/// Label constraint: any of `included` must be present (when non-empty),
/// none of `excluded` may be.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    /// Labels of which at least one must be present.
    pub included: Vec<Label>,
    /// Labels of which none may be present.
    pub excluded: Vec<Label>,
}

impl LabelFilter {
    /// Filter requiring any of the given labels.
    #[must_use]
    pub fn any_of<I, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        Self {
            included: labels.into_iter().map(Into::into).collect(),
            excluded: Vec::new(),
        }
    }

    /// Adds exclusions.
    #[must_use]
    pub fn excluding<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        self.excluded.extend(labels.into_iter().map(Into::into));
        self
    }

    /// True when the filter places no constraint.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty()
    }

    /// Evaluates the filter against a label set.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        if !self.included.is_empty() && !labels.contains_any(&self.included) {
            return false;
        }
        !labels.contains_any(&self.excluded)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFilterRepr {
    List(OneOrMany<Label>),
    Table {
        #[serde(default)]
        included: Vec<Label>,
        #[serde(default)]
        excluded: Vec<Label>,
    },
}

impl<'de> Deserialize<'de> for LabelFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(match LabelFilterRepr::deserialize(deserializer)? {
            LabelFilterRepr::List(list) => Self {
                included: list.into(),
                excluded: Vec::new(),
            },
            LabelFilterRepr::Table { included, excluded } => Self { included, excluded },
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addrs(emails: &[&str]) -> Vec<Address> {
        emails.iter().map(|e| Address::new(*e)).collect()
    }

    #[test]
    fn test_glob_wildcards() {
        let glob = Glob::new("*@example.com").unwrap();
        assert!(glob.is_match("test@example.com"));
        assert!(glob.is_match("TEST@EXAMPLE.COM"));
        assert!(!glob.is_match("test@example.com.evil"));

        let glob = Glob::new("user?@x.org").unwrap();
        assert!(glob.is_match("user1@x.org"));
        assert!(!glob.is_match("user12@x.org"));
    }

    #[test]
    fn test_glob_is_anchored_and_literal() {
        let glob = Glob::new("a.b").unwrap();
        assert!(glob.is_match("a.b"));
        assert!(!glob.is_match("axb"));
        assert!(!glob.is_match("xa.b"));

        let glob = Glob::new("[repo] (1)+").unwrap();
        assert!(glob.is_match("[REPO] (1)+"));
    }

    #[test]
    fn test_address_filter_exact_and_glob() {
        let filter = AddressFilter::new(&["test@example.com", "*@test.com"]).unwrap();
        assert!(filter.matches(&addrs(&["test@example.com"])));
        assert!(filter.matches(&addrs(&["other@elsewhere.org", "user@test.com"])));
        assert!(!filter.matches(&addrs(&["other@example.com"])));
        assert!(!filter.matches(&[]));
    }

    #[test]
    fn test_address_filter_empty_requires_no_addresses() {
        let filter = AddressFilter::empty();
        assert!(filter.matches(&[]));
        assert!(!filter.matches(&addrs(&["cc@example.com"])));
    }

    #[test]
    fn test_header_filter_patterns() {
        let mut headers = Headers::new();
        headers.add("List-Id", "<repo.github.com>");

        let filter = HeaderFilter::new("list-id", &["*github*"]).unwrap();
        assert!(filter.matches(&headers));

        let filter = HeaderFilter::new("List-Id", &["*gitlab*"]).unwrap();
        assert!(!filter.matches(&headers));

        let filter = HeaderFilter::new("X-Priority", &["1"]).unwrap();
        assert!(!filter.matches(&headers));
    }

    #[test]
    fn test_header_filter_empty_requires_absence() {
        let mut headers = Headers::new();
        let filter = HeaderFilter {
            name: "List-Id".to_string(),
            patterns: Vec::new(),
        };
        assert!(filter.matches(&headers));

        headers.add("List-Id", "<x>");
        assert!(!filter.matches(&headers));
    }

    #[test]
    fn test_header_filter_any_value() {
        let mut headers = Headers::new();
        headers.add("Delivered-To", "a@example.com");
        headers.add("Delivered-To", "b@example.com");
        let filter = HeaderFilter::new("Delivered-To", &["b@*"]).unwrap();
        assert!(filter.matches(&headers));
    }

    #[test]
    fn test_label_filter() {
        let labels: Labels = ["INBOX", "\\Seen"].into_iter().collect();

        assert!(LabelFilter::default().matches(&labels));
        assert!(LabelFilter::any_of(["Starred", "INBOX"]).matches(&labels));
        assert!(!LabelFilter::any_of(["Starred"]).matches(&labels));
        assert!(
            !LabelFilter::any_of(["INBOX"])
                .excluding(["Seen"])
                .matches(&labels)
        );
        assert!(LabelFilter::default().excluding(["Spam"]).matches(&labels));
    }

    #[test]
    fn test_label_filter_deserialize_shapes() {
        let single: LabelFilter = serde_json::from_str(r#""Starred""#).unwrap();
        assert_eq!(single.included, vec![Label::Starred]);

        let list: LabelFilter = serde_json::from_str(r#"["Starred", "Important"]"#).unwrap();
        assert_eq!(list.included, vec![Label::Starred, Label::Important]);

        let table: LabelFilter =
            serde_json::from_str(r#"{"included": ["INBOX"], "excluded": ["Seen"]}"#).unwrap();
        assert_eq!(table.included, vec![Label::Inbox]);
        assert_eq!(table.excluded, vec![Label::Seen]);
    }

    #[test]
    fn test_address_filter_deserialize_shapes() {
        let one: AddressFilter = serde_json::from_str(r#""*@example.com""#).unwrap();
        assert_eq!(one.patterns.len(), 1);

        let none: AddressFilter = serde_json::from_str("[]").unwrap();
        assert!(none.patterns.is_empty());
    }

    proptest! {
        #[test]
        fn prop_literal_glob_matches_itself_any_case(text in "[a-zA-Z0-9@._+\\-\\[\\]() ]{0,24}") {
            let glob = Glob::new(&text).unwrap();
            prop_assert!(glob.is_match(&text));
            prop_assert!(glob.is_match(&text.to_uppercase()));
            prop_assert!(glob.is_match(&text.to_lowercase()));
        }

        #[test]
        fn prop_star_matches_everything(text in "\\PC{0,32}") {
            let glob = Glob::new("*").unwrap();
            prop_assert!(glob.is_match(&text));
        }
    }
}
