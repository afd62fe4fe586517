//! TTL state filters.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Deserializer};

use super::duration::{format_duration, parse_duration};
use crate::action::Action;
use crate::label::{Label, Labels};
use crate::pattern::LabelFilter;

/// How long a message may live before its state rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Never expires and protects the whole thread.
    Keep,
    /// Expires after a fixed age.
    Fixed(Duration),
    /// Age limit chosen by read state. `None` never expires.
    ReadUnread {
        /// Limit for messages carrying the read marker.
        read: Option<Duration>,
        /// Limit for messages without it.
        unread: Option<Duration>,
    },
}

/// Outcome of applying a [`Ttl`] to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Protected by `Keep`.
    Protected,
    /// Expires once older than the duration.
    Expires(Duration),
    /// Never expires, but does not protect its thread either.
    Unlimited,
}

impl Ttl {
    /// Lifetime of a message in the given read state.
    #[must_use]
    pub const fn lifetime(&self, is_read: bool) -> Lifetime {
        let limit = match *self {
            Self::Keep => return Lifetime::Protected,
            Self::Fixed(d) => Some(d),
            Self::ReadUnread { read, unread } => {
                if is_read {
                    read
                } else {
                    unread
                }
            }
        };
        match limit {
            Some(d) => Lifetime::Expires(d),
            None => Lifetime::Unlimited,
        }
    }

    /// Returns true for [`Ttl::Keep`].
    #[must_use]
    pub const fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |d: Option<Duration>| d.map_or_else(|| "never".to_string(), format_duration);
        match *self {
            Self::Keep => write!(f, "Keep"),
            Self::Fixed(d) => write!(f, "{}", format_duration(d)),
            Self::ReadUnread { read, unread } => {
                write!(f, "{{read: {}, unread: {}}}", side(read), side(unread))
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SplitRepr {
    #[serde(default)]
    read: Option<String>,
    #[serde(default)]
    unread: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TtlRepr {
    Text(String),
    Split(SplitRepr),
}

impl<'de> Deserialize<'de> for Ttl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;

        let parse = |raw: Option<String>| {
            raw.map(|r| parse_duration(&r))
                .transpose()
                .map_err(D::Error::custom)
        };

        match TtlRepr::deserialize(deserializer)? {
            TtlRepr::Text(text) if text.trim().eq_ignore_ascii_case("keep") => Ok(Self::Keep),
            TtlRepr::Text(text) => parse_duration(&text)
                .map(Self::Fixed)
                .map_err(D::Error::custom),
            TtlRepr::Split(SplitRepr {
                read: None,
                unread: None,
            }) => Err(D::Error::custom(
                "ttl table needs at least one of `read` or `unread`",
            )),
            TtlRepr::Split(SplitRepr { read, unread }) => Ok(Self::ReadUnread {
                read: parse(read)?,
                unread: parse(unread)?,
            }),
        }
    }
}

/// A TTL state rule. The first rule whose label filter matches applies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StateRule {
    /// Rule name, unique within the config.
    pub name: String,
    /// Which messages the rule covers. Unconstrained means every message.
    #[serde(default, alias = "label")]
    pub labels: LabelFilter,
    /// Age limit.
    pub ttl: Ttl,
    /// Transition applied on expiry. Required unless `ttl` is `Keep`.
    #[serde(default)]
    pub action: Option<Action>,
    /// Evaluate but never apply.
    #[serde(default)]
    pub nerf: bool,
}

impl StateRule {
    /// Creates a rule covering every message.
    #[must_use]
    pub fn new(name: impl Into<String>, ttl: Ttl) -> Self {
        Self {
            name: name.into(),
            labels: LabelFilter::default(),
            ttl,
            action: None,
            nerf: false,
        }
    }

    /// Restricts the rule to messages carrying any of `labels`.
    #[must_use]
    pub fn with_labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        self.labels = LabelFilter::any_of(labels);
        self
    }

    /// Sets the transition action.
    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Marks the rule as evaluate-only.
    #[must_use]
    pub const fn nerfed(mut self) -> Self {
        self.nerf = true;
        self
    }

    /// Returns true if the rule covers a message with `labels`.
    #[must_use]
    pub fn matches(&self, labels: &Labels) -> bool {
        self.labels.matches(labels)
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

    fn rule(toml_text: &str) -> StateRule {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn test_keep_rule() {
        let r = rule("name = \"starred\"\nlabels = [\"Starred\", \"Important\"]\nttl = \"Keep\"");
        assert!(r.ttl.is_keep());
        assert_eq!(r.ttl.lifetime(true), Lifetime::Protected);
        assert_eq!(r.action, None);
        assert!(r.matches(&["\\Important"].into_iter().collect()));
        assert!(!r.matches(&["INBOX"].into_iter().collect()));
    }

    #[test]
    fn test_fixed_ttl_rule() {
        let r = rule("name = \"old\"\nttl = \"30d\"\naction = \"Delete\"\nnerf = true");
        assert_eq!(r.ttl, Ttl::Fixed(Duration::days(30)));
        assert_eq!(r.action, Some(Action::Delete));
        assert!(r.nerf);
        assert!(r.matches(&Labels::new()));
    }

    #[test]
    fn test_read_unread_ttl() {
        let r = rule(
            r#"
            name = "inbox"
            label = "INBOX"
            ttl = { read = "7d", unread = "3w" }
            action = { Move = "Purgatory" }
            "#,
        );
        assert_eq!(r.ttl.lifetime(true), Lifetime::Expires(Duration::days(7)));
        assert_eq!(r.ttl.lifetime(false), Lifetime::Expires(Duration::days(21)));
        assert_eq!(r.action, Some(Action::Move("Purgatory".to_string())));
    }

    #[test]
    fn test_read_unread_missing_side_never_expires() {
        let r = rule("name = \"x\"\nttl = { read = \"7d\" }\naction = \"Purgatory\"");
        assert_eq!(r.ttl.lifetime(false), Lifetime::Unlimited);
        assert_eq!(r.ttl.to_string(), "{read: 1w, unread: never}");
    }

    #[test]
    fn test_bad_ttl_rejected() {
        assert!(toml::from_str::<StateRule>("name = \"x\"\nttl = \"soon\"").is_err());
        assert!(toml::from_str::<StateRule>("name = \"x\"\nttl = { read = \"7x\" }").is_err());
        assert!(toml::from_str::<StateRule>("name = \"x\"").is_err());
        assert!(toml::from_str::<StateRule>("name = \"x\"\nttl = { raed = \"7d\" }").is_err());
        assert!(toml::from_str::<StateRule>("name = \"x\"\nttl = {}").is_err());
    }

    #[test]
    fn test_one_sided_ttl_accepted() {
        let r: StateRule = toml::from_str("name = \"x\"\nttl = { unread = \"21d\" }").unwrap();
        assert_eq!(
            r.ttl,
            Ttl::ReadUnread {
                read: None,
                unread: Some(Duration::days(21)),
            }
        );
    }

    #[test]
    fn test_builder() {
        let r = StateRule::new("purge", Ttl::Fixed(Duration::days(14)))
            .with_labels(["Purgatory"])
            .with_action(Action::Delete)
            .nerfed();
        assert!(r.nerf);
        assert!(r.matches(&["Purgatory"].into_iter().collect()));
    }
}
