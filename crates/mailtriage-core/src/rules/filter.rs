//! Immediate-action message filters.

use std::collections::BTreeMap;

use mailtriage_mime::Address;
use serde::{Deserialize, Deserializer};

use crate::action::Action;
use crate::message::Message;
use crate::pattern::{AddressFilter, Glob, HeaderFilter, LabelFilter, OneOrMany, any_match};

/// A message filter rule.
///
/// All present predicates must hold. Within one predicate any pattern may
/// match. A rule with no predicate matches every message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRule {
    /// Rule name, unique within the config.
    pub name: String,
    /// Constraint on `To`.
    pub to: Option<AddressFilter>,
    /// Constraint on `Cc`.
    pub cc: Option<AddressFilter>,
    /// Constraint on `Bcc`.
    pub bcc: Option<AddressFilter>,
    /// Constraint on `From`.
    pub from: Option<AddressFilter>,
    /// Subject globs; empty means unconstrained.
    pub subject: Vec<Glob>,
    /// Label constraint.
    pub labels: LabelFilter,
    /// Header constraints.
    pub headers: Vec<HeaderFilter>,
    /// Actions applied when the rule wins.
    pub actions: Vec<Action>,
}

impl FilterRule {
    /// Creates a rule with no predicates and no actions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an action.
    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Returns true if the rule has no predicate at all.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.to.is_none()
            && self.cc.is_none()
            && self.bcc.is_none()
            && self.from.is_none()
            && self.subject.is_empty()
            && self.labels.is_unconstrained()
            && self.headers.is_empty()
    }

    /// Returns true if every predicate holds for `message`.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        let address_ok = |filter: Option<&AddressFilter>, field: &[Address]| {
            filter.is_none_or(|f| f.matches(field))
        };

        address_ok(self.to.as_ref(), &message.to)
            && address_ok(self.cc.as_ref(), &message.cc)
            && address_ok(self.bcc.as_ref(), &message.bcc)
            && address_ok(self.from.as_ref(), &message.from)
            && (self.subject.is_empty() || any_match(&self.subject, &message.subject))
            && self.labels.matches(&message.labels)
            && self.headers.iter().all(|h| h.matches(&message.headers))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FilterRuleRepr {
    name: String,
    #[serde(default)]
    to: Option<AddressFilter>,
    #[serde(default)]
    cc: Option<AddressFilter>,
    #[serde(default)]
    bcc: Option<AddressFilter>,
    #[serde(default)]
    from: Option<AddressFilter>,
    #[serde(default)]
    subject: Option<OneOrMany<Glob>>,
    #[serde(default, alias = "label")]
    labels: LabelFilter,
    #[serde(default)]
    headers: BTreeMap<String, OneOrMany<Glob>>,
    #[serde(default, alias = "action")]
    actions: Option<OneOrMany<Action>>,
}

impl<'de> Deserialize<'de> for FilterRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = FilterRuleRepr::deserialize(deserializer)?;
        Ok(Self {
            name: repr.name,
            to: repr.to,
            cc: repr.cc,
            bcc: repr.bcc,
            from: repr.from,
            subject: repr.subject.map(Vec::from).unwrap_or_default(),
            labels: repr.labels,
            headers: repr
                .headers
                .into_iter()
                .map(|(name, patterns)| HeaderFilter {
                    name,
                    patterns: patterns.into(),
                })
                .collect(),
            actions: repr.actions.map(Vec::from).unwrap_or_default(),
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
    use crate::label::{Label, Labels};
    use crate::message::Uid;
    use chrono::Utc;

    fn message(headers: &str, labels: &[&str]) -> Message {
        Message::new(
            Uid(1),
            headers.as_bytes(),
            labels.iter().copied().collect::<Labels>(),
            Utc::now(),
            None,
        )
    }

    fn rule(toml_text: &str) -> FilterRule {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn test_deserialize_full_rule() {
        let r = rule(
            r#"
            name = "newsletters"
            from = ["*@news.example.com", "digest@*"]
            cc = []
            subject = ["*weekly*"]
            labels = { included = ["INBOX"], excluded = ["Starred"] }
            headers = { List-Id = "*", X-Spam = [] }
            actions = ["Star", { AddLabel = "News" }]
            "#,
        );
        assert_eq!(r.name, "newsletters");
        assert_eq!(r.from.as_ref().unwrap().patterns.len(), 2);
        assert!(r.cc.as_ref().unwrap().patterns.is_empty());
        assert!(r.to.is_none());
        assert_eq!(r.labels.included, vec![Label::Inbox]);
        assert_eq!(r.labels.excluded, vec![Label::Starred]);
        assert_eq!(r.headers.len(), 2);
        assert_eq!(
            r.actions,
            vec![Action::Star, Action::AddLabel("News".to_string())]
        );
        assert!(!r.is_catch_all());
    }

    #[test]
    fn test_single_action_alias() {
        let r = rule(
            r#"
            name = "bills"
            to = "bills@example.com"
            action = "Bills"
            "#,
        );
        assert_eq!(r.actions, vec![Action::Move("Bills".to_string())]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<FilterRule>("name = \"x\"\nsubjet = [\"a\"]").is_err());
    }

    #[test]
    fn test_wrong_value_type_rejected() {
        assert!(toml::from_str::<FilterRule>("name = \"x\"\nsubject = 5").is_err());
        assert!(toml::from_str::<FilterRule>("name = \"x\"\nfrom = { a = 1 }").is_err());
    }

    #[test]
    fn test_catch_all_matches_everything() {
        let r = FilterRule::new("all").with_action(Action::Star);
        assert!(r.is_catch_all());
        assert!(r.matches(&message("", &[])));
    }

    #[test]
    fn test_predicates_are_anded() {
        let r = rule(
            r#"
            name = "boss"
            from = "boss@work.com"
            subject = ["urgent*"]
            "#,
        );
        assert!(r.matches(&message(
            "From: The Boss <BOSS@work.com>\r\nSubject: Urgent: call me\r\n",
            &[]
        )));
        assert!(!r.matches(&message(
            "From: boss@work.com\r\nSubject: lunch?\r\n",
            &[]
        )));
        assert!(!r.matches(&message(
            "From: other@work.com\r\nSubject: urgent\r\n",
            &[]
        )));
    }

    #[test]
    fn test_empty_cc_requires_no_cc() {
        let r = rule("name = \"direct\"\ncc = []");
        assert!(r.matches(&message("To: me@x.com\r\n", &[])));
        assert!(!r.matches(&message("To: me@x.com\r\nCc: other@x.com\r\n", &[])));
    }

    #[test]
    fn test_empty_header_list_requires_absence() {
        let r = rule("name = \"personal\"\nheaders = { List-Id = [] }");
        assert!(r.matches(&message("Subject: hi\r\n", &[])));
        assert!(!r.matches(&message("List-Id: <dev.lists.example.com>\r\n", &[])));
    }

    #[test]
    fn test_label_predicate() {
        let r = rule("name = \"starred\"\nlabels = [\"\\\\Flagged\"]");
        assert!(r.matches(&message("", &["\\Starred"])));
        assert!(!r.matches(&message("", &["INBOX"])));
    }
}
