//! Mailbox labels and flags.
//!
//! IMAP system flags and Gmail labels are folded into one vocabulary so
//! rules can say `Starred` without caring whether the server reported
//! `\Flagged`, `\Starred` or `STARRED`.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A label or flag carried by a message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    /// The inbox.
    Inbox,
    /// Gmail "Important".
    Important,
    /// Starred (IMAP `\Flagged`).
    Starred,
    /// Message has been read.
    Seen,
    /// Sent mail.
    Sent,
    /// Message is a draft.
    Draft,
    /// Trash.
    Trash,
    /// Spam/junk.
    Spam,
    /// Message is marked for deletion.
    Deleted,
    /// Any user label or keyword.
    Custom(String),
}

impl Label {
    /// Parses a label as reported by the server or written in config.
    ///
    /// Leading backslashes are ignored and system names are matched
    /// case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim().trim_start_matches('\\');
        match trimmed.to_uppercase().as_str() {
            "INBOX" => Self::Inbox,
            "IMPORTANT" => Self::Important,
            "FLAGGED" | "STARRED" => Self::Starred,
            "SEEN" => Self::Seen,
            "SENT" => Self::Sent,
            "DRAFT" | "DRAFTS" => Self::Draft,
            "TRASH" => Self::Trash,
            "SPAM" | "JUNK" => Self::Spam,
            "DELETED" => Self::Deleted,
            _ => Self::Custom(trimmed.to_string()),
        }
    }

    /// Returns the label in the form the transport expects.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Inbox => "INBOX",
            Self::Important => "\\Important",
            Self::Starred => "\\Starred",
            Self::Seen => "\\Seen",
            Self::Sent => "\\Sent",
            Self::Draft => "\\Draft",
            Self::Trash => "\\Trash",
            Self::Spam => "\\Spam",
            Self::Deleted => "\\Deleted",
            Self::Custom(s) => s,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Label {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Set of labels on one message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels {
    labels: BTreeSet<Label>,
}

impl Labels {
    /// Creates an empty label set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label. Returns false if it was already present.
    pub fn insert(&mut self, label: Label) -> bool {
        self.labels.insert(label)
    }

    /// Removes a label. Returns false if it was not present.
    pub fn remove(&mut self, label: &Label) -> bool {
        self.labels.remove(label)
    }

    /// Returns true if the label is present.
    #[must_use]
    pub fn contains(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// Returns true if any of `candidates` is present.
    #[must_use]
    pub fn contains_any(&self, candidates: &[Label]) -> bool {
        candidates.iter().any(|l| self.contains(l))
    }

    /// Returns an iterator over the labels, in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    /// Returns the number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if there are no labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl FromIterator<Label> for Labels {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for Labels {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(Label::parse).collect()
    }
}

impl IntoIterator for Labels {
    type Item = Label;
    type IntoIter = std::collections::btree_set::IntoIter<Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.into_iter()
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

    #[test]
    fn test_label_parse_system_names() {
        assert_eq!(Label::parse("INBOX"), Label::Inbox);
        assert_eq!(Label::parse("inbox"), Label::Inbox);
        assert_eq!(Label::parse("\\Flagged"), Label::Starred);
        assert_eq!(Label::parse("\\\\Starred"), Label::Starred);
        assert_eq!(Label::parse("\\Important"), Label::Important);
        assert_eq!(Label::parse("\\Seen"), Label::Seen);
        assert_eq!(Label::parse("\\Deleted"), Label::Deleted);
    }

    #[test]
    fn test_label_parse_custom_keeps_case() {
        assert_eq!(
            Label::parse("Purgatory"),
            Label::Custom("Purgatory".to_string())
        );
        assert_eq!(Label::parse("Purgatory").as_str(), "Purgatory");
    }

    #[test]
    fn test_label_transport_form_reparses() {
        for label in [
            Label::Inbox,
            Label::Important,
            Label::Starred,
            Label::Seen,
            Label::Deleted,
        ] {
            assert_eq!(Label::parse(label.as_str()), label);
        }
    }

    #[test]
    fn test_labels_set_operations() {
        let mut labels: Labels = ["INBOX", "\\Seen"].into_iter().collect();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(&Label::Seen));
        assert!(!labels.insert(Label::Inbox));
        assert!(labels.insert(Label::Starred));
        assert!(labels.contains_any(&[Label::Important, Label::Starred]));
        assert!(labels.remove(&Label::Inbox));
        assert!(!labels.contains(&Label::Inbox));
    }

    #[test]
    fn test_label_deserialize() {
        let labels: Vec<Label> = serde_json::from_str(r#"["Starred", "Work"]"#).unwrap();
        assert_eq!(
            labels,
            vec![Label::Starred, Label::Custom("Work".to_string())]
        );
    }
}
