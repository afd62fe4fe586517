//! Actions decided by the engines.

use std::collections::HashMap;
use std::fmt;

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

use crate::message::Uid;

/// A change to apply to one message (or, for `CreateLabel`, the mailbox).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    /// Set the starred label.
    Star,
    /// Mark important (`\Important`).
    Flag,
    /// Move out of the selected folder.
    Move(String),
    /// Flag for deletion.
    Delete,
    /// Add a label.
    AddLabel(String),
    /// Remove a label.
    RemoveLabel(String),
    /// Create a label/folder.
    CreateLabel(String),
}

impl Action {
    /// Returns true if the action changes where or how prominently the
    /// conversation shows up. Such actions are applied to a whole thread.
    #[must_use]
    pub const fn affects_visibility(&self) -> bool {
        matches!(self, Self::Star | Self::Flag | Self::Move(_) | Self::Delete)
    }

    /// Label or destination the action names, if any.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Move(name)
            | Self::AddLabel(name)
            | Self::RemoveLabel(name)
            | Self::CreateLabel(name) => Some(name),
            Self::Star | Self::Flag | Self::Delete => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Star => write!(f, "Star"),
            Self::Flag => write!(f, "Flag"),
            Self::Move(dest) => write!(f, "Move({dest})"),
            Self::Delete => write!(f, "Delete"),
            Self::AddLabel(label) => write!(f, "AddLabel({label})"),
            Self::RemoveLabel(label) => write!(f, "RemoveLabel({label})"),
            Self::CreateLabel(label) => write!(f, "CreateLabel({label})"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableValue {
    Text(String),
    Other(IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActionRepr {
    Name(String),
    Table(HashMap<String, TableValue>),
}

impl<'de> Deserialize<'de> for Action {
    /// Accepts `"Star"`, `"Flag"`, `"Delete"`, any other string as a move
    /// destination, or a one-entry table such as `{ Move = "Archive" }`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;

        match ActionRepr::deserialize(deserializer)? {
            ActionRepr::Name(name) => Ok(match name.to_ascii_lowercase().as_str() {
                "star" => Self::Star,
                "flag" => Self::Flag,
                "delete" => Self::Delete,
                _ => Self::Move(name),
            }),
            ActionRepr::Table(table) => {
                if table.len() != 1 {
                    return Err(D::Error::custom(format!(
                        "action table must have exactly one entry, found {}",
                        table.len()
                    )));
                }
                let Some((kind, value)) = table.into_iter().next() else {
                    return Err(D::Error::custom("empty action table"));
                };
                let text = |value: TableValue| match value {
                    TableValue::Text(s) => Ok(s),
                    TableValue::Other(_) => {
                        Err(D::Error::custom(format!("{kind} requires a label name")))
                    }
                };
                match kind.to_ascii_lowercase().as_str() {
                    "star" => Ok(Self::Star),
                    "flag" => Ok(Self::Flag),
                    "delete" => Ok(Self::Delete),
                    "move" => text(value).map(Self::Move),
                    "addlabel" => text(value).map(Self::AddLabel),
                    "removelabel" => text(value).map(Self::RemoveLabel),
                    _ => Err(D::Error::custom(format!("unknown action '{kind}'"))),
                }
            }
        }
    }
}

/// Which engine decided an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Immediate message filters.
    MessageFilter,
    /// TTL state filters.
    StateFilter,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageFilter => write!(f, "message-filter"),
            Self::StateFilter => write!(f, "state-filter"),
        }
    }
}

/// Why an action was planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    /// Deciding engine.
    pub phase: Phase,
    /// Name of the rule that fired.
    pub rule: String,
    /// Subject of the target message.
    pub subject: String,
    /// Thread-mate whose match caused this action, when propagated.
    pub propagated_from: Option<Uid>,
    /// Evaluated but not to be applied.
    pub nerfed: bool,
}

/// An action bound to its target message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    /// Target message.
    pub uid: Uid,
    /// What to do.
    pub action: Action,
    /// Diagnostics.
    pub context: ActionContext,
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UID {} {} [{}]", self.uid, self.action, self.context.rule)?;
        if let Some(source) = self.context.propagated_from {
            write!(f, " via UID {source}")?;
        }
        Ok(())
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

    #[derive(Deserialize)]
    struct Wrapper {
        action: Action,
    }

    fn parse(toml_value: &str) -> Result<Action, toml::de::Error> {
        toml::from_str::<Wrapper>(&format!("action = {toml_value}")).map(|w| w.action)
    }

    #[test]
    fn test_action_from_string() {
        assert_eq!(parse(r#""Star""#).unwrap(), Action::Star);
        assert_eq!(parse(r#""flag""#).unwrap(), Action::Flag);
        assert_eq!(parse(r#""Delete""#).unwrap(), Action::Delete);
        assert_eq!(
            parse(r#""Purgatory""#).unwrap(),
            Action::Move("Purgatory".to_string())
        );
    }

    #[test]
    fn test_action_from_table() {
        assert_eq!(
            parse(r#"{ Move = "Archive" }"#).unwrap(),
            Action::Move("Archive".to_string())
        );
        assert_eq!(
            parse(r#"{ AddLabel = "Bills" }"#).unwrap(),
            Action::AddLabel("Bills".to_string())
        );
        assert_eq!(
            parse(r#"{ RemoveLabel = "INBOX" }"#).unwrap(),
            Action::RemoveLabel("INBOX".to_string())
        );
        assert_eq!(parse("{ Delete = {} }").unwrap(), Action::Delete);
    }

    #[test]
    fn test_action_table_errors() {
        assert!(parse(r#"{ Move = "A", Star = {} }"#).is_err());
        assert!(parse(r#"{ Explode = "now" }"#).is_err());
        assert!(parse("{ Move = 3 }").is_err());
    }

    #[test]
    fn test_affects_visibility() {
        assert!(Action::Star.affects_visibility());
        assert!(Action::Flag.affects_visibility());
        assert!(Action::Move("X".to_string()).affects_visibility());
        assert!(Action::Delete.affects_visibility());
        assert!(!Action::AddLabel("X".to_string()).affects_visibility());
        assert!(!Action::RemoveLabel("X".to_string()).affects_visibility());
    }

    #[test]
    fn test_display() {
        let planned = PlannedAction {
            uid: Uid(4),
            action: Action::Move("Purgatory".to_string()),
            context: ActionContext {
                phase: Phase::StateFilter,
                rule: "read".to_string(),
                subject: "hi".to_string(),
                propagated_from: Some(Uid(9)),
                nerfed: false,
            },
        };
        assert_eq!(planned.to_string(), "UID 4 Move(Purgatory) [read] via UID 9");
    }
}
