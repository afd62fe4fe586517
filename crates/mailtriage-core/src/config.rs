//! Rule configuration.
//!
//! Rules live in a TOML file:
//!
//! ```toml
//! folder = "INBOX"
//! read-marker = "\\Seen"
//!
//! [[message-filters]]
//! name = "boss"
//! from = "boss@work.com"
//! action = "Star"
//!
//! [[state-filters]]
//! name = "protected"
//! labels = ["Starred", "Important"]
//! ttl = "Keep"
//!
//! [[state-filters]]
//! name = "inbox"
//! label = "INBOX"
//! ttl = { read = "7d", unread = "21d" }
//! action = "Purgatory"
//! ```
//!
//! A [`Config`] that loaded successfully has been validated; the engines
//! never see an invalid rule.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::action::Action;
use crate::error::{Error, Result};
use crate::label::Label;
use crate::rules::{FilterRule, StateRule};

fn default_folder() -> String {
    "INBOX".to_string()
}

const fn default_read_marker() -> Label {
    Label::Seen
}

/// Validated rule configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Folder to triage.
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Label marking a message as read.
    #[serde(default = "default_read_marker")]
    pub read_marker: Label,
    /// Phase-one rules, in priority order.
    #[serde(default)]
    pub message_filters: Vec<FilterRule>,
    /// Phase-two rules, in priority order.
    #[serde(default)]
    pub state_filters: Vec<StateRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            read_marker: default_read_marker(),
            message_filters: Vec::new(),
            state_filters: Vec::new(),
        }
    }
}

impl Config {
    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML, does not match the
    /// rule schema, or fails [`Config::validate`].
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Checks rule invariants the schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.folder.trim().is_empty() {
            return Err(Error::Config("folder must not be empty".to_string()));
        }

        check_names("message-filters", self.message_filters.iter().map(|r| r.name.as_str()))?;
        check_names("state-filters", self.state_filters.iter().map(|r| r.name.as_str()))?;

        for rule in &self.message_filters {
            if rule.actions.is_empty() {
                return Err(Error::Config(format!(
                    "message filter '{}' has no action",
                    rule.name
                )));
            }
            for action in &rule.actions {
                check_action(&rule.name, action)?;
            }
            if rule.is_catch_all() {
                warn!(
                    "Message filter '{}' has no predicates and will match every message",
                    rule.name
                );
            }
        }

        for rule in &self.state_filters {
            match &rule.action {
                Some(action) => check_action(&rule.name, action)?,
                None if !rule.ttl.is_keep() => {
                    return Err(Error::Config(format!(
                        "state filter '{}' needs an action for ttl {}",
                        rule.name, rule.ttl
                    )));
                }
                None => {}
            }
        }

        Ok(())
    }
}

fn check_names<'a>(section: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(Error::Config(format!("{section}: rule name must not be empty")));
        }
        if !seen.insert(name) {
            return Err(Error::Config(format!("{section}: duplicate rule name '{name}'")));
        }
    }
    Ok(())
}

fn check_action(rule: &str, action: &Action) -> Result<()> {
    match action.target() {
        Some(target) if target.trim().is_empty() => Err(Error::Config(format!(
            "rule '{rule}': {action} needs a non-empty label"
        ))),
        _ => Ok(()),
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
    use crate::rules::Ttl;
    use chrono::Duration;
    use std::io::Write;

    const SAMPLE: &str = r#"
folder = "INBOX"
read-marker = "\\Seen"

[[message-filters]]
name = "boss"
from = "boss@work.com"
action = "Star"

[[message-filters]]
name = "lists"
headers = { List-Id = "*" }
actions = [{ AddLabel = "Lists" }, "Lists"]

[[state-filters]]
name = "protected"
labels = ["Starred", "Important"]
ttl = "Keep"

[[state-filters]]
name = "purgatory"
label = "Purgatory"
ttl = "14d"
action = "Delete"

[[state-filters]]
name = "inbox"
ttl = { read = "7d", unread = "21d" }
action = { Move = "Purgatory" }
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.folder, "INBOX");
        assert_eq!(config.read_marker, Label::Seen);
        assert_eq!(config.message_filters.len(), 2);
        assert_eq!(config.state_filters.len(), 3);
        assert_eq!(
            config.message_filters[1].actions,
            vec![
                Action::AddLabel("Lists".to_string()),
                Action::Move("Lists".to_string())
            ]
        );
        assert_eq!(
            config.state_filters[2].ttl,
            Ttl::ReadUnread {
                read: Some(Duration::days(7)),
                unread: Some(Duration::days(21)),
            }
        );
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = r#"
[[state-filters]]
name = "a"
ttl = "Keep"

[[state-filters]]
name = "a"
ttl = "Keep"
"#;
        let err = Config::from_toml(text).unwrap_err();
        assert!(err.to_string().contains("duplicate rule name 'a'"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let text = "[[message-filters]]\nname = \"\"\naction = \"Star\"";
        assert!(matches!(Config::from_toml(text), Err(Error::Config(_))));
    }

    #[test]
    fn test_state_filter_needs_action_unless_keep() {
        let text = "[[state-filters]]\nname = \"old\"\nttl = \"30d\"";
        assert!(matches!(Config::from_toml(text), Err(Error::Config(_))));
    }

    #[test]
    fn test_message_filter_needs_action() {
        let text = "[[message-filters]]\nname = \"x\"\nfrom = \"a@b.c\"";
        assert!(matches!(Config::from_toml(text), Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_destination_rejected() {
        let text = "[[message-filters]]\nname = \"x\"\naction = { Move = \"  \" }";
        assert!(matches!(Config::from_toml(text), Err(Error::Config(_))));
    }

    #[test]
    fn test_catch_all_filter_accepted() {
        let text = "[[message-filters]]\nname = \"everything\"\naction = \"Star\"";
        let config = Config::from_toml(text).unwrap();
        assert!(config.message_filters[0].is_catch_all());
    }

    #[test]
    fn test_bad_toml_is_toml_error() {
        assert!(matches!(
            Config::from_toml("folder = "),
            Err(Error::Toml(_))
        ));
        assert!(matches!(
            Config::from_toml("colour = \"blue\""),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_misspelled_or_empty_ttl_table_rejected() {
        for ttl in ["{ raed = \"7d\" }", "{}"] {
            let text = format!(
                "[[state-filters]]\nname = \"inbox\"\nttl = {ttl}\naction = \"Purgatory\"\n"
            );
            assert!(
                matches!(Config::from_toml(&text), Err(Error::Toml(_))),
                "accepted ttl = {ttl}"
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.state_filters[0].name, "protected");

        let missing = Config::load(Path::new("/nonexistent/mailtriage.toml"));
        assert!(matches!(missing, Err(Error::Io(_))));
    }
}
