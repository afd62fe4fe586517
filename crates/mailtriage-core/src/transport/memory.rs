//! In-memory mailbox implementing [`Transport`].
//!
//! Folders follow the Gmail model: a message is "in" a folder when it
//! carries the folder's label, and a move swaps the selected folder's label
//! for the destination's. Every successful mutation is appended to a
//! journal so callers can see exactly what happened.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FetchRecord, Transport, TransportError, TransportResult};
use crate::error::Result;
use crate::label::{Label, Labels};
use crate::message::Uid;

const DEFAULT_FOLDER: &str = "INBOX";

/// One message held by a [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoredMessage {
    /// Message uid.
    pub uid: Uid,
    /// Raw header block.
    pub headers: String,
    /// Server arrival time.
    pub internal_date: DateTime<Utc>,
    /// Labels and flags.
    #[serde(default)]
    pub labels: Labels,
    /// Thread-extension id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl StoredMessage {
    /// Creates a message with no labels and no thread id.
    #[must_use]
    pub fn new(uid: u32, headers: impl Into<String>, internal_date: DateTime<Utc>) -> Self {
        Self {
            uid: Uid(uid),
            headers: headers.into(),
            internal_date,
            labels: Labels::new(),
            thread_id: None,
        }
    }

    /// Adds labels.
    #[must_use]
    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        for label in labels {
            self.labels.insert(Label::parse(label));
        }
        self
    }

    /// Sets the thread-extension id.
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    fn to_record(&self, thread_extension: bool) -> FetchRecord {
        FetchRecord {
            uid: self.uid,
            header: self.headers.clone().into_bytes(),
            labels: self.labels.iter().map(ToString::to_string).collect(),
            internal_date: self.internal_date,
            thread_id: if thread_extension {
                self.thread_id.clone()
            } else {
                None
            },
        }
    }
}

/// Serializable mailbox contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MailboxState {
    /// Whether fetches report thread-extension ids.
    #[serde(default = "default_true")]
    pub thread_extension: bool,
    /// Existing labels/folders besides `INBOX`.
    #[serde(default)]
    pub folders: BTreeSet<String>,
    /// Messages.
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

impl Default for MailboxState {
    fn default() -> Self {
        Self {
            thread_extension: default_true(),
            folders: BTreeSet::new(),
            messages: Vec::new(),
        }
    }
}

const fn default_true() -> bool {
    true
}

/// A mutating call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    /// [`Transport::add_label`].
    AddLabel,
    /// [`Transport::remove_label`].
    RemoveLabel,
    /// [`Transport::move_message`].
    Move,
    /// [`Transport::delete`].
    Delete,
}

/// A successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// A label was added.
    AddLabel {
        /// Target message.
        uid: Uid,
        /// Label added.
        label: String,
    },
    /// A label was removed.
    RemoveLabel {
        /// Target message.
        uid: Uid,
        /// Label removed.
        label: String,
    },
    /// A message changed folder.
    Move {
        /// Target message.
        uid: Uid,
        /// Folder it left.
        from: String,
        /// Folder it entered.
        to: String,
    },
    /// A message was flagged deleted.
    Delete {
        /// Target message.
        uid: Uid,
    },
    /// A label/folder was created.
    CreateLabel {
        /// The new label.
        label: String,
    },
}

/// In-memory [`Transport`].
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    messages: BTreeMap<Uid, StoredMessage>,
    folders: BTreeSet<Label>,
    thread_extension: bool,
    selected: String,
    journal: Vec<JournalEntry>,
    failures: HashMap<(MemoryOp, Uid), TransportError>,
    disconnected: bool,
    logged_out: bool,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Creates an empty mailbox with only `INBOX`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: BTreeMap::new(),
            folders: BTreeSet::from([Label::Inbox]),
            thread_extension: true,
            selected: DEFAULT_FOLDER.to_string(),
            journal: Vec::new(),
            failures: HashMap::new(),
            disconnected: false,
            logged_out: false,
        }
    }

    /// Builds a mailbox from serialized state.
    #[must_use]
    pub fn from_state(state: MailboxState) -> Self {
        let mut transport = Self::new();
        transport.thread_extension = state.thread_extension;
        transport
            .folders
            .extend(state.folders.iter().map(|f| Label::parse(f)));
        for message in state.messages {
            transport.insert(message);
        }
        transport
    }

    /// Parses a JSON mailbox file.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a mailbox.
    pub fn from_json(json: &str) -> Result<Self> {
        let state: MailboxState = serde_json::from_str(json)?;
        Ok(Self::from_state(state))
    }

    /// Current contents as serializable state.
    #[must_use]
    pub fn state(&self) -> MailboxState {
        MailboxState {
            thread_extension: self.thread_extension,
            folders: self
                .folders
                .iter()
                .filter(|f| **f != Label::Inbox)
                .map(ToString::to_string)
                .collect(),
            messages: self.messages.values().cloned().collect(),
        }
    }

    /// Current contents as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.state())?)
    }

    /// Turns thread-extension ids on or off in fetch results.
    #[must_use]
    pub const fn with_thread_extension(mut self, enabled: bool) -> Self {
        self.thread_extension = enabled;
        self
    }

    /// Adds or replaces a message.
    pub fn insert(&mut self, message: StoredMessage) {
        self.messages.insert(message.uid, message);
    }

    /// Looks up a message.
    #[must_use]
    pub fn message(&self, uid: u32) -> Option<&StoredMessage> {
        self.messages.get(&Uid(uid))
    }

    /// Makes every future `op` on `uid` fail with `error`.
    pub fn fail_on(&mut self, op: MemoryOp, uid: u32, error: TransportError) {
        self.failures.insert((op, Uid(uid)), error);
    }

    /// Makes every subsequent call fail with [`TransportError::Connection`].
    pub fn disconnect(&mut self) {
        self.disconnected = true;
    }

    /// Successful mutations so far.
    #[must_use]
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Returns true once [`Transport::logout`] succeeded.
    #[must_use]
    pub const fn is_logged_out(&self) -> bool {
        self.logged_out
    }

    /// Removes messages flagged deleted, returning their uids.
    pub fn expunge(&mut self) -> Vec<Uid> {
        let doomed: Vec<Uid> = self
            .messages
            .values()
            .filter(|m| m.labels.contains(&Label::Deleted))
            .map(|m| m.uid)
            .collect();
        for uid in &doomed {
            self.messages.remove(uid);
        }
        doomed
    }

    fn check_connected(&self) -> TransportResult<()> {
        if self.disconnected {
            return Err(TransportError::Connection(
                "connection reset by peer".to_string(),
            ));
        }
        Ok(())
    }

    fn check_failure(&self, op: MemoryOp, uid: Uid) -> TransportResult<()> {
        self.check_connected()?;
        self.failures
            .get(&(op, uid))
            .map_or(Ok(()), |err| Err(err.clone()))
    }

    fn message_mut(&mut self, uid: Uid) -> TransportResult<&mut StoredMessage> {
        self.messages
            .get_mut(&uid)
            .ok_or(TransportError::NotFound(uid))
    }
}

impl Transport for MemoryTransport {
    fn select(&mut self, folder: &str) -> TransportResult<()> {
        self.check_connected()?;
        if !self.folders.contains(&Label::parse(folder)) {
            return Err(TransportError::Rejected {
                command: format!("SELECT {folder}"),
                reason: "no such mailbox".to_string(),
            });
        }
        debug!("Selected {}", folder);
        self.selected = folder.to_string();
        Ok(())
    }

    fn search(&mut self, query: &str) -> TransportResult<Vec<Uid>> {
        self.check_connected()?;
        if !query.trim().eq_ignore_ascii_case("ALL") {
            return Err(TransportError::Unsupported(format!("SEARCH {query}")));
        }
        let folder = Label::parse(&self.selected);
        Ok(self
            .messages
            .values()
            .filter(|m| m.labels.contains(&folder))
            .map(|m| m.uid)
            .collect())
    }

    fn fetch(&mut self, uids: &[Uid]) -> TransportResult<Vec<FetchRecord>> {
        self.check_connected()?;
        Ok(uids
            .iter()
            .filter_map(|uid| self.messages.get(uid))
            .map(|m| m.to_record(self.thread_extension))
            .collect())
    }

    fn labels(&mut self, uid: Uid) -> TransportResult<Labels> {
        self.check_connected()?;
        self.messages
            .get(&uid)
            .map(|m| m.labels.clone())
            .ok_or(TransportError::NotFound(uid))
    }

    fn add_label(&mut self, uid: Uid, label: &str) -> TransportResult<()> {
        self.check_failure(MemoryOp::AddLabel, uid)?;
        self.message_mut(uid)?.labels.insert(Label::parse(label));
        self.journal.push(JournalEntry::AddLabel {
            uid,
            label: label.to_string(),
        });
        Ok(())
    }

    fn remove_label(&mut self, uid: Uid, label: &str) -> TransportResult<()> {
        self.check_failure(MemoryOp::RemoveLabel, uid)?;
        self.message_mut(uid)?.labels.remove(&Label::parse(label));
        self.journal.push(JournalEntry::RemoveLabel {
            uid,
            label: label.to_string(),
        });
        Ok(())
    }

    fn move_message(&mut self, uid: Uid, destination: &str) -> TransportResult<()> {
        self.check_failure(MemoryOp::Move, uid)?;
        let target = Label::parse(destination);
        if !self.folders.contains(&target) {
            return Err(TransportError::Rejected {
                command: format!("UID MOVE {uid} {destination}"),
                reason: "[TRYCREATE] no such mailbox".to_string(),
            });
        }
        let from = self.selected.clone();
        let message = self.message_mut(uid)?;
        message.labels.remove(&Label::parse(&from));
        message.labels.insert(target);
        self.journal.push(JournalEntry::Move {
            uid,
            from,
            to: destination.to_string(),
        });
        Ok(())
    }

    fn delete(&mut self, uid: Uid) -> TransportResult<()> {
        self.check_failure(MemoryOp::Delete, uid)?;
        self.message_mut(uid)?.labels.insert(Label::Deleted);
        self.journal.push(JournalEntry::Delete { uid });
        Ok(())
    }

    fn create_label(&mut self, label: &str) -> TransportResult<()> {
        self.check_connected()?;
        if self.folders.insert(Label::parse(label)) {
            self.journal.push(JournalEntry::CreateLabel {
                label: label.to_string(),
            });
        }
        Ok(())
    }

    fn label_exists(&mut self, label: &str) -> TransportResult<bool> {
        self.check_connected()?;
        Ok(self.folders.contains(&Label::parse(label)))
    }

    fn logout(&mut self) -> TransportResult<()> {
        self.check_connected()?;
        self.logged_out = true;
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

    fn date() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T10:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn mailbox() -> MemoryTransport {
        let mut transport = MemoryTransport::new();
        transport.insert(
            StoredMessage::new(1, "Subject: one\r\n", date())
                .with_labels(&["INBOX"])
                .with_thread_id("t1"),
        );
        transport.insert(StoredMessage::new(2, "Subject: two\r\n", date()).with_labels(&["Archive"]));
        transport
    }

    #[test]
    fn test_search_only_selected_folder() {
        let mut transport = mailbox();
        transport.select("INBOX").unwrap();
        assert_eq!(transport.search("ALL").unwrap(), vec![Uid(1)]);
        assert!(matches!(
            transport.search("UNSEEN"),
            Err(TransportError::Unsupported(_))
        ));
    }

    #[test]
    fn test_fetch_respects_thread_extension() {
        let mut transport = mailbox();
        let records = transport.fetch(&[Uid(1)]).unwrap();
        assert_eq!(records[0].thread_id.as_deref(), Some("t1"));

        let mut transport = mailbox().with_thread_extension(false);
        let records = transport.fetch(&[Uid(1), Uid(99)]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].thread_id, None);
    }

    #[test]
    fn test_move_requires_existing_destination() {
        let mut transport = mailbox();
        transport.select("INBOX").unwrap();
        assert!(transport.move_message(Uid(1), "Purgatory").is_err());

        transport.create_label("Purgatory").unwrap();
        transport.move_message(Uid(1), "Purgatory").unwrap();

        let labels = transport.labels(Uid(1)).unwrap();
        assert!(!labels.contains(&Label::Inbox));
        assert!(labels.contains(&Label::parse("Purgatory")));
        assert_eq!(
            transport.journal(),
            &[
                JournalEntry::CreateLabel {
                    label: "Purgatory".to_string()
                },
                JournalEntry::Move {
                    uid: Uid(1),
                    from: "INBOX".to_string(),
                    to: "Purgatory".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_injected_failure_and_disconnect() {
        let mut transport = mailbox();
        transport.fail_on(
            MemoryOp::AddLabel,
            1,
            TransportError::Rejected {
                command: "STORE".to_string(),
                reason: "quota".to_string(),
            },
        );
        assert!(transport.add_label(Uid(1), "\\Starred").is_err());
        assert!(transport.add_label(Uid(2), "\\Starred").is_ok());

        transport.disconnect();
        let err = transport.delete(Uid(2)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_delete_and_expunge() {
        let mut transport = mailbox();
        transport.delete(Uid(1)).unwrap();
        assert!(transport.message(1).unwrap().labels.contains(&Label::Deleted));
        assert_eq!(transport.expunge(), vec![Uid(1)]);
        assert!(transport.message(1).is_none());
    }

    #[test]
    fn test_default_state_matches_empty_json() {
        let from_json: MailboxState = serde_json::from_str("{}").unwrap();
        assert_eq!(MailboxState::default(), from_json);
        assert!(MailboxState::default().thread_extension);
        assert_eq!(MemoryTransport::from_state(MailboxState::default()).state(), from_json);
    }

    #[test]
    fn test_json_state() {
        let json = r#"{
            "thread-extension": false,
            "folders": ["Purgatory"],
            "messages": [
                {"uid": 5, "headers": "Subject: hi\r\n", "internal-date": "2024-01-15T10:00:00Z", "labels": ["INBOX", "\\Seen"]}
            ]
        }"#;
        let mut transport = MemoryTransport::from_json(json).unwrap();
        assert!(transport.label_exists("Purgatory").unwrap());
        let records = transport.fetch(&[Uid(5)]).unwrap();
        assert!(records[0].labels.contains(&"\\Seen".to_string()));

        let state = transport.state();
        assert!(!state.thread_extension);
        assert_eq!(state.messages.len(), 1);
    }
}
