//! Per-run message model.
//!
//! A [`Message`] is an immutable view of one fetched message. A
//! [`Snapshot`] owns every message fetched in a run and is the only thing
//! the engines read from.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use mailtriage_mime::encoding::decode_header_value;
use mailtriage_mime::{Address, Headers, parse_address_list, parse_message_ids};

use crate::label::{Label, Labels};
use crate::transport::FetchRecord;

/// Unique identifier of a message within the selected mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub u32);

impl Uid {
    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One message as fetched at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Mailbox-unique identifier.
    pub uid: Uid,
    /// `To` recipients (falls back to `Delivered-To`).
    pub to: Vec<Address>,
    /// `Cc` recipients.
    pub cc: Vec<Address>,
    /// `Bcc` recipients, when the server exposes them.
    pub bcc: Vec<Address>,
    /// `From` addresses.
    pub from: Vec<Address>,
    /// Decoded subject, empty if absent.
    pub subject: String,
    /// Every header of the message.
    pub headers: Headers,
    /// Server arrival time (`INTERNALDATE`).
    pub internal_date: DateTime<Utc>,
    /// Labels and flags.
    pub labels: Labels,
    /// Conversation id reported by the server's thread extension.
    ///
    /// Only ever populated from fetch metadata; there is no header that
    /// carries it.
    pub thread_id: Option<String>,
    /// `Message-ID`, with angle brackets.
    pub message_id: Option<String>,
    /// Ancestors from `References` followed by `In-Reply-To`, de-duplicated.
    pub references: Vec<String>,
}

impl Message {
    /// Builds a message from raw fetch data.
    ///
    /// Header parsing never fails: unreadable fields simply come out empty.
    #[must_use]
    pub fn new(
        uid: Uid,
        raw_headers: &[u8],
        labels: Labels,
        internal_date: DateTime<Utc>,
        thread_id: Option<String>,
    ) -> Self {
        let headers = Headers::parse_bytes(raw_headers);

        let addresses = |name: &str| -> Vec<Address> {
            headers
                .get_all(name)
                .into_iter()
                .flat_map(parse_address_list)
                .collect()
        };

        let mut to = addresses("To");
        if to.is_empty() {
            to = addresses("Delivered-To");
        }
        let cc = addresses("Cc");
        let bcc = addresses("Bcc");
        let from = addresses("From");

        let subject = headers
            .get("Subject")
            .map(decode_header_value)
            .unwrap_or_default();

        let message_id = headers
            .get("Message-ID")
            .and_then(|v| parse_message_ids(v).into_iter().next());

        let mut seen = HashSet::new();
        let references = headers
            .get_all("References")
            .into_iter()
            .chain(headers.get_all("In-Reply-To"))
            .flat_map(parse_message_ids)
            .filter(|id| Some(id) != message_id.as_ref() && seen.insert(id.clone()))
            .collect();

        Self {
            uid,
            to,
            cc,
            bcc,
            from,
            subject,
            headers,
            internal_date,
            labels,
            thread_id: thread_id.filter(|id| !id.trim().is_empty()),
            message_id,
            references,
        }
    }

    /// Builds a message from a transport fetch record.
    #[must_use]
    pub fn from_record(record: &FetchRecord) -> Self {
        let labels = record.labels.iter().map(String::as_str).collect();
        Self::new(
            record.uid,
            &record.header,
            labels,
            record.internal_date,
            record.thread_id.clone(),
        )
    }

    /// Display name of the first sender, or their address if unnamed.
    #[must_use]
    pub fn sender_display(&self) -> String {
        self.from
            .first()
            .map(|addr| addr.display().to_string())
            .unwrap_or_default()
    }

    /// Returns true if the message carries `label`.
    #[must_use]
    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// Time elapsed between arrival and `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.internal_date)
    }
}

/// Immutable set of messages fetched in one run, ordered by uid.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    messages: BTreeMap<Uid, Message>,
}

impl Snapshot {
    /// Builds a snapshot. When a uid appears twice, the first copy wins.
    #[must_use]
    pub fn new(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut map = BTreeMap::new();
        for message in messages {
            let uid = message.uid;
            if map.contains_key(&uid) {
                warn!("Duplicate UID {} in fetch results; keeping first copy", uid);
                continue;
            }
            map.insert(uid, message);
        }
        Self { messages: map }
    }

    /// Looks up a message.
    #[must_use]
    pub fn get(&self, uid: Uid) -> Option<&Message> {
        self.messages.get(&uid)
    }

    /// Iterates messages in uid order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    /// All uids, ascending.
    pub fn uids(&self) -> impl Iterator<Item = Uid> + '_ {
        self.messages.keys().copied()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
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

    fn make_test_headers() -> &'static [u8] {
        b"From: Test User <test@example.com>\r\n\
          To: recipient@example.com\r\n\
          Cc: cc@example.com\r\n\
          Subject: Test Subject\r\n\
          Message-ID: <123@example.com>\r\n\
          In-Reply-To: <parent@example.com>\r\n\
          References: <root@example.com> <parent@example.com>\r\n\
          \r\n"
    }

    #[test]
    fn test_message_new_parses_headers() {
        let labels: Labels = ["INBOX", "Important"].into_iter().collect();
        let msg = Message::new(
            Uid(12345),
            make_test_headers(),
            labels,
            date(),
            Some("thread123".to_string()),
        );

        assert_eq!(msg.uid, Uid(12345));
        assert_eq!(msg.subject, "Test Subject");
        assert_eq!(msg.thread_id.as_deref(), Some("thread123"));
        assert_eq!(msg.from[0].email, "test@example.com");
        assert_eq!(msg.from[0].name, "Test User");
        assert_eq!(msg.to[0].email, "recipient@example.com");
        assert_eq!(msg.cc[0].email, "cc@example.com");
        assert!(msg.bcc.is_empty());
        assert!(msg.has_label(&Label::Inbox));
        assert!(msg.has_label(&Label::Important));
    }

    #[test]
    fn test_message_thread_headers() {
        let msg = Message::new(Uid(1), make_test_headers(), Labels::new(), date(), None);

        assert_eq!(msg.message_id.as_deref(), Some("<123@example.com>"));
        assert_eq!(
            msg.references,
            vec!["<root@example.com>".to_string(), "<parent@example.com>".to_string()]
        );
        assert_eq!(msg.thread_id, None);
    }

    #[test]
    fn test_thread_id_never_read_from_headers() {
        let raw = b"X-GM-THRID: 1852322999435237597\r\nSubject: x\r\n\r\n";
        let msg = Message::new(Uid(1), raw, Labels::new(), date(), None);
        assert_eq!(msg.thread_id, None);
    }

    #[test]
    fn test_blank_thread_id_is_dropped() {
        let msg = Message::new(Uid(1), b"", Labels::new(), date(), Some("  ".to_string()));
        assert_eq!(msg.thread_id, None);
    }

    #[test]
    fn test_message_uses_delivered_to_when_no_to() {
        let raw = b"From: sender@example.com\r\n\
                    Delivered-To: delivered@example.com\r\n\
                    Subject: No To Header\r\n\
                    \r\n";
        let msg = Message::new(Uid(1), raw, Labels::new(), date(), None);
        assert_eq!(msg.to.len(), 1);
        assert_eq!(msg.to[0].email, "delivered@example.com");
    }

    #[test]
    fn test_message_decodes_subject() {
        let raw = b"Subject: =?utf-8?B?SMOpbGxv?=\r\n\r\n";
        let msg = Message::new(Uid(1), raw, Labels::new(), date(), None);
        assert_eq!(msg.subject, "Héllo");
    }

    #[test]
    fn test_sender_display() {
        let named = Message::new(
            Uid(1),
            b"From: John Doe <john@example.com>\r\n\r\n",
            Labels::new(),
            date(),
            None,
        );
        assert_eq!(named.sender_display(), "John Doe");

        let bare = Message::new(
            Uid(2),
            b"From: john@example.com\r\n\r\n",
            Labels::new(),
            date(),
            None,
        );
        assert_eq!(bare.sender_display(), "john@example.com");
    }

    #[test]
    fn test_snapshot_orders_and_dedupes() {
        let a = Message::new(Uid(7), b"Subject: first\r\n", Labels::new(), date(), None);
        let b = Message::new(Uid(3), b"", Labels::new(), date(), None);
        let dup = Message::new(Uid(7), b"Subject: second\r\n", Labels::new(), date(), None);

        let snapshot = Snapshot::new([a, b, dup]);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.uids().collect::<Vec<_>>(), vec![Uid(3), Uid(7)]);
        assert_eq!(snapshot.get(Uid(7)).unwrap().subject, "first");
    }
}
