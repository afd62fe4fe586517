//! Mailbox transport capability.
//!
//! The engine never talks to a server directly. Everything it needs from
//! the mailbox goes through [`Transport`], whose calls are synchronous and
//! may fail independently of one another. Retrying is the implementor's
//! business; the engine calls each operation once.

mod memory;

use chrono::{DateTime, Utc};

use crate::label::{Label, Labels};
use crate::message::Uid;

pub use memory::{JournalEntry, MailboxState, MemoryOp, MemoryTransport, StoredMessage};

/// Raw data returned for one message by [`Transport::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord {
    /// Message uid.
    pub uid: Uid,
    /// Raw header block (`RFC822.HEADER`).
    pub header: Vec<u8>,
    /// Flags and labels, as the server spells them.
    pub labels: Vec<String>,
    /// Server arrival time.
    pub internal_date: DateTime<Utc>,
    /// Thread-extension attribute (e.g. `X-GM-THRID`), if the server has one.
    pub thread_id: Option<String>,
}

/// Errors reported by a transport call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection is gone; nothing further can succeed.
    #[error("Connection lost: {0}")]
    Connection(String),

    /// The message no longer exists.
    #[error("Message UID {0} not found")]
    NotFound(Uid),

    /// The server refused one command.
    #[error("Server rejected {command}: {reason}")]
    Rejected {
        /// Command that failed.
        command: String,
        /// Server-provided reason.
        reason: String,
    },

    /// The transport cannot perform this operation.
    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Returns true if the run cannot continue after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Result type for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Operations the engine needs from a mailbox.
pub trait Transport {
    /// Selects the folder subsequent calls operate on.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be selected.
    fn select(&mut self, folder: &str) -> TransportResult<()>;

    /// Searches the selected folder. The engine only ever sends `ALL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails or the query is unsupported.
    fn search(&mut self, query: &str) -> TransportResult<Vec<Uid>>;

    /// Fetches headers, labels, arrival time and thread id for `uids`.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails.
    fn fetch(&mut self, uids: &[Uid]) -> TransportResult<Vec<FetchRecord>>;

    /// Current labels of one message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotFound`] if the message is gone.
    fn labels(&mut self, uid: Uid) -> TransportResult<Labels> {
        let record = self
            .fetch(&[uid])?
            .into_iter()
            .find(|r| r.uid == uid)
            .ok_or(TransportError::NotFound(uid))?;
        Ok(record.labels.iter().map(|l| Label::parse(l)).collect())
    }

    /// Adds a label or flag to a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn add_label(&mut self, uid: Uid, label: &str) -> TransportResult<()>;

    /// Removes a label or flag from a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn remove_label(&mut self, uid: Uid, label: &str) -> TransportResult<()>;

    /// Moves a message out of the selected folder into `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if the move fails.
    fn move_message(&mut self, uid: Uid, destination: &str) -> TransportResult<()>;

    /// Marks a message deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn delete(&mut self, uid: Uid) -> TransportResult<()>;

    /// Creates a label/folder.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    fn create_label(&mut self, label: &str) -> TransportResult<()>;

    /// Returns true if a label/folder exists.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    fn label_exists(&mut self, label: &str) -> TransportResult<bool>;

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge the logout.
    fn logout(&mut self) -> TransportResult<()>;
}
