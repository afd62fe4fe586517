//! Rule-driven mailbox triage.
//!
//! A run fetches one folder into an immutable [`Snapshot`], groups it into
//! conversations with [`ThreadMap`], and evaluates two rule phases:
//!
//! - **Message filters** ([`MessageFilterEngine`]): first matching rule
//!   wins and its actions apply immediately (star, flag, move, label).
//! - **State filters** ([`StateFilterEngine`]): TTL rules move each
//!   conversation through its lifecycle (inbox, purgatory, deletion),
//!   while `Keep` rules protect whole threads.
//!
//! The planned actions are then executed by [`ActionApplier`] through a
//! [`Transport`], producing an [`AuditLog`].
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use mailtriage_core::time::FixedClock;
//! use mailtriage_core::transport::{MemoryTransport, StoredMessage};
//! use mailtriage_core::{Config, RunOptions, Triage};
//!
//! let config = Config::from_toml(r#"
//!     [[state-filters]]
//!     name = "inbox"
//!     ttl = { read = "7d", unread = "21d" }
//!     action = "Purgatory"
//! "#).unwrap();
//!
//! let now = Utc::now();
//! let mut mailbox = MemoryTransport::new();
//! mailbox.insert(
//!     StoredMessage::new(1, "Subject: old news\r\n", now - Duration::days(8))
//!         .with_labels(&["INBOX", "\\Seen"]),
//! );
//!
//! let summary = Triage::new(config)
//!     .run(&mut mailbox, &FixedClock(now), RunOptions::default())
//!     .unwrap();
//! assert_eq!(summary.audit.applied(), 2); // create label, then move
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod action;
mod apply;
mod config;
mod error;
mod label;
mod message;
mod pattern;
mod thread;
mod triage;

pub mod engine;
pub mod rules;
pub mod time;
pub mod transport;

pub use action::{Action, ActionContext, Phase, PlannedAction};
pub use apply::{ActionApplier, AuditLog, AuditRecord, Outcome};
pub use config::Config;
pub use engine::{FilterMatch, MessageFilterEngine, MessageFilterOutcome, StateFilterEngine};
pub use error::{Error, Result};
pub use label::{Label, Labels};
pub use message::{Message, Snapshot, Uid};
pub use pattern::{AddressFilter, Glob, HeaderFilter, LabelFilter};
pub use rules::{FilterRule, Lifetime, StateRule, Ttl};
pub use thread::{Thread, ThreadMap};
pub use triage::{RunOptions, RunSummary, Triage};

pub use mailtriage_mime::{Address, Headers};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Duration, Utc};

    use crate::label::Labels;
    use crate::message::{Message, Uid};

    /// Reference "now" for unit tests.
    pub fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// A message that arrived `age` before [`now`].
    pub fn message(
        uid: u32,
        age: Duration,
        headers: &str,
        labels: &[&str],
        thread_id: Option<&str>,
    ) -> Message {
        Message::new(
            Uid(uid),
            headers.as_bytes(),
            labels.iter().copied().collect::<Labels>(),
            now() - age,
            thread_id.map(str::to_string),
        )
    }
}
