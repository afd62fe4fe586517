//! The two evaluation phases.
//!
//! Both engines are pure: they read a [`Snapshot`](crate::Snapshot) and
//! its [`ThreadMap`](crate::ThreadMap) and return planned actions without
//! touching the mailbox.

mod message_filter;
mod state_filter;

pub use message_filter::{FilterMatch, MessageFilterEngine, MessageFilterOutcome};
pub use state_filter::StateFilterEngine;
