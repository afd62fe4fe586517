//! One triage run, end to end.

use tracing::{info, warn};

use crate::apply::{ActionApplier, AuditLog};
use crate::config::Config;
use crate::engine::{MessageFilterEngine, StateFilterEngine};
use crate::error::Result;
use crate::message::{Message, Snapshot, Uid};
use crate::thread::ThreadMap;
use crate::time::Clock;
use crate::transport::{Transport, TransportError};

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Record every action as skipped instead of applying it.
    pub dry_run: bool,
}

/// What a run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Messages fetched.
    pub messages: usize,
    /// Threads found.
    pub threads: usize,
    /// Messages claimed by a message filter.
    pub filtered: usize,
    /// Every attempted action.
    pub audit: AuditLog,
    /// Set when a fatal transport error cut the run short.
    pub aborted: Option<TransportError>,
}

impl RunSummary {
    /// Returns true if every planned action was attempted.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }

    /// Returns true if any attempted action on `uid` failed.
    #[must_use]
    pub fn has_failure(&self, uid: Uid) -> bool {
        self.audit
            .for_uid(uid)
            .any(|r| matches!(r.outcome, crate::apply::Outcome::Failed(_)))
    }
}

/// The triage pipeline bound to one configuration.
#[derive(Debug, Clone)]
pub struct Triage {
    config: Config,
}

impl Triage {
    /// Creates a pipeline from validated configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Fetches the configured folder, evaluates both phases and applies
    /// the result.
    ///
    /// The clock is read exactly once, after fetching and before state
    /// evaluation.
    ///
    /// # Errors
    ///
    /// Returns an error if selecting, searching or fetching fails. Failures
    /// while applying actions are reported in the summary instead.
    pub fn run<T, C>(&self, transport: &mut T, clock: &C, options: RunOptions) -> Result<RunSummary>
    where
        T: Transport + ?Sized,
        C: Clock + ?Sized,
    {
        let folder = self.config.folder.as_str();
        transport.select(folder)?;
        let uids = transport.search("ALL")?;
        let records = if uids.is_empty() {
            Vec::new()
        } else {
            transport.fetch(&uids)?
        };
        let snapshot = Snapshot::new(records.iter().map(Message::from_record));
        let threads = ThreadMap::build(&snapshot);
        info!(
            "Fetched {} messages from {} in {} threads",
            snapshot.len(),
            folder,
            threads.len()
        );

        let phase_one =
            MessageFilterEngine::new(&self.config.message_filters).evaluate(&snapshot, &threads);

        let now = clock.now();
        let phase_two = StateFilterEngine::new(
            &self.config.state_filters,
            self.config.read_marker.clone(),
        )
        .evaluate(&snapshot, &phase_one.unmatched, &threads, now);

        let mut summary = RunSummary {
            messages: snapshot.len(),
            threads: threads.len(),
            filtered: phase_one.matches.len(),
            ..RunSummary::default()
        };

        let mut applier = ActionApplier::new(transport, folder).dry_run(options.dry_run);
        let applied = applier
            .apply(&phase_one.actions, &mut summary.audit)
            .and_then(|()| applier.apply(&phase_two, &mut summary.audit));

        if let Err(err) = applied {
            warn!("Run aborted: {}", err);
            summary.aborted = Some(err);
            return Ok(summary);
        }

        if let Err(err) = transport.logout() {
            warn!("Logout failed: {}", err);
        }

        info!(
            "Run complete: {} applied, {} skipped, {} failed",
            summary.audit.applied(),
            summary.audit.skipped(),
            summary.audit.failed()
        );
        Ok(summary)
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
    use crate::fixtures::now;
    use crate::time::FixedClock;
    use crate::transport::{MemoryTransport, StoredMessage};

    fn config() -> Config {
        Config::from_toml(
            r#"
            [[message-filters]]
            name = "boss"
            from = "boss@work.com"
            action = "Star"

            [[state-filters]]
            name = "inbox"
            ttl = "7d"
            action = "Purgatory"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_run_both_phases() {
        let mut transport = MemoryTransport::new();
        transport.insert(
            StoredMessage::new(1, "From: boss@work.com\r\n", now() - chrono::Duration::days(30))
                .with_labels(&["INBOX"]),
        );
        transport.insert(
            StoredMessage::new(2, "From: spam@ads.com\r\n", now() - chrono::Duration::days(30))
                .with_labels(&["INBOX"]),
        );

        let summary = Triage::new(config())
            .run(&mut transport, &FixedClock(now()), RunOptions::default())
            .unwrap();

        assert!(summary.is_complete());
        assert_eq!(summary.messages, 2);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.audit.applied(), 3);
        assert!(!summary.has_failure(Uid(1)));
        assert!(transport.is_logged_out());
    }

    #[test]
    fn test_empty_folder() {
        let mut transport = MemoryTransport::new();
        let summary = Triage::new(config())
            .run(&mut transport, &FixedClock(now()), RunOptions::default())
            .unwrap();
        assert_eq!(summary.messages, 0);
        assert!(summary.audit.is_empty());
    }

    #[test]
    fn test_unknown_folder_is_error() {
        let mut config = config();
        config.folder = "Nope".to_string();
        let mut transport = MemoryTransport::new();
        assert!(
            Triage::new(config)
                .run(&mut transport, &FixedClock(now()), RunOptions::default())
                .is_err()
        );
    }
}
