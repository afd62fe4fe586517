//! Applying planned actions to the mailbox.
//!
//! Actions run one at a time, in order. Before each mutating call the
//! applier reads the message's current labels and skips the call when its
//! effect is already there, so replaying a run changes nothing. Per-call
//! failures are recorded and the queue keeps going; a lost connection ends
//! the run.

use std::fmt;

use tracing::{debug, info, warn};

use crate::action::{Action, Phase, PlannedAction};
use crate::label::{Label, Labels};
use crate::message::Uid;
use crate::transport::{Transport, TransportError, TransportResult};

/// What happened to one attempted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The transport call succeeded.
    Applied,
    /// No call was made.
    Skipped(String),
    /// The transport call failed.
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// One entry of the audit stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Target message; `None` for mailbox-level actions.
    pub uid: Option<Uid>,
    /// The action attempted.
    pub action: Action,
    /// Subject of the target message.
    pub subject: String,
    /// Folder the message was in.
    pub source: String,
    /// Deciding phase.
    pub phase: Phase,
    /// Deciding rule.
    pub rule: String,
    /// Result.
    pub outcome: Outcome,
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uid {
            Some(uid) => write!(f, "UID {:<6} ", uid.get())?,
            None => write!(f, "{:<10} ", "-")?,
        }
        match &self.action {
            Action::Move(dest) => write!(f, "{} -> {dest}", self.source)?,
            other => write!(f, "{other}")?,
        }
        if !self.subject.is_empty() {
            write!(f, " {:?}", self.subject)?;
        }
        write!(f, " [{}: {}] {}", self.phase, self.rule, self.outcome)
    }
}

/// Ordered record of every attempted action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditLog {
    records: Vec<AuditRecord>,
}

impl AuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn push(&mut self, record: AuditRecord) {
        self.records.push(record);
    }

    /// Records in the order they were attempted.
    pub fn iter(&self) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter()
    }

    /// Records concerning one message.
    pub fn for_uid(&self, uid: Uid) -> impl Iterator<Item = &AuditRecord> {
        self.records.iter().filter(move |r| r.uid == Some(uid))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing was attempted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of applied records.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Applied))
    }

    /// Number of skipped records.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    /// Number of failed records.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }
}

impl<'a> IntoIterator for &'a AuditLog {
    type Item = &'a AuditRecord;
    type IntoIter = std::slice::Iter<'a, AuditRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Executes planned actions against a [`Transport`].
pub struct ActionApplier<'t, T: Transport + ?Sized> {
    transport: &'t mut T,
    folder: String,
    dry_run: bool,
}

impl<'t, T: Transport + ?Sized> ActionApplier<'t, T> {
    /// Creates an applier for messages in `folder`.
    pub fn new(transport: &'t mut T, folder: impl Into<String>) -> Self {
        Self {
            transport,
            folder: folder.into(),
            dry_run: false,
        }
    }

    /// Records every action as skipped instead of applying it.
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Applies `actions` in order, appending to `log`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`TransportError`]; actions after it are not
    /// attempted. Non-fatal errors are only recorded.
    pub fn apply(&mut self, actions: &[PlannedAction], log: &mut AuditLog) -> TransportResult<()> {
        for planned in actions {
            self.apply_one(planned, log)?;
        }
        Ok(())
    }

    fn apply_one(&mut self, planned: &PlannedAction, log: &mut AuditLog) -> TransportResult<()> {
        let folder = self.folder.clone();
        let record = |action: &Action, uid: Option<Uid>, outcome: Outcome| AuditRecord {
            uid,
            action: action.clone(),
            subject: uid.map_or_else(String::new, |_| planned.context.subject.clone()),
            source: folder.clone(),
            phase: planned.context.phase,
            rule: planned.context.rule.clone(),
            outcome,
        };
        let own = |outcome: Outcome| record(&planned.action, Some(planned.uid), outcome);

        if self.dry_run || planned.context.nerfed {
            let reason = if self.dry_run { "dry run" } else { "nerfed rule" };
            info!("[{}] Would apply {}", reason, planned);
            log.push(own(Outcome::Skipped(reason.to_string())));
            return Ok(());
        }

        let labels = match self.transport.labels(planned.uid) {
            Ok(labels) => labels,
            Err(err) => return Self::fail(log, own(Outcome::Failed(err.to_string())), err),
        };

        if let Some(reason) = already_done(&planned.action, &labels) {
            debug!("Skipping {}: {}", planned, reason);
            log.push(own(Outcome::Skipped(reason.to_string())));
            return Ok(());
        }

        if let Action::Move(dest) = &planned.action {
            let create = Action::CreateLabel(dest.clone());
            match self.ensure_label(dest) {
                Ok(false) => {}
                Ok(true) => {
                    info!("Created label {}", dest);
                    log.push(record(&create, None, Outcome::Applied));
                }
                Err(err) => {
                    log.push(record(&create, None, Outcome::Failed(err.to_string())));
                    let reason = format!("destination unavailable: {err}");
                    return Self::fail(log, own(Outcome::Failed(reason)), err);
                }
            }
        }

        match self.call(planned.uid, &planned.action) {
            Ok(()) => {
                info!("Applied {}", planned);
                log.push(own(Outcome::Applied));
                Ok(())
            }
            Err(err) => Self::fail(log, own(Outcome::Failed(err.to_string())), err),
        }
    }

    /// Records a failure; returns the error only if it is fatal.
    fn fail(log: &mut AuditLog, entry: AuditRecord, err: TransportError) -> TransportResult<()> {
        if err.is_fatal() {
            warn!("Aborting: {}", err);
            log.push(entry);
            return Err(err);
        }
        warn!("Failed: {}", entry);
        log.push(entry);
        Ok(())
    }

    /// Creates `label` if missing. Returns true if it was created.
    fn ensure_label(&mut self, label: &str) -> TransportResult<bool> {
        if self.transport.label_exists(label)? {
            return Ok(false);
        }
        self.transport.create_label(label)?;
        Ok(true)
    }

    fn call(&mut self, uid: Uid, action: &Action) -> TransportResult<()> {
        match action {
            Action::Star => self.transport.add_label(uid, Label::Starred.as_str()),
            Action::Flag => self.transport.add_label(uid, Label::Important.as_str()),
            Action::Move(dest) => self.transport.move_message(uid, dest),
            Action::Delete => self.transport.delete(uid),
            Action::AddLabel(label) => self.transport.add_label(uid, label),
            Action::RemoveLabel(label) => self.transport.remove_label(uid, label),
            Action::CreateLabel(label) => {
                if self.transport.label_exists(label)? {
                    Ok(())
                } else {
                    self.transport.create_label(label)
                }
            }
        }
    }
}

/// Why `action` needs no call, given the message's current labels.
fn already_done(action: &Action, labels: &Labels) -> Option<&'static str> {
    match action {
        Action::Star => labels
            .contains(&Label::Starred)
            .then_some("already starred"),
        Action::Flag => labels
            .contains(&Label::Important)
            .then_some("already important"),
        Action::Move(dest) => labels
            .contains(&Label::parse(dest))
            .then_some("already in destination"),
        Action::Delete => labels.contains(&Label::Deleted).then_some("already deleted"),
        Action::AddLabel(label) => labels
            .contains(&Label::parse(label))
            .then_some("label already present"),
        Action::RemoveLabel(label) => (!labels.contains(&Label::parse(label)))
            .then_some("label already absent"),
        Action::CreateLabel(_) => None,
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
    use crate::action::ActionContext;
    use crate::fixtures::now;
    use crate::transport::{JournalEntry, MemoryOp, MemoryTransport, StoredMessage};

    fn planned(uid: u32, action: Action) -> PlannedAction {
        PlannedAction {
            uid: Uid(uid),
            action,
            context: ActionContext {
                phase: Phase::StateFilter,
                rule: "test".to_string(),
                subject: format!("message {uid}"),
                propagated_from: None,
                nerfed: false,
            },
        }
    }

    fn mailbox() -> MemoryTransport {
        let mut transport = MemoryTransport::new();
        for uid in 1..=3 {
            transport.insert(
                StoredMessage::new(uid, format!("Subject: message {uid}\r\n"), now())
                    .with_labels(&["INBOX"]),
            );
        }
        transport
    }

    fn purgatory() -> Action {
        Action::Move("Purgatory".to_string())
    }

    #[test]
    fn test_move_creates_destination_once() {
        let mut transport = mailbox();
        let mut log = AuditLog::new();
        ActionApplier::new(&mut transport, "INBOX")
            .apply(&[planned(1, purgatory()), planned(2, purgatory())], &mut log)
            .unwrap();

        let actions: Vec<_> = log.iter().map(|r| (r.uid, r.action.clone())).collect();
        assert_eq!(
            actions,
            vec![
                (None, Action::CreateLabel("Purgatory".to_string())),
                (Some(Uid(1)), purgatory()),
                (Some(Uid(2)), purgatory()),
            ]
        );
        assert_eq!(log.applied(), 3);
        assert!(transport.message(1).unwrap().labels.contains(&Label::parse("Purgatory")));
        assert!(!transport.message(1).unwrap().labels.contains(&Label::Inbox));
    }

    #[test]
    fn test_reapplying_is_idempotent() {
        let mut transport = mailbox();
        let actions = [
            planned(1, purgatory()),
            planned(2, Action::Star),
            planned(3, Action::Delete),
            planned(3, Action::AddLabel("Seen-by-bot".to_string())),
            planned(2, Action::RemoveLabel("INBOX".to_string())),
        ];

        let mut first = AuditLog::new();
        ActionApplier::new(&mut transport, "INBOX")
            .apply(&actions, &mut first)
            .unwrap();
        let journal_len = transport.journal().len();

        let mut second = AuditLog::new();
        ActionApplier::new(&mut transport, "INBOX")
            .apply(&actions, &mut second)
            .unwrap();

        assert_eq!(transport.journal().len(), journal_len);
        assert_eq!(second.applied(), 0);
        assert_eq!(second.skipped(), actions.len());
        let moves = transport
            .journal()
            .iter()
            .filter(|e| matches!(e, JournalEntry::Move { .. }))
            .count();
        assert_eq!(moves, 1);
    }

    #[test]
    fn test_failure_is_recorded_and_processing_continues() {
        let mut transport = mailbox();
        transport.fail_on(
            MemoryOp::AddLabel,
            1,
            TransportError::Rejected {
                command: "STORE".to_string(),
                reason: "quota exceeded".to_string(),
            },
        );
        let mut log = AuditLog::new();
        ActionApplier::new(&mut transport, "INBOX")
            .apply(&[planned(1, Action::Star), planned(2, Action::Star)], &mut log)
            .unwrap();

        assert_eq!(log.failed(), 1);
        assert_eq!(log.applied(), 1);
        assert!(matches!(
            log.for_uid(Uid(1)).next().unwrap().outcome,
            Outcome::Failed(_)
        ));
        assert!(transport.message(2).unwrap().labels.contains(&Label::Starred));
    }

    #[test]
    fn test_missing_message_is_not_fatal() {
        let mut transport = mailbox();
        let mut log = AuditLog::new();
        ActionApplier::new(&mut transport, "INBOX")
            .apply(&[planned(99, Action::Star), planned(1, Action::Star)], &mut log)
            .unwrap();
        assert_eq!(log.failed(), 1);
        assert_eq!(log.applied(), 1);
    }

    #[test]
    fn test_connection_loss_aborts() {
        let mut transport = mailbox();
        transport.disconnect();
        let mut log = AuditLog::new();
        let err = ActionApplier::new(&mut transport, "INBOX")
            .apply(&[planned(1, Action::Star), planned(2, Action::Star)], &mut log)
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(log.len(), 1);
        assert_eq!(log.failed(), 1);
    }

    #[test]
    fn test_dry_run_and_nerf_skip() {
        let mut transport = mailbox();
        let mut log = AuditLog::new();
        ActionApplier::new(&mut transport, "INBOX")
            .dry_run(true)
            .apply(&[planned(1, Action::Delete)], &mut log)
            .unwrap();

        let mut nerfed = planned(2, Action::Delete);
        nerfed.context.nerfed = true;
        ActionApplier::new(&mut transport, "INBOX")
            .apply(&[nerfed], &mut log)
            .unwrap();

        assert_eq!(log.skipped(), 2);
        assert!(transport.journal().is_empty());
    }

    #[test]
    fn test_flag_and_star_are_distinct_states() {
        let mut transport = mailbox();
        let mut log = AuditLog::new();
        ActionApplier::new(&mut transport, "INBOX")
            .apply(&[planned(1, Action::Flag), planned(1, Action::Star)], &mut log)
            .unwrap();
        assert_eq!(log.applied(), 2);

        let labels = &transport.message(1).unwrap().labels;
        assert!(labels.contains(&Label::Important));
        assert!(labels.contains(&Label::Starred));

        let mut flagged_only = mailbox();
        let mut log = AuditLog::new();
        ActionApplier::new(&mut flagged_only, "INBOX")
            .apply(&[planned(2, Action::Flag)], &mut log)
            .unwrap();
        let labels = &flagged_only.message(2).unwrap().labels;
        assert!(labels.contains(&Label::Important));
        assert!(!labels.contains(&Label::Starred));

        let mut again = AuditLog::new();
        ActionApplier::new(&mut flagged_only, "INBOX")
            .apply(&[planned(2, Action::Flag)], &mut again)
            .unwrap();
        assert_eq!(again.skipped(), 1);
    }

    #[test]
    fn test_created_label_record_has_no_subject() {
        let mut transport = mailbox();
        let mut log = AuditLog::new();
        ActionApplier::new(&mut transport, "INBOX")
            .apply(&[planned(1, purgatory())], &mut log)
            .unwrap();

        let created = log.iter().next().unwrap();
        assert_eq!(created.action, Action::CreateLabel("Purgatory".to_string()));
        assert_eq!(created.uid, None);
        assert!(created.subject.is_empty());
        assert_eq!(log.for_uid(Uid(1)).next().unwrap().subject, "message 1");
    }

    #[test]
    fn test_record_display() {
        let record = AuditRecord {
            uid: Some(Uid(7)),
            action: purgatory(),
            subject: "Hello".to_string(),
            source: "INBOX".to_string(),
            phase: Phase::StateFilter,
            rule: "inbox".to_string(),
            outcome: Outcome::Applied,
        };
        assert_eq!(
            record.to_string(),
            "UID 7      INBOX -> Purgatory \"Hello\" [state-filter: inbox] applied"
        );
    }
}
