//! End-to-end triage runs against an in-memory mailbox.
//!
//! Each test builds a mailbox, runs the full pipeline with a controlled
//! clock and inspects the audit log and the resulting mailbox state.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, Duration, Utc};

use mailtriage_core::time::MockClock;
use mailtriage_core::transport::{
    JournalEntry, MemoryOp, MemoryTransport, StoredMessage, TransportError,
};
use mailtriage_core::{Action, Config, Label, Outcome, RunOptions, RunSummary, Triage, Uid};

const CONFIG: &str = r#"
[[message-filters]]
name = "boss"
from = "*@boss.example.com"
action = "Star"

[[message-filters]]
name = "direct-personal"
to = "me@example.com"
cc = []
headers = { List-Id = [] }
subject = ["personal:*"]
action = { AddLabel = "Personal" }

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
label = "INBOX"
ttl = { read = "7d", unread = "21d" }
action = "Purgatory"
"#;

fn base() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T09:00:00+00:00")
        .unwrap()
        .with_timezone(&Utc)
}

fn stored(uid: u32, age_days: i64, headers: &str, labels: &[&str]) -> StoredMessage {
    StoredMessage::new(uid, headers, base() - Duration::days(age_days)).with_labels(labels)
}

fn run(transport: &mut MemoryTransport, clock: &MockClock) -> RunSummary {
    let config = Config::from_toml(CONFIG).unwrap();
    Triage::new(config)
        .run(transport, clock, RunOptions::default())
        .unwrap()
}

fn moved_to_purgatory(transport: &MemoryTransport, uid: u32) -> bool {
    let labels = &transport.message(uid).unwrap().labels;
    labels.contains(&Label::parse("Purgatory")) && !labels.contains(&Label::Inbox)
}

#[test]
fn test_read_message_past_read_ttl_goes_to_purgatory() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 8, "Subject: read\r\n", &["INBOX", "\\Seen"]));

    let summary = run(&mut transport, &MockClock::new(base()));

    assert!(moved_to_purgatory(&transport, 1));
    let record = summary.audit.for_uid(Uid(1)).next().unwrap();
    assert_eq!(record.action, Action::Move("Purgatory".to_string()));
    assert_eq!(record.source, "INBOX");
    assert_eq!(record.subject, "read");
    assert_eq!(record.outcome, Outcome::Applied);
}

#[test]
fn test_unread_message_within_unread_ttl_stays() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 8, "Subject: unread\r\n", &["INBOX"]));

    let summary = run(&mut transport, &MockClock::new(base()));

    assert!(summary.audit.is_empty());
    assert!(transport.journal().is_empty());
}

#[test]
fn test_keep_protects_old_message() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 365, "", &["INBOX", "\\Seen", "\\Starred"]));

    let summary = run(&mut transport, &MockClock::new(base()));
    assert!(summary.audit.is_empty());
}

#[test]
fn test_protected_thread_member_protects_old_mate() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 10, "", &["INBOX", "\\Seen"]).with_thread_id("t1"));
    transport.insert(stored(2, 0, "", &["INBOX", "\\Important"]).with_thread_id("t1"));

    let summary = run(&mut transport, &MockClock::new(base()));
    assert!(summary.audit.is_empty());
}

#[test]
fn test_newest_member_governs_and_thread_moves_together() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 10, "", &["INBOX", "\\Seen"]).with_thread_id("t1"));
    transport.insert(stored(2, 3, "", &["INBOX", "\\Seen"]).with_thread_id("t1"));
    let clock = MockClock::new(base());

    let first = run(&mut transport, &clock);
    assert!(first.audit.is_empty());

    clock.advance(Duration::days(5));
    let second = run(&mut transport, &clock);

    assert!(moved_to_purgatory(&transport, 1));
    assert!(moved_to_purgatory(&transport, 2));
    let moves: Vec<Uid> = second
        .audit
        .iter()
        .filter(|r| r.action == Action::Move("Purgatory".to_string()))
        .filter_map(|r| r.uid)
        .collect();
    assert_eq!(moves, vec![Uid(1), Uid(2)]);
}

#[test]
fn test_reference_threading_without_extension() {
    let mut transport = MemoryTransport::new().with_thread_extension(false);
    transport.insert(
        stored(1, 30, "Message-ID: <root@x>\r\n", &["INBOX", "\\Seen"]).with_thread_id("ignored"),
    );
    transport.insert(stored(
        2,
        1,
        "Message-ID: <reply@x>\r\nIn-Reply-To: <root@x>\r\n",
        &["INBOX", "\\Seen"],
    ));

    let summary = run(&mut transport, &MockClock::new(base()));
    // The fresh reply keeps the old root alive.
    assert!(summary.audit.is_empty());
}

#[test]
fn test_message_filter_first_match_and_propagation() {
    let mut transport = MemoryTransport::new();
    transport.insert(
        stored(1, 30, "From: me@example.com\r\nTo: ceo@boss.example.com\r\n", &["INBOX", "\\Seen"])
            .with_thread_id("t1"),
    );
    transport.insert(
        stored(2, 29, "From: ceo@boss.example.com\r\nTo: me@example.com\r\nSubject: personal: lunch\r\n", &["INBOX", "\\Seen"])
            .with_thread_id("t1"),
    );

    let summary = run(&mut transport, &MockClock::new(base()));

    assert_eq!(summary.filtered, 2);
    // Both star via the boss rule, no "Personal" label (first match wins),
    // and no TTL transition because phase one claimed the whole thread.
    for uid in [1, 2] {
        let labels = &transport.message(uid).unwrap().labels;
        assert!(labels.contains(&Label::Starred));
        assert!(!labels.contains(&Label::parse("Personal")));
        assert!(labels.contains(&Label::Inbox));
    }
}

#[test]
fn test_empty_cc_and_absent_list_id() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 0, "To: me@example.com\r\nSubject: personal: a\r\n", &["INBOX"]));
    transport.insert(stored(
        2,
        0,
        "To: me@example.com\r\nCc: x@example.com\r\nSubject: personal: b\r\n",
        &["INBOX"],
    ));
    transport.insert(stored(
        3,
        0,
        "To: me@example.com\r\nList-Id: <list.example.com>\r\nSubject: personal: c\r\n",
        &["INBOX"],
    ));

    run(&mut transport, &MockClock::new(base()));

    let personal = Label::parse("Personal");
    assert!(transport.message(1).unwrap().labels.contains(&personal));
    assert!(!transport.message(2).unwrap().labels.contains(&personal));
    assert!(!transport.message(3).unwrap().labels.contains(&personal));
}

#[test]
fn test_second_run_adds_no_duplicate_records() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 8, "", &["INBOX", "\\Seen"]));
    transport.insert(stored(2, 1, "From: ceo@boss.example.com\r\n", &["INBOX"]));
    let clock = MockClock::new(base());

    run(&mut transport, &clock);
    let journal_after_first = transport.journal().to_vec();
    run(&mut transport, &clock);

    assert_eq!(transport.journal(), journal_after_first.as_slice());
    let moves = transport
        .journal()
        .iter()
        .filter(|e| matches!(e, JournalEntry::Move { .. }))
        .count();
    assert_eq!(moves, 1);
}

#[test]
fn test_purgatory_then_oblivion() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 8, "", &["INBOX", "\\Seen"]));
    let clock = MockClock::new(base());

    run(&mut transport, &clock);
    assert!(moved_to_purgatory(&transport, 1));

    // Purgatory is a separate folder; its own run applies the 14-day rule.
    let mut config = Config::from_toml(CONFIG).unwrap();
    config.folder = "Purgatory".to_string();
    clock.advance(Duration::days(7));
    let summary = Triage::new(config)
        .run(&mut transport, &clock, RunOptions::default())
        .unwrap();

    assert_eq!(summary.audit.applied(), 1);
    assert!(
        transport
            .message(1)
            .unwrap()
            .labels
            .contains(&Label::Deleted)
    );
    assert_eq!(transport.expunge(), vec![Uid(1)]);
}

#[test]
fn test_failure_is_isolated() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 8, "", &["INBOX", "\\Seen"]));
    transport.insert(stored(2, 8, "", &["INBOX", "\\Seen"]));
    transport.fail_on(
        MemoryOp::Move,
        1,
        TransportError::Rejected {
            command: "UID MOVE".to_string(),
            reason: "try again later".to_string(),
        },
    );

    let summary = run(&mut transport, &MockClock::new(base()));

    assert!(summary.is_complete());
    assert!(summary.has_failure(Uid(1)));
    assert!(!summary.has_failure(Uid(2)));
    assert!(moved_to_purgatory(&transport, 2));
    assert!(transport.is_logged_out());
}

#[test]
fn test_connection_loss_aborts_run() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 8, "", &["INBOX", "\\Seen"]));
    transport.insert(stored(2, 8, "", &["INBOX", "\\Seen"]));
    transport.fail_on(
        MemoryOp::Move,
        1,
        TransportError::Connection("socket closed".to_string()),
    );

    let summary = run(&mut transport, &MockClock::new(base()));

    assert!(!summary.is_complete());
    assert!(summary.aborted.as_ref().unwrap().is_fatal());
    assert!(summary.audit.for_uid(Uid(2)).next().is_none());
    assert!(!transport.is_logged_out());
}

#[test]
fn test_dry_run_changes_nothing() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 8, "", &["INBOX", "\\Seen"]));
    let config = Config::from_toml(CONFIG).unwrap();

    let summary = Triage::new(config)
        .run(
            &mut transport,
            &MockClock::new(base()),
            RunOptions { dry_run: true },
        )
        .unwrap();

    assert_eq!(summary.audit.skipped(), 1);
    assert!(transport.journal().is_empty());
}

#[test]
fn test_clock_sampled_once() {
    use mailtriage_core::time::Clock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClock(AtomicUsize);

    impl Clock for CountingClock {
        fn now(&self) -> DateTime<Utc> {
            self.0.fetch_add(1, Ordering::SeqCst);
            base()
        }
    }

    let mut transport = MemoryTransport::new();
    for uid in 1..=5 {
        transport.insert(stored(uid, i64::from(uid) * 3, "", &["INBOX", "\\Seen"]));
    }
    let clock = CountingClock(AtomicUsize::new(0));
    Triage::new(Config::from_toml(CONFIG).unwrap())
        .run(&mut transport, &clock, RunOptions::default())
        .unwrap();

    assert_eq!(clock.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_mailbox_json_round_trip_after_run() {
    let mut transport = MemoryTransport::new();
    transport.insert(stored(1, 8, "Subject: hi\r\n", &["INBOX", "\\Seen"]));
    run(&mut transport, &MockClock::new(base()));

    let json = transport.to_json().unwrap();
    let reloaded = MemoryTransport::from_json(&json).unwrap();
    assert_eq!(reloaded.state(), transport.state());
    assert!(moved_to_purgatory(&reloaded, 1));
}
