//! Phase two: TTL lifecycle with thread-wide protection and expiry.
//!
//! Each message first gets a verdict from the first [`StateRule`] covering
//! its labels. Verdicts are then reconciled per thread:
//!
//! - one `Keep` member protects the whole thread;
//! - otherwise the newest member decides, against its own rule, whether the
//!   thread has expired, and if so its rule's action is planned for every
//!   candidate in the thread.
//!
//! Thread-mates claimed in phase one still count for protection and age,
//! but only phase-two candidates receive actions.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::action::{Action, ActionContext, Phase, PlannedAction};
use crate::label::Label;
use crate::message::{Message, Snapshot, Uid};
use crate::rules::{Lifetime, StateRule};
use crate::thread::ThreadMap;

/// Per-message verdict before thread reconciliation.
#[derive(Debug, Clone, Copy)]
struct Verdict<'r> {
    rule: &'r StateRule,
    lifetime: Lifetime,
}

/// Evaluates [`StateRule`]s against a fixed instant.
#[derive(Debug, Clone)]
pub struct StateFilterEngine<'a> {
    rules: &'a [StateRule],
    read_marker: Label,
}

impl<'a> StateFilterEngine<'a> {
    /// Creates an engine. Messages carrying `read_marker` count as read.
    #[must_use]
    pub const fn new(rules: &'a [StateRule], read_marker: Label) -> Self {
        Self { rules, read_marker }
    }

    fn verdict(&self, message: &Message) -> Option<Verdict<'a>> {
        let rule = self.rules.iter().find(|r| r.matches(&message.labels))?;
        let is_read = message.has_label(&self.read_marker);
        Some(Verdict {
            rule,
            lifetime: rule.ttl.lifetime(is_read),
        })
    }

    /// Returns true if `message`, taken alone, has outlived its rule at `now`.
    #[must_use]
    pub fn is_expired(&self, message: &Message, now: DateTime<Utc>) -> bool {
        matches!(
            self.verdict(message),
            Some(Verdict { lifetime: Lifetime::Expires(limit), .. }) if message.age(now) > limit
        )
    }

    /// Plans transitions for `candidates` as of `now`.
    ///
    /// `now` is taken as given; callers sample their clock once per run.
    /// The result is ordered by thread, then by member age, and holds at
    /// most one copy of each (message, action) pair.
    #[must_use]
    pub fn evaluate(
        &self,
        snapshot: &Snapshot,
        candidates: &[Uid],
        threads: &ThreadMap,
        now: DateTime<Utc>,
    ) -> Vec<PlannedAction> {
        let candidate_set: BTreeSet<Uid> = candidates.iter().copied().collect();
        let mut visited_threads: HashSet<&str> = HashSet::new();
        let mut emitted: HashSet<(Uid, Action)> = HashSet::new();
        let mut planned = Vec::new();
        let mut protected = 0usize;

        for &uid in &candidate_set {
            let members: Vec<&Message> = match threads.thread_of(uid) {
                Some(thread) => {
                    if !visited_threads.insert(thread.id.as_str()) {
                        continue;
                    }
                    thread
                        .members
                        .iter()
                        .filter_map(|m| snapshot.get(*m))
                        .collect()
                }
                None => snapshot.get(uid).into_iter().collect(),
            };

            let verdicts: Vec<(&Message, Option<Verdict<'a>>)> =
                members.iter().map(|m| (*m, self.verdict(m))).collect();

            if let Some((keeper, Some(verdict))) = verdicts
                .iter()
                .find(|(_, v)| matches!(v, Some(v) if v.lifetime == Lifetime::Protected))
            {
                debug!(
                    "Thread of UID {} protected by '{}' on UID {}",
                    uid, verdict.rule.name, keeper.uid
                );
                protected += 1;
                continue;
            }

            let Some((newest, newest_verdict)) = verdicts
                .iter()
                .max_by_key(|(m, _)| (m.internal_date, m.uid))
            else {
                continue;
            };
            let Some(verdict) = newest_verdict else {
                continue;
            };
            let Lifetime::Expires(limit) = verdict.lifetime else {
                continue;
            };
            let age = newest.age(now);
            if age <= limit {
                continue;
            }
            let Some(action) = &verdict.rule.action else {
                continue;
            };

            debug!(
                "Thread of UID {} expired: newest UID {} is {}h old, limit {}h ('{}')",
                uid,
                newest.uid,
                age.num_hours(),
                limit.num_hours(),
                verdict.rule.name
            );

            for member in &members {
                if !candidate_set.contains(&member.uid)
                    || !emitted.insert((member.uid, action.clone()))
                {
                    continue;
                }
                planned.push(PlannedAction {
                    uid: member.uid,
                    action: action.clone(),
                    context: ActionContext {
                        phase: Phase::StateFilter,
                        rule: verdict.rule.name.clone(),
                        subject: member.subject.clone(),
                        propagated_from: (member.uid != newest.uid).then_some(newest.uid),
                        nerfed: verdict.rule.nerf,
                    },
                });
            }
        }

        info!(
            "State filters: {} candidates, {} threads protected, {} transitions",
            candidate_set.len(),
            protected,
            planned.len()
        );
        planned
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
    use crate::fixtures::{message, now};
    use crate::rules::Ttl;
    use chrono::Duration;
    use proptest::prelude::*;

    fn purgatory() -> Action {
        Action::Move("Purgatory".to_string())
    }

    fn rules() -> Vec<StateRule> {
        vec![
            StateRule::new("protected", Ttl::Keep).with_labels(["Starred", "Important"]),
            StateRule::new(
                "inbox",
                Ttl::ReadUnread {
                    read: Some(Duration::days(7)),
                    unread: Some(Duration::days(21)),
                },
            )
            .with_action(purgatory()),
        ]
    }

    fn evaluate(messages: Vec<Message>, rules: &[StateRule]) -> Vec<PlannedAction> {
        let snapshot = Snapshot::new(messages);
        let threads = ThreadMap::build(&snapshot);
        let candidates: Vec<Uid> = snapshot.uids().collect();
        StateFilterEngine::new(rules, Label::Seen).evaluate(&snapshot, &candidates, &threads, now())
    }

    fn pairs(planned: &[PlannedAction]) -> Vec<(Uid, Action)> {
        planned.iter().map(|p| (p.uid, p.action.clone())).collect()
    }

    #[test]
    fn test_read_message_past_read_ttl_moves() {
        let planned = evaluate(
            vec![message(1, Duration::days(8), "", &["INBOX", "\\Seen"], None)],
            &rules(),
        );
        assert_eq!(pairs(&planned), vec![(Uid(1), purgatory())]);
        assert_eq!(planned[0].context.rule, "inbox");
        assert_eq!(planned[0].context.phase, Phase::StateFilter);
    }

    #[test]
    fn test_unread_message_within_unread_ttl_stays() {
        let planned = evaluate(vec![message(1, Duration::days(8), "", &["INBOX"], None)], &rules());
        assert!(planned.is_empty());
    }

    #[test]
    fn test_exact_ttl_is_not_expired() {
        let planned = evaluate(
            vec![message(1, Duration::days(7), "", &["\\Seen"], None)],
            &rules(),
        );
        assert!(planned.is_empty());
    }

    #[test]
    fn test_keep_protects_message_regardless_of_age() {
        let planned = evaluate(
            vec![message(1, Duration::days(400), "", &["\\Starred", "\\Seen"], None)],
            &rules(),
        );
        assert!(planned.is_empty());
    }

    #[test]
    fn test_protection_propagates_to_thread() {
        let planned = evaluate(
            vec![
                message(1, Duration::days(10), "", &["\\Seen"], Some("t")),
                message(2, Duration::zero(), "", &["\\Important"], Some("t")),
            ],
            &rules(),
        );
        assert!(planned.is_empty());
    }

    #[test]
    fn test_newest_member_governs_thread() {
        let messages = vec![
            message(1, Duration::days(10), "", &["\\Seen"], Some("t")),
            message(2, Duration::days(3), "", &["\\Seen"], Some("t")),
        ];
        let snapshot = Snapshot::new(messages);
        let threads = ThreadMap::build(&snapshot);
        let candidates = [Uid(1), Uid(2)];
        let rules = rules();
        let engine = StateFilterEngine::new(&rules, Label::Seen);

        assert!(engine.is_expired(snapshot.get(Uid(1)).unwrap(), now()));
        assert!(
            engine
                .evaluate(&snapshot, &candidates, &threads, now())
                .is_empty()
        );

        let later = now() + Duration::days(5);
        let planned = engine.evaluate(&snapshot, &candidates, &threads, later);
        assert_eq!(
            pairs(&planned),
            vec![(Uid(1), purgatory()), (Uid(2), purgatory())]
        );
        assert_eq!(planned[0].context.propagated_from, Some(Uid(2)));
        assert_eq!(planned[1].context.propagated_from, None);
    }

    #[test]
    fn test_newest_uses_its_own_read_state() {
        // Old read root, 8-day-old unread reply: the reply's 21-day limit governs.
        let planned = evaluate(
            vec![
                message(1, Duration::days(30), "", &["\\Seen"], Some("t")),
                message(2, Duration::days(8), "", &[], Some("t")),
            ],
            &rules(),
        );
        assert!(planned.is_empty());
    }

    #[test]
    fn test_only_candidates_receive_actions() {
        let messages = vec![
            message(1, Duration::days(20), "", &["\\Seen"], Some("t")),
            message(2, Duration::days(9), "", &["\\Seen"], Some("t")),
        ];
        let snapshot = Snapshot::new(messages);
        let threads = ThreadMap::build(&snapshot);
        let rules = rules();
        let planned = StateFilterEngine::new(&rules, Label::Seen).evaluate(
            &snapshot,
            &[Uid(1)],
            &threads,
            now(),
        );
        assert_eq!(pairs(&planned), vec![(Uid(1), purgatory())]);
    }

    #[test]
    fn test_non_candidate_keeper_still_protects() {
        let messages = vec![
            message(1, Duration::days(20), "", &["\\Seen"], Some("t")),
            message(2, Duration::days(20), "", &["\\Starred"], Some("t")),
        ];
        let snapshot = Snapshot::new(messages);
        let threads = ThreadMap::build(&snapshot);
        let rules = rules();
        let planned = StateFilterEngine::new(&rules, Label::Seen).evaluate(
            &snapshot,
            &[Uid(1)],
            &threads,
            now(),
        );
        assert!(planned.is_empty());
    }

    #[test]
    fn test_no_matching_rule_means_no_action() {
        let rules = vec![
            StateRule::new("purge", Ttl::Fixed(Duration::days(1)))
                .with_labels(["Purgatory"])
                .with_action(Action::Delete),
        ];
        let planned = evaluate(vec![message(1, Duration::days(90), "", &["INBOX"], None)], &rules);
        assert!(planned.is_empty());
    }

    #[test]
    fn test_missing_read_side_never_expires() {
        let rules = vec![
            StateRule::new(
                "read-only",
                Ttl::ReadUnread {
                    read: Some(Duration::days(7)),
                    unread: None,
                },
            )
            .with_action(purgatory()),
        ];
        let planned = evaluate(vec![message(1, Duration::days(900), "", &[], None)], &rules);
        assert!(planned.is_empty());
    }

    #[test]
    fn test_nerfed_rule_marks_context() {
        let rules = vec![
            StateRule::new("trial", Ttl::Fixed(Duration::hours(1)))
                .with_action(Action::Delete)
                .nerfed(),
        ];
        let planned = evaluate(vec![message(1, Duration::days(1), "", &[], None)], &rules);
        assert_eq!(planned.len(), 1);
        assert!(planned[0].context.nerfed);
    }

    #[test]
    fn test_custom_read_marker() {
        let rules = rules();
        let snapshot = Snapshot::new([message(1, Duration::days(8), "", &["Done"], None)]);
        let threads = ThreadMap::build(&snapshot);
        let engine = StateFilterEngine::new(&rules, Label::parse("Done"));
        let planned = engine.evaluate(&snapshot, &[Uid(1)], &threads, now());
        assert_eq!(pairs(&planned), vec![(Uid(1), purgatory())]);
    }

    proptest! {
        #[test]
        fn prop_keep_member_blocks_every_action(
            ages in proptest::collection::vec(0i64..60, 1..6),
            keeper in 0usize..6,
        ) {
            let keeper = keeper % ages.len();
            let messages: Vec<Message> = ages
                .iter()
                .enumerate()
                .map(|(i, days)| {
                    let labels: &[&str] = if i == keeper { &["\\Starred"] } else { &["\\Seen"] };
                    message(u32::try_from(i).unwrap() + 1, Duration::days(*days), "", labels, Some("t"))
                })
                .collect();
            prop_assert!(evaluate(messages, &rules()).is_empty());
        }

        #[test]
        fn prop_thread_moves_as_unit(ages in proptest::collection::vec(0i64..60, 1..6)) {
            let messages: Vec<Message> = ages
                .iter()
                .enumerate()
                .map(|(i, days)| {
                    message(u32::try_from(i).unwrap() + 1, Duration::days(*days), "", &["\\Seen"], Some("t"))
                })
                .collect();
            let newest_age = ages.iter().copied().min().unwrap();
            let planned = evaluate(messages, &rules());
            if newest_age > 7 {
                prop_assert_eq!(planned.len(), ages.len());
                prop_assert!(planned.iter().all(|p| p.action == purgatory()));
            } else {
                prop_assert!(planned.is_empty());
            }
        }
    }
}
