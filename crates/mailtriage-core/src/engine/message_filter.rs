//! Phase one: immediate message filters.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::action::{Action, ActionContext, Phase, PlannedAction};
use crate::message::{Message, Snapshot, Uid};
use crate::rules::FilterRule;
use crate::thread::ThreadMap;

/// A message claimed by a filter rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMatch {
    /// The message.
    pub uid: Uid,
    /// Name of the winning rule.
    pub rule: String,
    /// Actions planned for this message.
    pub actions: Vec<Action>,
    /// Set when the match was inherited from a thread-mate.
    pub propagated_from: Option<Uid>,
}

/// Result of phase one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilterOutcome {
    /// Matches, in evaluation order.
    pub matches: Vec<FilterMatch>,
    /// Every planned action, in evaluation order.
    pub actions: Vec<PlannedAction>,
    /// Messages no rule claimed, ascending. These go on to phase two.
    pub unmatched: Vec<Uid>,
}

/// Evaluates [`FilterRule`]s, first match wins.
#[derive(Debug, Clone, Copy)]
pub struct MessageFilterEngine<'a> {
    rules: &'a [FilterRule],
}

impl<'a> MessageFilterEngine<'a> {
    /// Creates an engine over rules in priority order.
    #[must_use]
    pub const fn new(rules: &'a [FilterRule]) -> Self {
        Self { rules }
    }

    /// First rule matching `message`.
    #[must_use]
    pub fn first_match(&self, message: &Message) -> Option<&'a FilterRule> {
        self.rules.iter().find(|rule| rule.matches(message))
    }

    /// Runs every message of `snapshot` through the rules.
    ///
    /// Visibility actions of a winning rule are also planned for the
    /// thread-mates no rule has claimed yet, which are then considered
    /// matched themselves.
    #[must_use]
    pub fn evaluate(&self, snapshot: &Snapshot, threads: &ThreadMap) -> MessageFilterOutcome {
        let mut outcome = MessageFilterOutcome::default();
        let mut claimed: HashSet<Uid> = HashSet::new();

        for message in snapshot.iter() {
            if claimed.contains(&message.uid) {
                continue;
            }
            let Some(rule) = self.first_match(message) else {
                continue;
            };
            debug!(
                "Filter '{}' matched UID {} ({:?})",
                rule.name, message.uid, message.subject
            );
            claimed.insert(message.uid);
            outcome.push(message, rule, rule.actions.clone(), None);

            let visible: Vec<Action> = rule
                .actions
                .iter()
                .filter(|a| a.affects_visibility())
                .cloned()
                .collect();
            if visible.is_empty() {
                continue;
            }
            for &mate in threads.members(message.uid) {
                if mate == message.uid || claimed.contains(&mate) {
                    continue;
                }
                let Some(mate_message) = snapshot.get(mate) else {
                    continue;
                };
                debug!(
                    "Filter '{}' propagated from UID {} to thread-mate UID {}",
                    rule.name, message.uid, mate
                );
                claimed.insert(mate);
                outcome.push(mate_message, rule, visible.clone(), Some(message.uid));
            }
        }

        outcome.unmatched = snapshot
            .uids()
            .filter(|uid| !claimed.contains(uid))
            .collect();

        info!(
            "Message filters: {} matched, {} actions, {} left for state filters",
            outcome.matches.len(),
            outcome.actions.len(),
            outcome.unmatched.len()
        );
        outcome
    }
}

impl MessageFilterOutcome {
    fn push(
        &mut self,
        message: &Message,
        rule: &FilterRule,
        actions: Vec<Action>,
        propagated_from: Option<Uid>,
    ) {
        for action in &actions {
            self.actions.push(PlannedAction {
                uid: message.uid,
                action: action.clone(),
                context: ActionContext {
                    phase: Phase::MessageFilter,
                    rule: rule.name.clone(),
                    subject: message.subject.clone(),
                    propagated_from,
                    nerfed: false,
                },
            });
        }
        self.matches.push(FilterMatch {
            uid: message.uid,
            rule: rule.name.clone(),
            actions,
            propagated_from,
        });
    }

    /// Returns true if `uid` was claimed by a rule.
    #[must_use]
    pub fn is_matched(&self, uid: Uid) -> bool {
        self.matches.iter().any(|m| m.uid == uid)
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
    use crate::fixtures::message;
    use crate::pattern::{AddressFilter, Glob, HeaderFilter};
    use chrono::Duration;

    fn evaluate(messages: Vec<Message>, rules: &[FilterRule]) -> MessageFilterOutcome {
        let snapshot = Snapshot::new(messages);
        let threads = ThreadMap::build(&snapshot);
        MessageFilterEngine::new(rules).evaluate(&snapshot, &threads)
    }

    fn from_rule(name: &str, pattern: &str, action: Action) -> FilterRule {
        FilterRule {
            from: Some(AddressFilter::new(&[pattern]).unwrap()),
            ..FilterRule::new(name).with_action(action)
        }
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            from_rule("boss", "boss@work.com", Action::Star),
            from_rule("work", "*@work.com", Action::Move("Work".to_string())),
        ];
        let outcome = evaluate(
            vec![
                message(1, Duration::zero(), "From: boss@work.com\r\n", &[], None),
                message(2, Duration::zero(), "From: intern@work.com\r\n", &[], None),
                message(3, Duration::zero(), "From: friend@home.org\r\n", &[], None),
            ],
            &rules,
        );

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].rule, "boss");
        assert_eq!(outcome.matches[0].actions, vec![Action::Star]);
        assert_eq!(outcome.matches[1].rule, "work");
        assert_eq!(outcome.unmatched, vec![Uid(3)]);
        assert!(
            outcome
                .actions
                .iter()
                .all(|a| !(a.uid == Uid(1) && a.action != Action::Star))
        );
    }

    #[test]
    fn test_all_actions_of_winning_rule() {
        let rule = from_rule("bills", "*@bank.com", Action::AddLabel("Bills".to_string()))
            .with_action(Action::Move("Finance".to_string()));
        let outcome = evaluate(
            vec![message(1, Duration::zero(), "From: alerts@bank.com\r\n", &[], None)],
            &[rule],
        );
        let actions: Vec<_> = outcome.actions.iter().map(|a| a.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                Action::AddLabel("Bills".to_string()),
                Action::Move("Finance".to_string())
            ]
        );
    }

    #[test]
    fn test_visibility_action_propagates_to_thread() {
        let rules = vec![
            from_rule("boss", "boss@work.com", Action::Star)
                .with_action(Action::AddLabel("Boss".to_string())),
        ];
        let outcome = evaluate(
            vec![
                message(1, Duration::days(2), "From: me@home.org\r\n", &[], Some("t")),
                message(2, Duration::days(1), "From: boss@work.com\r\n", &[], Some("t")),
                message(3, Duration::zero(), "From: me@home.org\r\n", &[], Some("t")),
                message(4, Duration::zero(), "From: me@home.org\r\n", &[], None),
            ],
            &rules,
        );

        assert_eq!(outcome.unmatched, vec![Uid(4)]);
        let for_uid = |uid: u32| -> Vec<Action> {
            outcome
                .actions
                .iter()
                .filter(|a| a.uid == Uid(uid))
                .map(|a| a.action.clone())
                .collect()
        };
        assert_eq!(
            for_uid(2),
            vec![Action::Star, Action::AddLabel("Boss".to_string())]
        );
        assert_eq!(for_uid(1), vec![Action::Star]);
        assert_eq!(for_uid(3), vec![Action::Star]);
        let propagated = outcome.matches.iter().find(|m| m.uid == Uid(3)).unwrap();
        assert_eq!(propagated.propagated_from, Some(Uid(2)));
    }

    #[test]
    fn test_label_only_action_does_not_propagate() {
        let rules = vec![from_rule("tag", "boss@work.com", Action::AddLabel("Boss".to_string()))];
        let outcome = evaluate(
            vec![
                message(1, Duration::zero(), "From: boss@work.com\r\n", &[], Some("t")),
                message(2, Duration::zero(), "From: me@home.org\r\n", &[], Some("t")),
            ],
            &rules,
        );
        assert_eq!(outcome.actions.len(), 1);
        assert_eq!(outcome.unmatched, vec![Uid(2)]);
    }

    #[test]
    fn test_propagation_skips_already_matched_mates() {
        let rules = vec![
            from_rule("first", "a@x.com", Action::Move("A".to_string())),
            from_rule("second", "b@x.com", Action::Move("B".to_string())),
        ];
        let outcome = evaluate(
            vec![
                message(1, Duration::zero(), "From: a@x.com\r\n", &[], Some("t")),
                message(2, Duration::zero(), "From: b@x.com\r\n", &[], Some("t")),
            ],
            &rules,
        );
        // UID 1 wins first and claims its mate.
        assert_eq!(outcome.matches.len(), 2);
        assert!(outcome.actions.iter().all(|a| a.action == Action::Move("A".to_string())));
    }

    #[test]
    fn test_empty_cc_and_absent_header() {
        let rules = vec![FilterRule {
            cc: Some(AddressFilter::empty()),
            headers: vec![HeaderFilter {
                name: "List-Id".to_string(),
                patterns: Vec::new(),
            }],
            ..FilterRule::new("personal").with_action(Action::Star)
        }];
        let outcome = evaluate(
            vec![
                message(1, Duration::zero(), "To: me@x.com\r\n", &[], None),
                message(2, Duration::zero(), "Cc: you@x.com\r\n", &[], None),
                message(3, Duration::zero(), "List-Id: <l.x.com>\r\n", &[], None),
            ],
            &rules,
        );
        assert_eq!(outcome.unmatched, vec![Uid(2), Uid(3)]);
        assert!(outcome.is_matched(Uid(1)));
    }

    #[test]
    fn test_subject_patterns_are_ored() {
        let rules = vec![FilterRule {
            subject: vec![Glob::new("*invoice*").unwrap(), Glob::new("receipt*").unwrap()],
            ..FilterRule::new("paper").with_action(Action::Move("Paper".to_string()))
        }];
        let outcome = evaluate(
            vec![
                message(1, Duration::zero(), "Subject: Your Invoice #3\r\n", &[], None),
                message(2, Duration::zero(), "Subject: Receipt for order\r\n", &[], None),
                message(3, Duration::zero(), "Subject: hello\r\n", &[], None),
            ],
            &rules,
        );
        assert_eq!(outcome.unmatched, vec![Uid(3)]);
    }

    #[test]
    fn test_no_rules_everything_unmatched() {
        let outcome = evaluate(
            vec![
                message(1, Duration::zero(), "", &[], None),
                message(2, Duration::zero(), "", &[], None),
            ],
            &[],
        );
        assert!(outcome.actions.is_empty());
        assert_eq!(outcome.unmatched, vec![Uid(1), Uid(2)]);
    }
}
