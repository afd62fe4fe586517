//! Conversation grouping.
//!
//! Messages carrying a server thread id are grouped by it. The remaining
//! messages are linked through their `References`/`In-Reply-To` chains and
//! grouped by connected component. Anything unrelated ends up alone.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::message::{Message, Snapshot, Uid};

/// One conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    /// Thread identifier, unique within a [`ThreadMap`].
    pub id: String,
    /// Members, oldest first (ties broken by uid).
    pub members: Vec<Uid>,
}

impl Thread {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the thread has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns true if `uid` belongs to this thread.
    #[must_use]
    pub fn contains(&self, uid: Uid) -> bool {
        self.members.contains(&uid)
    }
}

/// Partition of a [`Snapshot`] into threads.
///
/// Every message of the snapshot belongs to exactly one thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadMap {
    threads: BTreeMap<String, Thread>,
    index: HashMap<Uid, String>,
}

impl ThreadMap {
    /// Groups every message of `snapshot`.
    #[must_use]
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut map = Self::default();

        let mut by_server_id: BTreeMap<&str, Vec<&Message>> = BTreeMap::new();
        let mut unthreaded = Vec::new();
        for message in snapshot.iter() {
            match message.thread_id.as_deref() {
                Some(id) => by_server_id.entry(id).or_default().push(message),
                None => unthreaded.push(message),
            }
        }

        for (id, members) in by_server_id {
            map.insert(format!("gm:{id}"), members);
        }

        for component in reference_components(&unthreaded) {
            let Some(oldest) = component
                .iter()
                .min_by_key(|m| (m.internal_date, m.uid))
                .copied()
            else {
                continue;
            };
            let id = match &oldest.message_id {
                Some(msgid) if !map.threads.contains_key(&format!("ref:{msgid}")) => {
                    format!("ref:{msgid}")
                }
                _ => format!("uid:{}", oldest.uid),
            };
            map.insert(id, component);
        }

        debug!(
            "Grouped {} messages into {} threads",
            snapshot.len(),
            map.threads.len()
        );
        map
    }

    fn insert(&mut self, id: String, mut members: Vec<&Message>) {
        members.sort_by_key(|m| (m.internal_date, m.uid));
        for m in &members {
            let previous = self.index.insert(m.uid, id.clone());
            debug_assert!(previous.is_none(), "message {} in two threads", m.uid);
        }
        self.threads.insert(
            id.clone(),
            Thread {
                id,
                members: members.iter().map(|m| m.uid).collect(),
            },
        );
    }

    /// Thread containing `uid`.
    #[must_use]
    pub fn thread_of(&self, uid: Uid) -> Option<&Thread> {
        self.index.get(&uid).and_then(|id| self.threads.get(id))
    }

    /// Members of the thread containing `uid`, or an empty slice if unknown.
    #[must_use]
    pub fn members(&self, uid: Uid) -> &[Uid] {
        self.thread_of(uid).map_or(&[], |t| t.members.as_slice())
    }

    /// Looks up a thread by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Thread> {
        self.threads.get(id)
    }

    /// Iterates threads ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    /// Number of threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Returns true if there are no threads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

/// Connected components of the "references" relation, each in discovery
/// order. Components are discovered in the order of `messages`.
fn reference_components<'a>(messages: &[&'a Message]) -> Vec<Vec<&'a Message>> {
    let mut by_msgid: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, m) in messages.iter().enumerate() {
        if let Some(id) = m.message_id.as_deref() {
            by_msgid.entry(id).or_default().push(i);
        }
    }

    let mut adjacency: Vec<HashSet<usize>> = vec![HashSet::new(); messages.len()];
    for (i, m) in messages.iter().enumerate() {
        for reference in &m.references {
            for &j in by_msgid.get(reference.as_str()).into_iter().flatten() {
                if i != j {
                    adjacency[i].insert(j);
                    adjacency[j].insert(i);
                }
            }
        }
    }

    let mut visited = vec![false; messages.len()];
    let mut components = Vec::new();
    for start in 0..messages.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut component = Vec::new();
        while let Some(i) = queue.pop_front() {
            component.push(messages[i]);
            let mut next: Vec<usize> = adjacency[i].iter().copied().collect();
            next.sort_unstable();
            for j in next {
                if !visited[j] {
                    visited[j] = true;
                    queue.push_back(j);
                }
            }
        }
        components.push(component);
    }
    components
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
    use crate::label::Labels;
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T10:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn msg(uid: u32, days: i64, headers: &str, thread_id: Option<&str>) -> Message {
        Message::new(
            Uid(uid),
            headers.as_bytes(),
            Labels::new(),
            base() + Duration::days(days),
            thread_id.map(str::to_string),
        )
    }

    #[test]
    fn test_groups_by_server_thread_id() {
        let snapshot = Snapshot::new([
            msg(1, 0, "", Some("100")),
            msg(2, 1, "", Some("100")),
            msg(3, 2, "", Some("200")),
        ]);
        let map = ThreadMap::build(&snapshot);

        assert_eq!(map.len(), 2);
        assert_eq!(map.members(Uid(1)), &[Uid(1), Uid(2)]);
        assert_eq!(map.thread_of(Uid(3)).unwrap().id, "gm:200");
    }

    #[test]
    fn test_server_id_ignores_references() {
        let snapshot = Snapshot::new([
            msg(1, 0, "Message-ID: <a@x>\r\n", Some("100")),
            msg(2, 1, "References: <a@x>\r\n", Some("200")),
        ]);
        let map = ThreadMap::build(&snapshot);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_groups_by_reference_chain() {
        let snapshot = Snapshot::new([
            msg(3, 2, "Message-ID: <c@x>\r\nReferences: <a@x> <b@x>\r\n", None),
            msg(1, 0, "Message-ID: <a@x>\r\n", None),
            msg(2, 1, "Message-ID: <b@x>\r\nIn-Reply-To: <a@x>\r\n", None),
            msg(4, 0, "Message-ID: <d@x>\r\n", None),
        ]);
        let map = ThreadMap::build(&snapshot);

        assert_eq!(map.len(), 2);
        let thread = map.thread_of(Uid(3)).unwrap();
        assert_eq!(thread.id, "ref:<a@x>");
        assert_eq!(thread.members, vec![Uid(1), Uid(2), Uid(3)]);
        assert_eq!(map.members(Uid(4)), &[Uid(4)]);
    }

    #[test]
    fn test_transitive_link_through_common_parent() {
        // Two replies to the same root are linked through it.
        let snapshot = Snapshot::new([
            msg(1, 0, "Message-ID: <root@x>\r\n", None),
            msg(2, 1, "Message-ID: <r1@x>\r\nIn-Reply-To: <root@x>\r\n", None),
            msg(3, 1, "Message-ID: <r2@x>\r\nIn-Reply-To: <root@x>\r\n", None),
        ]);
        let map = ThreadMap::build(&snapshot);
        assert_eq!(map.len(), 1);
        assert_eq!(map.members(Uid(1)), &[Uid(1), Uid(2), Uid(3)]);
    }

    #[test]
    fn test_missing_parent_leaves_singletons() {
        let snapshot = Snapshot::new([
            msg(1, 0, "Message-ID: <a@x>\r\nReferences: <gone@x>\r\n", None),
            msg(2, 0, "References: garbage\r\n", None),
        ]);
        let map = ThreadMap::build(&snapshot);
        assert_eq!(map.len(), 2);
        assert_eq!(map.thread_of(Uid(2)).unwrap().id, "uid:2");
    }

    #[test]
    fn test_ties_broken_by_uid() {
        let snapshot = Snapshot::new([
            msg(9, 0, "", Some("t")),
            msg(4, 0, "", Some("t")),
            msg(6, -1, "", Some("t")),
        ]);
        let map = ThreadMap::build(&snapshot);
        assert_eq!(map.members(Uid(9)), &[Uid(6), Uid(4), Uid(9)]);
    }

    #[test]
    fn test_duplicate_message_ids_keep_unique_thread_ids() {
        let snapshot = Snapshot::new([
            msg(1, 0, "Message-ID: <same@x>\r\n", None),
            msg(2, 1, "Message-ID: <same@x>\r\n", None),
        ]);
        let map = ThreadMap::build(&snapshot);
        assert_eq!(map.len(), 2);
        assert!(map.get("ref:<same@x>").is_some());
        assert!(map.get("uid:2").is_some());
    }

    #[test]
    fn test_empty_snapshot() {
        let map = ThreadMap::build(&Snapshot::default());
        assert!(map.is_empty());
        assert!(map.members(Uid(1)).is_empty());
    }

    fn arb_message() -> impl Strategy<Value = (u32, i64, Option<u8>, Option<u8>, Option<u8>)> {
        (
            1u32..40,
            0i64..10,
            proptest::option::of(0u8..6),
            proptest::option::of(0u8..12),
            proptest::option::of(0u8..12),
        )
    }

    proptest! {
        #[test]
        fn prop_partition_is_disjoint_and_exhaustive(
            specs in proptest::collection::vec(arb_message(), 0..30)
        ) {
            let messages = specs.iter().map(|(uid, days, thread, id, parent)| {
                let mut headers = String::new();
                if let Some(id) = id {
                    headers.push_str(&format!("Message-ID: <m{id}@x>\r\n"));
                }
                if let Some(parent) = parent {
                    headers.push_str(&format!("In-Reply-To: <m{parent}@x>\r\n"));
                }
                msg(*uid, *days, &headers, thread.map(|t| t.to_string()).as_deref())
            });
            let snapshot = Snapshot::new(messages);
            let map = ThreadMap::build(&snapshot);

            let mut seen = HashSet::new();
            for thread in map.iter() {
                prop_assert!(!thread.is_empty());
                for uid in &thread.members {
                    prop_assert!(seen.insert(*uid));
                    prop_assert_eq!(&map.thread_of(*uid).unwrap().id, &thread.id);
                }
            }
            prop_assert_eq!(seen.len(), snapshot.len());
        }
    }
}
