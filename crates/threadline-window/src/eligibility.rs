//! Which posts in a run may move.
//!
//! Roots and events always may. A reply with an order record may move only
//! when its parent is in the run and may move itself, so one missing or
//! frozen ancestor freezes the whole subtree below it. A reply without an
//! order record is frozen: its thread position is unknown.

use std::collections::{HashMap, HashSet};

use threadline_core::{OrderTable, PostEntry, PostId};

/// Per-pass eligibility of the posts in a run.
#[derive(Debug, Clone, Default)]
pub struct Eligibility {
    eligible: HashSet<PostId>,
    locked: HashSet<PostId>,
}

impl Eligibility {
    /// Classify `run` against `table`.
    pub fn analyze(run: &[&PostEntry], table: &OrderTable) -> Self {
        let present: HashSet<PostId> = run.iter().map(|p| p.id).collect();
        let mut eligible = HashSet::with_capacity(run.len());
        // (post, parent) pairs still waiting on their parent.
        let mut waiting: Vec<(PostId, PostId)> = Vec::new();

        for post in run {
            if post.is_event() {
                eligible.insert(post.id);
                continue;
            }
            match table.get(post.id) {
                Some(record) => match record.parent_id {
                    None => {
                        eligible.insert(post.id);
                    }
                    Some(parent) if present.contains(&parent) => waiting.push((post.id, parent)),
                    Some(_) => {}
                },
                None if post.reply_to.is_none() => {
                    eligible.insert(post.id);
                }
                None => {}
            }
        }

        // Propagate top-down to a fixed point. Each round settles at least one
        // more level of the forest, so this is bounded by run length x depth.
        loop {
            let before = waiting.len();
            waiting.retain(|(id, parent)| {
                if eligible.contains(parent) {
                    eligible.insert(*id);
                    false
                } else {
                    true
                }
            });
            if waiting.len() == before {
                break;
            }
        }

        let locked = present.difference(&eligible).copied().collect();
        Self { eligible, locked }
    }

    #[must_use]
    pub fn is_eligible(&self, post_id: PostId) -> bool {
        self.eligible.contains(&post_id)
    }

    #[must_use]
    pub fn is_locked(&self, post_id: PostId) -> bool {
        self.locked.contains(&post_id)
    }

    #[must_use]
    pub fn eligible_count(&self) -> usize {
        self.eligible.len()
    }

    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.locked.len()
    }
}

/// Parent used for thread relationships: the order record's parent when the
/// post has one, otherwise the declared reply target. Events have none.
pub(crate) fn thread_parent(
    post_id: PostId,
    table: &OrderTable,
    loaded: &HashMap<PostId, &PostEntry>,
) -> Option<PostId> {
    if let Some(record) = table.get(post_id) {
        return record.parent_id;
    }
    loaded
        .get(&post_id)
        .filter(|p| !p.is_event())
        .and_then(|p| p.reply_to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::OrderRecord;

    fn table(records: &[(PostId, i64, Option<PostId>)]) -> OrderTable {
        records
            .iter()
            .map(|&(id, order, parent)| (id, OrderRecord::new(order, 0, parent)))
            .collect()
    }

    #[test]
    fn roots_and_present_replies_are_eligible() {
        let posts = [
            PostEntry::comment(1, 1),
            PostEntry::comment(3, 1),
            PostEntry::comment(2, 1).with_reply_to(1),
            PostEntry::comment(4, 1).with_reply_to(3),
        ];
        let run: Vec<&PostEntry> = posts.iter().collect();
        let table = table(&[(1, 0, None), (2, 1, Some(1)), (3, 2, None), (4, 3, Some(3))]);
        let e = Eligibility::analyze(&run, &table);
        assert_eq!(e.eligible_count(), 4);
        assert_eq!(e.locked_count(), 0);
    }

    #[test]
    fn missing_parent_freezes_subtree() {
        // 1 is not loaded; 2 replies to 1, 5 replies to 2.
        let posts = [
            PostEntry::comment(3, 1),
            PostEntry::comment(5, 1),
            PostEntry::comment(2, 1),
        ];
        let run: Vec<&PostEntry> = posts.iter().collect();
        let table = table(&[(1, 0, None), (2, 1, Some(1)), (5, 2, Some(2)), (3, 3, None)]);
        let e = Eligibility::analyze(&run, &table);
        assert!(e.is_eligible(3));
        assert!(e.is_locked(2));
        assert!(e.is_locked(5));
    }

    #[test]
    fn deep_chain_in_reverse_run_order_propagates() {
        let posts: Vec<PostEntry> = (1..=6).rev().map(|id| PostEntry::comment(id, 1)).collect();
        let run: Vec<&PostEntry> = posts.iter().collect();
        let records: Vec<(PostId, i64, Option<PostId>)> = (1..=6)
            .map(|id| (id, id, (id > 1).then_some(id - 1)))
            .collect();
        let e = Eligibility::analyze(&run, &table(&records));
        assert_eq!(e.eligible_count(), 6);
    }

    #[test]
    fn events_and_unthreaded_posts_without_records() {
        let posts = [
            PostEntry::event(1, 1, "discussionRenamed").with_reply_to(99),
            PostEntry::comment(2, 1),
            PostEntry::comment(3, 1).with_reply_to(2),
        ];
        let run: Vec<&PostEntry> = posts.iter().collect();
        let e = Eligibility::analyze(&run, &OrderTable::new());
        assert!(e.is_eligible(1), "events always eligible");
        assert!(e.is_eligible(2), "no record and no parent: root");
        assert!(e.is_locked(3), "no record but a parent: unknown order");
    }

    #[test]
    fn cyclic_records_stay_locked() {
        let posts = [PostEntry::comment(1, 1), PostEntry::comment(2, 1)];
        let run: Vec<&PostEntry> = posts.iter().collect();
        let e = Eligibility::analyze(&run, &table(&[(1, 0, Some(2)), (2, 1, Some(1))]));
        assert_eq!(e.locked_count(), 2);
    }

    #[test]
    fn thread_parent_prefers_record() {
        let post = PostEntry::comment(2, 1).with_reply_to(7);
        let loaded = HashMap::from([(2, &post)]);
        assert_eq!(thread_parent(2, &OrderTable::new(), &loaded), Some(7));
        let t = table(&[(2, 0, Some(1))]);
        assert_eq!(thread_parent(2, &t, &loaded), Some(1));
        assert_eq!(thread_parent(8, &t, &loaded), None);
    }
}
