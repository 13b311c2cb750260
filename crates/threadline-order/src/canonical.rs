//! Local thread-order builder.
//!
//! Used when no precomputed order table is available. Builds a parent to
//! children forest from the posts' declared parents and flattens it depth
//! first; siblings (and roots) sort by creation time, then id. The output has
//! the same shape as a fetched [`OrderTable`].
//!
//! A post whose parent is not among the input becomes a root for placement
//! and depth, but its record keeps the declared parent so that callers can
//! still tell it is a reply to something unloaded.
//!
//! Cycles are broken deterministically: chains are walked in chronological
//! order and the first post found to be its own ancestor becomes a root. Each
//! break is reported as a [`CycleDiagnostic`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::Serialize;
use threadline_core::config::DEFAULT_MAX_DEPTH;
use threadline_core::{Config, OrderRecord, OrderTable, PostEntry, PostId};

/// A parent reference dropped to break a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleDiagnostic {
    pub post_id: PostId,
    pub parent_id: PostId,
}

/// Result of [`CanonicalOrderBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct CanonicalOrder {
    /// Input posts in thread order.
    pub posts: Vec<PostEntry>,
    pub table: OrderTable,
    pub cycles: Vec<CycleDiagnostic>,
}

impl CanonicalOrder {
    pub fn ids(&self) -> impl Iterator<Item = PostId> + '_ {
        self.posts.iter().map(|p| p.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalOrderBuilder {
    max_depth: u32,
}

impl Default for CanonicalOrderBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    InProgress,
    Done,
}

impl CanonicalOrderBuilder {
    #[must_use]
    pub const fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(config.max_depth)
    }

    #[must_use]
    pub const fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Order `posts` canonically. Duplicate ids keep their first occurrence.
    #[must_use]
    pub fn build(&self, posts: &[PostEntry]) -> CanonicalOrder {
        let mut index: HashMap<PostId, usize> = HashMap::with_capacity(posts.len());
        let mut unique: Vec<&PostEntry> = Vec::with_capacity(posts.len());
        for post in posts {
            if let Entry::Vacant(slot) = index.entry(post.id) {
                slot.insert(unique.len());
                unique.push(post);
            }
        }

        let chrono_key = |i: usize| {
            let post = unique[i];
            (post.created_at.unwrap_or(i64::MAX), post.id)
        };

        // Declared parent, as recorded in the output table.
        let mut declared: Vec<Option<PostId>> = unique
            .iter()
            .map(|p| if p.is_event() { None } else { p.reply_to })
            .collect();
        let mut cycles = Vec::new();

        // Resolved parent index used for placement.
        let mut parent: Vec<Option<usize>> = Vec::with_capacity(unique.len());
        for (i, post) in unique.iter().enumerate() {
            let resolved = match declared[i] {
                Some(pid) if pid == post.id => {
                    cycles.push(CycleDiagnostic {
                        post_id: post.id,
                        parent_id: pid,
                    });
                    declared[i] = None;
                    None
                }
                Some(pid) => index.get(&pid).copied(),
                None => None,
            };
            parent.push(resolved);
        }

        let mut chronological: Vec<usize> = (0..unique.len()).collect();
        chronological.sort_by_key(|&i| chrono_key(i));

        let mut visit = vec![Visit::New; unique.len()];
        let mut path = Vec::new();
        for &start in &chronological {
            let mut cursor = start;
            while visit[cursor] == Visit::New {
                visit[cursor] = Visit::InProgress;
                path.push(cursor);
                let Some(next) = parent[cursor] else { break };
                match visit[next] {
                    Visit::New => cursor = next,
                    Visit::Done => break,
                    Visit::InProgress => {
                        if let Some(pid) = declared[next] {
                            cycles.push(CycleDiagnostic {
                                post_id: unique[next].id,
                                parent_id: pid,
                            });
                        }
                        parent[next] = None;
                        declared[next] = None;
                        break;
                    }
                }
            }
            for i in path.drain(..) {
                visit[i] = Visit::Done;
            }
        }

        for diagnostic in &cycles {
            tracing::warn!(
                post_id = diagnostic.post_id,
                parent_id = diagnostic.parent_id,
                "parent cycle broken; post treated as root"
            );
        }

        let mut roots = Vec::new();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); unique.len()];
        for &i in &chronological {
            match parent[i] {
                Some(p) => children[p].push(i),
                None => roots.push(i),
            }
        }

        let mut ordered = Vec::with_capacity(unique.len());
        let mut records = Vec::with_capacity(unique.len());
        let mut stack: Vec<(usize, u32)> = roots.iter().rev().map(|&r| (r, 0)).collect();
        while let Some((i, depth)) = stack.pop() {
            let order = i64::try_from(ordered.len()).unwrap_or(i64::MAX);
            records.push((
                unique[i].id,
                OrderRecord::new(order, depth.min(self.max_depth), declared[i]),
            ));
            ordered.push(unique[i].clone());
            stack.extend(children[i].iter().rev().map(|&c| (c, depth.saturating_add(1))));
        }

        CanonicalOrder {
            posts: ordered,
            table: records.into_iter().collect(),
            cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: PostId, at: i64, parent: Option<PostId>) -> PostEntry {
        let post = PostEntry::comment(id, 1).with_created_at(at);
        match parent {
            Some(p) => post.with_reply_to(p),
            None => post,
        }
    }

    fn ids(order: &CanonicalOrder) -> Vec<PostId> {
        order.ids().collect()
    }

    #[test]
    fn replies_follow_their_parents() {
        let posts = [
            post(1, 1, None),
            post(3, 2, None),
            post(2, 3, Some(1)),
            post(4, 4, Some(3)),
            post(5, 5, Some(2)),
        ];
        let built = CanonicalOrderBuilder::default().build(&posts);
        assert_eq!(ids(&built), vec![1, 2, 5, 3, 4]);
        assert!(built.cycles.is_empty());

        let record = built.table.get(5).unwrap();
        assert_eq!(record.depth, 2);
        assert_eq!(record.parent_id, Some(2));
        assert_eq!(record.order, 2);
    }

    #[test]
    fn siblings_sort_by_time_then_id() {
        let posts = [
            post(1, 0, None),
            post(9, 5, Some(1)),
            post(7, 5, Some(1)),
            post(8, 2, Some(1)),
        ];
        let built = CanonicalOrderBuilder::default().build(&posts);
        assert_eq!(ids(&built), vec![1, 8, 7, 9]);
    }

    #[test]
    fn missing_time_sorts_last() {
        let posts = [PostEntry::comment(2, 1), post(3, 10, None)];
        let built = CanonicalOrderBuilder::default().build(&posts);
        assert_eq!(ids(&built), vec![3, 2]);
    }

    #[test]
    fn orphan_is_placed_as_root_but_keeps_declared_parent() {
        let posts = [post(1, 1, None), post(5, 2, Some(99))];
        let built = CanonicalOrderBuilder::default().build(&posts);
        assert_eq!(ids(&built), vec![1, 5]);
        let record = built.table.get(5).unwrap();
        assert_eq!(record.depth, 0);
        assert_eq!(record.parent_id, Some(99));
    }

    #[test]
    fn depth_is_clamped_not_hidden() {
        let posts: Vec<PostEntry> = (1..=6)
            .map(|id| post(id, id, (id > 1).then_some(id - 1)))
            .collect();
        let built = CanonicalOrderBuilder::new(3).build(&posts);
        assert_eq!(built.posts.len(), 6);
        let depths: Vec<u32> = (1..=6).map(|id| built.table.get(id).unwrap().depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 3, 3, 3]);
    }

    #[test]
    fn two_cycle_is_broken_deterministically() {
        let posts = [post(1, 1, Some(2)), post(2, 2, Some(1))];
        let built = CanonicalOrderBuilder::default().build(&posts);
        // Walk starts at the oldest post (1); its ancestor 2 leads back to 1,
        // so 1 is the post whose parent link gets dropped.
        assert_eq!(
            built.cycles,
            vec![CycleDiagnostic {
                post_id: 1,
                parent_id: 2
            }]
        );
        assert_eq!(ids(&built), vec![1, 2]);
        assert_eq!(built.table.get(1).unwrap().parent_id, None);
        assert_eq!(built.table.get(2).unwrap().depth, 1);
    }

    #[test]
    fn self_reply_is_a_cycle() {
        let built = CanonicalOrderBuilder::default().build(&[post(4, 1, Some(4))]);
        assert_eq!(built.cycles.len(), 1);
        assert_eq!(built.table.get(4).unwrap().depth, 0);
    }

    #[test]
    fn cycle_hanging_off_a_tail() {
        // 5 -> 4 -> 3 -> 4
        let posts = [post(3, 1, Some(4)), post(4, 2, Some(3)), post(5, 3, Some(4))];
        let built = CanonicalOrderBuilder::default().build(&posts);
        assert_eq!(built.cycles.len(), 1);
        assert_eq!(built.posts.len(), 3);
        assert_eq!(ids(&built), vec![3, 4, 5]);
    }

    #[test]
    fn events_are_roots() {
        let event = PostEntry::event(2, 1, "discussionLocked")
            .with_created_at(2)
            .with_reply_to(1);
        let built = CanonicalOrderBuilder::default().build(&[post(1, 1, None), event]);
        assert_eq!(built.table.get(2).unwrap().parent_id, None);
        assert_eq!(built.table.get(2).unwrap().depth, 0);
    }

    #[test]
    fn duplicates_keep_first() {
        let built = CanonicalOrderBuilder::default().build(&[post(1, 1, None), post(1, 9, None)]);
        assert_eq!(built.posts.len(), 1);
        assert_eq!(built.posts[0].created_at, Some(1));
    }
}
