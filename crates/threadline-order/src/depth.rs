//! Per-post depth lookup.
//!
//! First hit wins:
//! 1. the order table record for the post;
//! 2. a depth hint attached to the post itself;
//! 3. a walk up the declared parent chain over the posts that are loaded.
//!
//! The walk stops at the first ancestor that is not loaded (that ancestor
//! counts as a root) or that has a table record (its depth is added). A
//! revisited post means the chain is cyclic and the depth is 0. Every result
//! is clamped to the configured maximum display depth.

use std::collections::{HashMap, HashSet};

use threadline_core::{Config, OrderTable, PostEntry, PostId};

/// Declared parent of every loaded post.
#[derive(Debug, Clone, Default)]
pub struct ParentIndex {
    parents: HashMap<PostId, Option<PostId>>,
}

impl ParentIndex {
    pub fn from_posts<'a>(posts: impl IntoIterator<Item = &'a PostEntry>) -> Self {
        let mut parents = HashMap::new();
        for post in posts {
            let parent = if post.is_event() { None } else { post.reply_to };
            parents.entry(post.id).or_insert(parent);
        }
        Self { parents }
    }

    /// Declared parent of a loaded post; `None` for roots and unknown posts.
    #[must_use]
    pub fn parent_of(&self, post_id: PostId) -> Option<PostId> {
        self.parents.get(&post_id).copied().flatten()
    }

    #[must_use]
    pub fn contains(&self, post_id: PostId) -> bool {
        self.parents.contains_key(&post_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

pub struct DepthResolver<'a> {
    table: &'a OrderTable,
    parents: &'a ParentIndex,
    max_depth: u32,
    max_hops: u32,
}

impl<'a> DepthResolver<'a> {
    #[must_use]
    pub fn new(table: &'a OrderTable, parents: &'a ParentIndex, config: &Config) -> Self {
        Self::with_limits(table, parents, config.max_depth, config.max_parent_hops)
    }

    #[must_use]
    pub const fn with_limits(
        table: &'a OrderTable,
        parents: &'a ParentIndex,
        max_depth: u32,
        max_hops: u32,
    ) -> Self {
        Self {
            table,
            parents,
            max_depth,
            max_hops,
        }
    }

    /// Depth of `post` in `[0, max_depth]`. Never fails.
    #[must_use]
    pub fn depth_of(&self, post: &PostEntry) -> u32 {
        if let Some(record) = self.table.get(post.id) {
            return record.depth.min(self.max_depth);
        }
        if let Some(hint) = post.depth_hint {
            return hint.min(self.max_depth);
        }
        if post.is_event() {
            return 0;
        }
        self.walk(post.id, post.reply_to).min(self.max_depth)
    }

    fn walk(&self, post_id: PostId, first_parent: Option<PostId>) -> u32 {
        let mut visited = HashSet::from([post_id]);
        let mut depth: u32 = 0;
        let mut cursor = first_parent;

        while let Some(parent) = cursor {
            if let Some(record) = self.table.get(parent) {
                return depth.saturating_add(1).saturating_add(record.depth);
            }
            if !self.parents.contains(parent) {
                break;
            }
            if !visited.insert(parent) {
                tracing::warn!(post_id, parent, "cycle in parent chain; treating post as root");
                return 0;
            }
            depth += 1;
            if depth >= self.max_hops {
                tracing::debug!(post_id, hops = depth, "parent walk hit hop ceiling");
                break;
            }
            cursor = self.parents.parent_of(parent);
        }
        depth
    }
}
