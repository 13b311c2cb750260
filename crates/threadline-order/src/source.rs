//! The order data source seam.
//!
//! The network layer that serves precomputed order tuples lives outside the
//! engine; the cache only needs something that can produce a discussion's
//! rows on request.

use std::collections::HashMap;

use threadline_core::{DiscussionId, OrderRow, ThreadlineResult};

/// Produces the precomputed order rows for one discussion.
///
/// Implementations may block; the cache calls them from whichever thread
/// drives the fetch and never holds a lock across the call.
pub trait OrderSource: Send + Sync {
    fn fetch_order(&self, discussion_id: DiscussionId) -> ThreadlineResult<Vec<OrderRow>>;
}

impl<F> OrderSource for F
where
    F: Fn(DiscussionId) -> ThreadlineResult<Vec<OrderRow>> + Send + Sync,
{
    fn fetch_order(&self, discussion_id: DiscussionId) -> ThreadlineResult<Vec<OrderRow>> {
        self(discussion_id)
    }
}

/// In-memory source serving fixed rows per discussion.
///
/// Unknown discussions yield no rows, which the cache treats as "no data".
#[derive(Debug, Clone, Default)]
pub struct StaticOrderSource {
    rows: HashMap<DiscussionId, Vec<OrderRow>>,
}

impl StaticOrderSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_discussion(mut self, discussion_id: DiscussionId, rows: Vec<OrderRow>) -> Self {
        self.rows.insert(discussion_id, rows);
        self
    }
}

impl OrderSource for StaticOrderSource {
    fn fetch_order(&self, discussion_id: DiscussionId) -> ThreadlineResult<Vec<OrderRow>> {
        Ok(self.rows.get(&discussion_id).cloned().unwrap_or_default())
    }
}

/// Source for hosts without a precomputed order endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOrderSource;

impl OrderSource for NoOrderSource {
    fn fetch_order(&self, _discussion_id: DiscussionId) -> ThreadlineResult<Vec<OrderRow>> {
        Ok(Vec::new())
    }
}
