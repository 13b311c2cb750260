//! Data model shared by the order and window crates.
//!
//! All timestamps are `i64` microseconds since the Unix epoch (see
//! [`crate::timestamps`]).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a single post.
pub type PostId = i64;

/// Identifier of a discussion (the unit the order cache is keyed by).
pub type DiscussionId = i64;

// =============================================================================
// OrderRecord / OrderRow / OrderTable
// =============================================================================

/// Precomputed thread placement of one post.
///
/// `parent_id == None` denotes a thread root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order: i64,
    pub depth: u32,
    pub parent_id: Option<PostId>,
}

impl OrderRecord {
    #[must_use]
    pub const fn new(order: i64, depth: u32, parent_id: Option<PostId>) -> Self {
        Self {
            order,
            depth,
            parent_id,
        }
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Wire shape of one order tuple as served by the order data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRow {
    pub post_id: PostId,
    pub order: i64,
    pub depth: i64,
    #[serde(default)]
    pub parent_post_id: Option<PostId>,
}

impl OrderRow {
    /// Validate the row and convert it into a keyed [`OrderRecord`].
    pub fn into_record(self) -> Result<(PostId, OrderRecord)> {
        if self.parent_post_id == Some(self.post_id) {
            return Err(Error::invalid_row(
                self.post_id,
                "post cannot be its own parent",
            ));
        }
        let depth = u32::try_from(self.depth)
            .map_err(|_| Error::invalid_row(self.post_id, format!("depth {}", self.depth)))?;
        Ok((
            self.post_id,
            OrderRecord::new(self.order, depth, self.parent_post_id),
        ))
    }
}

/// Immutable `post id -> OrderRecord` snapshot for one discussion.
///
/// Tables are never mutated after construction; a refresh builds a new table
/// and swaps it in wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderTable {
    records: HashMap<PostId, OrderRecord>,
}

impl OrderTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from wire rows. Invalid rows are skipped with a warning.
    pub fn from_rows(rows: impl IntoIterator<Item = OrderRow>) -> Self {
        let mut records = HashMap::new();
        for row in rows {
            match row.into_record() {
                Ok((id, record)) => {
                    records.insert(id, record);
                }
                Err(e) => tracing::warn!(error = %e, "skipping order row"),
            }
        }
        Self { records }
    }

    #[must_use]
    pub fn get(&self, post_id: PostId) -> Option<&OrderRecord> {
        self.records.get(&post_id)
    }

    #[must_use]
    pub fn contains(&self, post_id: PostId) -> bool {
        self.records.contains_key(&post_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PostId, &OrderRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    /// Ids from `ids` that have no record, in input order.
    pub fn missing(&self, ids: impl IntoIterator<Item = PostId>) -> Vec<PostId> {
        ids.into_iter().filter(|id| !self.contains(*id)).collect()
    }

    /// Wire rows sorted by `order`, then post id.
    #[must_use]
    pub fn to_rows(&self) -> Vec<OrderRow> {
        let mut rows: Vec<OrderRow> = self
            .records
            .iter()
            .map(|(id, r)| OrderRow {
                post_id: *id,
                order: r.order,
                depth: i64::from(r.depth),
                parent_post_id: r.parent_id,
            })
            .collect();
        rows.sort_by_key(|r| (r.order, r.post_id));
        rows
    }
}

impl FromIterator<(PostId, OrderRecord)> for OrderTable {
    fn from_iter<I: IntoIterator<Item = (PostId, OrderRecord)>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// Content kind
// =============================================================================

/// What a post carries.
///
/// Anything other than a plain comment is an *event* (renames, stickies,
/// moderation notices): positioned by time, never by thread relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentKind {
    #[default]
    Comment,
    Event(String),
}

impl ContentKind {
    #[must_use]
    pub const fn is_event(&self) -> bool {
        matches!(self, Self::Event(_))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Comment => "comment",
            Self::Event(kind) => kind,
        }
    }
}

impl From<String> for ContentKind {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("comment") {
            Self::Comment
        } else {
            Self::Event(value)
        }
    }
}

impl From<&str> for ContentKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ContentKind> for String {
    fn from(value: ContentKind) -> Self {
        match value {
            ContentKind::Comment => "comment".to_string(),
            ContentKind::Event(kind) => kind,
        }
    }
}

// =============================================================================
// Window entries
// =============================================================================

/// A rendered post in the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEntry {
    pub id: PostId,
    pub discussion_id: DiscussionId,
    /// Position number within the discussion, when the viewer knows it.
    #[serde(default)]
    pub number: Option<i64>,
    /// Microseconds since Unix epoch.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub content_kind: ContentKind,
    /// Declared parent reference (extracted upstream from the post body).
    #[serde(default)]
    pub reply_to: Option<PostId>,
    /// Locally attached precomputed depth, if any.
    #[serde(default)]
    pub depth_hint: Option<u32>,
}

impl PostEntry {
    /// A plain comment with no number, time or parent.
    #[must_use]
    pub const fn comment(id: PostId, discussion_id: DiscussionId) -> Self {
        Self {
            id,
            discussion_id,
            number: None,
            created_at: None,
            content_kind: ContentKind::Comment,
            reply_to: None,
            depth_hint: None,
        }
    }

    /// An event post of the given kind.
    #[must_use]
    pub fn event(id: PostId, discussion_id: DiscussionId, kind: impl Into<String>) -> Self {
        Self {
            content_kind: ContentKind::Event(kind.into()),
            ..Self::comment(id, discussion_id)
        }
    }

    #[must_use]
    pub const fn with_number(mut self, number: i64) -> Self {
        self.number = Some(number);
        self
    }

    #[must_use]
    pub const fn with_created_at(mut self, micros: i64) -> Self {
        self.created_at = Some(micros);
        self
    }

    #[must_use]
    pub const fn with_reply_to(mut self, parent: PostId) -> Self {
        self.reply_to = Some(parent);
        self
    }

    #[must_use]
    pub const fn with_depth_hint(mut self, depth: u32) -> Self {
        self.depth_hint = Some(depth);
        self
    }

    #[must_use]
    pub const fn is_event(&self) -> bool {
        self.content_kind.is_event()
    }
}

/// Kind of a non-post placeholder in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpaqueKind {
    LoadingGap,
    Composer,
    TypingIndicator,
    Other,
}

/// A placeholder entry: no post identity, never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpaqueEntry {
    pub key: u64,
    pub kind: OpaqueKind,
}

/// Stable identity of a window entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKey {
    Post(PostId),
    Opaque(u64),
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post(id) => write!(f, "post#{id}"),
            Self::Opaque(key) => write!(f, "placeholder#{key}"),
        }
    }
}

/// One element of the viewer's window, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowEntry {
    Post(PostEntry),
    Opaque(OpaqueEntry),
}

impl WindowEntry {
    #[must_use]
    pub const fn key(&self) -> EntryKey {
        match self {
            Self::Post(post) => EntryKey::Post(post.id),
            Self::Opaque(opaque) => EntryKey::Opaque(opaque.key),
        }
    }

    #[must_use]
    pub const fn as_post(&self) -> Option<&PostEntry> {
        match self {
            Self::Post(post) => Some(post),
            Self::Opaque(_) => None,
        }
    }

    #[must_use]
    pub const fn is_post(&self) -> bool {
        matches!(self, Self::Post(_))
    }

    #[must_use]
    pub const fn placeholder(key: u64, kind: OpaqueKind) -> Self {
        Self::Opaque(OpaqueEntry { key, kind })
    }
}

impl From<PostEntry> for WindowEntry {
    fn from(post: PostEntry) -> Self {
        Self::Post(post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_row_rejects_negative_depth_and_self_parent() {
        let row = OrderRow {
            post_id: 4,
            order: 1,
            depth: -1,
            parent_post_id: None,
        };
        assert_eq!(row.into_record().unwrap_err().error_code(), "INVALID_ORDER_ROW");

        let row = OrderRow {
            post_id: 4,
            order: 1,
            depth: 1,
            parent_post_id: Some(4),
        };
        assert!(row.into_record().is_err());
    }

    #[test]
    fn table_from_rows_skips_invalid() {
        let table = OrderTable::from_rows([
            OrderRow {
                post_id: 1,
                order: 0,
                depth: 0,
                parent_post_id: None,
            },
            OrderRow {
                post_id: 2,
                order: 1,
                depth: -3,
                parent_post_id: Some(1),
            },
        ]);
        assert_eq!(table.len(), 1);
        assert!(table.contains(1));
        assert!(!table.contains(2));
        assert_eq!(table.missing([1, 2, 3]), vec![2, 3]);
    }

    #[test]
    fn to_rows_is_sorted_by_order() {
        let table: OrderTable = [
            (9, OrderRecord::new(2, 1, Some(7))),
            (7, OrderRecord::new(0, 0, None)),
            (8, OrderRecord::new(1, 0, None)),
        ]
        .into_iter()
        .collect();
        let ids: Vec<PostId> = table.to_rows().iter().map(|r| r.post_id).collect();
        assert_eq!(ids, vec![7, 8, 9]);
    }

    #[test]
    fn order_row_wire_format_is_camel_case() {
        let row: OrderRow =
            serde_json::from_str(r#"{"postId":5,"order":3,"depth":1,"parentPostId":2}"#).unwrap();
        assert_eq!(row.parent_post_id, Some(2));
        let root: OrderRow = serde_json::from_str(r#"{"postId":1,"order":0,"depth":0}"#).unwrap();
        assert_eq!(root.parent_post_id, None);
    }

    #[test]
    fn content_kind_classification() {
        assert_eq!(ContentKind::from("comment"), ContentKind::Comment);
        assert_eq!(ContentKind::from("Comment"), ContentKind::Comment);
        let kind = ContentKind::from("discussionStickied");
        assert!(kind.is_event());
        assert_eq!(kind.as_str(), "discussionStickied");
        assert_eq!(String::from(kind), "discussionStickied");
    }

    #[test]
    fn window_entry_serde_tagging() {
        let json = r#"[
            {"type":"post","id":3,"discussion_id":1,"content_kind":"comment"},
            {"type":"opaque","key":9,"kind":"loading_gap"}
        ]"#;
        let entries: Vec<WindowEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].key(), EntryKey::Post(3));
        assert_eq!(entries[1].key(), EntryKey::Opaque(9));
        assert!(entries[0].is_post());
        assert!(entries[1].as_post().is_none());
    }

    #[test]
    fn post_builders() {
        let post = PostEntry::comment(5, 1)
            .with_number(3)
            .with_created_at(1_000)
            .with_reply_to(2)
            .with_depth_hint(1);
        assert_eq!(post.number, Some(3));
        assert_eq!(post.reply_to, Some(2));
        assert!(!post.is_event());
        assert!(PostEntry::event(6, 1, "discussionRenamed").is_event());
    }
}
