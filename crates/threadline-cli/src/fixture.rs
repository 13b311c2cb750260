//! Fixture files: a discussion snapshot the engine can be run against offline.
//!
//! ```json
//! {
//!   "discussion_id": 7,
//!   "order": [{"postId": 1, "order": 0, "depth": 0}],
//!   "entries": [
//!     {"type": "placeholder", "key": 0, "kind": "loading_gap"},
//!     {"type": "post", "id": 1, "created_at": "2024-05-01T10:00:00Z"},
//!     {"type": "post", "id": 2, "reply_to": 1, "content_kind": "comment"}
//!   ]
//! }
//! ```
//!
//! `order` is optional; without it the run falls back to the local builder.

use std::path::Path;

use serde::Deserialize;
use threadline_core::{
    ContentKind, DiscussionId, OpaqueKind, OrderRow, PostEntry, PostId, ThreadlineError,
    ThreadlineResult, WindowEntry, iso_to_micros,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub discussion_id: DiscussionId,
    #[serde(default)]
    pub order: Option<Vec<OrderRow>>,
    pub entries: Vec<FixtureEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixtureEntry {
    Post(FixturePost),
    Placeholder {
        key: u64,
        #[serde(default = "default_kind")]
        kind: OpaqueKind,
    },
}

const fn default_kind() -> OpaqueKind {
    OpaqueKind::Other
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixturePost {
    pub id: PostId,
    #[serde(default)]
    pub number: Option<i64>,
    /// ISO-8601 timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub content_kind: ContentKind,
    #[serde(default)]
    pub reply_to: Option<PostId>,
    #[serde(default)]
    pub depth_hint: Option<u32>,
}

impl FixturePost {
    fn into_entry(self, discussion_id: DiscussionId) -> ThreadlineResult<PostEntry> {
        let created_at = match self.created_at.as_deref() {
            Some(raw) => Some(iso_to_micros(raw).ok_or_else(|| {
                ThreadlineError::InvalidArgument(format!(
                    "post {}: malformed created_at {raw:?}",
                    self.id
                ))
            })?),
            None => None,
        };
        Ok(PostEntry {
            id: self.id,
            discussion_id,
            number: self.number,
            created_at,
            content_kind: self.content_kind,
            reply_to: self.reply_to,
            depth_hint: self.depth_hint,
        })
    }
}

impl Fixture {
    pub fn load(path: &Path) -> ThreadlineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> ThreadlineResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Window entries in fixture order, with timestamps converted.
    pub fn window_entries(&self) -> ThreadlineResult<Vec<WindowEntry>> {
        self.entries
            .iter()
            .cloned()
            .map(|entry| match entry {
                FixtureEntry::Post(post) => post.into_entry(self.discussion_id).map(WindowEntry::from),
                FixtureEntry::Placeholder { key, kind } => Ok(WindowEntry::placeholder(key, kind)),
            })
            .collect()
    }

    /// Just the posts, in fixture order.
    pub fn posts(&self) -> ThreadlineResult<Vec<PostEntry>> {
        Ok(self
            .window_entries()?
            .into_iter()
            .filter_map(|entry| match entry {
                WindowEntry::Post(post) => Some(post),
                WindowEntry::Opaque(_) => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "discussion_id": 7,
        "order": [{"postId": 1, "order": 0, "depth": 0}, {"postId": 2, "order": 1, "depth": 1, "parentPostId": 1}],
        "entries": [
            {"type": "placeholder", "key": 0, "kind": "loading_gap"},
            {"type": "post", "id": 2, "reply_to": 1, "created_at": "1970-01-01T00:00:02Z"},
            {"type": "post", "id": 1, "created_at": "1970-01-01T00:00:01Z"},
            {"type": "post", "id": 3, "content_kind": "discussionStickied"},
            {"type": "placeholder", "key": 1}
        ]
    }"#;

    #[test]
    fn parses_entries_and_converts_timestamps() {
        let fixture = Fixture::parse(SAMPLE).unwrap();
        assert_eq!(fixture.discussion_id, 7);
        assert_eq!(fixture.order.as_ref().map(Vec::len), Some(2));

        let entries = fixture.window_entries().unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[4], WindowEntry::placeholder(1, OpaqueKind::Other));

        let posts = fixture.posts().unwrap();
        assert_eq!(posts[0].created_at, Some(2_000_000));
        assert_eq!(posts[0].reply_to, Some(1));
        assert_eq!(posts[0].discussion_id, 7);
        assert!(posts[2].is_event());
    }

    #[test]
    fn order_is_optional() {
        let fixture = Fixture::parse(r#"{"discussion_id": 1, "entries": []}"#).unwrap();
        assert!(fixture.order.is_none());
        assert!(fixture.posts().unwrap().is_empty());
    }

    #[test]
    fn malformed_timestamp_is_an_invalid_argument() {
        let fixture = Fixture::parse(
            r#"{"discussion_id": 1, "entries": [{"type": "post", "id": 4, "created_at": "yesterday"}]}"#,
        )
        .unwrap();
        let err = fixture.window_entries().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        assert!(err.to_string().contains("post 4"));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = Fixture::parse("{").unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
    }
}
