//! The viewer-owned window seam.
//!
//! The host list component owns the rendered entries, pagination and scroll
//! anchoring. The engine only reads a snapshot of the entries and moves
//! existing entries with a single relative-insertion primitive.

use threadline_core::{EntryKey, ThreadlineError, ThreadlineResult, WindowEntry};

/// A live, viewer-owned sequence of rendered entries.
pub trait Window {
    /// Snapshot of the entries in display order.
    fn entries(&self) -> Vec<WindowEntry>;

    /// Whether `key` is still part of the window.
    fn is_attached(&self, key: EntryKey) -> bool;

    /// Move the existing entry `key` so it sits immediately before `anchor`,
    /// or at the end of the window when `anchor` is `None`. The entry keeps
    /// its identity; nothing is destroyed or recreated.
    fn move_before(&mut self, key: EntryKey, anchor: Option<EntryKey>) -> ThreadlineResult<()>;

    /// Counter that changes on every structural mutation, moves included.
    fn revision(&self) -> u64;
}

/// In-memory [`Window`] over a `Vec`.
///
/// Used by the CLI, tests and benchmarks, and as a reference for hosts.
#[derive(Debug, Clone, Default)]
pub struct ListWindow {
    entries: Vec<WindowEntry>,
    revision: u64,
    moves: u64,
}

impl ListWindow {
    #[must_use]
    pub fn new(entries: Vec<WindowEntry>) -> Self {
        Self {
            entries,
            revision: 0,
            moves: 0,
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[WindowEntry] {
        &self.entries
    }

    #[must_use]
    pub fn keys(&self) -> Vec<EntryKey> {
        self.entries.iter().map(WindowEntry::key).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of successful [`Window::move_before`] calls.
    #[must_use]
    pub const fn moves(&self) -> u64 {
        self.moves
    }

    /// Append (pagination forward, live update).
    pub fn push(&mut self, entry: impl Into<WindowEntry>) {
        self.entries.push(entry.into());
        self.bump();
    }

    /// Prepend a page of entries, keeping their order.
    pub fn prepend(&mut self, entries: impl IntoIterator<Item = WindowEntry>) {
        let mut page: Vec<WindowEntry> = entries.into_iter().collect();
        if page.is_empty() {
            return;
        }
        page.append(&mut self.entries);
        self.entries = page;
        self.bump();
    }

    pub fn insert(&mut self, index: usize, entry: impl Into<WindowEntry>) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry.into());
        self.bump();
    }

    /// Remove an entry (unload). Returns it if it was present.
    pub fn remove(&mut self, key: EntryKey) -> Option<WindowEntry> {
        let index = self.position(key)?;
        self.bump();
        Some(self.entries.remove(index))
    }

    fn position(&self, key: EntryKey) -> Option<usize> {
        self.entries.iter().position(|e| e.key() == key)
    }

    const fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

impl Window for ListWindow {
    fn entries(&self) -> Vec<WindowEntry> {
        self.entries.clone()
    }

    fn is_attached(&self, key: EntryKey) -> bool {
        self.position(key).is_some()
    }

    fn move_before(&mut self, key: EntryKey, anchor: Option<EntryKey>) -> ThreadlineResult<()> {
        if anchor == Some(key) {
            return Err(ThreadlineError::InvalidArgument(format!(
                "cannot move {key} before itself"
            )));
        }
        let from = self.position(key).ok_or(ThreadlineError::Detached(key))?;
        if let Some(anchor) = anchor
            && !self.is_attached(anchor)
        {
            return Err(ThreadlineError::AnchorDetached(anchor));
        }
        let entry = self.entries.remove(from);
        let to = match anchor {
            Some(anchor) => self
                .position(anchor)
                .ok_or(ThreadlineError::AnchorDetached(anchor))?,
            None => self.entries.len(),
        };
        self.entries.insert(to, entry);
        self.moves += 1;
        self.bump();
        Ok(())
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

impl FromIterator<WindowEntry> for ListWindow {
    fn from_iter<I: IntoIterator<Item = WindowEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
