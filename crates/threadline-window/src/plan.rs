//! Target-sequence construction for one run of posts.
//!
//! Three stages, each over the output of the previous one:
//!
//! 1. **Base**: timed events are pulled out. Eligible comments are sorted by
//!    [`sort_key`] and written back into the slots eligible comments held;
//!    frozen posts and events without a timestamp keep their slots.
//! 2. **Events**: timed events go back in one at a time, oldest first, before
//!    the first comment created after them.
//! 3. **Cohesion**: every frozen post with a frozen ancestor in the run is
//!    lifted out and re-emitted right after that ancestor, depth first,
//!    siblings by creation time.
//!
//! The stages only ever compare comments that are not cohesion members, and
//! cohesion output depends only on group membership, so planning the result
//! of a plan yields the same sequence again.

use std::collections::{HashMap, HashSet};

use threadline_core::{EntryKey, OrderTable, PostEntry, PostId, WindowEntry};

use crate::eligibility::{Eligibility, thread_parent};

/// Creation-time keys are shifted into this range so they never collide with
/// order values or post numbers.
pub const TIME_KEY_OFFSET: i64 = 1 << 52;

/// Key base for posts with no order, number or timestamp.
pub const LAST_RESORT_KEY: i64 = 1 << 62;

/// Location of the run of posts a pass works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunBounds {
    pub start: usize,
    pub end: usize,
    /// Entry immediately after the run; `None` when the run ends the window.
    pub anchor: Option<EntryKey>,
}

impl RunBounds {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// The longest contiguous run of post entries (the first one on ties).
#[must_use]
pub fn isolate_run(entries: &[WindowEntry]) -> Option<RunBounds> {
    let mut best: Option<(usize, usize)> = None;
    let mut start = None;
    for i in 0..=entries.len() {
        let is_post = entries.get(i).is_some_and(WindowEntry::is_post);
        match (is_post, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if best.is_none_or(|(bs, be)| i - s > be - bs) {
                    best = Some((s, i));
                }
                start = None;
            }
            _ => {}
        }
    }
    best.map(|(start, end)| RunBounds {
        start,
        end,
        anchor: entries.get(end).map(WindowEntry::key),
    })
}

/// Base ordering key: order record, then post number, then creation time,
/// then id.
#[must_use]
pub fn sort_key(post: &PostEntry, table: &OrderTable) -> i64 {
    if let Some(record) = table.get(post.id) {
        return record.order;
    }
    if let Some(number) = post.number {
        return number;
    }
    if let Some(created_at) = post.created_at {
        return TIME_KEY_OFFSET.saturating_add(created_at);
    }
    LAST_RESORT_KEY.saturating_add(post.id)
}

fn chrono_key(post: &PostEntry) -> (i64, PostId) {
    (post.created_at.unwrap_or(i64::MAX), post.id)
}

/// Planned order of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub order: Vec<PostId>,
    /// Timed events placed by creation time.
    pub events: usize,
    /// Frozen posts re-emitted under a frozen ancestor.
    pub members: Vec<PostId>,
}

/// Plan the target order for `run`.
#[must_use]
pub fn build_target(
    run: &[&PostEntry],
    table: &OrderTable,
    eligibility: &Eligibility,
    max_hops: u32,
) -> Target {
    let loaded: HashMap<PostId, &PostEntry> = run.iter().map(|p| (p.id, *p)).collect();
    let groups = cohesion_parents(run, table, eligibility, &loaded, max_hops);

    // Base.
    let (mut timed_events, base): (Vec<&PostEntry>, Vec<&PostEntry>) = run
        .iter()
        .copied()
        .partition(|p| p.is_event() && p.created_at.is_some());
    let movable = |p: &PostEntry| !p.is_event() && eligibility.is_eligible(p.id);
    let mut sorted: Vec<&PostEntry> = base.iter().copied().filter(|&p| movable(p)).collect();
    sorted.sort_by_key(|p| sort_key(p, table));
    let mut sorted = sorted.into_iter();
    let mut seq: Vec<&PostEntry> = base
        .iter()
        .map(|&p| if movable(p) { sorted.next().unwrap_or(p) } else { p })
        .collect();

    // Events.
    timed_events.sort_by_key(|p| chrono_key(p));
    let events = timed_events.len();
    for event in timed_events {
        let at = event.created_at.unwrap_or(i64::MAX);
        let index = seq
            .iter()
            .position(|p| {
                !p.is_event()
                    && !groups.contains_key(&p.id)
                    && p.created_at.is_some_and(|t| t > at)
            })
            .unwrap_or(seq.len());
        seq.insert(index, event);
    }

    // Cohesion.
    if groups.is_empty() {
        return Target {
            order: seq.iter().map(|p| p.id).collect(),
            events,
            members: Vec::new(),
        };
    }
    let mut members: HashMap<PostId, Vec<&PostEntry>> = HashMap::new();
    for post in run {
        if let Some(anchor) = groups.get(&post.id) {
            members.entry(*anchor).or_default().push(*post);
        }
    }
    for list in members.values_mut() {
        list.sort_by_key(|p| chrono_key(p));
    }

    let mut order = Vec::with_capacity(seq.len());
    for post in seq.iter().filter(|p| !groups.contains_key(&p.id)) {
        order.push(post.id);
        let mut stack: Vec<PostId> = members
            .get(&post.id)
            .map(|m| m.iter().rev().map(|p| p.id).collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(m) = members.get(&id) {
                stack.extend(m.iter().rev().map(|p| p.id));
            }
        }
    }

    let mut grouped: Vec<PostId> = groups.into_keys().collect();
    grouped.sort_unstable();
    Target {
        order,
        events,
        members: grouped,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Nearest frozen ancestor in the run for each frozen post that has one.
///
/// The walk climbs through ancestors that are not loaded (using their order
/// records) and stops at the first loaded one. The resulting forest is made
/// acyclic by walking it in creation order and cutting the link that closes
/// a loop.
fn cohesion_parents(
    run: &[&PostEntry],
    table: &OrderTable,
    eligibility: &Eligibility,
    loaded: &HashMap<PostId, &PostEntry>,
    max_hops: u32,
) -> HashMap<PostId, PostId> {
    let mut parents = HashMap::new();
    for post in run.iter().filter(|p| eligibility.is_locked(p.id)) {
        let mut seen = HashSet::from([post.id]);
        let mut cursor = thread_parent(post.id, table, loaded);
        let mut hops = 0u32;
        while let Some(ancestor) = cursor {
            if hops >= max_hops || !seen.insert(ancestor) {
                break;
            }
            hops += 1;
            if loaded.contains_key(&ancestor) {
                if eligibility.is_locked(ancestor) {
                    parents.insert(post.id, ancestor);
                }
                break;
            }
            cursor = table.get(ancestor).and_then(|r| r.parent_id);
        }
    }

    let mut starts: Vec<&PostEntry> = run
        .iter()
        .copied()
        .filter(|p| parents.contains_key(&p.id))
        .collect();
    starts.sort_by_key(|p| chrono_key(p));
    let mut visit: HashMap<PostId, Visit> = HashMap::new();
    let mut path = Vec::new();
    for start in starts {
        let mut cursor = start.id;
        while !visit.contains_key(&cursor) {
            visit.insert(cursor, Visit::InProgress);
            path.push(cursor);
            let Some(next) = parents.get(&cursor).copied() else {
                break;
            };
            match visit.get(&next) {
                None => cursor = next,
                Some(Visit::Done) => break,
                Some(Visit::InProgress) => {
                    tracing::debug!(post_id = next, "cohesion loop cut");
                    parents.remove(&next);
                    break;
                }
            }
        }
        for id in path.drain(..) {
            visit.insert(id, Visit::Done);
        }
    }
    parents
}
