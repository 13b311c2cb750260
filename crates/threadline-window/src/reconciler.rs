//! One reconciliation pass over a window.
//!
//! A pass snapshots the window, isolates the run of posts it will touch,
//! classifies the run, plans a target order and applies it. Every failure
//! mode degrades instead of surfacing: no order data means only roots and
//! events move, failed moves are skipped, a detached anchor means append.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use threadline_core::{Config, EntryKey, OrderTable, PostEntry, PostId, WindowEntry};
use threadline_order::{CanonicalOrder, CanonicalOrderBuilder, DepthResolver, ParentIndex};

use crate::apply::apply_order;
use crate::eligibility::Eligibility;
use crate::plan::{build_target, isolate_run};
use crate::window::Window;

/// A post whose depth or frozen/movable classification changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepthChange {
    pub post_id: PostId,
    pub depth: u32,
    pub locked: bool,
}

/// What a pass saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Reconciliation is switched off; nothing was inspected.
    pub disabled: bool,
    pub run_len: usize,
    pub eligible: usize,
    pub locked: usize,
    /// Timed events placed by creation time.
    pub events: usize,
    /// Frozen posts kept next to a frozen ancestor.
    pub grouped: usize,
    /// The window sequence changed.
    pub changed: bool,
    pub moved: usize,
    pub failed_moves: usize,
    pub anchor_fallback: bool,
    /// The order came from the local builder rather than a fetched table.
    pub local_order: bool,
    pub cycles: usize,
    pub depth_changes: Vec<DepthChange>,
    /// Non-event posts in the run without a fetched order record.
    pub missing_order: Vec<PostId>,
}

impl PassReport {
    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        self.changed || !self.depth_changes.is_empty()
    }
}

/// Reconciles a window against order data.
///
/// Holds only the previous pass's depth classification; everything else is
/// recomputed from the snapshot each pass.
#[derive(Debug, Clone)]
pub struct Reconciler {
    enabled: bool,
    local_fallback: bool,
    max_depth: u32,
    max_hops: u32,
    builder: CanonicalOrderBuilder,
    classes: HashMap<PostId, (u32, bool)>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.enabled,
            local_fallback: config.local_fallback,
            max_depth: config.max_depth,
            max_hops: config.max_parent_hops,
            builder: CanonicalOrderBuilder::from_config(config),
            classes: HashMap::new(),
        }
    }

    /// Forget the previous classification (discussion switch).
    pub fn reset(&mut self) {
        self.classes.clear();
    }

    pub fn reconcile<W: Window + ?Sized>(
        &mut self,
        window: &mut W,
        table: &OrderTable,
    ) -> PassReport {
        let mut report = PassReport::default();
        if !self.enabled {
            report.disabled = true;
            return report;
        }

        let entries = window.entries();
        let Some(bounds) = isolate_run(&entries) else {
            tracing::debug!("no post run in window");
            return report;
        };
        let run: Vec<&PostEntry> = entries[bounds.start..bounds.end]
            .iter()
            .filter_map(WindowEntry::as_post)
            .collect();
        report.run_len = run.len();

        let mut seen = HashSet::with_capacity(run.len());
        if let Some(dup) = run.iter().find(|p| !seen.insert(p.id)) {
            tracing::warn!(post_id = dup.id, "duplicate post in window; skipping pass");
            return report;
        }

        report.missing_order = run
            .iter()
            .filter(|p| !p.is_event() && !table.contains(p.id))
            .map(|p| p.id)
            .collect();

        let local: Option<CanonicalOrder> = (table.is_empty() && self.local_fallback).then(|| {
            let posts: Vec<PostEntry> = run.iter().map(|p| (*p).clone()).collect();
            self.builder.build(&posts)
        });
        let effective = local.as_ref().map_or(table, |built| &built.table);
        if let Some(built) = &local {
            report.local_order = true;
            report.cycles = built.cycles.len();
        }

        let eligibility = Eligibility::analyze(&run, effective);
        report.eligible = eligibility.eligible_count();
        report.locked = eligibility.locked_count();

        let target = build_target(&run, effective, &eligibility, self.max_hops);
        report.events = target.events;
        report.grouped = target.members.len();

        let current: Vec<EntryKey> = run.iter().map(|p| EntryKey::Post(p.id)).collect();
        let wanted: Vec<EntryKey> = target.order.iter().map(|&id| EntryKey::Post(id)).collect();
        let outcome = apply_order(window, &current, &wanted, bounds.anchor);
        report.changed = outcome.changed();
        report.moved = outcome.moved;
        report.failed_moves = outcome.failed;
        report.anchor_fallback = outcome.anchor_fallback;

        let parents = ParentIndex::from_posts(entries.iter().filter_map(WindowEntry::as_post));
        let resolver = DepthResolver::with_limits(effective, &parents, self.max_depth, self.max_hops);
        let mut classes = HashMap::with_capacity(run.len());
        for post in &run {
            let class = (resolver.depth_of(post), eligibility.is_locked(post.id));
            if self.classes.get(&post.id) != Some(&class) {
                report.depth_changes.push(DepthChange {
                    post_id: post.id,
                    depth: class.0,
                    locked: class.1,
                });
            }
            classes.insert(post.id, class);
        }
        self.classes = classes;

        tracing::debug!(
            run_len = report.run_len,
            eligible = report.eligible,
            locked = report.locked,
            moved = report.moved,
            failed = report.failed_moves,
            local_order = report.local_order,
            "reconciliation pass"
        );
        report
    }
}
