//! Scheduling of reconciliation passes around the viewer's lifecycle.
//!
//! ```text
//!            will_paginate                     last did_paginate
//!   Active ─────────────────▶ Suspended{pending} ─────────────────▶ Active
//!     │                                                   (one pass if pending)
//!     └──────── destroyed ────────▶ Destroyed
//! ```
//!
//! While `Active`, triggers (creation, mutations, order-ready, invalidation)
//! arm a debounce deadline; the first trigger sets it and later ones inside
//! the window ride along. [`ReconcileController::on_frame`] runs the pass once
//! the deadline has passed and flushes at most one redraw per frame.
//!
//! While `Suspended`, triggers only set `pending`. When the last outstanding
//! pagination settles, a single pass runs immediately if anything happened in
//! between: a pending trigger, or any change of the window's revision.
//!
//! Mutations the controller caused itself are recognised by the window
//! revision recorded after each pass and ignored.
//!
//! All methods take `&mut self`, so two passes can never overlap. Time is
//! passed in by the host's event loop.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use serde::Serialize;
use threadline_core::{Config, DiscussionId};
use threadline_order::{OrderCache, OrderReady};

use crate::reconciler::{DepthChange, PassReport, Reconciler};
use crate::window::Window;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControllerState {
    Active,
    Suspended {
        /// A pass is owed once pagination settles.
        pending: bool,
        /// Outstanding overlapping paginations.
        depth: u32,
    },
    Destroyed,
}

/// Completion signal sent to the viewer after passes that changed something.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedrawHint {
    pub discussion_id: DiscussionId,
    /// The window sequence changed.
    pub reordered: bool,
    /// Posts whose indentation or frozen marker should be refreshed.
    pub changes: Vec<DepthChange>,
}

impl RedrawHint {
    fn merge(&mut self, report: &PassReport) {
        self.reordered |= report.changed;
        let updated: Vec<_> = report.depth_changes.iter().map(|c| c.post_id).collect();
        self.changes.retain(|c| !updated.contains(&c.post_id));
        self.changes.extend_from_slice(&report.depth_changes);
    }
}

/// Receives the completion signal.
pub trait Viewer {
    fn redraw(&mut self, hint: &RedrawHint);
}

impl<F> Viewer for F
where
    F: FnMut(&RedrawHint),
{
    fn redraw(&mut self, hint: &RedrawHint) {
        self(hint);
    }
}

pub struct ReconcileController {
    discussion_id: DiscussionId,
    cache: Arc<OrderCache>,
    ready: Receiver<OrderReady>,
    reconciler: Reconciler,
    state: ControllerState,
    debounce: Duration,
    deadline: Option<Instant>,
    /// Window revision when the outermost pagination began.
    suspended_revision: Option<u64>,
    /// Window revision right after our last pass.
    applied_revision: Option<u64>,
    redraw: Option<RedrawHint>,
    last_report: Option<PassReport>,
}

impl ReconcileController {
    #[must_use]
    pub fn new(discussion_id: DiscussionId, cache: Arc<OrderCache>, config: &Config) -> Self {
        let ready = cache.subscribe();
        Self {
            discussion_id,
            cache,
            ready,
            reconciler: Reconciler::new(config),
            state: ControllerState::Active,
            debounce: config.debounce,
            deadline: None,
            suspended_revision: None,
            applied_revision: None,
            redraw: None,
            last_report: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub const fn discussion_id(&self) -> DiscussionId {
        self.discussion_id
    }

    /// When the next debounced pass is due, if one is scheduled.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub const fn last_report(&self) -> Option<&PassReport> {
        self.last_report.as_ref()
    }

    // -------------------------------------------------------------------------
    // Lifecycle signals
    // -------------------------------------------------------------------------

    /// The window was created.
    pub fn created(&mut self, now: Instant) {
        if self.state == ControllerState::Destroyed {
            return;
        }
        self.request_order(false);
        self.mark_dirty(now + self.debounce);
    }

    /// The viewer observed a structural change.
    pub fn mutated<W: Window + ?Sized>(&mut self, window: &W, now: Instant) {
        if self.applied_revision == Some(window.revision()) {
            tracing::trace!(revision = window.revision(), "ignoring echo of own moves");
            return;
        }
        self.mark_dirty(now + self.debounce);
    }

    /// The viewer is about to fetch a page.
    pub fn will_paginate<W: Window + ?Sized>(&mut self, window: &W) {
        self.state = match self.state {
            ControllerState::Active => {
                self.suspended_revision = Some(window.revision());
                let pending = self.deadline.take().is_some();
                tracing::debug!(discussion_id = self.discussion_id, pending, "reconciler suspended");
                ControllerState::Suspended { pending, depth: 1 }
            }
            ControllerState::Suspended { pending, depth } => ControllerState::Suspended {
                pending,
                depth: depth.saturating_add(1),
            },
            ControllerState::Destroyed => ControllerState::Destroyed,
        };
    }

    /// A page fetch settled (success or failure).
    ///
    /// Runs the single owed pass immediately when the last outstanding
    /// pagination settles and something changed while suspended.
    pub fn did_paginate<W: Window + ?Sized>(&mut self, window: &mut W) -> Option<PassReport> {
        match self.state {
            ControllerState::Suspended { pending, depth } if depth > 1 => {
                self.state = ControllerState::Suspended {
                    pending,
                    depth: depth - 1,
                };
                None
            }
            ControllerState::Suspended { pending, .. } => {
                let changed = pending || self.suspended_revision != Some(window.revision());
                self.state = ControllerState::Active;
                self.suspended_revision = None;
                tracing::debug!(discussion_id = self.discussion_id, changed, "reconciler resumed");
                changed.then(|| self.run_pass(window))
            }
            ControllerState::Active => {
                tracing::debug!("did_paginate without matching will_paginate");
                None
            }
            ControllerState::Destroyed => None,
        }
    }

    /// Order data for this discussion is known to be outdated.
    pub fn order_invalidated(&mut self, now: Instant) {
        if self.state == ControllerState::Destroyed {
            return;
        }
        self.cache.invalidate(self.discussion_id);
        self.request_order(false);
        self.mark_dirty(now + self.debounce);
    }

    /// Run a pass now, unless suspended (then it is owed on resume).
    pub fn force_rebuild<W: Window + ?Sized>(&mut self, window: &mut W) -> Option<PassReport> {
        match self.state {
            ControllerState::Active => {
                self.deadline = None;
                Some(self.run_pass(window))
            }
            ControllerState::Suspended { depth, .. } => {
                self.state = ControllerState::Suspended {
                    pending: true,
                    depth,
                };
                None
            }
            ControllerState::Destroyed => None,
        }
    }

    /// The window is gone. Every later call is a no-op.
    pub fn destroyed(&mut self) {
        self.state = ControllerState::Destroyed;
        self.deadline = None;
        self.redraw = None;
        tracing::debug!(discussion_id = self.discussion_id, "reconciler destroyed");
    }

    /// Move to another discussion: the previous discussion's order data is
    /// evicted and per-pass state starts over.
    pub fn switch_discussion(&mut self, discussion_id: DiscussionId, now: Instant) {
        if discussion_id == self.discussion_id || self.state == ControllerState::Destroyed {
            return;
        }
        self.cache.evict(self.discussion_id);
        tracing::debug!(from = self.discussion_id, to = discussion_id, "switching discussion");
        self.discussion_id = discussion_id;
        self.reconciler.reset();
        self.redraw = None;
        self.applied_revision = None;
        self.request_order(false);
        self.mark_dirty(now + self.debounce);
    }

    // -------------------------------------------------------------------------
    // Frame
    // -------------------------------------------------------------------------

    /// Drive the controller from the host's frame callback.
    ///
    /// Consumes order-ready notifications, runs the debounced pass if it is
    /// due, and delivers at most one redraw.
    pub fn on_frame<W, V>(
        &mut self,
        window: &mut W,
        viewer: &mut V,
        now: Instant,
    ) -> Option<PassReport>
    where
        W: Window + ?Sized,
        V: Viewer + ?Sized,
    {
        if self.state == ControllerState::Destroyed {
            return None;
        }
        let mut ready = false;
        while let Ok(event) = self.ready.try_recv() {
            ready |= event.discussion_id == self.discussion_id;
        }
        if ready {
            tracing::debug!(discussion_id = self.discussion_id, "order ready");
            self.mark_dirty(now);
        }

        let report = match (self.state, self.deadline) {
            (ControllerState::Active, Some(deadline)) if deadline <= now => {
                self.deadline = None;
                Some(self.run_pass(window))
            }
            _ => None,
        };

        if let Some(hint) = self.redraw.take() {
            viewer.redraw(&hint);
        }
        report
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn mark_dirty(&mut self, due: Instant) {
        match &mut self.state {
            ControllerState::Active => {
                if self.deadline.is_none() {
                    self.deadline = Some(due);
                }
            }
            ControllerState::Suspended { pending, .. } => *pending = true,
            ControllerState::Destroyed => {}
        }
    }

    fn run_pass<W: Window + ?Sized>(&mut self, window: &mut W) -> PassReport {
        let table = self.cache.read(self.discussion_id);
        let report = self.reconciler.reconcile(window, &table);
        self.applied_revision = Some(window.revision());

        if report.needs_redraw() {
            self.redraw
                .get_or_insert_with(|| RedrawHint {
                    discussion_id: self.discussion_id,
                    ..RedrawHint::default()
                })
                .merge(&report);
        }
        if !report.missing_order.is_empty()
            && self
                .cache
                .needs_refresh_for(self.discussion_id, report.missing_order.iter().copied())
        {
            tracing::debug!(
                discussion_id = self.discussion_id,
                missing = report.missing_order.len(),
                "requesting order refresh for unknown posts"
            );
            self.request_order(true);
        }
        self.last_report = Some(report.clone());
        report
    }

    fn request_order(&self, force: bool) {
        let id = self.discussion_id;
        if self.cache.is_fetching(id) || (!force && self.cache.is_fresh(id)) {
            return;
        }
        if let Err(e) = self.cache.fetch_in_background(id, force) {
            tracing::warn!(discussion_id = id, error = %e, "could not start order fetch");
        }
    }
}
