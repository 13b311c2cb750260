//! Window reconciliation for Threadline.
//!
//! - [`Window`]: the viewer-owned entry sequence and its move primitive.
//! - [`Reconciler`]: one pass of eligibility analysis, target planning and
//!   minimal application.
//! - [`ReconcileController`]: decides when passes run around pagination,
//!   live updates and order-ready notifications.

#![forbid(unsafe_code)]

pub mod apply;
pub mod controller;
pub mod eligibility;
pub mod plan;
pub mod reconciler;
pub mod window;

pub use apply::{ApplyOutcome, apply_order};
pub use controller::{ControllerState, ReconcileController, RedrawHint, Viewer};
pub use eligibility::Eligibility;
pub use plan::{LAST_RESORT_KEY, RunBounds, TIME_KEY_OFFSET, Target, build_target, isolate_run, sort_key};
pub use reconciler::{DepthChange, PassReport, Reconciler};
pub use window::{ListWindow, Window};
