//! Order data for Threadline.
//!
//! - [`OrderCache`]: per-discussion precomputed order tables with single-flight
//!   fetches, TTL, LRU capacity and ready notifications.
//! - [`CanonicalOrderBuilder`]: local thread order from declared parents.
//! - [`DepthResolver`]: depth lookup with fallbacks and cycle protection.

#![forbid(unsafe_code)]

pub mod cache;
pub mod canonical;
pub mod coalesce;
pub mod depth;
pub mod source;

pub use cache::{FetchOutcome, OrderCache, OrderCacheMetricsSnapshot, OrderReady};
pub use canonical::{CanonicalOrder, CanonicalOrderBuilder, CycleDiagnostic};
pub use depth::{DepthResolver, ParentIndex};
pub use source::{NoOrderSource, OrderSource, StaticOrderSource};
