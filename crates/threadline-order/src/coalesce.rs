//! Single-flight bookkeeping for order fetches.
//!
//! At most one fetch per discussion runs at a time. The first caller becomes
//! the leader and performs the request; callers arriving while it runs join
//! the leader's slot and receive a clone of its result. Unlike a general
//! request coalescer, a joiner that times out never issues its own request:
//! it falls back to whatever snapshot the cache already holds.
//!
//! A slot can be *discarded* while in flight (discussion evicted); the leader
//! still wakes its joiners but the cache drops the result.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Slot: shared state between leader and joiners
// ---------------------------------------------------------------------------

enum SlotState<V> {
    /// The leader is still executing.
    Pending,
    /// The leader finished; joiners clone this value.
    Ready(V),
    /// The leader went away without producing a value.
    Abandoned,
}

pub struct Slot<V> {
    state: Mutex<SlotState<V>>,
    done: Condvar,
    discarded: AtomicBool,
}

impl<V: Clone> Slot<V> {
    const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending),
            done: Condvar::new(),
            discarded: AtomicBool::new(false),
        }
    }

    /// Publish the leader's result and wake all joiners.
    pub fn complete(&self, value: &V) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = SlotState::Ready(value.clone());
        drop(state);
        self.done.notify_all();
    }

    /// Wake joiners without a value.
    pub fn abandon(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if matches!(*state, SlotState::Pending) {
            *state = SlotState::Abandoned;
        }
        drop(state);
        self.done.notify_all();
    }

    #[allow(clippy::significant_drop_tightening)] // guard is consumed by wait_timeout_while
    pub fn wait(&self, timeout: Duration) -> Result<V, JoinError> {
        let guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let (guard, wait_result) = self
            .done
            .wait_timeout_while(guard, timeout, |s| matches!(s, SlotState::Pending))
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if wait_result.timed_out() {
            return Err(JoinError::Timeout);
        }
        let result = match &*guard {
            SlotState::Ready(v) => Ok(v.clone()),
            SlotState::Abandoned => Err(JoinError::Abandoned),
            SlotState::Pending => unreachable!("condvar spurious wakeup with timeout"),
        };
        drop(guard);
        result
    }

    pub fn discard(&self) {
        self.discarded.store(true, Ordering::Release);
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Error returned when joining an in-flight fetch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// The join timed out waiting for the leader.
    Timeout,
    /// The leader finished without publishing a value.
    Abandoned,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "fetch join timed out"),
            Self::Abandoned => write!(f, "fetch leader abandoned the request"),
        }
    }
}

impl std::error::Error for JoinError {}

/// Role assigned by [`InflightMap::claim`].
pub enum Role<V> {
    /// This caller must run the fetch and complete the slot.
    Leader(Arc<Slot<V>>),
    /// A fetch is already running; wait on its slot.
    Joiner(Arc<Slot<V>>),
}

// ---------------------------------------------------------------------------
// InflightMap
// ---------------------------------------------------------------------------

/// Map of in-flight fetches keyed by discussion.
pub struct InflightMap<K, V> {
    slots: Mutex<HashMap<K, Arc<Slot<V>>>>,
}

impl<K: Hash + Eq + Clone, V: Clone> Default for InflightMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> InflightMap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Become the leader for `key`, or join the fetch already running.
    pub fn claim(&self, key: &K) -> Role<V> {
        let mut map = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(slot) = map.get(key).map(Arc::clone) {
            drop(map);
            return Role::Joiner(slot);
        }
        let slot = Arc::new(Slot::new());
        map.insert(key.clone(), Arc::clone(&slot));
        drop(map);
        Role::Leader(slot)
    }

    /// The running slot for `key`, if any.
    pub fn get(&self, key: &K) -> Option<Arc<Slot<V>>> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .map(Arc::clone)
    }

    /// Remove `slot` from the map if it is still the registered one.
    pub fn finish(&self, key: &K, slot: &Arc<Slot<V>>) {
        let mut map = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(existing) = map.get(key)
            && Arc::ptr_eq(existing, slot)
        {
            map.remove(key);
        }
    }

    /// Unregister the running slot for `key` and mark it discarded.
    pub fn detach(&self, key: &K) -> bool {
        let removed = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
        removed.is_some_and(|slot| {
            slot.discard();
            true
        })
    }

    /// Unregister and discard every running slot.
    pub fn detach_all(&self) -> usize {
        let drained: Vec<Arc<Slot<V>>> = self
            .slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        for slot in &drained {
            slot.discard();
        }
        drained.len()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of in-flight fetches.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
