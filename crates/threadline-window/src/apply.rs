//! Applying a planned order to a live window.

use serde::Serialize;
use threadline_core::EntryKey;

use crate::window::Window;

/// Result of applying one target sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    /// Successful moves.
    pub moved: usize,
    /// Moves that failed and were skipped.
    pub failed: usize,
    /// The insertion reference was gone and entries were appended instead.
    pub anchor_fallback: bool,
}

impl ApplyOutcome {
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.moved > 0
    }
}

/// Rearrange `current` (a contiguous run in `window`) into `target`.
///
/// Only the span between the longest common prefix and suffix moves. Each
/// entry in that span is inserted, in target order, before the first entry of
/// the unchanged suffix, or before `anchor` (the entry after the run) when
/// there is no suffix. A reference that is no longer attached degrades to
/// appending at the end of the window. A failed move is logged and skipped.
pub fn apply_order<W: Window + ?Sized>(
    window: &mut W,
    current: &[EntryKey],
    target: &[EntryKey],
    anchor: Option<EntryKey>,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();
    if current == target {
        return outcome;
    }

    let prefix = current
        .iter()
        .zip(target)
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = current.len().min(target.len()) - prefix;
    let suffix = current
        .iter()
        .rev()
        .zip(target.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let middle = &target[prefix..target.len() - suffix];
    let mut reference = if suffix > 0 {
        Some(target[target.len() - suffix])
    } else {
        anchor
    };
    if let Some(key) = reference
        && !window.is_attached(key)
    {
        tracing::debug!(anchor = %key, "reinsertion anchor detached; appending instead");
        outcome.anchor_fallback = true;
        reference = None;
    }

    for &key in middle {
        match window.move_before(key, reference) {
            Ok(()) => outcome.moved += 1,
            Err(e) => {
                outcome.failed += 1;
                tracing::warn!(entry = %key, error = %e, "move failed; skipping entry");
            }
        }
    }
    outcome
}
