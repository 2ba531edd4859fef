//! Per-URL retry budget tracking.
//!
//! This module provides the [`RetryLedger`], a concurrent mapping from URL
//! to remaining retry count. It is the only shared mutable state in the
//! fetch core: every transport failure for a URL decrements that URL's
//! budget atomically, and once the budget reaches zero the entry is evicted
//! and no further automatic retry occurs for that URL.
//!
//! # Overview
//!
//! The ledger is owned by a [`FetchEngine`](super::FetchEngine) instance and
//! shared (via `Arc`) with any detached fetch tasks the engine spawns. It is
//! never process-global; unrelated engines keep independent budgets.
//!
//! # Example
//!
//! ```
//! use codefetch_core::fetch::{RetryDecision, RetryLedger};
//!
//! let ledger = RetryLedger::new();
//! ledger.ensure("https://example.com/code.jpg", 2);
//!
//! // First failure leaves one retry in the budget.
//! assert_eq!(
//!     ledger.decrement_and_check("https://example.com/code.jpg"),
//!     RetryDecision::Retry { remaining: 1 }
//! );
//!
//! // Second failure exhausts the budget and evicts the entry.
//! assert_eq!(
//!     ledger.decrement_and_check("https://example.com/code.jpg"),
//!     RetryDecision::Exhausted
//! );
//! assert_eq!(ledger.remaining("https://example.com/code.jpg"), None);
//! ```

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

/// Outcome of consuming one retry from a URL's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Budget remains; the caller should re-attempt the fetch.
    Retry {
        /// Retries left after this decrement.
        remaining: u32,
    },

    /// Budget is exhausted (or was never present); the entry has been
    /// evicted and the caller must surface the failure.
    Exhausted,
}

/// Concurrent per-URL retry budget map.
///
/// Backed by a [`DashMap`] so concurrent fetches can consult and mutate
/// budgets without an outer lock. Both operations go through the entry API,
/// which holds the shard lock for the full read-modify-write: no two
/// concurrent decrements can observe the same pre-decrement value, and a
/// losing concurrent insert is discarded rather than merged.
#[derive(Debug, Default)]
pub struct RetryLedger {
    budgets: DashMap<String, u32>,
}

impl RetryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a retry budget for `url` if none is present.
    ///
    /// A no-op when the URL already has an entry (first-writer-wins), so an
    /// in-flight retry chain keeps its remaining budget even if another call
    /// starts for the same URL with a different `initial`.
    pub fn ensure(&self, url: &str, initial: u32) {
        if let Entry::Vacant(slot) = self.budgets.entry(url.to_string()) {
            debug!(url, initial, "installing retry budget");
            slot.insert(initial);
        }
    }

    /// Atomically consumes one retry from the budget for `url`.
    ///
    /// Decrements the remaining count; if the decremented value reaches
    /// zero the entry is removed and [`RetryDecision::Exhausted`] is
    /// returned, otherwise the new value is stored and returned in
    /// [`RetryDecision::Retry`]. A URL with no entry (already exhausted by
    /// a concurrent chain, or never registered) is `Exhausted`.
    pub fn decrement_and_check(&self, url: &str) -> RetryDecision {
        match self.budgets.entry(url.to_string()) {
            Entry::Occupied(mut slot) => {
                let remaining = slot.get().saturating_sub(1);
                if remaining == 0 {
                    slot.remove();
                    debug!(url, "retry budget exhausted, entry evicted");
                    RetryDecision::Exhausted
                } else {
                    *slot.get_mut() = remaining;
                    RetryDecision::Retry { remaining }
                }
            }
            Entry::Vacant(_) => RetryDecision::Exhausted,
        }
    }

    /// Returns the remaining budget for `url`, or `None` if no entry exists.
    #[must_use]
    pub fn remaining(&self, url: &str) -> Option<u32> {
        self.budgets.get(url).map(|entry| *entry.value())
    }

    /// Returns the number of URLs currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.budgets.len()
    }

    /// Returns true when no URL is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.budgets.is_empty()
    }
}
