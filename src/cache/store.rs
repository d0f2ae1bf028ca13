//! Cache state: entries, statuses, pending fetches, and the version counter
//!
//! `CacheState` is the single encapsulated owner of all mutable cache
//! state. Nothing outside this module touches its fields; every read and
//! write goes through its methods, under the one lock `DataCache` holds
//! around it. That funneling is what makes store mutations atomic with
//! respect to each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, Shared};
use serde_json::Value;

use super::FetchError;

/// Shared handle to one in-flight fetch's eventual outcome
///
/// Every caller that arrives before resolution awaits a clone of the same
/// future, so success or failure fans out without a second transport call.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Value>, FetchError>>>;

/// Per-key fetch status, tracked independently of entry presence
///
/// A key can be `Loading` with no prior entry, or `Success` while a stale
/// entry is being refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// No fetch has been attempted since the key was last (in)validated
    Idle,
    /// A fetch is in flight
    Loading,
    /// The last fetch resolved and populated the entry
    Success,
    /// The last fetch failed; the previous entry (if any) is untouched
    Error,
}

/// One cached payload with its fetch timestamp
///
/// The payload is opaque JSON exactly as the transport resolved it; the
/// cache never inspects or merges it. Typed decoding happens at the
/// consumer's call site.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached payload
    pub data: Arc<Value>,
    /// When the fetch that produced this payload resolved
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// True iff the entry is younger than the given TTL
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        Utc::now().signed_duration_since(self.cached_at) < ttl
    }
}

/// An in-flight fetch registration
///
/// The ticket ties a settlement back to the registration it belongs to:
/// if the key was invalidated and re-fetched while the old fetch was
/// still in flight, the old settlement must not clear the new handle.
pub(crate) struct PendingFetch {
    pub ticket: u64,
    pub shared: SharedFetch,
}

/// All mutable cache state behind the manager's lock
pub(crate) struct CacheState {
    entries: HashMap<String, CacheEntry>,
    statuses: HashMap<String, FetchStatus>,
    pending: HashMap<String, PendingFetch>,
    /// Bumped by every invalidation; never reset
    version: u64,
    next_ticket: u64,
}

impl CacheState {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            statuses: HashMap::new(),
            pending: HashMap::new(),
            version: 0,
            next_ticket: 0,
        }
    }

    /// Looks up the entry for a key, fresh or stale
    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Returns the status for a key; keys never fetched are `Idle`
    pub fn status(&self, key: &str) -> FetchStatus {
        self.statuses
            .get(key)
            .copied()
            .unwrap_or(FetchStatus::Idle)
    }

    pub fn set_status(&mut self, key: &str, status: FetchStatus) {
        self.statuses.insert(key.to_string(), status);
    }

    /// Writes a successful payload, stamping the current time
    ///
    /// Creates or wholly replaces the entry and marks the key `Success`.
    pub fn put(&mut self, key: &str, data: Arc<Value>) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                cached_at: Utc::now(),
            },
        );
        self.statuses.insert(key.to_string(), FetchStatus::Success);
    }

    /// Removes a key entirely: entry, status, and any pending handle
    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.statuses.remove(key);
        self.pending.remove(key);
    }

    pub fn pending(&self, key: &str) -> Option<&PendingFetch> {
        self.pending.get(key)
    }

    /// Reserves a ticket for a fetch about to be registered
    pub fn reserve_ticket(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        ticket
    }

    /// Registers an in-flight fetch under a previously reserved ticket
    pub fn register_pending(&mut self, key: &str, ticket: u64, shared: SharedFetch) {
        self.pending
            .insert(key.to_string(), PendingFetch { ticket, shared });
    }

    /// Clears the pending handle for a key, but only if it still belongs
    /// to the given ticket
    pub fn clear_pending(&mut self, key: &str, ticket: u64) {
        if self
            .pending
            .get(key)
            .is_some_and(|p| p.ticket == ticket)
        {
            self.pending.remove(key);
        }
    }

    /// Collects every key containing `pattern` as a literal substring
    pub fn keys_containing(&self, pattern: &str) -> Vec<String> {
        self.entries
            .keys()
            .chain(self.statuses.keys())
            .chain(self.pending.keys())
            .filter(|key| key.contains(pattern))
            .cloned()
            .collect()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Drops every entry, status, and pending handle
    ///
    /// The version counter is left alone; the caller bumps it like any
    /// other invalidation.
    pub fn clear_all(&mut self) {
        self.entries.clear();
        self.statuses.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(v: i64) -> Arc<Value> {
        Arc::new(json!({ "value": v }))
    }

    #[test]
    fn test_status_defaults_to_idle() {
        let state = CacheState::new();
        assert_eq!(state.status("bills"), FetchStatus::Idle);
    }

    #[test]
    fn test_put_creates_entry_and_marks_success() {
        let mut state = CacheState::new();
        let before = Utc::now();
        state.put("bills", payload(1));

        let entry = state.entry("bills").expect("entry should exist");
        assert_eq!(*entry.data, json!({ "value": 1 }));
        assert!(entry.cached_at >= before);
        assert_eq!(state.status("bills"), FetchStatus::Success);
    }

    #[test]
    fn test_put_replaces_whole_entry() {
        let mut state = CacheState::new();
        state.put("bills", payload(1));
        let first_stamp = state.entry("bills").unwrap().cached_at;
        state.put("bills", payload(2));

        let entry = state.entry("bills").unwrap();
        assert_eq!(*entry.data, json!({ "value": 2 }));
        assert!(entry.cached_at >= first_stamp);
        assert_eq!(state.entry_count(), 1);
    }

    #[test]
    fn test_remove_is_total_per_key() {
        let mut state = CacheState::new();
        state.put("bills", payload(1));
        state.set_status("bills", FetchStatus::Loading);
        state.remove("bills");

        assert!(state.entry("bills").is_none());
        assert_eq!(state.status("bills"), FetchStatus::Idle);
        assert!(state.pending("bills").is_none());
    }

    #[test]
    fn test_freshness_window_boundary() {
        let entry = CacheEntry {
            data: payload(1),
            cached_at: Utc::now() - Duration::seconds(299),
        };
        assert!(entry.is_fresh(Duration::seconds(300)));

        let stale = CacheEntry {
            data: payload(1),
            cached_at: Utc::now() - Duration::seconds(301),
        };
        assert!(!stale.is_fresh(Duration::seconds(300)));
    }

    #[test]
    fn test_version_only_increases() {
        let mut state = CacheState::new();
        assert_eq!(state.version(), 0);
        assert_eq!(state.bump_version(), 1);
        assert_eq!(state.bump_version(), 2);
        state.clear_all();
        // clear_all leaves the counter to the caller
        assert_eq!(state.version(), 2);
    }

    #[test]
    fn test_keys_containing_matches_literal_substring() {
        let mut state = CacheState::new();
        state.put("bills", payload(1));
        state.put("bills?page=2", payload(2));
        state.put("reports/bill/9", payload(3));

        let mut keys = state.keys_containing("bills");
        keys.sort();
        assert_eq!(keys, vec!["bills", "bills?page=2"]);
    }

    #[test]
    fn test_keys_containing_sees_status_only_keys() {
        let mut state = CacheState::new();
        state.set_status("referrals", FetchStatus::Loading);
        assert_eq!(state.keys_containing("referrals"), vec!["referrals"]);
    }

    #[test]
    fn test_clear_pending_requires_matching_ticket() {
        use futures::FutureExt;

        let mut state = CacheState::new();
        let fut: BoxFuture<'static, Result<Arc<Value>, FetchError>> =
            futures::future::ready(Ok(payload(1))).boxed();
        let shared = fut.shared();
        let ticket = state.reserve_ticket();
        state.register_pending("bills", ticket, shared.clone());

        state.clear_pending("bills", ticket + 1);
        assert!(state.pending("bills").is_some(), "wrong ticket must not clear");

        state.clear_pending("bills", ticket);
        assert!(state.pending("bills").is_none());
    }
}
