//! Cache manager: fetch orchestration and invalidation
//!
//! Provides [`DataCache`], the process-wide object every data read and
//! every mutation-triggered invalidation goes through. The fetch decision
//! ladder lives in [`DataCache::fetch_with_cache`]; everything it does
//! outside the injected transport call is synchronous under one lock, so
//! the pending-handle check and registration can never race.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration as StdDuration;

use chrono::Duration;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::store::{CacheState, FetchStatus, SharedFetch};
use super::{FetchError, NoopNotifier, Notifier};
use crate::key::{cache_key, Params};

/// Configuration for the cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Validity window for cached entries
    pub ttl: StdDuration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: StdDuration::from_secs(300), // 5 minutes
        }
    }
}

/// Per-call fetch options
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Bypass the cache and always invoke the transport
    pub force: bool,
    /// Forward a failure to the installed [`Notifier`]
    pub notify_on_error: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            force: false,
            notify_on_error: true,
        }
    }
}

impl FetchOptions {
    /// Options for a forced refresh
    pub fn force() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

struct CacheInner {
    state: Mutex<CacheState>,
    ttl: Duration,
    notifier: RwLock<Arc<dyn Notifier>>,
}

/// Process-wide read-through cache
///
/// Cheap to clone; every clone shares the same underlying state, which is
/// how UI bindings and mutation call sites all see one store. A fresh
/// instance starts empty and [`DataCache::clear`] fully resets it.
#[derive(Clone)]
pub struct DataCache {
    inner: Arc<CacheInner>,
}

impl Default for DataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DataCache {
    /// Creates a cache with the default five-minute TTL and no notifier
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a cache with a custom configuration
    pub fn with_config(config: CacheConfig) -> Self {
        let ttl = Duration::from_std(config.ttl).unwrap_or(Duration::MAX);
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::new()),
                ttl,
                notifier: RwLock::new(Arc::new(NoopNotifier)),
            }),
        }
    }

    /// Installs a notification collaborator for fetch failures
    ///
    /// Builder-style. Swaps the notifier in place: cached entries survive,
    /// and every clone of this cache sees the new notifier.
    pub fn with_notifier(self, notifier: Arc<dyn Notifier>) -> Self {
        *self
            .inner
            .notifier
            .write()
            .unwrap_or_else(PoisonError::into_inner) = notifier;
        self
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(
            &self
                .inner
                .notifier
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock leaves the state consistent
        // enough to keep serving; recover instead of propagating poison.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches a resource through the cache
    ///
    /// The decision ladder, evaluated in order under one lock:
    /// 1. fresh entry and not forced: return it without suspending;
    /// 2. a fetch is already in flight: await its shared outcome;
    /// 3. `Loading` status but no pending handle (recoverable
    ///    inconsistency) and a stale entry exists: serve the stale entry
    ///    rather than start a redundant fetch;
    /// 4. otherwise mark the key `Loading`, register the fetch, and invoke
    ///    the transport.
    ///
    /// On success the entry is written and the pending handle cleared; on
    /// failure the key is marked `Error`, the handle cleared, and the
    /// failure re-raised to every awaiting caller, so a retry is never
    /// blocked by residue.
    ///
    /// # Arguments
    /// * `resource` - Logical resource name (e.g. "bills")
    /// * `api_fn` - Injected transport call for this resource
    /// * `params` - Parameters identifying this read
    /// * `options` - Force/notification flags
    pub async fn fetch_with_cache<F, Fut>(
        &self,
        resource: &str,
        api_fn: F,
        params: &Params,
        options: FetchOptions,
    ) -> Result<Arc<Value>, FetchError>
    where
        F: FnOnce(Params) -> Fut,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        let key = cache_key(resource, params);

        let shared = {
            let mut state = self.state();

            if !options.force {
                if let Some(entry) = state.entry(&key) {
                    if entry.is_fresh(self.inner.ttl) {
                        tracing::debug!(key = %key, "cache hit");
                        return Ok(Arc::clone(&entry.data));
                    }
                }
            }

            if let Some(pending) = state.pending(&key) {
                tracing::debug!(key = %key, "joining in-flight fetch");
                pending.shared.clone()
            } else {
                // A loading flag with no pending handle should not happen;
                // fall back to the stale entry instead of racing a second
                // fetch against whatever left the flag behind.
                if state.status(&key) == FetchStatus::Loading {
                    if let Some(entry) = state.entry(&key) {
                        tracing::warn!(key = %key, "loading status without pending fetch, serving stale entry");
                        return Ok(Arc::clone(&entry.data));
                    }
                }
                self.begin_fetch(
                    &mut state,
                    &key,
                    resource,
                    api_fn(params.clone()),
                    options.notify_on_error,
                )
            }
        };

        shared.await
    }

    /// Registers and launches a new fetch for a key
    ///
    /// Called with the state lock held: the `Loading` transition and the
    /// registration happen before any caller can suspend.
    fn begin_fetch<Fut>(
        &self,
        state: &mut CacheState,
        key: &str,
        resource: &str,
        fut: Fut,
        notify_on_error: bool,
    ) -> SharedFetch
    where
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        tracing::debug!(key = %key, "starting fetch");
        state.set_status(key, FetchStatus::Loading);
        let ticket = state.reserve_ticket();

        let cache = self.clone();
        let owned_key = key.to_string();
        let owned_resource = resource.to_string();

        let shared: SharedFetch = async move {
            match fut.await {
                Ok(value) => {
                    let data = Arc::new(value);
                    cache.finish_success(&owned_key, ticket, Arc::clone(&data));
                    Ok(data)
                }
                Err(err) => {
                    cache.finish_failure(&owned_key, &owned_resource, ticket, &err, notify_on_error);
                    Err(err)
                }
            }
        }
        .boxed()
        .shared();

        state.register_pending(key, ticket, shared.clone());

        // Drive the fetch to completion even if every caller that
        // triggered it is dropped before it settles.
        tokio::spawn({
            let shared = shared.clone();
            async move {
                let _ = shared.await;
            }
        });

        shared
    }

    fn finish_success(&self, key: &str, ticket: u64, data: Arc<Value>) {
        let mut state = self.state();
        state.put(key, data);
        state.clear_pending(key, ticket);
        tracing::debug!(key = %key, "fetch resolved, entry cached");
    }

    fn finish_failure(
        &self,
        key: &str,
        resource: &str,
        ticket: u64,
        err: &FetchError,
        notify: bool,
    ) {
        {
            let mut state = self.state();
            state.set_status(key, FetchStatus::Error);
            state.clear_pending(key, ticket);
        }
        tracing::warn!(key = %key, error = %err, "fetch failed");
        if notify {
            self.notifier().error(resource, &err.to_string());
        }
    }

    /// Returns a fresh cached payload, if one exists
    ///
    /// Synchronous and side-effect free; stale entries are reported as
    /// absent.
    pub fn get_cached(&self, resource: &str, params: &Params) -> Option<Arc<Value>> {
        let key = cache_key(resource, params);
        let state = self.state();
        state
            .entry(&key)
            .filter(|entry| entry.is_fresh(self.inner.ttl))
            .map(|entry| Arc::clone(&entry.data))
    }

    /// Returns a fresh cached payload decoded into the caller's type
    ///
    /// Entries that are absent, stale, or fail to decode all come back as
    /// `None`; the store itself stays resource-agnostic.
    pub fn get_cached_as<T: DeserializeOwned>(&self, resource: &str, params: &Params) -> Option<T> {
        self.get_cached(resource, params)
            .and_then(|data| serde_json::from_value((*data).clone()).ok())
    }

    /// True while a fetch for this read is in flight
    pub fn is_loading(&self, resource: &str, params: &Params) -> bool {
        self.status(resource, params) == FetchStatus::Loading
    }

    /// Returns the fetch status for a read
    pub fn status(&self, resource: &str, params: &Params) -> FetchStatus {
        let key = cache_key(resource, params);
        self.state().status(&key)
    }

    /// Removes exactly the listed keys; absent keys are ignored
    ///
    /// Bumps the cache version by one regardless of how many keys matched.
    pub fn invalidate_keys<S: AsRef<str>>(&self, keys: &[S]) {
        let mut state = self.state();
        for key in keys {
            state.remove(key.as_ref());
        }
        let version = state.bump_version();
        tracing::debug!(keys = keys.len(), version, "invalidated keys");
    }

    /// Removes every key containing `pattern` as a literal substring
    ///
    /// Case-sensitive, no wildcard syntax. This is how a mutation drops a
    /// whole resource family (every parameterization of "bills") without
    /// enumerating keys. Contract: resource names must not be substrings
    /// of unrelated resource names, or this will over-invalidate.
    pub fn invalidate_pattern(&self, pattern: &str) {
        let mut state = self.state();
        let keys = state.keys_containing(pattern);
        for key in &keys {
            state.remove(key);
        }
        let version = state.bump_version();
        tracing::debug!(pattern = %pattern, removed = keys.len(), version, "invalidated by pattern");
    }

    /// Drops every entry, status, and pending handle
    ///
    /// Counts as one invalidation: the version keeps its monotonic
    /// direction and is bumped by one.
    pub fn clear(&self) {
        let mut state = self.state();
        state.clear_all();
        let version = state.bump_version();
        tracing::debug!(version, "cache cleared");
    }

    /// Current cache version; bumped by every invalidation
    ///
    /// Consumers can watch this to detect that global cache state changed
    /// even when their own keys look untouched.
    pub fn version(&self) -> u64 {
        self.state().version()
    }

    /// Number of cached entries (fresh and stale)
    pub fn len(&self) -> usize {
        self.state().entry_count()
    }

    /// True if no entries are cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCache")
            .field("entries", &self.len())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}
