//! Carecache: client-side data-access cache
//!
//! The one shared layer every server read in the clinic client goes
//! through. It serves fresh payloads without touching the network,
//! coalesces concurrent fetches for the same logical request into a
//! single transport call, and gives mutating call sites an invalidation
//! protocol (exact keys, substring patterns, or a full clear). State is
//! in-memory only and scoped to one running process.

pub mod binding;
pub mod cache;
pub mod key;

pub use binding::ResourceBinding;
pub use cache::{
    CacheConfig, CacheEntry, DataCache, FetchError, FetchOptions, FetchStatus, NoopNotifier,
    Notifier,
};
pub use key::{cache_key, Params};
