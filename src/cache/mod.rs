//! Read-through cache with TTL expiry and event-driven invalidation.
//!
//! - [`CacheEntry`] wraps values with an absolute expiry and judges freshness.
//! - [`CacheManager`] is the single entry point for reads and the only writer.
//! - [`Invalidator`] drops entries after mutations or change notifications,
//!   including the aggregate key of the affected [`KeySpace`].
//! - [`KeyValueStore`] is the persistence seam; [`MemoryStore`] lives here,
//!   the Postgres-backed store lives in `infra::db`.
//!
//! Expiry is lazy: expired entries stay in the store until overwritten or
//! invalidated, and are invisible to every read path.

mod clock;
mod entry;
mod fetcher;
mod invalidation;
mod keys;
mod lock;
mod manager;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, DecodeError};
pub use fetcher::{FromFn, SourceFetcher, from_fn};
pub use invalidation::{ChangeOperation, InvalidationError, Invalidator, SourceChange};
pub use keys::{KeySpace, page_key};
pub use manager::{CacheManager, CacheSource, CacheWriteError, Lookup};
pub use store::{KeyValueStore, MemoryStore, StoreError};

/// Response header marking a body served from the cache.
pub const SERVED_VIA_CACHE_HEADER: &str = "x-served-via-cache";
