//! Source fetchers produce the authoritative value on a cache miss.
//!
//! A fetcher must never write to the cache store itself; the
//! [`CacheManager`](super::CacheManager) is the only writer.

use std::future::Future;

/// One-shot producer of an authoritative value.
pub trait SourceFetcher<T>: Send {
    type Error: Send;

    fn fetch(self) -> impl Future<Output = Result<T, Self::Error>> + Send;
}

/// Adapter turning an async closure into a [`SourceFetcher`].
pub struct FromFn<F>(F);

/// Wrap `f` so it can be handed to the cache manager.
///
/// ```ignore
/// cache.read_through("greeting", 5, from_fn(|| async { Ok::<_, Infallible>("hi") })).await
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F> {
    FromFn(f)
}

impl<T, E, F, Fut> SourceFetcher<T> for FromFn<F>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    E: Send,
{
    type Error = E;

    fn fetch(self) -> impl Future<Output = Result<T, E>> + Send {
        (self.0)()
    }
}
