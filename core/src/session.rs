//! Session-expiry detection.

use tracing::debug;

use crate::cache::{QueryCache, Subscription};

/// Calls `on_unauthorized` for every failed fetch answered with 401, on any
/// key. Other errors are ignored. Drop the returned subscription (or call
/// `unsubscribe`) when the owning scope goes away.
pub fn watch_unauthorized<F>(cache: &QueryCache, on_unauthorized: F) -> Subscription
where
    F: Fn() + Send + Sync + 'static,
{
    cache.subscribe_to_errors(move |event| {
        if event.error.is_unauthorized() {
            debug!(key = %event.key, "unauthorized response, session expired");
            on_unauthorized();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, RequestError, TransportError};
    use crate::key::QueryKey;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn status(status: u16) -> RequestError {
        RequestError::Api(ApiError {
            message: String::new(),
            status,
            body: None,
        })
    }

    async fn fail(cache: &QueryCache, key: &QueryKey, error: RequestError) {
        let _ = cache
            .refetch::<(), _, _>(key, || {
                let error = error.clone();
                async move { Err(error) }
            })
            .await;
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = count.clone();
        (count, move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn each_401_triggers_once() {
        let cache = QueryCache::new();
        let (count, on_unauthorized) = counter();
        let _watch = watch_unauthorized(&cache, on_unauthorized);

        fail(&cache, &QueryKey::new(["users", "list"]), status(401)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        fail(&cache, &QueryKey::new(["users", "detail"]).with(1), status(401)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_ignored() {
        let cache = QueryCache::new();
        let (count, on_unauthorized) = counter();
        let _watch = watch_unauthorized(&cache, on_unauthorized);
        let key = QueryKey::new(["users", "list"]);

        fail(&cache, &key, status(403)).await;
        fail(&cache, &key, status(404)).await;
        fail(&cache, &key, status(500)).await;
        fail(&cache, &key, TransportError::new("timeout").into()).await;
        cache.set_data(&key, ());

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nothing_after_unsubscribe() {
        let cache = QueryCache::new();
        let (count, on_unauthorized) = counter();
        let key = QueryKey::new(["users", "list"]);

        let watch = watch_unauthorized(&cache, on_unauthorized);
        watch.unsubscribe();
        fail(&cache, &key, status(401)).await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(cache.subscriber_count(), 0);
    }
}
