//! Cache patches applied after a user mutation has been confirmed.
//!
//! Nothing here runs before the server answered with success. Patches are
//! pure functions of the list value current when they run, and do nothing if
//! the list was never fetched.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::user_list_key;
use crate::cache::QueryCache;
use crate::key::QueryKey;
use crate::types::UserListItem;

/// Drops the row with `user_id` from the cached list. Returns whether the
/// list changed.
pub fn remove_user_from_list(cache: &QueryCache, user_id: i64) -> bool {
    cache.update_data::<Vec<UserListItem>, _>(&user_list_key(), |list| {
        list.iter().filter(|user| user.id != user_id).cloned().collect()
    })
}

/// Appends a draft row to the cached list. Returns whether the list changed.
pub fn append_draft_user(cache: &QueryCache) -> bool {
    cache.update_data::<Vec<UserListItem>, _>(&user_list_key(), |list| {
        let mut next = list.clone();
        next.push(UserListItem::draft());
        next
    })
}

/// Invalidates `key` once `delay` has passed. The task holds its own cache
/// handle and finishes harmlessly even if nobody reads the key any more.
pub fn schedule_invalidation(cache: &QueryCache, key: QueryKey, delay: Duration) -> JoinHandle<()> {
    let cache = cache.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        debug!(%key, ?delay, "reconciling");
        cache.invalidate(&key);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserType;

    fn row(id: i64) -> UserListItem {
        UserListItem {
            id,
            name: format!("user {id}"),
            user_type: UserType::Agent,
            is_draft: false,
        }
    }

    fn ids(cache: &QueryCache) -> Option<Vec<i64>> {
        cache
            .data::<Vec<UserListItem>>(&user_list_key())
            .map(|list| list.iter().map(|user| user.id).collect())
    }

    #[test]
    fn remove_filters_matching_row() {
        let cache = QueryCache::new();
        cache.set_data(&user_list_key(), vec![row(1), row(2), row(3)]);
        assert!(remove_user_from_list(&cache, 2));
        assert_eq!(ids(&cache), Some(vec![1, 3]));
    }

    #[test]
    fn remove_unknown_id_leaves_list_untouched() {
        let cache = QueryCache::new();
        cache.set_data(&user_list_key(), vec![row(1)]);
        assert!(!remove_user_from_list(&cache, 7));
        assert_eq!(ids(&cache), Some(vec![1]));
    }

    #[test]
    fn remove_without_cached_list_is_noop() {
        let cache = QueryCache::new();
        assert!(!remove_user_from_list(&cache, 2));
        assert!(cache.read::<Vec<UserListItem>>(&user_list_key()).is_none());
    }

    #[test]
    fn append_adds_single_draft() {
        let cache = QueryCache::new();
        cache.set_data(&user_list_key(), vec![row(1)]);
        assert!(append_draft_user(&cache));

        let list = cache.data::<Vec<UserListItem>>(&user_list_key()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], UserListItem::draft());
    }

    #[test]
    fn append_without_cached_list_is_noop() {
        let cache = QueryCache::new();
        assert!(!append_draft_user(&cache));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_fires_after_delay() {
        let cache = QueryCache::new();
        cache.set_data(&user_list_key(), vec![row(1)]);
        let handle = schedule_invalidation(&cache, user_list_key(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(!cache.read::<Vec<UserListItem>>(&user_list_key()).unwrap().is_stale);

        handle.await.unwrap();
        assert!(cache.read::<Vec<UserListItem>>(&user_list_key()).unwrap().is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_against_dropped_readers_is_harmless() {
        let cache = QueryCache::new();
        let handle = schedule_invalidation(&cache, user_list_key(), Duration::from_millis(100));
        drop(cache);
        handle.await.unwrap();
    }
}
