//! User endpoints wired to the query cache.
//!
//! # Design
//! Queries go through `QueryCache::fetch_query`, so a fresh cached value is
//! served without a request. Mutations go straight to the executor and only
//! touch the cache once the server confirmed them: a delete filters the row
//! out of the cached list, a create appends a draft row and schedules an
//! invalidation after the configured reconciliation delay, so the next list
//! read replaces the draft with the server's row.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::cache::{FetchStatus, QueryCache, QueryObserver};
use crate::classify::ErrorPanel;
use crate::client::{RequestExecutor, RequestOptions};
use crate::config::{ClientConfig, ConfigError};
use crate::error::RequestError;
use crate::key::QueryKey;
use crate::transport::Transport;
use crate::types::{User, UserInfo, UserListItem, UserRole};
use crate::updater::{append_draft_user, remove_user_from_list, schedule_invalidation};

pub const USER_LIST_ENDPOINT: &str = "/api/user/list";
pub const USER_ENDPOINT: &str = "/api/user";

pub fn user_list_key() -> QueryKey {
    QueryKey::new(["users", "list"])
}

pub fn user_detail_key(user_id: i64) -> QueryKey {
    QueryKey::new(["users", "detail"]).with(user_id)
}

fn user_endpoint(user_id: i64) -> String {
    format!("{USER_ENDPOINT}/{user_id}")
}

fn user_roles_endpoint(user_id: i64) -> String {
    format!("{USER_ENDPOINT}/{user_id}/roles")
}

/// A confirmed create.
#[derive(Debug)]
pub struct AddedUser {
    /// The server's record of the new user.
    pub info: UserInfo,
    /// Completes once the cached list has been invalidated for
    /// reconciliation. Dropping it does not cancel the invalidation.
    pub reconcile: JoinHandle<()>,
}

/// What a screen shows for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryView<T> {
    /// Nothing to show yet.
    Pending,
    Ready(T),
    Failed(ErrorPanel),
}

#[derive(Debug, Clone)]
pub struct UsersApi {
    executor: RequestExecutor,
    cache: QueryCache,
    reconcile_delay: Duration,
}

impl UsersApi {
    pub fn new(executor: RequestExecutor, cache: QueryCache, reconcile_delay: Duration) -> Self {
        Self {
            executor,
            cache,
            reconcile_delay,
        }
    }

    /// Builds an executor and a fresh cache from `config`.
    pub fn from_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> Result<Self, ConfigError> {
        let executor = RequestExecutor::new(transport, config)?;
        let cache = QueryCache::with_config(config.query.clone());
        Ok(Self::new(executor, cache, config.reconcile_delay))
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub async fn user_list(&self) -> Result<Vec<UserListItem>, RequestError> {
        self.cache
            .fetch_query(&user_list_key(), || {
                self.executor.execute(RequestOptions::get(USER_LIST_ENDPOINT))
            })
            .await
    }

    /// Info and roles are fetched concurrently. When both fail, the info
    /// error is the one reported.
    pub async fn user(&self, user_id: i64) -> Result<User, RequestError> {
        self.cache
            .fetch_query(&user_detail_key(user_id), || self.fetch_user(user_id))
            .await
    }

    async fn fetch_user(&self, user_id: i64) -> Result<User, RequestError> {
        let (info, roles) = tokio::join!(
            self.executor.execute::<UserInfo>(RequestOptions::get(user_endpoint(user_id))),
            self.executor.execute::<Vec<UserRole>>(RequestOptions::get(user_roles_endpoint(user_id))),
        );
        Ok(User {
            info: info?,
            roles: roles?,
        })
    }

    /// Creates a user, then appends a draft row to the cached list and
    /// schedules its reconciliation.
    pub async fn add_user(&self) -> Result<AddedUser, RequestError> {
        let info: UserInfo = self.executor.execute(RequestOptions::post(USER_ENDPOINT)).await?;
        append_draft_user(&self.cache);
        let reconcile = schedule_invalidation(&self.cache, user_list_key(), self.reconcile_delay);
        Ok(AddedUser { info, reconcile })
    }

    /// Deletes a user, then drops its row from the cached list.
    pub async fn remove_user(&self, user_id: i64) -> Result<(), RequestError> {
        self.executor
            .execute_unit(RequestOptions::delete(user_endpoint(user_id)))
            .await?;
        remove_user_from_list(&self.cache, user_id);
        Ok(())
    }

    /// Keeps the list entry alive across `QueryCache::collect_garbage` while
    /// the returned observer lives.
    pub fn watch_list(&self) -> QueryObserver {
        self.cache.watch(&user_list_key())
    }

    /// Same as [`UsersApi::watch_list`] for one detail dialog.
    pub fn watch_user(&self, user_id: i64) -> QueryObserver {
        self.cache.watch(&user_detail_key(user_id))
    }

    /// Current state of the list screen. Errors use the generic panel.
    pub fn list_view(&self) -> QueryView<Vec<UserListItem>> {
        self.view(&user_list_key(), ErrorPanel::for_list)
    }

    /// Current state of a detail dialog. A 404 uses the not-found panel.
    pub fn detail_view(&self, user_id: i64) -> QueryView<User> {
        self.view(&user_detail_key(user_id), ErrorPanel::for_detail)
    }

    fn view<T, P>(&self, key: &QueryKey, panel: P) -> QueryView<T>
    where
        T: Clone + 'static,
        P: Fn(&RequestError) -> ErrorPanel,
    {
        let Some(entry) = self.cache.read::<T>(key) else {
            return QueryView::Pending;
        };
        match (entry.status, entry.error, entry.data) {
            (FetchStatus::Error, Some(error), _) => QueryView::Failed(panel(&error)),
            (_, _, Some(data)) => QueryView::Ready(data),
            _ => QueryView::Pending,
        }
    }
}
