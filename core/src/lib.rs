//! Client core for the user-management API.
//!
//! # Overview
//! Executes typed requests against the user API, keeps fetched results in a
//! query cache, patches that cache after confirmed mutations, and reports
//! expired sessions from the cache's error stream.
//!
//! # Design
//! - `RequestExecutor` is stateless: it builds plain-data requests, hands them
//!   to a `Transport`, and turns responses into `T` or a `RequestError`.
//!   Non-2xx answers become `ApiError`; transport failures never do.
//! - `QueryCache` is an injectable service, not a global: each instance is
//!   independent. Writes are wholesale on fetch and pure patches on mutation.
//! - The optimistic create is two explicit steps: append a draft row after the
//!   server confirms, then invalidate the list after a configurable delay.
//! - DTOs are defined independently from the mock-server crate; the
//!   end-to-end test catches schema drift.

pub mod api;
pub mod cache;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod key;
pub mod session;
pub mod transport;
pub mod types;
pub mod updater;

pub use api::{user_detail_key, user_list_key, AddedUser, QueryView, UsersApi};
pub use cache::{CacheEntry, CacheEvent, ErrorEvent, FetchStatus, QueryCache, QueryObserver, Subscription};
pub use classify::{error_message, extract_message, ErrorPanel};
pub use client::{RequestExecutor, RequestOptions};
pub use config::{ClientConfig, ConfigError, Credentials, QueryConfig};
pub use error::{ApiError, ErrorKind, RequestError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use key::{KeySegment, QueryKey};
pub use session::watch_unauthorized;
pub use transport::{Transport, UreqTransport};
pub use types::{can_add_user, User, UserInfo, UserListItem, UserRole, UserType, DRAFT_USER_ID, MAX_USERS};
