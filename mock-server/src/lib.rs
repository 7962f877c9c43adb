//! In-memory stand-in for the user-management backend.
//!
//! Serves the `/api/user*` routes the client core consumes. Ids are assigned
//! sequentially starting at 1, so they never collide with the client's draft
//! sentinel. `POST /api/debug/expire-session` flips every user route to
//! `401 Unauthorized`, which lets tests drive the session-expiry path without
//! an auth protocol.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserType {
    Admin,
    Agent,
    Customer,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserListItem {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub email: String,
    pub phone: String,
}

#[derive(Clone, Debug)]
struct StoredUser {
    info: UserInfo,
    roles: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Store {
    users: BTreeMap<i64, StoredUser>,
    next_id: i64,
    session_expired: bool,
}

impl Store {
    fn insert(&mut self, name: String, user_type: UserType, roles: Vec<String>) -> UserInfo {
        self.next_id += 1;
        let id = self.next_id;
        let info = UserInfo {
            id,
            email: format!("user{id}@example.com"),
            phone: format!("+1-555-{id:04}"),
            name,
            user_type,
        };
        self.users.insert(
            id,
            StoredUser {
                info: info.clone(),
                roles,
            },
        );
        info
    }
}

pub type Db = Arc<RwLock<Store>>;

/// Error response carrying `{"message": ...}`, the shape the client classifier reads.
struct Failure {
    status: StatusCode,
    message: String,
}

impl Failure {
    fn not_found(id: i64) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("User {id} not found"),
        }
    }

    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Session expired".to_string(),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

/// Router seeded with one user of each type.
pub fn app() -> Router {
    let mut store = Store::default();
    store.insert(
        "Alice Admin".to_string(),
        UserType::Admin,
        vec!["users:write".to_string(), "users:read".to_string()],
    );
    store.insert("Bob Agent".to_string(), UserType::Agent, vec!["tickets:write".to_string()]);
    store.insert("Carol Customer".to_string(), UserType::Customer, Vec::new());
    app_with_store(store)
}

/// Router over an empty store.
pub fn empty_app() -> Router {
    app_with_store(Store::default())
}

fn app_with_store(store: Store) -> Router {
    let db: Db = Arc::new(RwLock::new(store));
    Router::new()
        .route("/api/user/list", get(list_users))
        .route("/api/user", post(create_user))
        .route("/api/user/{id}", get(get_user).delete(delete_user))
        .route("/api/user/{id}/roles", get(get_roles))
        .route("/api/debug/expire-session", post(expire_session))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn ensure_session(store: &Store) -> Result<(), Failure> {
    if store.session_expired {
        return Err(Failure::unauthorized());
    }
    Ok(())
}

async fn list_users(State(db): State<Db>) -> Result<Json<Vec<UserListItem>>, Failure> {
    let store = db.read().await;
    ensure_session(&store)?;
    let users = store
        .users
        .values()
        .map(|user| UserListItem {
            id: user.info.id,
            name: user.info.name.clone(),
            user_type: user.info.user_type,
        })
        .collect();
    Ok(Json(users))
}

async fn create_user(State(db): State<Db>) -> Result<(StatusCode, Json<UserInfo>), Failure> {
    let mut store = db.write().await;
    ensure_session(&store)?;
    let name = format!("New user {}", store.next_id + 1);
    let info = store.insert(name, UserType::Customer, Vec::new());
    tracing::debug!(id = info.id, "created user");
    Ok((StatusCode::CREATED, Json(info)))
}

async fn get_user(State(db): State<Db>, Path(id): Path<i64>) -> Result<Json<UserInfo>, Failure> {
    let store = db.read().await;
    ensure_session(&store)?;
    store
        .users
        .get(&id)
        .map(|user| Json(user.info.clone()))
        .ok_or_else(|| Failure::not_found(id))
}

async fn get_roles(State(db): State<Db>, Path(id): Path<i64>) -> Result<Json<Vec<String>>, Failure> {
    let store = db.read().await;
    ensure_session(&store)?;
    store
        .users
        .get(&id)
        .map(|user| Json(user.roles.clone()))
        .ok_or_else(|| Failure::not_found(id))
}

async fn delete_user(State(db): State<Db>, Path(id): Path<i64>) -> Result<StatusCode, Failure> {
    let mut store = db.write().await;
    ensure_session(&store)?;
    store
        .users
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| Failure::not_found(id))
}

async fn expire_session(State(db): State<Db>) -> StatusCode {
    db.write().await.session_expired = true;
    tracing::debug!("session expired");
    StatusCode::NO_CONTENT
}
