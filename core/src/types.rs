//! Domain DTOs for the user API.
//!
//! # Design
//! These types mirror the mock-server's schema but are defined independently;
//! the end-to-end test catches schema drift between the two crates.
//! `UserListItem::is_draft` never crosses the wire: it only marks the
//! placeholder row the client appends after a successful create.

use serde::{Deserialize, Serialize};

/// Id carried by draft rows. Servers assign positive ids, so it cannot
/// collide with a real row.
pub const DRAFT_USER_ID: i64 = -1;

/// The list screen stops offering "create" once it shows this many rows.
pub const MAX_USERS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserType {
    Admin,
    Agent,
    Customer,
}

/// A row of `GET /api/user/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserListItem {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    #[serde(skip)]
    pub is_draft: bool,
}

impl UserListItem {
    /// Placeholder appended to the cached list until the server's row for a
    /// freshly created user has been fetched.
    pub fn draft() -> Self {
        Self {
            id: DRAFT_USER_ID,
            name: String::new(),
            user_type: UserType::Customer,
            is_draft: true,
        }
    }
}

/// Full record of `GET /api/user/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub email: String,
    pub phone: String,
}

pub type UserRole = String;

/// Detail view of one user, assembled from the info and roles endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub info: UserInfo,
    pub roles: Vec<UserRole>,
}

pub fn can_add_user(list: &[UserListItem]) -> bool {
    list.len() < MAX_USERS
}
