//! In-memory backend implementing `Transport`, with hooks for injecting
//! failures and for holding a list response in flight.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::oneshot;
use users_core::{
    ClientConfig, HttpMethod, HttpRequest, HttpResponse, Transport, TransportError, UserInfo, UserListItem,
    UserType, UsersApi,
};

pub const BASE_URL: &str = "http://backend.test";

struct Stored {
    info: UserInfo,
    roles: Vec<String>,
}

#[derive(Default)]
struct State {
    users: Vec<Stored>,
    next_id: i64,
    injected: HashMap<(HttpMethod, String), VecDeque<(u16, &'static str, String)>>,
    held_list: Option<oneshot::Receiver<()>>,
    requests: Vec<(HttpMethod, String)>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

fn json_response(status: u16, status_text: &str, body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        status_text: status_text.to_string(),
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: body.to_string(),
    }
}

fn not_found(id: &str) -> HttpResponse {
    json_response(404, "Not Found", json!({ "message": format!("User {id} not found") }))
}

impl FakeBackend {
    /// Backend holding users with the given ids; new users get the next id
    /// and the name "New".
    pub fn with_users(ids: &[i64]) -> Arc<Self> {
        let backend = Self::default();
        {
            let mut state = backend.state.lock().unwrap();
            for &id in ids {
                state.users.push(Stored {
                    info: UserInfo {
                        id,
                        name: format!("user {id}"),
                        user_type: UserType::Agent,
                        email: format!("user{id}@example.com"),
                        phone: format!("555-{id:04}"),
                    },
                    roles: vec!["reader".to_string()],
                });
            }
            state.next_id = ids.iter().copied().max().unwrap_or(0);
        }
        Arc::new(backend)
    }

    pub fn api(self: &Arc<Self>) -> UsersApi {
        let config = ClientConfig::default().with_base_url(BASE_URL);
        UsersApi::from_config(self.clone(), &config).unwrap()
    }

    /// The next `method path` request is answered with `status` and `body`
    /// instead of being routed.
    pub fn fail_next(&self, method: HttpMethod, path: &str, status: u16, status_text: &'static str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .injected
            .entry((method, path.to_string()))
            .or_default()
            .push_back((status, status_text, body.to_string()));
    }

    /// The next list request reads the users immediately but only answers
    /// once the returned sender fires (or is dropped).
    pub fn hold_next_list(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state.lock().unwrap().held_list = Some(rx);
        tx
    }

    pub fn requests(&self) -> Vec<(HttpMethod, String)> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }

    fn route(state: &mut State, method: HttpMethod, path: &str) -> HttpResponse {
        if let Some((status, status_text, body)) = state
            .injected
            .get_mut(&(method, path.to_string()))
            .and_then(VecDeque::pop_front)
        {
            return HttpResponse {
                status,
                status_text: status_text.to_string(),
                headers: Vec::new(),
                body,
            };
        }

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (HttpMethod::Get, ["api", "user", "list"]) => {
                let list: Vec<UserListItem> = state
                    .users
                    .iter()
                    .map(|user| UserListItem {
                        id: user.info.id,
                        name: user.info.name.clone(),
                        user_type: user.info.user_type,
                        is_draft: false,
                    })
                    .collect();
                json_response(200, "OK", serde_json::to_value(list).unwrap())
            }
            (HttpMethod::Post, ["api", "user"]) => {
                state.next_id += 1;
                let info = UserInfo {
                    id: state.next_id,
                    name: "New".to_string(),
                    user_type: UserType::Customer,
                    email: String::new(),
                    phone: String::new(),
                };
                state.users.push(Stored {
                    info: info.clone(),
                    roles: Vec::new(),
                });
                json_response(201, "Created", serde_json::to_value(info).unwrap())
            }
            (HttpMethod::Get, ["api", "user", id]) => {
                match state.users.iter().find(|user| user.info.id.to_string() == *id) {
                    Some(user) => json_response(200, "OK", serde_json::to_value(&user.info).unwrap()),
                    None => not_found(id),
                }
            }
            (HttpMethod::Get, ["api", "user", id, "roles"]) => {
                match state.users.iter().find(|user| user.info.id.to_string() == *id) {
                    Some(user) => json_response(200, "OK", json!(user.roles)),
                    None => not_found(id),
                }
            }
            (HttpMethod::Delete, ["api", "user", id]) => {
                let before = state.users.len();
                state.users.retain(|user| user.info.id.to_string() != *id);
                if state.users.len() == before {
                    not_found(id)
                } else {
                    HttpResponse {
                        status: 204,
                        status_text: "No Content".to_string(),
                        headers: Vec::new(),
                        body: String::new(),
                    }
                }
            }
            _ => json_response(404, "Not Found", json!({ "message": "no route" })),
        }
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .ok_or_else(|| TransportError::new(format!("unknown host in {}", request.url)))?
            .to_string();

        let (response, hold) = {
            let mut state = self.state.lock().unwrap();
            state.requests.push((request.method, path.clone()));
            let response = Self::route(&mut state, request.method, &path);
            let hold = if request.method == HttpMethod::Get && path == "/api/user/list" {
                state.held_list.take()
            } else {
                None
            };
            (response, hold)
        };

        if let Some(hold) = hold {
            let _ = hold.await;
        }
        Ok(response)
    }
}
