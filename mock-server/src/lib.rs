//! In-memory backend used by the client tests.
//!
//! Speaks snake_case JSON, guards `/me` with a bearer token, answers
//! validation failures with 422 and echoes multipart uploads.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Token `/me` accepts when the app is built with `app()`.
pub const DEFAULT_TOKEN: &str = "Bearer mock-token";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// One part of a multipart upload as the server saw it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadedPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub parts: Vec<UploadedPart>,
}

struct AppState {
    users: RwLock<HashMap<Uuid, User>>,
    token: String,
}

type Shared = Arc<AppState>;

pub fn app() -> Router {
    app_with_token(DEFAULT_TOKEN)
}

/// Build the router with `token` as the only accepted `Authorization` value.
pub fn app_with_token(token: impl Into<String>) -> Router {
    let state = Arc::new(AppState {
        users: RwLock::new(HashMap::new()),
        token: token.into(),
    });
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/me", get(me))
        .route("/uploads", post(upload))
        .route("/status/{code}", get(status))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock backend listening");
    }
    axum::serve(listener, app()).await
}

fn validation_error(field: &str, message: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "errors": { field: [message] } })),
    )
        .into_response()
}

/// Malformed JSON is a 400; well-formed JSON of the wrong shape is a 422.
fn json_rejection(rejection: JsonRejection) -> Response {
    warn!(%rejection, "rejected request body");
    match rejection {
        JsonRejection::JsonDataError(e) => validation_error("body", &e.body_text()),
        other => (StatusCode::BAD_REQUEST, other.body_text()).into_response(),
    }
}

async fn list_users(State(state): State<Shared>) -> Json<Vec<User>> {
    let users = state.users.read().await;
    let mut all: Vec<User> = users.values().cloned().collect();
    all.sort_by(|a, b| a.email.cmp(&b.email));
    Json(all)
}

async fn create_user(
    State(state): State<Shared>,
    input: Result<Json<CreateUser>, JsonRejection>,
) -> Response {
    let Json(input) = match input {
        Ok(input) => input,
        Err(rejection) => return json_rejection(rejection),
    };
    if input.email.trim().is_empty() {
        return validation_error("email", "can't be blank");
    }
    let user = User {
        id: Uuid::new_v4(),
        first_name: input.first_name,
        last_name: input.last_name,
        email: input.email,
    };
    debug!(id = %user.id, "user created");
    state.users.write().await.insert(user.id, user.clone());
    (StatusCode::CREATED, Json(user)).into_response()
}

async fn get_user(
    State(state): State<Shared>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, StatusCode> {
    let users = state.users.read().await;
    users.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_user(
    State(state): State<Shared>,
    Path(id): Path<Uuid>,
    input: Result<Json<UpdateUser>, JsonRejection>,
) -> Response {
    let Json(input) = match input {
        Ok(input) => input,
        Err(rejection) => return json_rejection(rejection),
    };
    if input.email.as_deref().is_some_and(|e| e.trim().is_empty()) {
        return validation_error("email", "can't be blank");
    }
    let mut users = state.users.write().await;
    let Some(user) = users.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(first_name) = input.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = input.last_name {
        user.last_name = last_name;
    }
    if let Some(email) = input.email {
        user.email = email;
    }
    Json(user.clone()).into_response()
}

async fn delete_user(State(state): State<Shared>, Path(id): Path<Uuid>) -> StatusCode {
    let mut users = state.users.write().await;
    users
        .remove(&id)
        .map_or(StatusCode::NOT_FOUND, |_| StatusCode::NO_CONTENT)
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Result<Json<User>, StatusCode> {
    let presented = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    if presented != Some(state.token.as_str()) {
        warn!("rejected /me without a valid token");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(User {
        id: Uuid::nil(),
        first_name: "Mock".to_string(),
        last_name: "User".to_string(),
        email: "me@example.com".to_string(),
    }))
}

async fn upload(mut multipart: Multipart) -> Response {
    let mut parts = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, e.body_text()).into_response(),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let size = match field.bytes().await {
            Ok(bytes) => bytes.len(),
            Err(e) => return (StatusCode::BAD_REQUEST, e.body_text()).into_response(),
        };
        parts.push(UploadedPart {
            name,
            file_name,
            content_type,
            size,
        });
    }
    debug!(parts = parts.len(), "upload received");
    Json(UploadReceipt { parts }).into_response()
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) if status.as_u16() >= 200 => {
            (status, Json(json!({ "status": code }))).into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}
