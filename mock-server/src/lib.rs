use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const API_PREFIX: &str = "/v1";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Application {
    pub id: Uuid,
    pub href: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateApplication {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Shared server state. Tests keep a clone to inspect what the server saw.
#[derive(Clone, Default)]
pub struct ServerState {
    applications: Arc<RwLock<HashMap<Uuid, Application>>>,
    hits: Arc<AtomicU64>,
    authorization: Arc<RwLock<Option<String>>>,
}

impl ServerState {
    /// Requests served so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    /// `Authorization` header of the most recent request, if it had one.
    pub async fn last_authorization(&self) -> Option<String> {
        self.authorization.read().await.clone()
    }
}

pub fn app() -> Router {
    app_with_state(ServerState::default())
}

pub fn app_with_state(state: ServerState) -> Router {
    let api = Router::new()
        .route("/tenants/current", get(current_tenant))
        .route("/applications", get(list_applications).post(create_application))
        .route(
            "/applications/{id}",
            get(get_application).delete(delete_application),
        )
        .route("/tasks", post(enqueue_task))
        .route("/login", post(login));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(middleware::from_fn_with_state(state.clone(), track))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, ServerState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: ServerState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn track(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let auth = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    *state.authorization.write().await = auth;
    next.run(request).await
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": 404, "code": 404, "message": message })),
    )
        .into_response()
}

async fn current_tenant() -> Json<Value> {
    Json(json!({
        "href": format!("{API_PREFIX}/tenants/current"),
        "name": "acme",
        "key": "acme-key",
    }))
}

async fn list_applications(State(state): State<ServerState>) -> Json<Value> {
    let apps = state.applications.read().await;
    let mut items: Vec<Application> = apps.values().cloned().collect();
    items.sort_by(|a, b| a.name.cmp(&b.name));
    Json(json!({ "size": items.len(), "items": items }))
}

async fn create_application(
    State(state): State<ServerState>,
    Json(input): Json<CreateApplication>,
) -> (StatusCode, Json<Application>) {
    let id = Uuid::new_v4();
    let app = Application {
        id,
        href: format!("{API_PREFIX}/applications/{id}"),
        name: input.name,
        description: input.description,
    };
    state.applications.write().await.insert(id, app.clone());
    (StatusCode::CREATED, Json(app))
}

async fn get_application(State(state): State<ServerState>, Path(id): Path<Uuid>) -> Response {
    let apps = state.applications.read().await;
    match apps.get(&id) {
        Some(app) => Json(app.clone()).into_response(),
        None => not_found("application not found"),
    }
}

async fn delete_application(State(state): State<ServerState>, Path(id): Path<Uuid>) -> Response {
    let mut apps = state.applications.write().await;
    match apps.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found("application not found"),
    }
}

async fn enqueue_task() -> StatusCode {
    StatusCode::ACCEPTED
}

async fn login(Form(form): Form<LoginForm>) -> Response {
    if form.password == "correct horse" {
        Json(json!({ "account": { "username": form.username } })).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": 400, "code": 7100, "message": "invalid username or password" })),
        )
            .into_response()
    }
}
