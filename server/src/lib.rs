use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use parking_lot::RwLock;
use qps_core::{
    Document, IndexConfig, IndexStatus, Note, QpsError, QpsPersistence, QpsSearchResult, QpsService, SledIndexTable,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u128,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<QpsSearchResult>,
}

#[derive(Deserialize)]
pub struct NotePayload {
    pub content: String,
}

pub struct AppConfig {
    /// sled database directory holding the persisted index
    pub db_path: PathBuf,
    /// Used only when no valid index is stored yet.
    pub index_config: IndexConfig,
    pub admin_token: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RwLock<QpsService>>,
    pub persistence: Arc<QpsPersistence<SledIndexTable>>,
    pub admin_token: Option<String>,
    /// Held from snapshot to write so saves land in the order they were taken.
    pub save_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(engine: QpsService, persistence: QpsPersistence<SledIndexTable>, admin_token: Option<String>) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            persistence: Arc::new(persistence),
            admin_token,
            save_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

type ApiError = (StatusCode, String);

pub async fn build_app(config: AppConfig) -> Result<Router> {
    let persistence = QpsPersistence::new(SledIndexTable::open(&config.db_path)?);
    let engine = match persistence.load_index().await? {
        Some(service) => service,
        None => {
            tracing::info!(db = %config.db_path.display(), "no stored index, starting empty");
            QpsService::new(config.index_config)
        }
    };
    let state = AppState::new(engine, persistence, config.admin_token);
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/status", get(status_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/sync", post(sync_handler))
        .route("/index/notes/:note_id", put(put_note_handler).delete(delete_note_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, MAX_K);
    let mut results = state.engine.read().search(&params.q, usize::MAX);
    let total_hits = results.len();
    results.truncate(k);

    let elapsed = start.elapsed();
    Json(SearchResponse { query: params.q, took_ms: elapsed.as_millis(), took_s: elapsed.as_secs_f64(), total_hits, results })
}

pub async fn status_handler(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.engine.read().index_status())
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> Result<Json<Document>, ApiError> {
    state
        .engine
        .read()
        .document(&doc_id)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("document {doc_id} not found")))
}

// --- Admin endpoints ---
async fn sync_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(notes): Json<Vec<Note>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    // Rebuild outside the lock and publish the finished engine in one step.
    let config = *state.engine.read().config();
    let mut fresh = QpsService::new(config);
    let synced = fresh.sync_all_notes(&notes);
    *state.engine.write() = fresh;
    persist(&state).await;
    Ok(Json(serde_json::json!({ "synced": synced })))
}

async fn put_note_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(note_id): Path<String>,
    Json(payload): Json<NotePayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let tokens = state.engine.write().index_note(&note_id, &payload.content).map_err(|e| match e {
        QpsError::InvalidDocument(msg) => (StatusCode::BAD_REQUEST, msg),
        other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })?;
    persist(&state).await;
    Ok(Json(serde_json::json!({ "note_id": note_id, "tokens": tokens })))
}

async fn delete_note_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(note_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    authorize(&state, &headers)?;
    let removed = state.engine.write().remove_note(&note_id);
    if removed.is_none() {
        return Err((StatusCode::NOT_FOUND, format!("document {note_id} not found")));
    }
    persist(&state).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Auto-save a copy of the current engine. The engine lock is released before
/// the write; the save lock is not, so an older copy never overwrites a newer one.
async fn persist(state: &AppState) {
    let _guard = state.save_lock.lock().await;
    let snapshot = state.engine.read().clone();
    state.persistence.auto_save(&snapshot).await;
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
