use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use super::AppState;
use crate::cultivar::{MatchError, MatchQuery};
use crate::runs::repository::StoreError;
use crate::runs::service::{
    AddBinding, AddNote, AddPhase, CreateRun, EndRun, MatchCultivar, ServiceError, SetCultivar,
};
use crate::runs::{PHASE_VOCABULARY, RunStatus, RunSummary};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async {
                Json(json!({
                    "status": "ok",
                }))
            }),
        )
        .route("/runs", post(create_run).get(list_runs))
        .route("/runs/summary", get(runs_summary))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/phases", post(add_phase))
        .route("/runs/{id}/notes", post(add_note))
        .route("/runs/{id}/bindings", post(add_binding))
        .route("/runs/{id}/end", post(end_run))
        .route("/runs/{id}/cultivar", post(set_cultivar))
        .route("/phases", get(phase_vocabulary))
        .route("/cultivars/search", get(search_cultivars))
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn not_found(req: axum::extract::Request) -> impl IntoResponse {
    tracing::warn!("unhandled path: {}", req.uri());
    (StatusCode::NOT_FOUND, "Not Found")
}

/// Map service failures onto the error taxonomy: unknown run 404, bad input
/// 400, catalogue trouble 502. Nothing here is allowed to take the process
/// down.
fn error_response(err: ServiceError) -> Response {
    let status = match &err {
        ServiceError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::Match(MatchError::MissingQuery) => StatusCode::BAD_REQUEST,
        ServiceError::Match(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

async fn create_run(
    State(state): State<AppState>,
    Json(req): Json<CreateRun>,
) -> Response {
    match state.service.create_run(req).await {
        Ok(run) => (StatusCode::CREATED, Json(run)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    Json(state.service.summaries().await)
}

async fn runs_summary(State(state): State<AppState>) -> Json<Value> {
    let runs = state.service.list_runs().await;
    let active = runs
        .iter()
        .filter(|r| r.status == RunStatus::Active)
        .count();
    Json(json!({
        "total_runs": runs.len(),
        "active_runs": active,
    }))
}

async fn get_run(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.get_run(&id).await {
        Some(run) => Json(run).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("run not found: {id}")})),
        )
            .into_response(),
    }
}

async fn add_phase(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddPhase>,
) -> Response {
    match state.service.add_phase(&id, req).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(e),
    }
}

async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddNote>,
) -> Response {
    match state.service.add_note(&id, req).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(e),
    }
}

async fn add_binding(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddBinding>,
) -> Response {
    match state.service.add_binding(&id, req).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(e),
    }
}

async fn end_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<EndRun>,
) -> Response {
    match state.service.end_run(&id, req).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(e),
    }
}

/// The two cultivar policies stay distinct modes rather than one collapsed
/// behavior: a manual snapshot is written as given, a lookup goes through
/// the catalogue matcher.
#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
enum CultivarRequest {
    Manual(SetCultivar),
    Lookup(MatchCultivar),
}

async fn set_cultivar(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CultivarRequest>,
) -> Response {
    let result = match req {
        CultivarRequest::Manual(manual) => state.service.set_cultivar(&id, manual).await,
        CultivarRequest::Lookup(lookup) => state.service.match_cultivar(&id, lookup).await,
    };
    match result {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(e),
    }
}

async fn phase_vocabulary() -> Json<Value> {
    Json(json!({ "phases": PHASE_VOCABULARY }))
}

async fn search_cultivars(
    State(state): State<AppState>,
    Query(query): Query<MatchQuery>,
) -> Json<Value> {
    let candidates = state.service.search_cultivars(&query).await;
    Json(json!({ "candidates": candidates }))
}
