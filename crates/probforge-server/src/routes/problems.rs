use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;
use uuid::Uuid;

use probforge_core::model::{Problem, ProblemDraft, ProblemFilter, VariantOverrides};

use crate::extract::Caller;
use crate::response::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_problem).get(list_problems))
        .route("/:id", get(get_problem).delete(delete_problem))
        .route("/:id/children", get(list_children))
        .route("/:id/ancestors", get(list_ancestors))
        .route("/:id/generate", post(generate_variant))
}

async fn create_problem(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ProblemDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Problem>), AppError> {
    let Json(draft) = payload?;
    let problem = state.lineage.create_problem(draft, caller.0).await?;
    Ok((StatusCode::CREATED, Json(problem)))
}

async fn list_problems(
    State(state): State<AppState>,
    filter: Result<Query<ProblemFilter>, QueryRejection>,
) -> Result<Json<Vec<Problem>>, AppError> {
    let Query(filter) = filter?;
    Ok(Json(state.lineage.list_problems(&filter).await?))
}

async fn get_problem(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Problem>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.lineage.get_problem(id).await?))
}

async fn delete_problem(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    state.lineage.delete_problem(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_children(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<Problem>>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.lineage.list_children(id).await?))
}

async fn list_ancestors(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<Problem>>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.lineage.list_ancestors(id).await?))
}

/// The body is optional; an empty body means "inherit everything".
async fn generate_variant(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<(StatusCode, Json<Problem>), AppError> {
    let Path(id) = id?;
    let overrides = parse_overrides(&body)?;
    let variant = state.orchestrator.generate_similar(id, &overrides).await?;
    info!(parent_id = %id, variant_id = %variant.id, "variant served");
    Ok((StatusCode::CREATED, Json(variant)))
}

fn parse_overrides(body: &[u8]) -> Result<VariantOverrides, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(VariantOverrides::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::validation(format!("invalid overrides body: {e}")))
}
