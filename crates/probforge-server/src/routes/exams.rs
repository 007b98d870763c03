use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use probforge_core::model::{Exam, ExamDraft, ExamEntry, ExamProblem};

use crate::extract::Caller;
use crate::response::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam).get(list_exams))
        .route("/:id", get(get_exam))
        .route("/:id/publish", put(set_published))
        .route("/:id/problems", get(list_exam_problems).post(add_problem))
        .route(
            "/:id/problems/:problem_id",
            put(reorder_problem).delete(remove_problem),
        )
}

#[derive(Debug, Deserialize)]
struct ExamQuery {
    #[serde(default)]
    owner_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct PublishRequest {
    is_published: bool,
}

#[derive(Debug, Deserialize)]
struct AddProblemRequest {
    problem_id: Uuid,
    #[serde(default)]
    order_index: i32,
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    order_index: i32,
}

async fn create_exam(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ExamDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Exam>), AppError> {
    let owner_id = caller.require()?;
    let Json(draft) = payload?;
    let exam = state.exams.create_exam(draft, owner_id).await?;
    Ok((StatusCode::CREATED, Json(exam)))
}

async fn list_exams(
    State(state): State<AppState>,
    query: Result<Query<ExamQuery>, QueryRejection>,
) -> Result<Json<Vec<Exam>>, AppError> {
    let Query(query) = query?;
    Ok(Json(state.exams.list_exams(query.owner_id).await?))
}

async fn get_exam(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Exam>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.exams.get_exam(id).await?))
}

async fn set_published(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<Exam>, AppError> {
    let Path(id) = id?;
    let Json(request) = payload?;
    Ok(Json(state.exams.set_published(id, request.is_published).await?))
}

async fn list_exam_problems(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<ExamEntry>>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.exams.list_entries(id).await?))
}

async fn add_problem(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AddProblemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ExamProblem>), AppError> {
    let Path(id) = id?;
    let Json(request) = payload?;
    let link = state
        .exams
        .add_problem(id, request.problem_id, request.order_index)
        .await?;
    Ok((StatusCode::CREATED, Json(link)))
}

async fn reorder_problem(
    State(state): State<AppState>,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
    payload: Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Json<ExamProblem>, AppError> {
    let Path((exam_id, problem_id)) = ids?;
    let Json(request) = payload?;
    Ok(Json(
        state
            .exams
            .reorder(exam_id, problem_id, request.order_index)
            .await?,
    ))
}

async fn remove_problem(
    State(state): State<AppState>,
    ids: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path((exam_id, problem_id)) = ids?;
    state.exams.remove_problem(exam_id, problem_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
