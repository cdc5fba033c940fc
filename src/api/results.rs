use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStudent, CurrentUser};
use crate::core::state::AppState;
use crate::db::types::{department_of, is_student_id, Role};
use crate::schemas::result::{ResultResponse, SubmitRequest};
use crate::services::scoring;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit).get(own_result))
        .route("/:student_id", get(result_by_id))
}

async fn submit(
    State(state): State<AppState>,
    CurrentUser(account): CurrentUser,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<ResultResponse>, ApiError> {
    let student_id = match account.role {
        Role::Student => {
            if payload.student_id.as_deref().is_some_and(|id| id != account.id) {
                return Err(ApiError::Forbidden("Students may only submit their own exam"));
            }
            account.id
        }
        Role::Administrator => payload
            .student_id
            .ok_or_else(|| ApiError::BadRequest("student_id is required".to_string()))?,
        Role::Counselor => return Err(ApiError::Forbidden("Counselors cannot submit exams")),
    };

    if !is_student_id(&student_id) {
        return Err(ApiError::BadRequest("Invalid student id format".to_string()));
    }

    let result = scoring::submit(&state, &student_id, &payload.answers).await?;
    Ok(Json(result))
}

async fn own_result(
    State(state): State<AppState>,
    CurrentStudent(account): CurrentStudent,
) -> Result<Json<ResultResponse>, ApiError> {
    let result = scoring::get_result(&state, &account.id).await?;
    Ok(Json(result))
}

async fn result_by_id(
    State(state): State<AppState>,
    CurrentUser(account): CurrentUser,
    Path(student_id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    if !is_student_id(&student_id) {
        return Err(ApiError::BadRequest("Invalid student id format".to_string()));
    }

    match account.role {
        Role::Administrator => {}
        Role::Counselor => {
            if account.department != department_of(&student_id) {
                return Err(ApiError::Forbidden("Counselors may only view their own department"));
            }
        }
        Role::Student => {
            if account.id != student_id {
                return Err(ApiError::Forbidden("Students may only view their own result"));
            }
        }
    }

    let result = scoring::get_result(&state, &student_id).await?;
    Ok(Json(result))
}
