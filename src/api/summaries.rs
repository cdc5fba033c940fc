use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentAdmin, CurrentUser};
use crate::core::state::AppState;
use crate::db::types::Role;
use crate::repositories::summaries;
use crate::schemas::summary::{DepartmentSummary, SchoolSummary};

#[derive(Debug, Deserialize)]
struct DepartmentQuery {
    department: Option<i16>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/department", get(department)).route("/school", get(school))
}

async fn department(
    State(state): State<AppState>,
    CurrentUser(account): CurrentUser,
    Query(query): Query<DepartmentQuery>,
) -> Result<Json<DepartmentSummary>, ApiError> {
    let department = match account.role {
        Role::Counselor => account.department.ok_or_else(|| {
            ApiError::internal("counselor account without a department", "Invalid account")
        })?,
        Role::Administrator => query
            .department
            .ok_or_else(|| ApiError::BadRequest("department query parameter is required".to_string()))?,
        Role::Student => return Err(ApiError::Forbidden("Insufficient permissions")),
    };

    let summary = summaries::department(&state, department)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load department summary"))?;
    Ok(Json(summary))
}

async fn school(
    State(state): State<AppState>,
    CurrentAdmin(_account): CurrentAdmin,
) -> Result<Json<SchoolSummary>, ApiError> {
    let summary = summaries::school(&state)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load school summary"))?;
    Ok(Json(summary))
}
