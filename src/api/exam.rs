use axum::{extract::State, routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::core::state::AppState;
use crate::schemas::exam::BeginExamResponse;
use crate::services::scoring;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/begin", post(begin))
}

async fn begin(
    State(state): State<AppState>,
    CurrentStudent(account): CurrentStudent,
) -> Result<Json<BeginExamResponse>, ApiError> {
    let response = scoring::begin(&state, &account.id).await?;
    Ok(Json(response))
}
