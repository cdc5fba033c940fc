use crate::core::state::AppState;
use crate::repositories::RepoError;
use crate::schemas::result::ResultResponse;

fn key(student_id: &str) -> String {
    format!("result:{student_id}")
}

/// Results are cache-only: a lost entry is rebuilt deterministically from
/// the student record and the answer key.
pub(crate) async fn get(
    state: &AppState,
    student_id: &str,
) -> Result<Option<ResultResponse>, RepoError> {
    Ok(state.redis().get_json::<ResultResponse>(&key(student_id)).await?)
}

pub(crate) async fn set(
    state: &AppState,
    student_id: &str,
    result: &ResultResponse,
) -> Result<(), RepoError> {
    state.redis().set_json(&key(student_id), result).await?;
    Ok(())
}
