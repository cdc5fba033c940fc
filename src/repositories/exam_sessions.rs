use serde::{Deserialize, Serialize};

use crate::core::state::AppState;
use crate::db::types::TestState;
use crate::repositories::RepoError;

/// Per-student exam lifecycle record, held in the cache for the duration
/// of the exam window. The durable store only ever sees the final
/// `is_tested` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ExamSession {
    pub(crate) state: TestState,
    pub(crate) seed_id: Option<i32>,
    pub(crate) begin_at: Option<i64>,
}

impl ExamSession {
    pub(crate) fn not_tested() -> Self {
        Self { state: TestState::NotTested, seed_id: None, begin_at: None }
    }

    pub(crate) fn tested(seed_id: Option<i32>) -> Self {
        Self { state: TestState::Tested, seed_id, begin_at: None }
    }
}

fn key(student_id: &str) -> String {
    format!("session:{student_id}")
}

pub(crate) async fn get(
    state: &AppState,
    student_id: &str,
) -> Result<Option<ExamSession>, RepoError> {
    Ok(state.redis().get_json::<ExamSession>(&key(student_id)).await?)
}

pub(crate) async fn set(
    state: &AppState,
    student_id: &str,
    session: &ExamSession,
) -> Result<(), RepoError> {
    state.redis().set_json(&key(student_id), session).await?;
    Ok(())
}
