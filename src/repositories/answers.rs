use sqlx::PgPool;

use crate::core::state::AppState;
use crate::db::models::Question;
use crate::db::types::QuestionKind;
use crate::repositories::RepoError;

const COLUMNS: &str = "id, kind, answer, points";

fn key(id: i32) -> String {
    format!("answer:{id}")
}

pub(crate) async fn get(state: &AppState, id: i32) -> Result<Option<Question>, RepoError> {
    if let Some(question) = state.redis().get_json::<Question>(&key(id)).await? {
        return Ok(Some(question));
    }

    let Some(question) = find_by_id(state.db(), id).await? else {
        return Ok(None);
    };

    state.redis().set_json(&key(id), &question).await?;
    Ok(Some(question))
}

/// Warmup path: pushes the whole answer key into the cache so scoring
/// never has to touch the durable store.
pub(crate) async fn load_all_to_cache(state: &AppState) -> Result<usize, RepoError> {
    let questions = list_all(state.db()).await?;
    for question in &questions {
        state.redis().set_json(&key(question.id), question).await?;
    }
    Ok(questions.len())
}

pub(crate) async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_all(pool: &PgPool) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions ORDER BY id"))
        .fetch_all(pool)
        .await
}

pub(crate) async fn ids_by_kind(
    pool: &PgPool,
    kind: QuestionKind,
) -> Result<Vec<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT id FROM questions WHERE kind = $1 ORDER BY id")
        .bind(kind)
        .fetch_all(pool)
        .await
}
