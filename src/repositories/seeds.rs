use sqlx::PgPool;

use crate::core::state::AppState;
use crate::db::models::QuestionSeed;
use crate::repositories::RepoError;

fn key(id: i32) -> String {
    format!("seed:{id}")
}

pub(crate) async fn get(state: &AppState, id: i32) -> Result<Option<QuestionSeed>, RepoError> {
    if let Some(seed) = state.redis().get_json::<QuestionSeed>(&key(id)).await? {
        return Ok(Some(seed));
    }

    let Some(seed) = find_by_id(state.db(), id).await? else {
        return Ok(None);
    };

    state.redis().set_json(&key(id), &seed).await?;
    Ok(Some(seed))
}

pub(crate) async fn set_range(state: &AppState, seeds: &[QuestionSeed]) -> Result<(), RepoError> {
    for seed in seeds {
        state.redis().set_json(&key(seed.id), seed).await?;
    }
    Ok(())
}

pub(crate) async fn list_all(pool: &PgPool) -> Result<Vec<QuestionSeed>, sqlx::Error> {
    sqlx::query_as::<_, QuestionSeed>("SELECT id, question_ids FROM question_seeds ORDER BY id")
        .fetch_all(pool)
        .await
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: i32,
) -> Result<Option<QuestionSeed>, sqlx::Error> {
    sqlx::query_as::<_, QuestionSeed>(
        "SELECT id, question_ids FROM question_seeds WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Seeds are regenerated as a whole batch per exam cycle; the previous
/// batch is discarded.
pub(crate) async fn replace_all(
    pool: &PgPool,
    seeds: &[QuestionSeed],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM question_seeds").execute(&mut *tx).await?;
    for seed in seeds {
        sqlx::query("INSERT INTO question_seeds (id, question_ids) VALUES ($1, $2)")
            .bind(seed.id)
            .bind(&seed.question_ids)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}
