use sqlx::PgPool;

use crate::core::state::AppState;
use crate::db::models::{Student, StudentView};
use crate::repositories::RepoError;

const COLUMNS: &str = "\
    id, real_name, department, question_seed_id, choices, score, \
    finished_at, time_consumed_seconds, is_tested, updated_at";

fn key(id: &str) -> String {
    format!("student:{id}")
}

fn view_key(id: &str) -> String {
    format!("student_view:{id}")
}

/// Cache-first read; a miss falls through to the durable store and
/// repopulates the cache on the way out.
pub(crate) async fn get(state: &AppState, id: &str) -> Result<Option<Student>, RepoError> {
    if let Some(student) = state.redis().get_json::<Student>(&key(id)).await? {
        return Ok(Some(student));
    }

    let Some(student) = find_by_id(state.db(), id).await? else {
        return Ok(None);
    };

    state.redis().set_json(&key(id), &student).await?;
    Ok(Some(student))
}

pub(crate) async fn set(state: &AppState, student: &Student) -> Result<(), RepoError> {
    state.redis().set_json(&key(&student.id), student).await?;
    Ok(())
}

pub(crate) async fn set_view(state: &AppState, view: &StudentView) -> Result<(), RepoError> {
    state.redis().set_json(&view_key(&view.id), view).await?;
    Ok(())
}

pub(crate) async fn set_range(state: &AppState, students: &[Student]) -> Result<(), RepoError> {
    for student in students {
        state.redis().set_json(&key(&student.id), student).await?;
        state.redis().set_json(&view_key(&student.id), &StudentView::from(student)).await?;
    }
    Ok(())
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!("SELECT {COLUMNS} FROM students WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_all(pool: &PgPool) -> Result<Vec<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!("SELECT {COLUMNS} FROM students ORDER BY id"))
        .fetch_all(pool)
        .await
}

pub(crate) async fn distinct_departments(pool: &PgPool) -> Result<Vec<i16>, sqlx::Error> {
    sqlx::query_scalar::<_, i16>("SELECT DISTINCT department FROM students ORDER BY department")
        .fetch_all(pool)
        .await
}

pub(crate) async fn insert(pool: &PgPool, student: &Student) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO students (
            id, real_name, department, question_seed_id, choices, score,
            finished_at, time_consumed_seconds, is_tested, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
    )
    .bind(&student.id)
    .bind(&student.real_name)
    .bind(student.department)
    .bind(student.question_seed_id)
    .bind(&student.choices)
    .bind(student.score)
    .bind(student.finished_at)
    .bind(student.time_consumed_seconds)
    .bind(student.is_tested)
    .bind(student.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Idempotent write keyed by student id; the synchronizer may deliver the
/// same record more than once.
pub(crate) async fn upsert(pool: &PgPool, student: &Student) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO students (
            id, real_name, department, question_seed_id, choices, score,
            finished_at, time_consumed_seconds, is_tested, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        ON CONFLICT (id) DO UPDATE SET
            real_name = EXCLUDED.real_name,
            department = EXCLUDED.department,
            question_seed_id = EXCLUDED.question_seed_id,
            choices = EXCLUDED.choices,
            score = EXCLUDED.score,
            finished_at = EXCLUDED.finished_at,
            time_consumed_seconds = EXCLUDED.time_consumed_seconds,
            is_tested = EXCLUDED.is_tested,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(&student.id)
    .bind(&student.real_name)
    .bind(student.department)
    .bind(student.question_seed_id)
    .bind(&student.choices)
    .bind(student.score)
    .bind(student.finished_at)
    .bind(student.time_consumed_seconds)
    .bind(student.is_tested)
    .bind(student.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}
