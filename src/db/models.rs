use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{QuestionKind, Role};

/// Login account for any of the three roles. Durable-store only; the
/// cache never holds credentials.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct Account {
    pub(crate) id: String,
    pub(crate) hashed_password: String,
    pub(crate) real_name: String,
    pub(crate) role: Role,
    pub(crate) department: Option<i16>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Canonical student record. Created once at exam setup, mutated exactly
/// once at scoring, reconciled into the durable store by the synchronizer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub(crate) struct Student {
    pub(crate) id: String,
    pub(crate) real_name: String,
    pub(crate) department: i16,
    pub(crate) question_seed_id: Option<i32>,
    pub(crate) choices: Option<Vec<i16>>,
    pub(crate) score: Option<i32>,
    pub(crate) finished_at: Option<PrimitiveDateTime>,
    pub(crate) time_consumed_seconds: Option<i64>,
    pub(crate) is_tested: bool,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Counselor-facing projection of a student, kept alongside the full
/// record in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StudentView {
    pub(crate) id: String,
    pub(crate) real_name: String,
    pub(crate) department: i16,
    pub(crate) score: Option<i32>,
    pub(crate) is_tested: bool,
}

impl From<&Student> for StudentView {
    fn from(student: &Student) -> Self {
        Self {
            id: student.id.clone(),
            real_name: student.real_name.clone(),
            department: student.department,
            score: student.score,
            is_tested: student.is_tested,
        }
    }
}

/// One answer-key entry: correct answer value and point weight for a
/// question. Immutable reference data.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) id: i32,
    pub(crate) kind: QuestionKind,
    pub(crate) answer: i16,
    pub(crate) points: i32,
}

/// A fixed-size randomized paper: ordered question ids, choice questions
/// first, then true/false. Immutable after creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub(crate) struct QuestionSeed {
    pub(crate) id: i32,
    pub(crate) question_ids: Vec<i32>,
}
