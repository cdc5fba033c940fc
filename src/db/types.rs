use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "accountrole", rename_all = "lowercase")]
pub(crate) enum Role {
    Administrator,
    Counselor,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "questionkind", rename_all = "lowercase")]
pub(crate) enum QuestionKind {
    Choice,
    TrueFalse,
}

/// Lifecycle of a student's single exam attempt. Lives in the cache-backed
/// session record, never in the durable store (durable keeps `is_tested`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum TestState {
    NotTested,
    Testing,
    Tested,
}

const STUDENT_ID_LEN: usize = 8;

pub(crate) fn is_student_id(id: &str) -> bool {
    id.len() == STUDENT_ID_LEN && id.bytes().all(|b| b.is_ascii_digit())
}

/// Student identifiers encode the department in their leading two digits.
pub(crate) fn department_of(id: &str) -> Option<i16> {
    if !is_student_id(id) {
        return None;
    }
    id[..2].parse::<i16>().ok()
}
