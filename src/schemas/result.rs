use serde::{Deserialize, Serialize};

/// One position of the submit-answers payload. Callers must send answers
/// in the same order as the assigned seed's question ids.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct SubmittedAnswer {
    pub(crate) id: i32,
    pub(crate) answer: i16,
}

/// Submit-answers payload. `student_id` is only honored for administrator
/// callers; students always submit their own exam.
#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    pub(crate) student_id: Option<String>,
    pub(crate) answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ResultDetail {
    pub(crate) id: i32,
    pub(crate) correct: i16,
    pub(crate) submit: i16,
}

/// The scored outcome returned to the caller and cached verbatim, so a
/// repeat read yields a byte-identical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ResultResponse {
    pub(crate) score: i32,
    pub(crate) time_finished: String,
    pub(crate) time_consumed_seconds: i64,
    pub(crate) details: Vec<ResultDetail>,
}
