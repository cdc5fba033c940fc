use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct BeginExamResponse {
    pub(crate) seed_id: i32,
    pub(crate) question_ids: Vec<i32>,
    pub(crate) begin_at: i64,
    pub(crate) duration_minutes: u64,
}
