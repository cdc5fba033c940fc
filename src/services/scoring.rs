use rand::Rng;
use thiserror::Error;

use crate::core::state::AppState;
use crate::core::time;
use crate::db::models::StudentView;
use crate::db::types::TestState;
use crate::repositories::exam_sessions::ExamSession;
use crate::repositories::{exam_sessions, results, seeds, students, summaries, sync, RepoError};
use crate::schemas::exam::BeginExamResponse;
use crate::schemas::result::{ResultDetail, ResultResponse, SubmittedAnswer};
use crate::services::question_seeds::{self, SeedError};

/// A submission landing almost immediately after the exam opened, or after
/// the allotted time plus this slack, is rejected as outside the window.
const WINDOW_SLACK_SECONDS: i64 = 180;

#[derive(Debug, Error)]
pub(crate) enum ScoringError {
    #[error("the exam has not been started")]
    TestNotStarted,
    #[error("submission outside the allowed time window ({elapsed_seconds}s elapsed)")]
    TimeWindow { elapsed_seconds: i64 },
    #[error("expected {expected} answers, got {got}")]
    MalformedSubmission { expected: usize, got: usize },
    #[error("the exam has already been scored")]
    AlreadyTested,
    #[error("a scoring attempt is already in progress")]
    ScoringInProgress,
    #[error("no question seed assigned")]
    SeedNotAssigned,
    #[error("answer id mismatch at position {position}: got question {id}")]
    AnswerIdMismatch { position: usize, id: i32 },
    #[error("student not found")]
    StudentNotFound,
    #[error("question seed not found")]
    SeedNotFound,
    #[error("the exam has not been completed")]
    NotCompleted,
    #[error("inconsistent student record: {0}")]
    CorruptRecord(&'static str),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Strict on both ends: exactly the slack (too early) and exactly the
/// duration plus slack (too late) are rejected.
fn within_window(elapsed_seconds: i64, duration_minutes: u64) -> bool {
    let ceiling = duration_minutes as i64 * 60 + WINDOW_SLACK_SECONDS;
    elapsed_seconds > WINDOW_SLACK_SECONDS && elapsed_seconds < ceiling
}

impl From<SeedError> for ScoringError {
    fn from(err: SeedError) -> Self {
        match err {
            SeedError::SeedNotFound(_) => ScoringError::SeedNotFound,
            SeedError::QuestionNotFound(_) => {
                ScoringError::CorruptRecord("seed references a question with no answer key")
            }
            SeedError::Repo(err) => ScoringError::Repo(err),
        }
    }
}

/// Opens the exam for a student. Idempotent while the exam is running: a
/// reconnecting client gets the same seed and the original start time, so
/// the clock is never reset.
pub(crate) async fn begin(
    state: &AppState,
    student_id: &str,
) -> Result<BeginExamResponse, ScoringError> {
    let contest = state.settings().contest();
    let session = exam_sessions::get(state, student_id).await?;

    if let Some(session) = &session {
        match session.state {
            TestState::Tested => return Err(ScoringError::AlreadyTested),
            TestState::Testing => {
                let seed_id = session.seed_id.ok_or(ScoringError::SeedNotAssigned)?;
                let begin_at = session.begin_at.ok_or(ScoringError::TestNotStarted)?;
                let seed =
                    seeds::get(state, seed_id).await?.ok_or(ScoringError::SeedNotFound)?;
                return Ok(BeginExamResponse {
                    seed_id,
                    question_ids: seed.question_ids,
                    begin_at,
                    duration_minutes: contest.test_duration_minutes,
                });
            }
            TestState::NotTested => {}
        }
    }

    let mut student =
        students::get(state, student_id).await?.ok_or(ScoringError::StudentNotFound)?;
    if student.is_tested {
        return Err(ScoringError::AlreadyTested);
    }

    let seed_id = match student.question_seed_id {
        Some(seed_id) => seed_id,
        None => {
            let seed_id = rand::thread_rng().gen_range(1..=contest.question_seed_scale as i32);
            student.question_seed_id = Some(seed_id);
            student.updated_at = time::primitive_now_utc();
            students::set(state, &student).await?;
            sync::enqueue_pending(state, student_id).await?;
            seed_id
        }
    };
    let seed = seeds::get(state, seed_id).await?.ok_or(ScoringError::SeedNotFound)?;

    let begin_at = time::unix_now();
    let session =
        ExamSession { state: TestState::Testing, seed_id: Some(seed_id), begin_at: Some(begin_at) };
    exam_sessions::set(state, student_id, &session).await?;

    tracing::info!(student_id, seed_id, "exam started");
    Ok(BeginExamResponse {
        seed_id,
        question_ids: seed.question_ids,
        begin_at,
        duration_minutes: contest.test_duration_minutes,
    })
}

/// Scores a submission. At most one call per student ever reaches the
/// scoring section: a cache lock admits a single scorer, and the session
/// flips to `Tested` before the lock is released, so a second attempt is
/// turned away at one gate or the other.
pub(crate) async fn submit(
    state: &AppState,
    student_id: &str,
    answers: &[SubmittedAnswer],
) -> Result<ResultResponse, ScoringError> {
    let session =
        exam_sessions::get(state, student_id).await?.ok_or(ScoringError::TestNotStarted)?;
    match session.state {
        TestState::NotTested => return Err(ScoringError::TestNotStarted),
        TestState::Tested => return Err(ScoringError::AlreadyTested),
        TestState::Testing => {}
    }
    let begin_at = session.begin_at.ok_or(ScoringError::TestNotStarted)?;

    let contest = state.settings().contest();
    let elapsed_seconds = time::unix_now() - begin_at;
    if !within_window(elapsed_seconds, contest.test_duration_minutes) {
        return Err(ScoringError::TimeWindow { elapsed_seconds });
    }

    let expected = contest.total_question_count();
    if answers.len() != expected {
        return Err(ScoringError::MalformedSubmission { expected, got: answers.len() });
    }

    if !sync::try_acquire_scoring_lock(state, student_id).await? {
        return Err(ScoringError::ScoringInProgress);
    }

    let outcome = score_locked(state, student_id, &session, answers, elapsed_seconds).await;
    match &outcome {
        Ok(_) => {}
        // A concurrent attempt scored the student between our session read
        // and the lock grant. Tested is terminal; writing the stale session
        // back would regress it.
        Err(ScoringError::AlreadyTested) => {
            let tested = ExamSession::tested(session.seed_id);
            if let Err(err) = exam_sessions::set(state, student_id, &tested).await {
                tracing::error!(student_id, error = %err, "failed to restore tested session");
            }
        }
        Err(_) => {
            // Put the session back so the student can retry once the cause
            // is fixed; a stuck lock would otherwise block them until the
            // TTL.
            let revert = ExamSession {
                state: TestState::Testing,
                seed_id: session.seed_id,
                begin_at: session.begin_at,
            };
            if let Err(err) = exam_sessions::set(state, student_id, &revert).await {
                tracing::error!(student_id, error = %err, "failed to revert exam session");
            }
        }
    }
    if let Err(err) = sync::release_scoring_lock(state, student_id).await {
        tracing::error!(student_id, error = %err, "failed to release scoring lock");
    }

    outcome
}

async fn score_locked(
    state: &AppState,
    student_id: &str,
    session: &ExamSession,
    answers: &[SubmittedAnswer],
    elapsed_seconds: i64,
) -> Result<ResultResponse, ScoringError> {
    let seed_id = session.seed_id.ok_or(ScoringError::SeedNotAssigned)?;
    let mut student =
        students::get(state, student_id).await?.ok_or(ScoringError::StudentNotFound)?;
    if student.is_tested {
        return Err(ScoringError::AlreadyTested);
    }

    let key = question_seeds::answers_by_seed_id(state, seed_id).await?;
    if key.len() != answers.len() {
        return Err(ScoringError::MalformedSubmission { expected: key.len(), got: answers.len() });
    }

    let mut score = 0i32;
    let mut details = Vec::with_capacity(key.len());
    for (position, (correct, submitted)) in key.iter().zip(answers).enumerate() {
        if correct.id != submitted.id {
            return Err(ScoringError::AnswerIdMismatch { position, id: submitted.id });
        }
        if correct.answer == submitted.answer {
            score += correct.points;
        }
        details.push(ResultDetail { id: correct.id, correct: correct.answer, submit: submitted.answer });
    }

    let finished_at = time::primitive_now_utc();
    let result = ResultResponse {
        score,
        time_finished: time::format_primitive(finished_at),
        time_consumed_seconds: elapsed_seconds,
        details,
    };

    student.question_seed_id = Some(seed_id);
    student.choices = Some(answers.iter().map(|a| a.answer).collect());
    student.score = Some(score);
    student.finished_at = Some(finished_at);
    student.time_consumed_seconds = Some(elapsed_seconds);
    student.is_tested = true;
    student.updated_at = finished_at;

    // Summary first: a scored student must never be missing from the
    // aggregates. A failed student write reverts the session, and the retry
    // will count the student a second time.
    summaries::apply_student(state, &student).await?;
    students::set(state, &student).await?;
    students::set_view(state, &StudentView::from(&student)).await?;
    results::set(state, student_id, &result).await?;
    sync::enqueue_pending(state, student_id).await?;
    exam_sessions::set(state, student_id, &ExamSession::tested(Some(seed_id))).await?;

    metrics::counter!("contest_submissions_scored_total").increment(1);
    tracing::info!(student_id, score, elapsed_seconds, "submission scored");
    Ok(result)
}

/// Idempotent read of a scored exam. A cache hit returns the stored record
/// verbatim; on a miss the same record is rebuilt from the student row and
/// the answer key, never re-scored.
pub(crate) async fn get_result(
    state: &AppState,
    student_id: &str,
) -> Result<ResultResponse, ScoringError> {
    if let Some(result) = results::get(state, student_id).await? {
        return Ok(result);
    }

    let student =
        students::get(state, student_id).await?.ok_or(ScoringError::StudentNotFound)?;
    if !student.is_tested {
        return Err(ScoringError::NotCompleted);
    }

    let seed_id =
        student.question_seed_id.ok_or(ScoringError::CorruptRecord("tested without a seed"))?;
    let choices =
        student.choices.as_ref().ok_or(ScoringError::CorruptRecord("tested without choices"))?;
    let score = student.score.ok_or(ScoringError::CorruptRecord("tested without a score"))?;
    let finished_at =
        student.finished_at.ok_or(ScoringError::CorruptRecord("tested without a finish time"))?;
    let time_consumed_seconds = student
        .time_consumed_seconds
        .ok_or(ScoringError::CorruptRecord("tested without a duration"))?;

    let key = question_seeds::answers_by_seed_id(state, seed_id).await?;
    if key.len() != choices.len() {
        return Err(ScoringError::CorruptRecord("choices do not match the seed length"));
    }

    let details = key
        .iter()
        .zip(choices)
        .map(|(correct, submit)| ResultDetail { id: correct.id, correct: correct.answer, submit: *submit })
        .collect();
    let result = ResultResponse {
        score,
        time_finished: time::format_primitive(finished_at),
        time_consumed_seconds,
        details,
    };

    results::set(state, student_id, &result).await?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::QuestionKind;
    use crate::test_support;

    const STUDENT_ID: &str = "09016319";

    /// Seed 1 holds questions 1, 2 (choice, 30 pts each, answers 2 and 1)
    /// and 101 (true/false, 40 pts, answer 1).
    async fn setup_exam(ctx: &test_support::TestContext) {
        test_support::insert_question(ctx.state.db(), 1, QuestionKind::Choice, 2, 30).await;
        test_support::insert_question(ctx.state.db(), 2, QuestionKind::Choice, 1, 30).await;
        test_support::insert_question(ctx.state.db(), 101, QuestionKind::TrueFalse, 1, 40).await;
        test_support::insert_seed(&ctx.state, 1, vec![1, 2, 101]).await;
        test_support::insert_student(&ctx.state, STUDENT_ID, "Alice", Some(1)).await;
    }

    async fn open_session(ctx: &test_support::TestContext, begin_offset_seconds: i64) {
        let session = ExamSession {
            state: TestState::Testing,
            seed_id: Some(1),
            begin_at: Some(time::unix_now() - begin_offset_seconds),
        };
        exam_sessions::set(&ctx.state, STUDENT_ID, &session).await.unwrap();
    }

    fn full_marks() -> Vec<SubmittedAnswer> {
        vec![
            SubmittedAnswer { id: 1, answer: 2 },
            SubmittedAnswer { id: 2, answer: 1 },
            SubmittedAnswer { id: 101, answer: 1 },
        ]
    }

    #[tokio::test]
    async fn submit_scores_and_marks_tested() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;
        open_session(&ctx, 600).await;

        let answers = vec![
            SubmittedAnswer { id: 1, answer: 2 },
            SubmittedAnswer { id: 2, answer: 3 },
            SubmittedAnswer { id: 101, answer: 1 },
        ];
        let result = submit(&ctx.state, STUDENT_ID, &answers).await.expect("submit");

        assert_eq!(result.score, 70);
        assert_eq!(result.time_consumed_seconds, 600);
        assert_eq!(result.details.len(), 3);
        assert_eq!(result.details[1], ResultDetail { id: 2, correct: 1, submit: 3 });

        let student = students::get(&ctx.state, STUDENT_ID).await.unwrap().unwrap();
        assert!(student.is_tested);
        assert_eq!(student.score, Some(70));
        assert_eq!(student.choices.as_deref(), Some(&[2, 3, 1][..]));

        let session = exam_sessions::get(&ctx.state, STUDENT_ID).await.unwrap().unwrap();
        assert_eq!(session.state, TestState::Tested);

        assert_eq!(sync::pending_len(&ctx.state).await.unwrap(), 1);

        let summary = summaries::department(&ctx.state, 9).await.unwrap();
        assert_eq!(summary.tested_count, 1);
        assert_eq!(summary.total_score, 70);
        assert_eq!(summary.ge60, 1);
        assert_eq!(summary.ge90, 0);
    }

    #[tokio::test]
    async fn scoring_matches_the_worked_example() {
        let ctx = test_support::setup_test_context().await;
        // Three questions worth 1, 2 and 1 points; correct answers 0, 1, 0.
        test_support::insert_question(ctx.state.db(), 1, QuestionKind::Choice, 0, 1).await;
        test_support::insert_question(ctx.state.db(), 2, QuestionKind::Choice, 1, 2).await;
        test_support::insert_question(ctx.state.db(), 101, QuestionKind::TrueFalse, 0, 1).await;
        test_support::insert_seed(&ctx.state, 1, vec![1, 2, 101]).await;
        test_support::insert_student(&ctx.state, STUDENT_ID, "Alice", Some(1)).await;
        open_session(&ctx, 600).await;

        let answers = vec![
            SubmittedAnswer { id: 1, answer: 0 },
            SubmittedAnswer { id: 2, answer: 1 },
            SubmittedAnswer { id: 101, answer: 1 },
        ];
        let result = submit(&ctx.state, STUDENT_ID, &answers).await.expect("submit");

        assert_eq!(result.score, 3);
        assert_eq!(
            result.details,
            vec![
                ResultDetail { id: 1, correct: 0, submit: 0 },
                ResultDetail { id: 2, correct: 1, submit: 1 },
                ResultDetail { id: 101, correct: 0, submit: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn submit_requires_an_open_session() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;

        let err = submit(&ctx.state, STUDENT_ID, &full_marks()).await.expect_err("no session");
        assert!(matches!(err, ScoringError::TestNotStarted));
    }

    #[tokio::test]
    async fn submit_enforces_the_time_window() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;

        open_session(&ctx, 60).await;
        let err = submit(&ctx.state, STUDENT_ID, &full_marks()).await.expect_err("too early");
        assert!(matches!(err, ScoringError::TimeWindow { .. }));

        open_session(&ctx, 60 * 60 + 180).await;
        let err = submit(&ctx.state, STUDENT_ID, &full_marks()).await.expect_err("too late");
        assert!(matches!(err, ScoringError::TimeWindow { .. }));
    }

    #[tokio::test]
    async fn submit_rejects_wrong_answer_count_without_mutating() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;
        open_session(&ctx, 600).await;

        let short = vec![SubmittedAnswer { id: 1, answer: 2 }];
        let err = submit(&ctx.state, STUDENT_ID, &short).await.expect_err("short submission");
        assert!(matches!(err, ScoringError::MalformedSubmission { expected: 3, got: 1 }));

        let student = students::get(&ctx.state, STUDENT_ID).await.unwrap().unwrap();
        assert!(!student.is_tested);
        let session = exam_sessions::get(&ctx.state, STUDENT_ID).await.unwrap().unwrap();
        assert_eq!(session.state, TestState::Testing);
    }

    #[tokio::test]
    async fn second_submit_is_rejected_and_the_result_stands() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;
        open_session(&ctx, 600).await;

        let first = submit(&ctx.state, STUDENT_ID, &full_marks()).await.expect("first submit");
        assert_eq!(first.score, 100);

        let worse = vec![
            SubmittedAnswer { id: 1, answer: 1 },
            SubmittedAnswer { id: 2, answer: 2 },
            SubmittedAnswer { id: 101, answer: 0 },
        ];
        let err = submit(&ctx.state, STUDENT_ID, &worse).await.expect_err("second submit");
        assert!(matches!(err, ScoringError::AlreadyTested));

        let stored = get_result(&ctx.state, STUDENT_ID).await.unwrap();
        assert_eq!(stored, first);
        let summary = summaries::department(&ctx.state, 9).await.unwrap();
        assert_eq!(summary.tested_count, 1);
    }

    #[tokio::test]
    async fn mismatch_frees_the_lock_for_a_retry() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;
        open_session(&ctx, 600).await;

        let shuffled = vec![
            SubmittedAnswer { id: 2, answer: 1 },
            SubmittedAnswer { id: 1, answer: 2 },
            SubmittedAnswer { id: 101, answer: 1 },
        ];
        let err = submit(&ctx.state, STUDENT_ID, &shuffled).await.expect_err("out of order");
        assert!(matches!(err, ScoringError::AnswerIdMismatch { position: 0, id: 2 }));

        let session = exam_sessions::get(&ctx.state, STUDENT_ID).await.unwrap().unwrap();
        assert_eq!(session.state, TestState::Testing);

        let result = submit(&ctx.state, STUDENT_ID, &full_marks()).await.expect("retry");
        assert_eq!(result.score, 100);
    }

    #[tokio::test]
    async fn stale_session_read_cannot_regress_the_tested_state() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;
        open_session(&ctx, 600).await;

        submit(&ctx.state, STUDENT_ID, &full_marks()).await.expect("submit");

        // Replays a racing loser: it read the session while the winner was
        // still scoring, so a stale Testing session is in play when its own
        // attempt reaches the lock.
        open_session(&ctx, 600).await;
        let err = submit(&ctx.state, STUDENT_ID, &full_marks()).await.expect_err("late loser");
        assert!(matches!(err, ScoringError::AlreadyTested));

        let session = exam_sessions::get(&ctx.state, STUDENT_ID).await.unwrap().unwrap();
        assert_eq!(session.state, TestState::Tested);
    }

    #[test]
    fn window_boundaries_are_strict() {
        assert!(!within_window(180, 60));
        assert!(within_window(181, 60));
        assert!(within_window(3779, 60));
        assert!(!within_window(3780, 60));
    }

    #[tokio::test]
    async fn concurrent_submits_score_exactly_once() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;
        open_session(&ctx, 600).await;

        let answers = full_marks();
        let (a, b) = tokio::join!(
            submit(&ctx.state, STUDENT_ID, &answers),
            submit(&ctx.state, STUDENT_ID, &answers),
        );

        let wins = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1, "exactly one submission must win: {a:?} / {b:?}");
        for outcome in [a, b] {
            if let Err(err) = outcome {
                assert!(matches!(
                    err,
                    ScoringError::ScoringInProgress | ScoringError::AlreadyTested
                ));
            }
        }

        let summary = summaries::department(&ctx.state, 9).await.unwrap();
        assert_eq!(summary.tested_count, 1);
        assert_eq!(sync::pending_len(&ctx.state).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_result_is_idempotent_and_survives_cache_loss() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;
        open_session(&ctx, 600).await;

        let submitted = submit(&ctx.state, STUDENT_ID, &full_marks()).await.expect("submit");

        let first = get_result(&ctx.state, STUDENT_ID).await.unwrap();
        assert_eq!(first, submitted);

        // Drop the cached result; the record must be rebuilt, not re-scored.
        ctx.state.redis().delete(&format!("result:{STUDENT_ID}")).await.unwrap();
        let rebuilt = get_result(&ctx.state, STUDENT_ID).await.unwrap();
        assert_eq!(rebuilt, submitted);
    }

    #[tokio::test]
    async fn get_result_before_completion_is_refused() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;

        let err = get_result(&ctx.state, STUDENT_ID).await.expect_err("not tested");
        assert!(matches!(err, ScoringError::NotCompleted));

        let err = get_result(&ctx.state, "00000000").await.expect_err("unknown student");
        assert!(matches!(err, ScoringError::StudentNotFound));
    }

    #[tokio::test]
    async fn begin_is_idempotent_while_testing() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;

        let first = begin(&ctx.state, STUDENT_ID).await.expect("begin");
        assert_eq!(first.seed_id, 1);
        assert_eq!(first.question_ids, vec![1, 2, 101]);

        let second = begin(&ctx.state, STUDENT_ID).await.expect("begin again");
        assert_eq!(second.seed_id, first.seed_id);
        assert_eq!(second.begin_at, first.begin_at);
    }

    #[tokio::test]
    async fn begin_after_scoring_is_refused() {
        let ctx = test_support::setup_test_context().await;
        setup_exam(&ctx).await;
        open_session(&ctx, 600).await;
        submit(&ctx.state, STUDENT_ID, &full_marks()).await.expect("submit");

        let err = begin(&ctx.state, STUDENT_ID).await.expect_err("already tested");
        assert!(matches!(err, ScoringError::AlreadyTested));
    }
}
