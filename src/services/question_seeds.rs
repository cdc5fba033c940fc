use anyhow::{bail, Context, Result};
use rand::seq::index::sample;
use thiserror::Error;

use crate::core::state::AppState;
use crate::db::models::QuestionSeed;
use crate::db::types::QuestionKind;
use crate::repositories::{answers, seeds, RepoError};

#[derive(Debug, Error)]
pub(crate) enum SeedError {
    #[error("question seed {0} not found")]
    SeedNotFound(i32),
    #[error("question {0} referenced by seed has no answer key entry")]
    QuestionNotFound(i32),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// One resolved position of a seed: question id, correct answer, points.
#[derive(Debug, Clone)]
pub(crate) struct CorrectAnswer {
    pub(crate) id: i32,
    pub(crate) answer: i16,
    pub(crate) points: i32,
}

/// Generates `count` randomized papers. Shape is fixed by configuration
/// (choice questions first, then true/false); content is a uniform sample
/// without replacement, so a seed never repeats a question. Ids run
/// sequentially from 1 and the whole batch replaces the previous one.
pub(crate) async fn create_seeds(state: &AppState, count: u32) -> Result<Vec<QuestionSeed>> {
    let contest = state.settings().contest();
    let choice_ids = answers::ids_by_kind(state.db(), QuestionKind::Choice)
        .await
        .context("load choice question ids")?;
    let true_false_ids = answers::ids_by_kind(state.db(), QuestionKind::TrueFalse)
        .await
        .context("load true/false question ids")?;

    if choice_ids.len() < contest.choice_count {
        bail!(
            "not enough choice questions: have {}, need {}",
            choice_ids.len(),
            contest.choice_count
        );
    }
    if true_false_ids.len() < contest.true_false_count {
        bail!(
            "not enough true/false questions: have {}, need {}",
            true_false_ids.len(),
            contest.true_false_count
        );
    }

    let mut rng = rand::thread_rng();
    let mut batch = Vec::with_capacity(count as usize);
    for id in 1..=count as i32 {
        let mut question_ids = Vec::with_capacity(contest.total_question_count());
        for index in sample(&mut rng, choice_ids.len(), contest.choice_count) {
            question_ids.push(choice_ids[index]);
        }
        for index in sample(&mut rng, true_false_ids.len(), contest.true_false_count) {
            question_ids.push(true_false_ids[index]);
        }
        batch.push(QuestionSeed { id, question_ids });
    }

    seeds::replace_all(state.db(), &batch).await.context("persist question seeds")?;
    seeds::set_range(state, &batch).await.context("cache question seeds")?;

    tracing::info!(count = batch.len(), "question seed batch generated");
    Ok(batch)
}

/// Resolves a seed against the answer key, preserving seed order.
pub(crate) async fn answers_by_seed_id(
    state: &AppState,
    seed_id: i32,
) -> Result<Vec<CorrectAnswer>, SeedError> {
    let seed = seeds::get(state, seed_id).await?.ok_or(SeedError::SeedNotFound(seed_id))?;

    let mut resolved = Vec::with_capacity(seed.question_ids.len());
    for question_id in seed.question_ids {
        let question = answers::get(state, question_id)
            .await?
            .ok_or(SeedError::QuestionNotFound(question_id))?;
        resolved.push(CorrectAnswer {
            id: question.id,
            answer: question.answer,
            points: question.points,
        });
    }

    Ok(resolved)
}
