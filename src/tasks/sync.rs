use anyhow::{anyhow, Result};

use crate::core::state::AppState;
use crate::repositories::sync as queue;
use crate::repositories::students;
use crate::services::reports;

/// One reconciliation pass: drain the pending queue into the durable
/// store. Each id is claimed onto a processing list and only acknowledged
/// after a successful upsert, so delivery is at-least-once even across a
/// crash mid-pass; the durable write is an idempotent upsert.
pub(crate) async fn run_once(state: &AppState) -> Result<()> {
    let recovered = queue::requeue_processing(state).await?;
    if recovered > 0 {
        tracing::warn!(recovered, "requeued sync entries stranded by an earlier pass");
    }

    let mut synced = 0usize;

    while let Some(student_id) = queue::claim_pending(state).await? {
        match sync_student(state, &student_id).await {
            Ok(()) => {
                queue::ack_pending(state, &student_id).await?;
                synced += 1;
            }
            Err(err) => {
                tracing::error!(student_id, error = %err, "student sync failed; will retry");
            }
        }
    }

    // Failed ids are still claimed; one sweep puts them back so a single
    // requeue error cannot drop the rest. Anything left behind is picked
    // up by the recovery step of the next pass.
    let requeued = match queue::requeue_processing(state).await {
        Ok(count) => count,
        Err(err) => {
            tracing::error!(error = %err, "failed to requeue sync entries");
            0
        }
    };

    if synced > 0 || requeued > 0 {
        tracing::info!(synced, requeued, "student sync pass finished");
    }
    metrics::counter!("contest_students_synced_total").increment(synced as u64);
    metrics::gauge!("contest_sync_pending").set(queue::pending_len(state).await? as f64);

    if let Err(err) = reports::export_school_summary(state).await {
        tracing::error!(error = %err, "school summary export failed");
    }

    Ok(())
}

async fn sync_student(state: &AppState, student_id: &str) -> Result<()> {
    let student = students::get(state, student_id)
        .await?
        .ok_or_else(|| anyhow!("student {student_id} not found in cache or durable store"))?;
    students::upsert(state.db(), &student).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time;
    use crate::db::models::Student;
    use crate::test_support;

    fn cache_only_student(id: &str) -> Student {
        Student {
            id: id.to_string(),
            real_name: format!("Student {id}"),
            department: crate::db::types::department_of(id).unwrap(),
            question_seed_id: Some(1),
            choices: Some(vec![1, 2, 1]),
            score: Some(70),
            finished_at: Some(time::primitive_now_utc()),
            time_consumed_seconds: Some(600),
            is_tested: true,
            updated_at: time::primitive_now_utc(),
        }
    }

    #[tokio::test]
    async fn run_once_persists_every_pending_student() {
        let ctx = test_support::setup_test_context().await;

        let ids = ["09016319", "09016320", "10016321"];
        for id in ids {
            students::set(&ctx.state, &cache_only_student(id)).await.unwrap();
            queue::enqueue_pending(&ctx.state, id).await.unwrap();
        }

        run_once(&ctx.state).await.expect("sync pass");

        for id in ids {
            let row = students::find_by_id(ctx.state.db(), id).await.unwrap();
            let row = row.unwrap_or_else(|| panic!("student {id} missing from durable store"));
            assert!(row.is_tested);
            assert_eq!(row.score, Some(70));
        }
        assert_eq!(queue::pending_len(&ctx.state).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_once_is_idempotent_on_redelivery() {
        let ctx = test_support::setup_test_context().await;

        students::set(&ctx.state, &cache_only_student("09016319")).await.unwrap();
        queue::enqueue_pending(&ctx.state, "09016319").await.unwrap();
        queue::enqueue_pending(&ctx.state, "09016319").await.unwrap();

        run_once(&ctx.state).await.expect("sync pass");

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(ctx.state.db())
            .await
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(queue::pending_len(&ctx.state).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_entries_are_requeued_for_the_next_pass() {
        let ctx = test_support::setup_test_context().await;

        students::set(&ctx.state, &cache_only_student("09016319")).await.unwrap();
        queue::enqueue_pending(&ctx.state, "09016319").await.unwrap();
        // No record anywhere for this id, so its sync must fail.
        queue::enqueue_pending(&ctx.state, "99990000").await.unwrap();

        run_once(&ctx.state).await.expect("sync pass");

        assert!(students::find_by_id(ctx.state.db(), "09016319").await.unwrap().is_some());
        assert_eq!(queue::pending_len(&ctx.state).await.unwrap(), 1);
        assert_eq!(queue::claim_pending(&ctx.state).await.unwrap().as_deref(), Some("99990000"));
    }

    #[tokio::test]
    async fn claimed_entries_survive_a_crashed_pass() {
        let ctx = test_support::setup_test_context().await;

        students::set(&ctx.state, &cache_only_student("09016319")).await.unwrap();
        queue::enqueue_pending(&ctx.state, "09016319").await.unwrap();

        // A pass that died between claim and upsert: the id is off the
        // pending queue but was never acknowledged.
        let claimed = queue::claim_pending(&ctx.state).await.unwrap();
        assert_eq!(claimed.as_deref(), Some("09016319"));
        assert_eq!(queue::pending_len(&ctx.state).await.unwrap(), 0);

        run_once(&ctx.state).await.expect("sync pass");

        assert!(students::find_by_id(ctx.state.db(), "09016319").await.unwrap().is_some());
        assert_eq!(queue::pending_len(&ctx.state).await.unwrap(), 0);
        assert_eq!(queue::claim_pending(&ctx.state).await.unwrap(), None);
    }
}
