use crate::core::state::AppState;
use crate::repositories::RepoError;

const SYNC_QUEUE: &str = "students:pending-sync";
const PROCESSING_QUEUE: &str = "students:pending-sync:processing";

/// A crashed scoring attempt must not wedge a student permanently, so the
/// lock expires on its own well after any plausible scoring duration.
const LOCK_TTL_SECONDS: u64 = 120;

fn lock_key(student_id: &str) -> String {
    format!("lock:{student_id}")
}

/// Atomic check-and-set: exactly one concurrent caller observes `true`.
pub(crate) async fn try_acquire_scoring_lock(
    state: &AppState,
    student_id: &str,
) -> Result<bool, RepoError> {
    Ok(state.redis().set_nx_ex(&lock_key(student_id), "1", LOCK_TTL_SECONDS).await?)
}

pub(crate) async fn release_scoring_lock(
    state: &AppState,
    student_id: &str,
) -> Result<(), RepoError> {
    state.redis().delete(&lock_key(student_id)).await?;
    Ok(())
}

pub(crate) async fn enqueue_pending(state: &AppState, student_id: &str) -> Result<(), RepoError> {
    state.redis().push_back(SYNC_QUEUE, student_id).await?;
    Ok(())
}

/// Claims the next pending id by moving it onto the processing list. A
/// claimed id stays there until acknowledged, so a crash mid-sync leaves
/// it recoverable instead of dropped.
pub(crate) async fn claim_pending(state: &AppState) -> Result<Option<String>, RepoError> {
    Ok(state.redis().move_first(SYNC_QUEUE, PROCESSING_QUEUE).await?)
}

/// Drops a claimed id after its durable write succeeded.
pub(crate) async fn ack_pending(state: &AppState, student_id: &str) -> Result<(), RepoError> {
    state.redis().list_remove(PROCESSING_QUEUE, student_id).await?;
    Ok(())
}

/// Moves every claimed-but-unacknowledged id back onto the pending queue.
/// Returns how many were moved.
pub(crate) async fn requeue_processing(state: &AppState) -> Result<u64, RepoError> {
    let mut moved = 0;
    while state.redis().move_first(PROCESSING_QUEUE, SYNC_QUEUE).await?.is_some() {
        moved += 1;
    }
    Ok(moved)
}

pub(crate) async fn pending_len(state: &AppState) -> Result<u64, RepoError> {
    Ok(state.redis().queue_len(SYNC_QUEUE).await?)
}
