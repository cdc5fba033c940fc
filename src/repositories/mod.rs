pub(crate) mod accounts;
pub(crate) mod answers;
pub(crate) mod exam_sessions;
pub(crate) mod results;
pub(crate) mod seeds;
pub(crate) mod students;
pub(crate) mod summaries;
pub(crate) mod sync;

use thiserror::Error;

/// Repository reads span both stores: cache first, durable fallback.
#[derive(Debug, Error)]
pub(crate) enum RepoError {
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
