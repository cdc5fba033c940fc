use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::Role;
use crate::repositories::{accounts, answers, seeds, students};
use crate::services::question_seeds;

pub(crate) async fn ensure_first_admin(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_admin_password.is_empty() {
        tracing::warn!("FIRST_ADMIN_PASSWORD not configured; skipping administrator creation");
        return Ok(());
    }

    let username = &admin.first_admin_username;
    let now = primitive_now_utc();

    if let Some(account) = accounts::find_by_id(state.db(), username).await? {
        let verified =
            security::verify_password(&admin.first_admin_password, &account.hashed_password)
                .unwrap_or(false);
        if verified && account.role == Role::Administrator {
            tracing::info!("First administrator already up to date");
            return Ok(());
        }

        let hashed_password = if verified {
            account.hashed_password.clone()
        } else {
            security::hash_password(&admin.first_admin_password)?
        };

        sqlx::query(
            "UPDATE accounts SET hashed_password = $1, role = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(hashed_password)
        .bind(Role::Administrator)
        .bind(now)
        .bind(&account.id)
        .execute(state.db())
        .await?;

        tracing::info!("Updated first administrator {username}");
        return Ok(());
    }

    let hashed_password = security::hash_password(&admin.first_admin_password)?;
    accounts::create(
        state.db(),
        accounts::CreateAccount {
            id: username,
            hashed_password,
            real_name: "Administrator",
            role: Role::Administrator,
            department: None,
            created_at: now,
            updated_at: now,
        },
    )
    .await?;

    tracing::info!("Created first administrator {username}");
    Ok(())
}

/// Boot-time cache population, gated by config. Seed regeneration discards
/// the previous batch, so it is only run for a fresh exam cycle.
pub(crate) async fn warm_cache(state: &AppState) -> anyhow::Result<()> {
    let contest = state.settings().contest();

    if contest.regenerate_seeds {
        let batch = question_seeds::create_seeds(state, contest.question_seed_scale).await?;
        tracing::info!(count = batch.len(), "question seed batch regenerated");
    }

    if contest.refresh_cache {
        let answer_count = answers::load_all_to_cache(state).await?;

        let seed_batch = seeds::list_all(state.db()).await?;
        seeds::set_range(state, &seed_batch).await?;

        let roster = students::list_all(state.db()).await?;
        students::set_range(state, &roster).await?;

        tracing::info!(
            answers = answer_count,
            seeds = seed_batch.len(),
            students = roster.len(),
            "cache warmed from durable store"
        );
    }

    Ok(())
}
