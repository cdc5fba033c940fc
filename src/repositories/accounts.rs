use sqlx::PgPool;

use crate::db::models::Account;
use crate::db::types::Role;

const COLUMNS: &str =
    "id, hashed_password, real_name, role, department, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(&format!("SELECT {COLUMNS} FROM accounts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) struct CreateAccount<'a> {
    pub id: &'a str,
    pub hashed_password: String,
    pub real_name: &'a str,
    pub role: Role,
    pub department: Option<i16>,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateAccount<'_>,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(&format!(
        "INSERT INTO accounts (
            id, hashed_password, real_name, role, department, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.hashed_password)
    .bind(params.real_name)
    .bind(params.role)
    .bind(params.department)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(pool)
    .await
}
