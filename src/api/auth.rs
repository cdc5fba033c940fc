use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::security;
use crate::core::state::AppState;
use crate::db::models::Account;
use crate::db::types::Role;
use crate::repositories::exam_sessions::{self, ExamSession};
use crate::repositories::{accounts, students};
use crate::schemas::auth::{LoginRequest, ProfileResponse, TokenResponse};

/// Max login attempts per identifier per window.
const AUTH_RATE_LIMIT: u64 = 10;
/// Rate limit window in seconds.
const AUTH_RATE_WINDOW_SECONDS: u64 = 60;

/// Role-specific login payload. Every role is handled explicitly; adding a
/// role forces this enum and its match sites to be revisited.
enum SessionInit {
    Administrator,
    Counselor { department: i16 },
    Student { session: ExamSession },
}

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/login", post(login)).route("/profile", get(profile))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let rate_key = format!("rl:login:{}", payload.username);
    let allowed = state
        .redis()
        .rate_limit(&rate_key, AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS)
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many login attempts, try again later"));
    }

    let account = accounts::find_by_id(state.db(), &payload.username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load account"))?
        .ok_or(ApiError::Unauthorized("Incorrect username or password"))?;

    let verified = security::verify_password(&payload.password, &account.hashed_password)
        .map_err(|_| ApiError::Unauthorized("Incorrect username or password"))?;
    if !verified {
        return Err(ApiError::Unauthorized("Incorrect username or password"));
    }

    let user = match initialize_session(&state, &account).await? {
        SessionInit::Administrator => ProfileResponse::from_account(&account, None),
        SessionInit::Counselor { department } => {
            let mut profile = ProfileResponse::from_account(&account, None);
            profile.department = Some(department);
            profile
        }
        SessionInit::Student { session } => {
            ProfileResponse::from_account(&account, Some(session.state))
        }
    };

    let token = security::create_access_token(&account.id, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    tracing::info!(account_id = %account.id, role = ?account.role, "login succeeded");
    Ok(Json(TokenResponse { access_token: token, token_type: "bearer".to_string(), user }))
}

async fn profile(
    State(state): State<AppState>,
    CurrentUser(account): CurrentUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let test_state = match account.role {
        Role::Student => {
            let session = exam_sessions::get(&state, &account.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load exam session"))?;
            Some(session.map_or(crate::db::types::TestState::NotTested, |s| s.state))
        }
        Role::Administrator | Role::Counselor => None,
    };

    Ok(Json(ProfileResponse::from_account(&account, test_state)))
}

/// Prepares role-specific session state at login. For students this is the
/// point where the exam session record is materialized from the student
/// record if the cache has never seen them.
async fn initialize_session(state: &AppState, account: &Account) -> Result<SessionInit, ApiError> {
    match account.role {
        Role::Administrator => Ok(SessionInit::Administrator),
        Role::Counselor => {
            let department = account.department.ok_or_else(|| {
                ApiError::internal("counselor account without a department", "Invalid account")
            })?;
            Ok(SessionInit::Counselor { department })
        }
        Role::Student => {
            if let Some(session) = exam_sessions::get(state, &account.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load exam session"))?
            {
                return Ok(SessionInit::Student { session });
            }

            let student = students::get(state, &account.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load student record"))?
                .ok_or_else(|| ApiError::NotFound("Student record not found".to_string()))?;

            let session = if student.is_tested {
                ExamSession::tested(student.question_seed_id)
            } else {
                ExamSession::not_tested()
            };
            exam_sessions::set(state, &account.id, &session)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to store exam session"))?;

            Ok(SessionInit::Student { session })
        }
    }
}
