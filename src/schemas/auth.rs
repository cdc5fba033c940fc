use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::Account;
use crate::db::types::{Role, TestState};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct LoginRequest {
    #[validate(length(min = 1, max = 64))]
    pub(crate) username: String,
    #[validate(length(min = 1, max = 128))]
    pub(crate) password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) token_type: String,
    pub(crate) user: ProfileResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProfileResponse {
    pub(crate) id: String,
    pub(crate) real_name: String,
    pub(crate) role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) department: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) test_state: Option<TestState>,
}

impl ProfileResponse {
    pub(crate) fn from_account(account: &Account, test_state: Option<TestState>) -> Self {
        Self {
            id: account.id.clone(),
            real_name: account.real_name.clone(),
            role: account.role,
            department: account.department,
            test_state,
        }
    }
}
