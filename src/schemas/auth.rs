use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct LoginRequest {
    #[validate(email(message = "account must be an email address"))]
    pub(crate) account: String,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub(crate) password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    pub(crate) access_token: String,
    pub(crate) token_type: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
}
