use axum::{extract::State, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::{exam_error, ApiError};
use crate::core::state::AppState;
use crate::schemas::auth::{LoginRequest, LoginResponse};

/// Max attempts per window for the login endpoint.
const LOGIN_RATE_LIMIT: u64 = 10;
/// Rate limit window in seconds.
const LOGIN_RATE_WINDOW_SECONDS: u64 = 60;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let account = payload.account.trim().to_ascii_lowercase();
    let rate_key = format!("rl:login:{account}");
    let allowed = state
        .redis()
        .rate_limit(&rate_key, LOGIN_RATE_LIMIT, LOGIN_RATE_WINDOW_SECONDS)
        .await
        .unwrap_or(true);
    if !allowed {
        return Err(ApiError::TooManyRequests("Too many login attempts, try again later"));
    }

    let outcome =
        state.login().login(&account, &payload.password).await.map_err(exam_error(&state))?;

    Ok(Json(LoginResponse {
        access_token: outcome.access_token,
        token_type: "bearer".to_string(),
        user_id: outcome.user_id,
        username: outcome.username,
    }))
}
