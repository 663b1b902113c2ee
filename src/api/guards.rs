use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::{header, request::Parts, HeaderMap};

use crate::api::errors::{exam_error, ApiError};
use crate::core::client::ClientInfo;
use crate::core::security::AccessClaims;
use crate::core::state::AppState;
use crate::services::exam_session::{ExamError, SessionScope};

pub(crate) const ACCESS_TOKEN_HEADER: &str = "x-token";
pub(crate) const EXAM_TOKEN_HEADER: &str = "x-exam-token";

const INVALID_CREDENTIALS: &str = "Invalid authentication credentials";

/// A verified access token and its claims.
pub(crate) struct CurrentUser {
    pub(crate) claims: AccessClaims,
    pub(crate) token: String,
}

/// Browser signals of the calling client.
pub(crate) struct Client(pub(crate) ClientInfo);

/// An exam-scoped request: both tokens verified and bound to one association.
pub(crate) struct ExamScope(pub(crate) SessionScope);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let token = access_token(&parts.headers)
            .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?
            .to_string();

        let claims = app_state
            .tokens()
            .verify_access_token(&token)
            .map_err(|err| exam_error(&app_state)(ExamError::Token(err)))?;

        Ok(CurrentUser { claims, token })
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Client {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Client(ClientInfo::from_headers(&parts.headers, peer_ip.as_deref())))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ExamScope {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Client(client) = Client::from_request_parts(parts, state).await?;

        let access =
            access_token(&parts.headers).ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;
        let exam = parts
            .headers
            .get(EXAM_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ApiError::Unauthorized("Exam session token required"))?;

        let claims = state
            .tokens()
            .verify_exam_token(access, exam, &client)
            .map_err(|err| exam_error(state)(ExamError::Token(err)))?;

        Ok(ExamScope(SessionScope::from_claims(&claims, &client)))
    }
}

/// `Authorization: Bearer <token>`, falling back to `X-Token`.
fn access_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    bearer
        .or_else(|| headers.get(ACCESS_TOKEN_HEADER).and_then(|value| value.to_str().ok()))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
