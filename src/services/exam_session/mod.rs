//! Attempt lifecycle: start, heartbeat time accounting and exactly-once submit.
//!
//! Heartbeats are lock-free and rely on a compare-and-set of the attempt's
//! last action time. Submits take a short Redis lock and leave a marker so
//! retries are rejected cheaply. Paper questions are cached in Redis.

mod answers;
mod heartbeat;
mod questions;
mod start;
mod submit;
mod timing;


use std::sync::Arc;

use thiserror::Error;

use crate::core::client::ClientInfo;
use crate::core::ids::IdGenerator;
use crate::core::security::{ExamSessionClaims, TokenError, TokenService};
use crate::core::time::Clock;
use crate::services::events::{EventDispatcher, RequestContext};
use crate::services::stores::{
    AnswerStore, AssociationStore, AttemptStore, CacheStore, LockService, PaperLookup,
    QuestionStore,
};

pub(crate) use answers::AnswerInput;
pub(crate) use questions::{ExamQuestion, ExamQuestionOption};
pub(crate) use start::{StartCommand, StartOutcome};
pub(crate) use timing::ExamTiming;

#[derive(Debug, Error)]
pub(crate) enum ExamError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("heartbeat sent too frequently")]
    RateLimited,
    #[error("submission in progress, retry shortly")]
    Busy,
    #[error("exam already submitted")]
    AlreadySubmitted,
    #[error("exam deadline has passed")]
    Expired,
    #[error("{0}")]
    InvalidState(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Internal(String),
}

impl ExamError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(format!("{context}: {err}"))
    }
}

/// The stores the engine reads and writes.
#[derive(Clone)]
pub(crate) struct ExamStores {
    pub(crate) attempts: Arc<dyn AttemptStore>,
    pub(crate) associations: Arc<dyn AssociationStore>,
    pub(crate) answers: Arc<dyn AnswerStore>,
    pub(crate) papers: Arc<dyn PaperLookup>,
    pub(crate) questions: Arc<dyn QuestionStore>,
    pub(crate) locks: Arc<dyn LockService>,
    pub(crate) cache: Arc<dyn CacheStore>,
}

/// An exam-scoped request: the association bound by a verified exam token and
/// the actor behind it.
#[derive(Debug, Clone)]
pub(crate) struct SessionScope {
    pub(crate) association_id: String,
    pub(crate) context: RequestContext,
}

impl SessionScope {
    pub(crate) fn from_claims(claims: &ExamSessionClaims, client: &ClientInfo) -> Self {
        Self {
            association_id: claims.association_id.clone(),
            context: RequestContext::new(
                claims.session_id.clone(),
                claims.user_id.clone(),
                client.ip.clone(),
                client.user_agent.clone(),
            ),
        }
    }
}

pub(crate) struct ExamEngine {
    stores: ExamStores,
    tokens: Arc<TokenService>,
    ids: Arc<IdGenerator>,
    clock: Arc<dyn Clock>,
    events: EventDispatcher,
    timing: ExamTiming,
}

impl ExamEngine {
    pub(crate) fn new(
        stores: ExamStores,
        tokens: Arc<TokenService>,
        ids: Arc<IdGenerator>,
        clock: Arc<dyn Clock>,
        events: EventDispatcher,
        timing: ExamTiming,
    ) -> Self {
        Self { stores, tokens, ids, clock, events, timing }
    }
}

pub(crate) fn submit_lock_key(association_id: &str) -> String {
    format!("exam_lock:submit:{association_id}")
}

pub(crate) fn submitted_marker_key(association_id: &str) -> String {
    format!("exam_submitted:{association_id}")
}
