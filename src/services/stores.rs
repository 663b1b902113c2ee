//! Persistence seams consumed by the exam engine and the login flow.
//!
//! Postgres implementations live in `repositories`, the Redis lock service in
//! `core::redis`; in-memory doubles back the unit tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{
    AnswerRecord, Association, AssociationSummary, Attempt, ExamEvent, Examinee, LoginRecord,
    Question, QuestionOption, SalesPaper,
};
use crate::db::types::Stage;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("key-value store is not connected")]
    Unavailable,
}

/// Compare-and-set update of an attempt's running time accounting.
#[derive(Debug, Clone)]
pub(crate) struct ActionUpdate<'a> {
    pub(crate) attempt_id: &'a str,
    pub(crate) new_last_action: PrimitiveDateTime,
    pub(crate) expected_last_action: Option<PrimitiveDateTime>,
    pub(crate) remaining_seconds: i32,
    pub(crate) answered_count: i32,
}

#[async_trait]
pub(crate) trait AttemptStore: Send + Sync {
    async fn get_by_association_id(
        &self,
        association_id: &str,
    ) -> Result<Option<Attempt>, StoreError>;

    /// Inserts the attempt unless one already exists for its association.
    /// Returns `false` when another caller won the race.
    async fn create(&self, attempt: &Attempt) -> Result<bool, StoreError>;

    /// Applies `update` only if the row's last action time still equals
    /// `expected_last_action`. Returns the number of rows changed.
    async fn conditional_update_action(&self, update: ActionUpdate<'_>)
        -> Result<u64, StoreError>;

    async fn update_result(
        &self,
        attempt_id: &str,
        score: f64,
        comparability: i32,
        usability: i32,
    ) -> Result<(), StoreError>;

    async fn submit_result(
        &self,
        attempt_id: &str,
        submit_time: PrimitiveDateTime,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait AssociationStore: Send + Sync {
    async fn get_by_id(&self, id: &str) -> Result<Option<Association>, StoreError>;

    /// Moves the association to `stage` if that is a legal transition from its
    /// current stage. Returns whether a row changed.
    async fn update_stage(&self, id: &str, stage: Stage) -> Result<bool, StoreError>;

    async fn list_by_examinee(
        &self,
        examinee_id: &str,
    ) -> Result<Vec<AssociationSummary>, StoreError>;
}

#[async_trait]
pub(crate) trait AnswerStore: Send + Sync {
    async fn get_by_attempt_id(&self, attempt_id: &str) -> Result<Vec<AnswerRecord>, StoreError>;

    /// Insert-or-update keyed by (attempt id, question id). The option
    /// signature is overwritten; the score of an existing row is kept.
    async fn upsert_many(&self, records: &[AnswerRecord]) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait PaperLookup: Send + Sync {
    async fn get_enabled_paper(&self, id: &str) -> Result<Option<SalesPaper>, StoreError>;
}

#[async_trait]
pub(crate) trait QuestionStore: Send + Sync {
    /// Questions of a paper in display order.
    async fn list_by_paper(&self, paper_id: &str) -> Result<Vec<Question>, StoreError>;

    /// Options of the given questions, ordered by question then display order.
    async fn list_options(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<QuestionOption>, StoreError>;
}

/// Short-lived string cache. Callers treat every error as a miss.
#[async_trait]
pub(crate) trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReleaseOutcome {
    Deleted,
    NotOwned,
}

#[async_trait]
pub(crate) trait LockService: Send + Sync {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Deletes `key` only if it still holds `expected`, atomically.
    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<ReleaseOutcome, StoreError>;
}

#[async_trait]
pub(crate) trait EventRecorder: Send + Sync {
    async fn record(&self, event: &ExamEvent) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait ExamineeStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Examinee>, StoreError>;
}

#[async_trait]
pub(crate) trait LoginRecordStore: Send + Sync {
    async fn create(&self, record: &LoginRecord) -> Result<(), StoreError>;
}
