//! Postgres-backed stores. Each submodule holds plain query functions; the
//! [`PgStores`] handle adapts them to the engine's store traits.

pub(crate) mod answers;
pub(crate) mod associations;
pub(crate) mod attempts;
pub(crate) mod events;
pub(crate) mod examinees;
pub(crate) mod login_records;
pub(crate) mod papers;
pub(crate) mod questions;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{
    AnswerRecord, Association, AssociationSummary, Attempt, ExamEvent, Examinee, LoginRecord,
    Question, QuestionOption, SalesPaper,
};
use crate::db::types::Stage;
use crate::services::stores::{
    ActionUpdate, AnswerStore, AssociationStore, AttemptStore, EventRecorder, ExamineeStore,
    LoginRecordStore, PaperLookup, QuestionStore, StoreError,
};

#[derive(Clone)]
pub(crate) struct PgStores {
    pool: PgPool,
}

impl PgStores {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for PgStores {
    async fn get_by_association_id(
        &self,
        association_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::find_by_association_id(&self.pool, association_id).await?)
    }

    async fn create(&self, attempt: &Attempt) -> Result<bool, StoreError> {
        Ok(attempts::create(&self.pool, attempt).await?)
    }

    async fn conditional_update_action(
        &self,
        update: ActionUpdate<'_>,
    ) -> Result<u64, StoreError> {
        Ok(attempts::update_action(&self.pool, &update).await?)
    }

    async fn update_result(
        &self,
        attempt_id: &str,
        score: f64,
        comparability: i32,
        usability: i32,
    ) -> Result<(), StoreError> {
        Ok(attempts::update_result(&self.pool, attempt_id, score, comparability, usability).await?)
    }

    async fn submit_result(
        &self,
        attempt_id: &str,
        submit_time: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        Ok(attempts::submit_result(&self.pool, attempt_id, submit_time).await?)
    }
}

#[async_trait]
impl AssociationStore for PgStores {
    async fn get_by_id(&self, id: &str) -> Result<Option<Association>, StoreError> {
        Ok(associations::find_by_id(&self.pool, id).await?)
    }

    async fn update_stage(&self, id: &str, stage: Stage) -> Result<bool, StoreError> {
        Ok(associations::update_stage(&self.pool, id, stage).await?)
    }

    async fn list_by_examinee(
        &self,
        examinee_id: &str,
    ) -> Result<Vec<AssociationSummary>, StoreError> {
        Ok(associations::list_by_examinee(&self.pool, examinee_id).await?)
    }
}

#[async_trait]
impl AnswerStore for PgStores {
    async fn get_by_attempt_id(&self, attempt_id: &str) -> Result<Vec<AnswerRecord>, StoreError> {
        Ok(answers::list_by_attempt(&self.pool, attempt_id).await?)
    }

    async fn upsert_many(&self, records: &[AnswerRecord]) -> Result<(), StoreError> {
        Ok(answers::upsert_many(&self.pool, records).await?)
    }
}

#[async_trait]
impl PaperLookup for PgStores {
    async fn get_enabled_paper(&self, id: &str) -> Result<Option<SalesPaper>, StoreError> {
        Ok(papers::find_enabled(&self.pool, id).await?)
    }
}

#[async_trait]
impl QuestionStore for PgStores {
    async fn list_by_paper(&self, paper_id: &str) -> Result<Vec<Question>, StoreError> {
        Ok(questions::list_by_paper(&self.pool, paper_id).await?)
    }

    async fn list_options(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<QuestionOption>, StoreError> {
        Ok(questions::list_options(&self.pool, question_ids).await?)
    }
}

#[async_trait]
impl EventRecorder for PgStores {
    async fn record(&self, event: &ExamEvent) -> Result<(), StoreError> {
        Ok(events::insert(&self.pool, event).await?)
    }
}

#[async_trait]
impl ExamineeStore for PgStores {
    async fn find_by_email(&self, email: &str) -> Result<Option<Examinee>, StoreError> {
        Ok(examinees::find_by_email(&self.pool, email).await?)
    }
}

#[async_trait]
impl LoginRecordStore for PgStores {
    async fn create(&self, record: &LoginRecord) -> Result<(), StoreError> {
        Ok(login_records::insert(&self.pool, record).await?)
    }
}
