//! In-memory stores for unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use time::PrimitiveDateTime;
use tokio::sync::watch;

use crate::core::security;
use crate::core::time::primitive_now_utc;
use crate::db::models::{
    AnswerRecord, Association, AssociationSummary, Attempt, ExamEvent, Examinee, LoginRecord,
    Question, QuestionOption, SalesPaper,
};
use crate::db::types::Stage;
use crate::services::stores::{
    ActionUpdate, AnswerStore, AssociationStore, AttemptStore, CacheStore, EventRecorder,
    ExamineeStore, LockService, LoginRecordStore, PaperLookup, QuestionStore, ReleaseOutcome,
    StoreError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct Tables {
    examinees: HashMap<String, Examinee>,
    papers: HashMap<String, SalesPaper>,
    associations: HashMap<String, Association>,
    attempts: HashMap<String, Attempt>,
    answers: Vec<AnswerRecord>,
    login_records: Vec<LoginRecord>,
    questions: Vec<Question>,
    options: Vec<QuestionOption>,
}

type UpdateHook = Box<dyn FnOnce(&mut Attempt) + Send>;

/// Every relational store behind one mutex.
#[derive(Default)]
pub(crate) struct MemoryStores {
    tables: Mutex<Tables>,
    before_update: Mutex<Option<UpdateHook>>,
    attempt_lookups: AtomicUsize,
    question_loads: AtomicUsize,
}

impl MemoryStores {
    pub(crate) fn insert_examinee(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password: &str,
        is_active: bool,
    ) {
        let now = primitive_now_utc();
        let examinee = Examinee {
            id: id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            hashed_password: security::hash_password(password).expect("hash password"),
            is_active,
            created_at: now,
            updated_at: now,
        };
        lock(&self.tables).examinees.insert(id.to_string(), examinee);
    }

    pub(crate) fn insert_paper(&self, id: &str, name: &str, recommended_minutes: i32, enabled: bool) {
        let paper = SalesPaper {
            id: id.to_string(),
            name: name.to_string(),
            recommended_minutes,
            is_enabled: enabled,
        };
        lock(&self.tables).papers.insert(id.to_string(), paper);
    }

    pub(crate) fn insert_association(&self, id: &str, examinee_id: &str, paper_id: &str) {
        let now = primitive_now_utc();
        let association = Association {
            id: id.to_string(),
            examinee_id: examinee_id.to_string(),
            sales_paper_id: paper_id.to_string(),
            stage: Stage::NotStarted,
            created_at: now,
            updated_at: now,
        };
        lock(&self.tables).associations.insert(id.to_string(), association);
    }

    pub(crate) fn insert_question(&self, id: &str, paper_id: &str, title: &str, order: i32) {
        lock(&self.tables).questions.push(Question {
            id: id.to_string(),
            sales_paper_id: paper_id.to_string(),
            title: title.to_string(),
            question_type: 1,
            sort_order: order,
        });
    }

    pub(crate) fn insert_option(&self, id: &str, question_id: &str, description: &str, order: i32) {
        lock(&self.tables).options.push(QuestionOption {
            id: id.to_string(),
            question_id: question_id.to_string(),
            description: description.to_string(),
            sort_order: order,
        });
    }

    pub(crate) fn set_stage(&self, id: &str, stage: Stage) {
        if let Some(association) = lock(&self.tables).associations.get_mut(id) {
            association.stage = stage;
        }
    }

    pub(crate) fn association(&self, id: &str) -> Option<Association> {
        lock(&self.tables).associations.get(id).cloned()
    }

    pub(crate) fn attempt(&self, association_id: &str) -> Option<Attempt> {
        lock(&self.tables).attempts.get(association_id).cloned()
    }

    pub(crate) fn edit_attempt(&self, association_id: &str, edit: impl FnOnce(&mut Attempt)) {
        if let Some(attempt) = lock(&self.tables).attempts.get_mut(association_id) {
            edit(attempt);
        }
    }

    pub(crate) fn answers(&self, attempt_id: &str) -> Vec<AnswerRecord> {
        lock(&self.tables)
            .answers
            .iter()
            .filter(|record| record.attempt_id == attempt_id)
            .cloned()
            .collect()
    }

    pub(crate) fn login_records(&self) -> Vec<LoginRecord> {
        lock(&self.tables).login_records.clone()
    }

    pub(crate) fn attempt_lookups(&self) -> usize {
        self.attempt_lookups.load(Ordering::SeqCst)
    }

    /// How many times the question table was read.
    pub(crate) fn question_loads(&self) -> usize {
        self.question_loads.load(Ordering::SeqCst)
    }

    /// Runs `hook` against the stored row just before the next conditional
    /// update compares it, simulating a concurrent writer.
    pub(crate) fn before_next_update(&self, hook: impl FnOnce(&mut Attempt) + Send + 'static) {
        *lock(&self.before_update) = Some(Box::new(hook));
    }
}

#[async_trait]
impl AttemptStore for MemoryStores {
    async fn get_by_association_id(
        &self,
        association_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        self.attempt_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.tables).attempts.get(association_id).cloned())
    }

    async fn create(&self, attempt: &Attempt) -> Result<bool, StoreError> {
        let mut tables = lock(&self.tables);
        if tables.attempts.contains_key(&attempt.association_id) {
            return Ok(false);
        }
        tables.attempts.insert(attempt.association_id.clone(), attempt.clone());
        Ok(true)
    }

    async fn conditional_update_action(
        &self,
        update: ActionUpdate<'_>,
    ) -> Result<u64, StoreError> {
        let hook = lock(&self.before_update).take();
        let mut tables = lock(&self.tables);
        let Some(attempt) =
            tables.attempts.values_mut().find(|attempt| attempt.id == update.attempt_id)
        else {
            return Ok(0);
        };

        if let Some(hook) = hook {
            hook(attempt);
        }

        if attempt.last_action_time != update.expected_last_action {
            return Ok(0);
        }

        attempt.last_action_time = Some(update.new_last_action);
        attempt.remaining_seconds = update.remaining_seconds;
        attempt.completed_question_count = update.answered_count;
        attempt.updated_at = update.new_last_action;
        Ok(1)
    }

    async fn update_result(
        &self,
        attempt_id: &str,
        score: f64,
        comparability: i32,
        usability: i32,
    ) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables);
        if let Some(attempt) = tables.attempts.values_mut().find(|attempt| attempt.id == attempt_id)
        {
            attempt.score = score;
            attempt.comparability = comparability;
            attempt.usability = usability;
        }
        Ok(())
    }

    async fn submit_result(
        &self,
        attempt_id: &str,
        submit_time: PrimitiveDateTime,
    ) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables);
        if let Some(attempt) = tables.attempts.values_mut().find(|attempt| attempt.id == attempt_id)
        {
            attempt.submit_time = Some(submit_time);
            attempt.updated_at = submit_time;
        }
        Ok(())
    }
}

#[async_trait]
impl AssociationStore for MemoryStores {
    async fn get_by_id(&self, id: &str) -> Result<Option<Association>, StoreError> {
        Ok(lock(&self.tables).associations.get(id).cloned())
    }

    async fn update_stage(&self, id: &str, stage: Stage) -> Result<bool, StoreError> {
        let mut tables = lock(&self.tables);
        match tables.associations.get_mut(id) {
            Some(association) if association.stage.can_transition_to(stage) => {
                association.stage = stage;
                association.updated_at = primitive_now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_examinee(
        &self,
        examinee_id: &str,
    ) -> Result<Vec<AssociationSummary>, StoreError> {
        let tables = lock(&self.tables);
        let mut rows: Vec<AssociationSummary> = tables
            .associations
            .values()
            .filter(|association| association.examinee_id == examinee_id)
            .filter_map(|association| {
                let paper = tables.papers.get(&association.sales_paper_id)?;
                Some(AssociationSummary {
                    association_id: association.id.clone(),
                    sales_paper_id: paper.id.clone(),
                    paper_name: paper.name.clone(),
                    stage: association.stage,
                    recommended_minutes: paper.recommended_minutes,
                })
            })
            .collect();
        rows.sort_by(|left, right| left.association_id.cmp(&right.association_id));
        Ok(rows)
    }
}

#[async_trait]
impl AnswerStore for MemoryStores {
    async fn get_by_attempt_id(&self, attempt_id: &str) -> Result<Vec<AnswerRecord>, StoreError> {
        Ok(self.answers(attempt_id))
    }

    async fn upsert_many(&self, records: &[AnswerRecord]) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables);
        for record in records {
            let existing = tables.answers.iter_mut().find(|current| {
                current.attempt_id == record.attempt_id && current.question_id == record.question_id
            });
            match existing {
                Some(current) => {
                    current.option_sign = record.option_sign.clone();
                    current.updated_by = record.updated_by.clone();
                    current.updated_at = record.updated_at;
                }
                None => tables.answers.push(record.clone()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PaperLookup for MemoryStores {
    async fn get_enabled_paper(&self, id: &str) -> Result<Option<SalesPaper>, StoreError> {
        Ok(lock(&self.tables).papers.get(id).filter(|paper| paper.is_enabled).cloned())
    }
}

#[async_trait]
impl QuestionStore for MemoryStores {
    async fn list_by_paper(&self, paper_id: &str) -> Result<Vec<Question>, StoreError> {
        self.question_loads.fetch_add(1, Ordering::SeqCst);
        let mut questions: Vec<Question> = lock(&self.tables)
            .questions
            .iter()
            .filter(|question| question.sales_paper_id == paper_id)
            .cloned()
            .collect();
        questions.sort_by(|left, right| {
            left.sort_order.cmp(&right.sort_order).then_with(|| left.id.cmp(&right.id))
        });
        Ok(questions)
    }

    async fn list_options(
        &self,
        question_ids: &[String],
    ) -> Result<Vec<QuestionOption>, StoreError> {
        let mut options: Vec<QuestionOption> = lock(&self.tables)
            .options
            .iter()
            .filter(|option| question_ids.contains(&option.question_id))
            .cloned()
            .collect();
        options.sort_by(|left, right| {
            left.question_id
                .cmp(&right.question_id)
                .then_with(|| left.sort_order.cmp(&right.sort_order))
        });
        Ok(options)
    }
}

#[async_trait]
impl ExamineeStore for MemoryStores {
    async fn find_by_email(&self, email: &str) -> Result<Option<Examinee>, StoreError> {
        Ok(lock(&self.tables)
            .examinees
            .values()
            .find(|examinee| examinee.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}

#[async_trait]
impl LoginRecordStore for MemoryStores {
    async fn create(&self, record: &LoginRecord) -> Result<(), StoreError> {
        lock(&self.tables).login_records.push(record.clone());
        Ok(())
    }
}

/// Lock service with real TTL expiry.
#[derive(Default)]
pub(crate) struct MemoryLocks {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLocks {
    pub(crate) fn value(&self, key: &str) -> Option<String> {
        let mut entries = lock(&self.entries);
        purge_expired(&mut entries, key);
        entries.get(key).map(|(value, _)| value.clone())
    }

    pub(crate) fn force(&self, key: &str, value: &str, ttl: Duration) {
        lock(&self.entries).insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }

    pub(crate) fn remove(&self, key: &str) {
        lock(&self.entries).remove(key);
    }
}

fn purge_expired(entries: &mut HashMap<String, (String, Instant)>, key: &str) {
    if entries.get(key).is_some_and(|(_, expires_at)| *expires_at <= Instant::now()) {
        entries.remove(key);
    }
}

#[async_trait]
impl LockService for MemoryLocks {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = lock(&self.entries);
        purge_expired(&mut entries, key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = lock(&self.entries);
        purge_expired(&mut entries, key);
        Ok(entries.contains_key(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        lock(&self.entries).insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<ReleaseOutcome, StoreError> {
        let mut entries = lock(&self.entries);
        purge_expired(&mut entries, key);
        match entries.get(key) {
            Some((value, _)) if value == expected => {
                entries.remove(key);
                Ok(ReleaseOutcome::Deleted)
            }
            _ => Ok(ReleaseOutcome::NotOwned),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryLocks {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.value(key))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.force(key, value, ttl);
        Ok(())
    }
}

/// Event sink that can be paused or told to fail.
pub(crate) struct MemoryEvents {
    events: Mutex<Vec<ExamEvent>>,
    gate: watch::Sender<bool>,
    failures: AtomicUsize,
}

impl Default for MemoryEvents {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self { events: Mutex::new(Vec::new()), gate, failures: AtomicUsize::new(0) }
    }
}

impl MemoryEvents {
    pub(crate) fn events(&self) -> Vec<ExamEvent> {
        lock(&self.events).clone()
    }

    pub(crate) fn kinds(&self) -> Vec<String> {
        lock(&self.events).iter().map(|event| event.event_type.clone()).collect()
    }

    pub(crate) fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub(crate) fn resume(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Waits until at least `count` events are stored.
    pub(crate) async fn wait_for(&self, count: usize) -> Vec<ExamEvent> {
        for _ in 0..200 {
            if lock(&self.events).len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.events()
    }
}

#[async_trait]
impl EventRecorder for MemoryEvents {
    async fn record(&self, event: &ExamEvent) -> Result<(), StoreError> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let should_fail = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(StoreError::Unavailable);
        }

        lock(&self.events).push(event.clone());
        Ok(())
    }
}
