use std::sync::Arc;

use sqlx::PgPool;
use tokio::task::JoinHandle;

use crate::core::{
    config::Settings, ids::IdGenerator, redis::RedisHandle, security::TokenService, time::Clock,
};
use crate::repositories::PgStores;
use crate::services::events::EventDispatcher;
use crate::services::exam_session::{ExamEngine, ExamStores, ExamTiming};
use crate::services::login::LoginService;
use crate::services::stores::{EventRecorder, ExamineeStore, LoginRecordStore};

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    tokens: Arc<TokenService>,
    engine: ExamEngine,
    login: LoginService,
}

/// Storage wiring behind the services.
pub(crate) struct Backends {
    pub(crate) exam: ExamStores,
    pub(crate) events: Arc<dyn EventRecorder>,
    pub(crate) examinees: Arc<dyn ExamineeStore>,
    pub(crate) login_records: Arc<dyn LoginRecordStore>,
}

impl Backends {
    pub(crate) fn production(pool: PgPool, redis: RedisHandle) -> Self {
        let stores = Arc::new(PgStores::new(pool));
        let redis = Arc::new(redis);
        Self {
            exam: ExamStores {
                attempts: stores.clone(),
                associations: stores.clone(),
                answers: stores.clone(),
                papers: stores.clone(),
                questions: stores.clone(),
                locks: redis.clone(),
                cache: redis,
            },
            events: stores.clone(),
            examinees: stores.clone(),
            login_records: stores,
        }
    }
}

impl AppState {
    /// Wires the services and starts the audit event worker. The worker stops
    /// once every clone of the returned state is dropped.
    pub(crate) fn build(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        backends: Backends,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let tokens = Arc::new(TokenService::from_settings(&settings)?);
        let ids = Arc::new(IdGenerator::new(settings.ids().worker_id)?);

        let (events, worker) = EventDispatcher::spawn(
            backends.events,
            ids.clone(),
            clock.clone(),
            settings.events().queue_capacity,
        );

        let engine = ExamEngine::new(
            backends.exam,
            tokens.clone(),
            ids.clone(),
            clock.clone(),
            events,
            ExamTiming::from_settings(&settings),
        );
        let login = LoginService::new(
            backends.examinees,
            backends.login_records,
            tokens.clone(),
            ids,
            clock,
        );

        let state =
            Self { inner: Arc::new(InnerState { settings, db, redis, tokens, engine, login }) };
        Ok((state, worker))
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn tokens(&self) -> &TokenService {
        &self.inner.tokens
    }

    pub(crate) fn engine(&self) -> &ExamEngine {
        &self.inner.engine
    }

    pub(crate) fn login(&self) -> &LoginService {
        &self.inner.login
    }
}
