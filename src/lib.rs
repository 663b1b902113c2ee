pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{
    config::Settings,
    redis::RedisHandle,
    state::{AppState, Backends},
    telemetry,
    time::SystemClock,
};

/// How long shutdown waits for queued audit events to be written.
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; submits will fail until it is up");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let backends = Backends::production(db_pool.clone(), redis.clone());
    let (state, event_worker) =
        AppState::build(settings, db_pool, redis.clone(), backends, Arc::new(SystemClock))?;

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        fingerprint_policy = ?state.settings().security().fingerprint_policy,
        "Exam session API listening"
    );

    let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(core::shutdown::shutdown_signal())
        .await;

    // The worker exits once the last dispatcher, owned by the state, is gone.
    drop(state);
    match tokio::time::timeout(EVENT_DRAIN_TIMEOUT, event_worker).await {
        Ok(Ok(())) => tracing::info!("Audit events drained"),
        Ok(Err(err)) => tracing::error!(error = %err, "Audit event worker failed"),
        Err(_) => tracing::warn!("Timed out draining audit events"),
    }

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
