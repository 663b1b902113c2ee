//! Off-path audit events.
//!
//! The engine hands events to [`EventDispatcher::emit`], which never blocks
//! and never fails the caller. A single worker drains the bounded queue into
//! the [`EventRecorder`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlx::types::Json;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::core::ids::{prefix, IdGenerator};
use crate::core::time::Clock;
use crate::db::models::ExamEvent;
use crate::db::types::EventKind;
use crate::services::stores::EventRecorder;

/// Who is acting and whether they are still waiting for the response.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestContext {
    pub(crate) session_id: String,
    pub(crate) user_id: String,
    pub(crate) client_ip: String,
    pub(crate) user_agent: String,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    pub(crate) fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        client_ip: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            client_ip: client_ip.into(),
            user_agent: user_agent.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Marks the context cancelled if dropped before [`AbortGuard::disarm`],
    /// which is what happens when axum drops a handler future mid-flight.
    pub(crate) fn abort_guard(&self) -> AbortGuard {
        AbortGuard { context: Some(self.clone()) }
    }
}

pub(crate) struct AbortGuard {
    context: Option<RequestContext>,
}

impl AbortGuard {
    pub(crate) fn disarm(mut self) {
        self.context = None;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            context.cancel();
        }
    }
}

struct EventJob {
    context: RequestContext,
    attempt_id: String,
    kind: EventKind,
    metadata: serde_json::Value,
}

#[derive(Clone)]
pub(crate) struct EventDispatcher {
    sender: mpsc::Sender<EventJob>,
}

impl EventDispatcher {
    /// Starts the worker. It exits once every dispatcher clone is dropped and
    /// the queue is drained.
    pub(crate) fn spawn(
        recorder: Arc<dyn EventRecorder>,
        ids: Arc<IdGenerator>,
        clock: Arc<dyn Clock>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(receiver, recorder, ids, clock));
        (Self { sender }, worker)
    }

    pub(crate) fn emit(
        &self,
        context: &RequestContext,
        attempt_id: &str,
        kind: EventKind,
        metadata: serde_json::Value,
    ) {
        let job = EventJob {
            context: context.clone(),
            attempt_id: attempt_id.to_string(),
            kind,
            metadata,
        };

        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                metrics::counter!("exam_events_dropped_total", "reason" => "full").increment(1);
                tracing::warn!(
                    attempt_id = %job.attempt_id,
                    event_type = job.kind.as_str(),
                    "Audit event queue full; dropping event"
                );
            }
            Err(TrySendError::Closed(job)) => {
                metrics::counter!("exam_events_dropped_total", "reason" => "closed").increment(1);
                tracing::warn!(
                    attempt_id = %job.attempt_id,
                    event_type = job.kind.as_str(),
                    "Audit event worker stopped; dropping event"
                );
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<EventJob>,
    recorder: Arc<dyn EventRecorder>,
    ids: Arc<IdGenerator>,
    clock: Arc<dyn Clock>,
) {
    while let Some(job) = receiver.recv().await {
        if job.context.is_cancelled() {
            tracing::debug!(
                attempt_id = %job.attempt_id,
                event_type = job.kind.as_str(),
                "Request cancelled; skipping audit event"
            );
            continue;
        }

        let id = match ids.next_id(prefix::EXAM_EVENT) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(error = %err, attempt_id = %job.attempt_id, "Failed to allocate event id");
                continue;
            }
        };

        let event = ExamEvent {
            id,
            attempt_id: job.attempt_id,
            session_id: job.context.session_id,
            user_id: job.context.user_id,
            event_type: job.kind.as_str().to_string(),
            client_ip: job.context.client_ip,
            user_agent: job.context.user_agent,
            metadata: Json(job.metadata),
            created_at: clock.now(),
        };

        if let Err(err) = recorder.record(&event).await {
            tracing::error!(
                error = %err,
                attempt_id = %event.attempt_id,
                event_type = %event.event_type,
                "Failed to record audit event"
            );
        }
    }

    tracing::debug!("Audit event worker stopped");
}
