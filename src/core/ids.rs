//! Time-ordered, prefixed identifiers.
//!
//! Layout of the numeric part, most significant first: 41 bits of milliseconds
//! since [`EPOCH_MS`], 10 bits of worker id, 12 bits of per-millisecond
//! sequence.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// 2020-01-01T00:00:00Z.
pub(crate) const EPOCH_MS: i64 = 1_577_836_800_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_BITS: u32 = 41;

pub(crate) const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;

const WORKER_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = WORKER_BITS + SEQUENCE_BITS;

pub(crate) mod prefix {
    pub(crate) const ATTEMPT: &str = "EAP";
    pub(crate) const ANSWER_RECORD: &str = "EAQAP";
    pub(crate) const EXAM_EVENT: &str = "EEP";
    pub(crate) const LOGIN_RECORD: &str = "SLR";
    pub(crate) const SUBMIT_LOCK: &str = "lock";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum IdError {
    #[error("worker id {0} is out of range (0..=1023)")]
    InvalidWorkerId(u16),
    #[error("clock moved backwards: last issued at {last_ms}ms, observed {now_ms}ms")]
    ClockMovedBackwards { last_ms: i64, now_ms: i64 },
    #[error("clock {0}ms is before the identifier epoch")]
    BeforeEpoch(i64),
}

type MillisSource = Box<dyn Fn() -> i64 + Send + Sync>;

struct GeneratorState {
    last_ms: i64,
    sequence: u64,
}

pub(crate) struct IdGenerator {
    worker_id: u64,
    clock: MillisSource,
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    pub(crate) fn new(worker_id: u16) -> Result<Self, IdError> {
        Self::with_clock(worker_id, Box::new(system_millis))
    }

    pub(crate) fn with_clock(worker_id: u16, clock: MillisSource) -> Result<Self, IdError> {
        if worker_id > MAX_WORKER_ID {
            return Err(IdError::InvalidWorkerId(worker_id));
        }
        Ok(Self {
            worker_id: u64::from(worker_id),
            clock,
            state: Mutex::new(GeneratorState { last_ms: -1, sequence: 0 }),
        })
    }

    /// Returns `prefix` followed by the decimal form of a fresh id.
    pub(crate) fn next_id(&self, prefix: &str) -> Result<String, IdError> {
        let id = self.next_raw()?;
        Ok(format!("{prefix}{id}"))
    }

    pub(crate) fn next_raw(&self) -> Result<u64, IdError> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut now = (self.clock)();
        if now < state.last_ms {
            return Err(IdError::ClockMovedBackwards { last_ms: state.last_ms, now_ms: now });
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = self.wait_next_millis(state.last_ms)?;
            }
        } else {
            state.sequence = 0;
        }

        let elapsed = now - EPOCH_MS;
        if elapsed < 0 {
            return Err(IdError::BeforeEpoch(now));
        }
        state.last_ms = now;

        Ok(((elapsed as u64 & TIMESTAMP_MASK) << TIMESTAMP_SHIFT)
            | (self.worker_id << WORKER_SHIFT)
            | state.sequence)
    }

    fn wait_next_millis(&self, last_ms: i64) -> Result<i64, IdError> {
        loop {
            let now = (self.clock)();
            if now > last_ms {
                return Ok(now);
            }
            if now < last_ms {
                return Err(IdError::ClockMovedBackwards { last_ms, now_ms: now });
            }
            // Called with the state mutex held; the wait is under a millisecond.
            std::thread::yield_now();
        }
    }
}

/// Splits a raw id into (milliseconds since epoch, worker id, sequence).
#[cfg(test)]
pub(crate) fn decompose(id: u64) -> (u64, u64, u64) {
    (
        (id >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK,
        (id >> WORKER_SHIFT) & u64::from(MAX_WORKER_ID),
        id & SEQUENCE_MASK,
    )
}

fn system_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
