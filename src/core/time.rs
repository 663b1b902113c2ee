use time::{OffsetDateTime, PrimitiveDateTime};

/// Wall-clock source for the exam engine.
///
/// Values are UTC and truncated to whole microseconds so that a timestamp read
/// back from Postgres compares equal to the one that was written.
pub(crate) trait Clock: Send + Sync {
    fn now(&self) -> PrimitiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> PrimitiveDateTime {
        primitive_now_utc()
    }
}

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    truncate_to_micros(PrimitiveDateTime::new(now.date(), now.time()))
}

pub(crate) fn truncate_to_micros(value: PrimitiveDateTime) -> PrimitiveDateTime {
    value.replace_nanosecond(value.nanosecond() / 1_000 * 1_000).unwrap_or(value)
}

pub(crate) fn unix_seconds(value: PrimitiveDateTime) -> i64 {
    value.assume_utc().unix_timestamp()
}

/// Test clock that only moves when told to.
#[cfg(test)]
pub(crate) struct ManualClock {
    now: std::sync::Mutex<PrimitiveDateTime>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(start: PrimitiveDateTime) -> Self {
        Self { now: std::sync::Mutex::new(truncate_to_micros(start)) }
    }

    pub(crate) fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub(crate) fn set(&self, value: PrimitiveDateTime) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = truncate_to_micros(value);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> PrimitiveDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
