use std::sync::{Arc, Mutex, PoisonError};

use time::{Duration, OffsetDateTime};

/// Source of the current time, injected so callers and tests control it.
pub type Clock = dyn Fn() -> OffsetDateTime + Send + Sync;

/// A clock reading the system time.
pub fn system_clock() -> Arc<Clock> {
    Arc::new(OffsetDateTime::now_utc)
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }

    /// A `Clock` reading this instance.
    pub fn as_clock(&self) -> Arc<Clock> {
        let this = self.clone();
        Arc::new(move || this.now())
    }
}
