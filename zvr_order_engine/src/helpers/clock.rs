use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// The single source of "now" for the engine. Every timestamp the backend writes comes from a `Clock`, so tests can
/// move time forward deterministically.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
