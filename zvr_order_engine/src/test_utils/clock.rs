use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::helpers::Clock;

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for MockClock {
    /// 10:00 on 3 June 2024, 17:00 in Jakarta.
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap())
    }
}

impl MockClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clones_share_time() {
        let clock = MockClock::default();
        let other = clock.clone();
        let start = clock.now();
        other.advance(Duration::hours(24) + Duration::seconds(1));
        assert_eq!(clock.now() - start, Duration::seconds(86_401));
    }
}
