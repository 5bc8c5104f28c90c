use std::sync::atomic::{AtomicI64, Ordering};

use chrono::NaiveDate;

use crate::model::{day_of, Ms};

/// Source of "now" for every timestamp and duration the engine computes.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Ms;

    fn today(&self) -> NaiveDate {
        day_of(self.now_ms())
    }
}

/// Wall clock that never repeats or goes backwards: two calls always return
/// strictly increasing milliseconds, even within the same wall-clock tick.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

fn wall_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        let wall = wall_ms();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Test clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Ms) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, ms: Ms) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: Ms) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Ms {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DAY_MS;

    #[test]
    fn system_clock_strictly_increasing() {
        let clock = SystemClock::new();
        let mut prev = clock.now_ms();
        for _ in 0..1000 {
            let next = clock.now_ms();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(DAY_MS);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(1970, 1, 2).unwrap());
    }
}
