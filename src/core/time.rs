use std::{
    ops::{Add, AddAssign, Sub, SubAssign},
    sync::{Arc, Mutex},
    thread,
};

use chrono::{DateTime, TimeDelta, Utc};

pub trait Clock {
    fn utc(&self) -> UtcInstant;
    fn monotonic(&self) -> Instant;

    /// Block (or advance virtual time) for `duration`
    fn sleep(&self, duration: TimeDelta);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub utc: UtcInstant,
    pub monotonic: Instant,
}

impl Timestamp {
    pub fn now(clock: &dyn Clock) -> Timestamp {
        Timestamp {
            utc: clock.utc(),
            monotonic: clock.monotonic(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash, Default)]
pub struct Instant {
    delta: TimeDelta,
}

impl Instant {
    pub fn elapsed(&self) -> TimeDelta {
        self.delta
    }

    pub fn elapsed_seconds_f64(&self) -> f64 {
        TD(self.elapsed()).seconds()
    }

    pub fn duration_since(&self, other: &Instant) -> TimeDelta {
        self.delta - other.delta
    }
}

impl Add<TimeDelta> for Instant {
    type Output = Instant;

    fn add(self, rhs: TimeDelta) -> Self::Output {
        Instant {
            delta: self.delta + rhs,
        }
    }
}

impl AddAssign<TimeDelta> for Instant {
    fn add_assign(&mut self, rhs: TimeDelta) {
        self.delta += rhs;
    }
}

impl Sub<TimeDelta> for Instant {
    type Output = Instant;
    fn sub(self, rhs: TimeDelta) -> Self::Output {
        Instant {
            delta: self.delta - rhs,
        }
    }
}

impl SubAssign<TimeDelta> for Instant {
    fn sub_assign(&mut self, rhs: TimeDelta) {
        self.delta -= rhs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UtcInstant {
    utc: DateTime<Utc>,
}

impl UtcInstant {
    pub fn from_datetime(utc: DateTime<Utc>) -> Self {
        UtcInstant { utc }
    }

    pub fn duration_since(&self, other: UtcInstant) -> TimeDelta {
        self.utc - other.utc
    }

    /// Time since the unix epoch
    pub fn elapsed(&self) -> TimeDelta {
        self.utc - DateTime::<Utc>::UNIX_EPOCH
    }

    pub fn unix_seconds_f64(&self) -> f64 {
        TD(self.elapsed()).seconds()
    }
}

impl Add<TimeDelta> for UtcInstant {
    type Output = UtcInstant;

    fn add(self, rhs: TimeDelta) -> Self::Output {
        UtcInstant {
            utc: self.utc + rhs,
        }
    }
}

impl Sub<TimeDelta> for UtcInstant {
    type Output = UtcInstant;
    fn sub(self, rhs: TimeDelta) -> Self::Output {
        UtcInstant {
            utc: self.utc - rhs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn utc(&self) -> UtcInstant {
        UtcInstant { utc: Utc::now() }
    }

    fn monotonic(&self) -> Instant {
        Instant {
            delta: TimeDelta::from_std(self.start.elapsed()).unwrap_or(TimeDelta::MAX),
        }
    }

    fn sleep(&self, duration: TimeDelta) {
        if let Ok(duration) = duration.to_std() {
            thread::sleep(duration);
        }
    }
}

/// Virtual clock. Clones share the same elapsed time, so a device and the
/// loop driving it always agree on "now".
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    utc_epoch: DateTime<Utc>,
    elapsed: Arc<Mutex<TimeDelta>>,
}

impl SimulatedClock {
    pub fn new(utc_epoch: DateTime<Utc>, elapsed: TimeDelta) -> SimulatedClock {
        SimulatedClock {
            utc_epoch,
            elapsed: Arc::new(Mutex::new(elapsed)),
        }
    }

    pub fn step(&self, delta: TimeDelta) {
        *self.lock() += delta
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TimeDelta> {
        self.elapsed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for SimulatedClock {
    fn utc(&self) -> UtcInstant {
        UtcInstant {
            utc: self.utc_epoch + *self.lock(),
        }
    }

    fn monotonic(&self) -> Instant {
        Instant {
            delta: *self.lock(),
        }
    }

    fn sleep(&self, duration: TimeDelta) {
        if duration > TimeDelta::zero() {
            self.step(duration);
        }
    }
}

pub struct TD(pub TimeDelta);

impl TD {
    pub fn seconds(&self) -> f64 {
        self.0.num_seconds() as f64 + (self.0.subsec_nanos() as f64) / 1000000000.0
    }
}
