use crate::status::PwmStatus;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: u32 = 1_000_000_000;
const NANOS_PER_MS: u32 = 1_000_000;

/// A point on the monotonic clock, split like a `timespec`.
///
/// Field order matters: the derived `Ord` compares seconds first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MonotonicInstant {
    secs: i64,
    nanos: u32,
}

impl MonotonicInstant {
    /// Builds an instant, normalising `nanos` into the seconds field.
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self {
            secs: secs.saturating_add(i64::from(nanos / NANOS_PER_SEC)),
            nanos: nanos % NANOS_PER_SEC,
        }
    }

    pub fn secs(&self) -> i64 {
        self.secs
    }

    pub fn subsec_nanos(&self) -> u32 {
        self.nanos
    }

    /// Returns the instant `ms` milliseconds later, carrying nanosecond
    /// overflow into the seconds field.
    pub fn advance_ms(self, ms: u32) -> Self {
        let mut secs = self.secs.saturating_add(i64::from(ms / 1000));
        let mut nanos = self.nanos + (ms % 1000) * NANOS_PER_MS;
        if nanos >= NANOS_PER_SEC {
            nanos -= NANOS_PER_SEC;
            secs = secs.saturating_add(1);
        }
        Self { secs, nanos }
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: MonotonicInstant) -> Duration {
        if *self <= earlier {
            return Duration::ZERO;
        }
        let (secs, nanos) = if self.nanos >= earlier.nanos {
            (self.secs - earlier.secs, self.nanos - earlier.nanos)
        } else {
            (
                self.secs - earlier.secs - 1,
                self.nanos + NANOS_PER_SEC - earlier.nanos,
            )
        };
        Duration::new(secs as u64, nanos)
    }
}

impl fmt::Display for MonotonicInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("sleep interrupted by signal")]
    Interrupted,

    #[error("monotonic clock failure: {0}")]
    Failed(#[source] std::io::Error),
}

impl ClockError {
    pub fn status(&self) -> PwmStatus {
        match self {
            Self::Interrupted => PwmStatus::Interrupted,
            Self::Failed(_) => PwmStatus::Failed,
        }
    }
}

/// Source of monotonic time able to block until an absolute deadline.
pub trait Clock {
    fn now(&self) -> Result<MonotonicInstant, ClockError>;

    /// Blocks until `deadline`. Returns immediately if it already passed.
    fn sleep_until(&self, deadline: MonotonicInstant) -> Result<(), ClockError>;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Result<MonotonicInstant, ClockError> {
        (**self).now()
    }

    fn sleep_until(&self, deadline: MonotonicInstant) -> Result<(), ClockError> {
        (**self).sleep_until(deadline)
    }
}

/// `CLOCK_MONOTONIC` with `TIMER_ABSTIME` sleeps.
///
/// The kernel never restarts `clock_nanosleep` after a signal handler runs,
/// so a delivered signal surfaces as [`ClockError::Interrupted`].
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

#[cfg(target_os = "linux")]
impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl Clock for MonotonicClock {
    fn now(&self) -> Result<MonotonicInstant, ClockError> {
        use nix::time::{clock_gettime, ClockId};

        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map_err(|errno| ClockError::Failed(errno.into()))?;
        Ok(MonotonicInstant::new(ts.tv_sec() as i64, ts.tv_nsec() as u32))
    }

    fn sleep_until(&self, deadline: MonotonicInstant) -> Result<(), ClockError> {
        use nix::errno::Errno;
        use nix::sys::time::TimeSpec;
        use nix::time::{clock_nanosleep, ClockId, ClockNanosleepFlags};

        let request = TimeSpec::new(deadline.secs() as _, deadline.subsec_nanos() as _);
        match clock_nanosleep(
            ClockId::CLOCK_MONOTONIC,
            ClockNanosleepFlags::TIMER_ABSTIME,
            &request,
        ) {
            Ok(_) => Ok(()),
            Err(Errno::EINTR) => Err(ClockError::Interrupted),
            Err(errno) => Err(ClockError::Failed(errno.into())),
        }
    }
}
