use crate::hal::{Attribute, ChannelId, HalError, PwmOutput};
use crate::timebase::{Clock, ClockError, MonotonicInstant};
use std::cell::{Cell, RefCell};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A single attribute write observed by [`SimulatedChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelWrite {
    DutyCycle(u32),
    Period(u32),
    Enable(bool),
}

/// In-memory PWM channel.
///
/// Applies the same validation the kernel does on sysfs writes: the duty
/// cycle may never exceed the period, and neither may a period be set below
/// the current duty cycle.
#[derive(Debug, Clone, Default)]
pub struct SimulatedChannel {
    id: ChannelId,
    enabled: bool,
    period_ns: u32,
    duty_ns: u32,
    writes: Vec<ChannelWrite>,
    fail_at_write: Option<usize>,
}

impl SimulatedChannel {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Makes the `n`-th write (0-based, counting successful ones) fail with
    /// an I/O error.
    pub fn fail_at_write(mut self, n: usize) -> Self {
        self.fail_at_write = Some(n);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn period_ns(&self) -> u32 {
        self.period_ns
    }

    pub fn duty_ns(&self) -> u32 {
        self.duty_ns
    }

    pub fn writes(&self) -> &[ChannelWrite] {
        &self.writes
    }

    /// Number of `enable = 1` writes, i.e. tones started.
    pub fn enable_count(&self) -> usize {
        self.writes
            .iter()
            .filter(|w| matches!(w, ChannelWrite::Enable(true)))
            .count()
    }

    fn check_fault(&mut self, attribute: Attribute, value: u32) -> Result<(), HalError> {
        if self.fail_at_write == Some(self.writes.len()) {
            self.fail_at_write = None;
            return Err(HalError::new(
                attribute,
                value,
                io::Error::other("injected write failure"),
            ));
        }
        Ok(())
    }
}

fn rejected(attribute: Attribute, value: u32) -> HalError {
    HalError::new(
        attribute,
        value,
        io::Error::from_raw_os_error(22), // EINVAL
    )
}

impl PwmOutput for SimulatedChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn write_duty_cycle(&mut self, duty_ns: u32) -> Result<(), HalError> {
        self.check_fault(Attribute::DutyCycle, duty_ns)?;
        if duty_ns > self.period_ns {
            return Err(rejected(Attribute::DutyCycle, duty_ns));
        }
        self.duty_ns = duty_ns;
        self.writes.push(ChannelWrite::DutyCycle(duty_ns));
        Ok(())
    }

    fn write_period(&mut self, period_ns: u32) -> Result<(), HalError> {
        self.check_fault(Attribute::Period, period_ns)?;
        if period_ns < self.duty_ns {
            return Err(rejected(Attribute::Period, period_ns));
        }
        self.period_ns = period_ns;
        self.writes.push(ChannelWrite::Period(period_ns));
        Ok(())
    }

    fn write_enable(&mut self, enabled: bool) -> Result<(), HalError> {
        self.check_fault(Attribute::Enable, u32::from(enabled))?;
        self.enabled = enabled;
        self.writes.push(ChannelWrite::Enable(enabled));
        Ok(())
    }
}

/// Virtual monotonic clock: sleeping jumps time straight to the deadline.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now: Cell<MonotonicInstant>,
    sleeps: RefCell<Vec<MonotonicInstant>>,
    interrupt_sleep: Cell<Option<usize>>,
    cancel_on_sleep: RefCell<Option<(usize, Arc<AtomicBool>)>>,
}

impl SimulatedClock {
    pub fn starting_at(now: MonotonicInstant) -> Self {
        Self {
            now: Cell::new(now),
            ..Self::default()
        }
    }

    /// The `n`-th sleep call (0-based) fails once with `Interrupted`
    /// without advancing time.
    pub fn interrupt_sleep(self, n: usize) -> Self {
        self.interrupt_sleep.set(Some(n));
        self
    }

    /// Raises `flag` while the `n`-th sleep (0-based) is in progress.
    pub fn cancel_during_sleep(self, n: usize, flag: Arc<AtomicBool>) -> Self {
        *self.cancel_on_sleep.borrow_mut() = Some((n, flag));
        self
    }

    /// Lets time pass outside of sleeps, e.g. to model a slow write.
    pub fn advance_ms(&self, ms: u32) {
        self.now.set(self.now.get().advance_ms(ms));
    }

    /// Every deadline passed to `sleep_until`, interrupted ones included.
    pub fn sleeps(&self) -> Vec<MonotonicInstant> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Result<MonotonicInstant, ClockError> {
        Ok(self.now.get())
    }

    fn sleep_until(&self, deadline: MonotonicInstant) -> Result<(), ClockError> {
        let index = {
            let mut sleeps = self.sleeps.borrow_mut();
            sleeps.push(deadline);
            sleeps.len() - 1
        };

        if self.interrupt_sleep.get() == Some(index) {
            self.interrupt_sleep.set(None);
            return Err(ClockError::Interrupted);
        }

        if let Some((n, flag)) = self.cancel_on_sleep.borrow().as_ref() {
            if *n == index {
                flag.store(true, Ordering::Relaxed);
            }
        }

        if deadline > self.now.get() {
            self.now.set(deadline);
        }
        Ok(())
    }
}
