use crate::status::PwmStatus;
use thiserror::Error;

pub const MIN_FREQUENCY_HZ: u32 = 1;
pub const MAX_FREQUENCY_HZ: u32 = 500_000_000;

const NANOS_PER_SEC: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frequency {frequency_hz} Hz is outside 1..=500000000 Hz")]
pub struct InvalidFrequency {
    pub frequency_hz: u32,
}

impl InvalidFrequency {
    pub fn status(&self) -> PwmStatus {
        PwmStatus::InvalidFrequency
    }
}

/// Period and duty cycle of a 50% square wave, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waveform {
    period_ns: u32,
    duty_ns: u32,
}

impl Waveform {
    /// Maps a frequency onto hardware period/duty values.
    ///
    /// Both values are rounded half away from zero on the exact quotient,
    /// so `3 Hz` gives a period of `333_333_333 ns` and a duty of
    /// `166_666_667 ns`.
    pub fn for_frequency(frequency_hz: u32) -> Result<Self, InvalidFrequency> {
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency_hz) {
            return Err(InvalidFrequency { frequency_hz });
        }

        let freq = u64::from(frequency_hz);
        let period = (2 * NANOS_PER_SEC + freq) / (2 * freq);
        let duty = (period + 1) / 2;

        // period <= 1e9 for any freq >= 1, so both fit in u32.
        Ok(Self {
            period_ns: period as u32,
            duty_ns: duty as u32,
        })
    }

    pub fn period_ns(&self) -> u32 {
        self.period_ns
    }

    pub fn duty_ns(&self) -> u32 {
        self.duty_ns
    }
}
