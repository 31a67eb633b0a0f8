use crate::status::PwmStatus;
use crate::waveform::Waveform;
use std::fmt;
use thiserror::Error;

/// Chip and channel index of one PWM output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelId {
    pub chip: u32,
    pub channel: u32,
}

impl ChannelId {
    pub fn new(chip: u32, channel: u32) -> Self {
        Self { chip, channel }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {} of chip {}", self.channel, self.chip)
    }
}

/// The three control surfaces of a PWM channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Enable,
    Period,
    DutyCycle,
}

impl Attribute {
    pub fn name(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Period => "period",
            Self::DutyCycle => "duty_cycle",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("failed to write {value} to {attribute}: {source}")]
pub struct HalError {
    pub attribute: Attribute,
    pub value: u32,
    #[source]
    pub source: std::io::Error,
}

impl HalError {
    pub fn new(attribute: Attribute, value: u32, source: std::io::Error) -> Self {
        Self {
            attribute,
            value,
            source,
        }
    }

    pub fn status(&self) -> PwmStatus {
        PwmStatus::Io
    }
}

/// An opened PWM channel.
///
/// Implementors only provide raw attribute writes; the enable sequencing
/// lives in the provided methods so every backend gets the same ordering.
pub trait PwmOutput {
    fn id(&self) -> ChannelId;
    fn write_duty_cycle(&mut self, duty_ns: u32) -> Result<(), HalError>;
    fn write_period(&mut self, period_ns: u32) -> Result<(), HalError>;
    fn write_enable(&mut self, enabled: bool) -> Result<(), HalError>;

    /// Starts the waveform.
    ///
    /// The duty cycle is parked at zero before the period is written, so a
    /// duty left over from a previous (longer) period can never exceed the
    /// new one.
    fn enable(&mut self, waveform: &Waveform) -> Result<(), HalError> {
        self.write_duty_cycle(0)?;
        self.write_period(waveform.period_ns())?;
        self.write_duty_cycle(waveform.duty_ns())?;
        self.write_enable(true)
    }

    fn disable(&mut self) -> Result<(), HalError> {
        self.write_enable(false)
    }
}
