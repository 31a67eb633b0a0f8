use std::fmt;

/// Terminal status of a PWM operation.
///
/// Every error type in the workspace maps onto one of these through its
/// `status()` method. The numeric value doubles as the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PwmStatus {
    Ok,
    Io,
    NoSysfs,
    NoChip,
    NoChannel,
    InvalidFrequency,
    /// Not produced by the script engine; kept so later codes stay stable.
    InvalidDuration,
    /// Not produced by the script engine; kept so later codes stay stable.
    InvalidCommand,
    Interrupted,
    Failed,
}

impl PwmStatus {
    /// Short human-readable description, suitable for user-facing reports.
    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "Ok",
            Self::Io => "I/O error",
            Self::NoSysfs => "PWM sysfs interface is not available",
            Self::NoChip => "PWM chip is not available",
            Self::NoChannel => "PWM channel is not available",
            Self::InvalidFrequency => "Invalid frequency",
            Self::InvalidDuration => "Invalid duration",
            Self::InvalidCommand => "Invalid command",
            Self::Interrupted => "Interrupted",
            Self::Failed => "General failure",
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Io => 1,
            Self::NoSysfs => 2,
            Self::NoChip => 3,
            Self::NoChannel => 4,
            Self::InvalidFrequency => 5,
            Self::InvalidDuration => 6,
            Self::InvalidCommand => 7,
            Self::Interrupted => 8,
            Self::Failed => 9,
        }
    }
}

impl fmt::Display for PwmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
