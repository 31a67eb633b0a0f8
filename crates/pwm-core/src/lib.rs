pub mod executor;
pub mod hal;
#[cfg(any(test, feature = "simulation"))]
pub mod hal_sim;
pub mod script;
pub mod status;
pub mod timebase;
pub mod waveform;

pub use executor::{
    Completion, ExecutionConfig, ExecutionError, ExecutionStats, InterruptPolicy,
    ScheduledCommand, ScriptExecutor,
};
pub use hal::{Attribute, ChannelId, HalError, PwmOutput};
#[cfg(any(test, feature = "simulation"))]
pub use hal_sim::{ChannelWrite, SimulatedChannel, SimulatedClock};
pub use script::{Command, CommandFetcher, SyntaxError};
pub use status::PwmStatus;
#[cfg(target_os = "linux")]
pub use timebase::MonotonicClock;
pub use timebase::{Clock, ClockError, MonotonicInstant};
pub use waveform::{InvalidFrequency, Waveform};
