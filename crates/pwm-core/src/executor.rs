use crate::hal::{ChannelId, HalError, PwmOutput};
use crate::script::{Command, CommandFetcher, SyntaxError};
use crate::status::PwmStatus;
use crate::timebase::{Clock, ClockError, MonotonicInstant};
use crate::waveform::{InvalidFrequency, Waveform};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_FREQUENCY_HZ: u32 = 1000;
pub const DEFAULT_DURATION_MS: u32 = 250;

/// What to do when a command's sleep is cut short by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptPolicy {
    /// Stop the run and report [`ExecutionError::Interrupted`].
    #[default]
    Abort,
    /// Sleep again until the same absolute deadline.
    Resume,
}

#[derive(Clone, Debug)]
pub struct ExecutionConfig {
    pub script: String,
    pub default_frequency_hz: u32,
    pub default_duration_ms: u32,
    /// Polled before each command; `None` disables cancellation.
    pub cancel: Option<Arc<AtomicBool>>,
    pub on_interrupt: InterruptPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            script: String::new(),
            default_frequency_hz: DEFAULT_FREQUENCY_HZ,
            default_duration_ms: DEFAULT_DURATION_MS,
            cancel: None,
            on_interrupt: InterruptPolicy::Abort,
        }
    }
}

impl ExecutionConfig {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    pub fn with_defaults(mut self, frequency_hz: u32, duration_ms: u32) -> Self {
        self.default_frequency_hz = frequency_hz;
        self.default_duration_ms = duration_ms;
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.on_interrupt = policy;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// How a run that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every command in the script ran.
    Finished,
    /// The cancellation flag was observed before fetching a command.
    Cancelled,
}

impl Completion {
    pub fn status(&self) -> PwmStatus {
        PwmStatus::Ok
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("command at position {offset}: {source}")]
    InvalidFrequency {
        offset: usize,
        #[source]
        source: InvalidFrequency,
    },

    #[error("{channel}: {source}")]
    Hardware {
        channel: ChannelId,
        #[source]
        source: HalError,
    },

    #[error("interrupted while waiting for command at position {offset}")]
    Interrupted { offset: usize },

    #[error(transparent)]
    Clock(ClockError),
}

impl ExecutionError {
    pub fn status(&self) -> PwmStatus {
        match self {
            Self::Syntax(e) => e.status(),
            Self::InvalidFrequency { source, .. } => source.status(),
            Self::Hardware { source, .. } => source.status(),
            Self::Interrupted { .. } => PwmStatus::Interrupted,
            Self::Clock(e) => e.status(),
        }
    }
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ExecutionStats {
    pub commands_executed: u64,
    pub tones_played: u64,
    pub silent_holds: u64,
    pub sleeps_resumed: u64,
    pub max_overrun_us: u64,
}

/// A fetched command together with the absolute deadline it runs until.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledCommand {
    pub command: Command,
    pub deadline: MonotonicInstant,
}

/// Runs command scripts against a borrowed PWM channel.
///
/// Deadlines are accumulated from a single starting timestamp, never
/// recomputed from "now", so per-command overhead does not add up to drift
/// over long scripts.
pub struct ScriptExecutor<'a, IO: PwmOutput, C: Clock> {
    io: &'a mut IO,
    clock: C,
    stats: ExecutionStats,
}

impl<'a, IO: PwmOutput, C: Clock> ScriptExecutor<'a, IO, C> {
    pub fn new(io: &'a mut IO, clock: C) -> Self {
        Self {
            io,
            clock,
            stats: ExecutionStats::default(),
        }
    }

    pub fn run(&mut self, config: &ExecutionConfig) -> Result<Completion, ExecutionError> {
        let mut fetcher = CommandFetcher::new(
            &config.script,
            config.default_frequency_hz,
            config.default_duration_ms,
        );
        let mut deadline = self.clock.now().map_err(ExecutionError::Clock)?;

        loop {
            if config.is_cancelled() {
                info!("Stop requested, ending script on {}", self.io.id());
                return Ok(Completion::Cancelled);
            }

            let command = match fetcher.fetch() {
                Ok(Some(command)) => command,
                Ok(None) => return Ok(Completion::Finished),
                Err(e) => {
                    self.disable_best_effort();
                    return Err(e.into());
                }
            };

            deadline = deadline.advance_ms(command.duration_ms);
            let scheduled = ScheduledCommand { command, deadline };

            if let Err(e) = self.execute(&scheduled, config.on_interrupt) {
                self.disable_best_effort();
                return Err(e);
            }
        }
    }

    fn execute(
        &mut self,
        scheduled: &ScheduledCommand,
        on_interrupt: InterruptPolicy,
    ) -> Result<(), ExecutionError> {
        let cmd = &scheduled.command;
        debug!(
            "cmd@{}: {} Hz for {} ms{} until {}",
            cmd.offset,
            cmd.frequency_hz,
            cmd.duration_ms,
            if cmd.keep_enabled { ", keep" } else { "" },
            scheduled.deadline
        );

        if cmd.is_silent() {
            self.io.disable().map_err(|e| self.hardware_error(e))?;
            self.stats.silent_holds += 1;
        } else {
            let waveform = Waveform::for_frequency(cmd.frequency_hz).map_err(|source| {
                ExecutionError::InvalidFrequency {
                    offset: cmd.offset,
                    source,
                }
            })?;
            self.io
                .enable(&waveform)
                .map_err(|e| self.hardware_error(e))?;
            self.stats.tones_played += 1;
        }

        if cmd.duration_ms != 0 {
            self.wait_until(scheduled, on_interrupt)?;
        }

        if !cmd.is_silent() && !cmd.keep_enabled {
            self.io.disable().map_err(|e| self.hardware_error(e))?;
        }

        self.stats.commands_executed += 1;
        Ok(())
    }

    fn wait_until(
        &mut self,
        scheduled: &ScheduledCommand,
        on_interrupt: InterruptPolicy,
    ) -> Result<(), ExecutionError> {
        loop {
            match self.clock.sleep_until(scheduled.deadline) {
                Ok(()) => break,
                Err(ClockError::Interrupted) if on_interrupt == InterruptPolicy::Resume => {
                    debug!("sleep interrupted, resuming until {}", scheduled.deadline);
                    self.stats.sleeps_resumed += 1;
                }
                Err(ClockError::Interrupted) => {
                    return Err(ExecutionError::Interrupted {
                        offset: scheduled.command.offset,
                    });
                }
                Err(e) => return Err(ExecutionError::Clock(e)),
            }
        }

        // Overrun is a statistic only; a failed clock read must not fail the run.
        match self.clock.now() {
            Ok(now) => {
                let overrun = now.saturating_duration_since(scheduled.deadline);
                self.stats.max_overrun_us =
                    self.stats.max_overrun_us.max(overrun.as_micros() as u64);
            }
            Err(e) => warn!("Could not read clock to measure overrun: {}", e),
        }
        Ok(())
    }

    fn hardware_error(&self, source: HalError) -> ExecutionError {
        ExecutionError::Hardware {
            channel: self.io.id(),
            source,
        }
    }

    fn disable_best_effort(&mut self) {
        if let Err(e) = self.io.disable() {
            warn!("Failed to disable {} after error: {}", self.io.id(), e);
        }
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }
}
