//! Lexer for PWM command scripts.
//!
//! A script is a sequence of commands separated by whitespace. Each command
//! is a run of single-letter operations written back to back, each with an
//! optional decimal argument:
//!
//! | Op      | Meaning                                                        |
//! |---------|----------------------------------------------------------------|
//! | `k`     | keep the channel enabled once the command's duration elapses   |
//! | `f[hz]` | frequency for this command (current default if no argument)    |
//! | `F[hz]` | like `f`, and the argument becomes the default frequency       |
//! | `d[ms]` | duration for this command (current default if no argument)     |
//! | `D[ms]` | like `d`, and the argument becomes the default duration        |
//!
//! A command without `f`/`F` has frequency 0 and acts as a silent delay.
//! `F1000D100 d50 f d50 f` plays three 100 ms beeps at 1 kHz, 50 ms apart.

use crate::status::PwmStatus;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown operation '{found}' in script at position {offset}")]
pub struct SyntaxError {
    /// 1-based character offset of the offending operation.
    pub offset: usize,
    pub found: char,
}

impl SyntaxError {
    pub fn status(&self) -> PwmStatus {
        PwmStatus::Failed
    }
}

/// One fully resolved script command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// 0 means no waveform: the command only holds the channel disabled.
    pub frequency_hz: u32,
    pub duration_ms: u32,
    pub keep_enabled: bool,
    /// 1-based character offset of the command's first operation.
    pub offset: usize,
}

impl Command {
    pub fn is_silent(&self) -> bool {
        self.frequency_hz == 0
    }
}

/// Walks a script and yields one [`Command`] per call, carrying the sticky
/// default frequency and duration forward.
#[derive(Debug, Clone)]
pub struct CommandFetcher<'s> {
    script: &'s str,
    pos: usize,
    default_frequency_hz: u32,
    default_duration_ms: u32,
    initial_frequency_hz: u32,
    initial_duration_ms: u32,
}

impl<'s> CommandFetcher<'s> {
    pub fn new(script: &'s str, default_frequency_hz: u32, default_duration_ms: u32) -> Self {
        Self {
            script,
            pos: 0,
            default_frequency_hz,
            default_duration_ms,
            initial_frequency_hz: default_frequency_hz,
            initial_duration_ms: default_duration_ms,
        }
    }

    /// Rewinds to the start of the script and restores the seeded defaults.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.default_frequency_hz = self.initial_frequency_hz;
        self.default_duration_ms = self.initial_duration_ms;
    }

    pub fn default_frequency_hz(&self) -> u32 {
        self.default_frequency_hz
    }

    pub fn default_duration_ms(&self) -> u32 {
        self.default_duration_ms
    }

    /// Fetches the next command.
    ///
    /// Returns `Ok(None)` once only whitespace remains. After a syntax error
    /// the fetcher is exhausted.
    pub fn fetch(&mut self) -> Result<Option<Command>, SyntaxError> {
        let bytes = self.script.as_bytes();

        while self.pos < bytes.len() && is_space(bytes[self.pos]) {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return Ok(None);
        }

        let mut cmd = Command {
            frequency_hz: 0,
            duration_ms: self.default_duration_ms,
            keep_enabled: false,
            offset: self.pos + 1,
        };

        while self.pos < bytes.len() && !is_space(bytes[self.pos]) {
            let op = bytes[self.pos];
            match op {
                b'k' => {
                    cmd.keep_enabled = true;
                    self.pos += 1;
                }
                b'f' | b'F' => match self.number_after_op() {
                    Some(hz) => {
                        cmd.frequency_hz = hz;
                        if op == b'F' {
                            self.default_frequency_hz = hz;
                        }
                    }
                    None => cmd.frequency_hz = self.default_frequency_hz,
                },
                b'd' | b'D' => match self.number_after_op() {
                    Some(ms) => {
                        cmd.duration_ms = ms;
                        if op == b'D' {
                            self.default_duration_ms = ms;
                        }
                    }
                    None => cmd.duration_ms = self.default_duration_ms,
                },
                _ => {
                    let offset = self.pos + 1;
                    let found = self.script[self.pos..].chars().next().unwrap_or('\0');
                    self.pos = bytes.len();
                    return Err(SyntaxError { offset, found });
                }
            }
        }

        Ok(Some(cmd))
    }

    /// Consumes the operation byte and any decimal digits that follow it.
    /// Values beyond `u32::MAX` saturate.
    fn number_after_op(&mut self) -> Option<u32> {
        let bytes = self.script.as_bytes();
        self.pos += 1;

        let start = self.pos;
        let mut value: u32 = 0;
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_digit() {
            let digit = u32::from(bytes[self.pos] - b'0');
            value = value.saturating_mul(10).saturating_add(digit);
            self.pos += 1;
        }

        (self.pos > start).then_some(value)
    }
}

impl Iterator for CommandFetcher<'_> {
    type Item = Result<Command, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch().transpose()
    }
}

impl std::iter::FusedIterator for CommandFetcher<'_> {}

/// Same set as C `isspace` in the "C" locale, vertical tab included.
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// Lexes the whole script up front.
pub fn parse(
    script: &str,
    default_frequency_hz: u32,
    default_duration_ms: u32,
) -> Result<Vec<Command>, SyntaxError> {
    CommandFetcher::new(script, default_frequency_hz, default_duration_ms).collect()
}
