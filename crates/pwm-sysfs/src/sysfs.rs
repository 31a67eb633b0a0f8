//! PWM channel backed by the Linux sysfs interface.
//!
//! Layout: `<root>/pwmchip<N>/pwm<M>/{enable,period,duty_cycle}`, with
//! `<root>` normally `/sys/class/pwm`. Channels that are not exported yet
//! can be requested through `<root>/pwmchip<N>/export`.

use pwm_core::{Attribute, ChannelId, HalError, PwmOutput, PwmStatus};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/pwm";

const EXPORT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum SysfsError {
    #[error("PWM sysfs interface is not available at {}", .root.display())]
    NoSysfs { root: PathBuf },

    #[error("PWM chip {chip} is not available at {}", .path.display())]
    NoChip { chip: u32, path: PathBuf },

    #[error("PWM {id} is not available at {}", .path.display())]
    NoChannel { id: ChannelId, path: PathBuf },

    #[error("Failed to export PWM {id}: {source}")]
    Export {
        id: ChannelId,
        #[source]
        source: io::Error,
    },

    #[error("Cannot open {}: {source}", .path.display())]
    Attribute {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SysfsError {
    pub fn status(&self) -> PwmStatus {
        match self {
            Self::NoSysfs { .. } => PwmStatus::NoSysfs,
            Self::NoChip { .. } => PwmStatus::NoChip,
            Self::NoChannel { .. } => PwmStatus::NoChannel,
            Self::Export { .. } | Self::Attribute { .. } => PwmStatus::Io,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChannelOptions {
    /// Export the channel through `pwmchipN/export` if it is missing.
    pub export: bool,
    /// How long to wait for an exported channel directory to show up.
    pub export_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            export: false,
            export_timeout: Duration::from_millis(500),
        }
    }
}

/// One opened sysfs PWM channel.
///
/// Every write opens its attribute with truncation and writes the decimal
/// value, which is what `echo N > attr` does from a shell.
#[derive(Debug, Clone)]
pub struct SysfsChannel {
    id: ChannelId,
    dir: PathBuf,
    exported: bool,
}

impl SysfsChannel {
    pub fn open(
        root: impl AsRef<Path>,
        id: ChannelId,
        options: &ChannelOptions,
    ) -> Result<Self, SysfsError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(SysfsError::NoSysfs {
                root: root.to_path_buf(),
            });
        }

        let chip_dir = root.join(format!("pwmchip{}", id.chip));
        if !chip_dir.is_dir() {
            return Err(SysfsError::NoChip {
                chip: id.chip,
                path: chip_dir,
            });
        }

        let dir = chip_dir.join(format!("pwm{}", id.channel));
        let mut exported = false;
        if !dir.is_dir() {
            if !options.export {
                return Err(SysfsError::NoChannel { id, path: dir });
            }
            export_channel(&chip_dir, id, options.export_timeout)?;
            exported = true;
        }

        let channel = Self { id, dir, exported };
        for attribute in [Attribute::Enable, Attribute::DutyCycle, Attribute::Period] {
            let path = channel.attribute_path(attribute);
            OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(|source| SysfsError::Attribute { path, source })?;
        }

        debug!(dir = %channel.dir.display(), exported, "Opened PWM channel");
        Ok(channel)
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Whether `open` had to export the channel.
    pub fn was_exported(&self) -> bool {
        self.exported
    }

    fn attribute_path(&self, attribute: Attribute) -> PathBuf {
        self.dir.join(attribute.name())
    }

    fn write_attribute(&self, attribute: Attribute, value: u32) -> Result<(), HalError> {
        let path = self.attribute_path(attribute);
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .and_then(|mut file| file.write_all(value.to_string().as_bytes()))
            .map_err(|source| HalError::new(attribute, value, source))
    }
}

impl PwmOutput for SysfsChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn write_duty_cycle(&mut self, duty_ns: u32) -> Result<(), HalError> {
        self.write_attribute(Attribute::DutyCycle, duty_ns)
    }

    fn write_period(&mut self, period_ns: u32) -> Result<(), HalError> {
        self.write_attribute(Attribute::Period, period_ns)
    }

    fn write_enable(&mut self, enabled: bool) -> Result<(), HalError> {
        self.write_attribute(Attribute::Enable, u32::from(enabled))
    }
}

fn export_channel(chip_dir: &Path, id: ChannelId, timeout: Duration) -> Result<(), SysfsError> {
    let export = chip_dir.join("export");
    info!(path = %export.display(), channel = id.channel, "Exporting PWM channel");

    OpenOptions::new()
        .write(true)
        .open(&export)
        .and_then(|mut file| file.write_all(id.channel.to_string().as_bytes()))
        .map_err(|source| SysfsError::Export { id, source })?;

    // The channel directory appears asynchronously, and udev may still be
    // adjusting permissions on its attributes.
    let dir = chip_dir.join(format!("pwm{}", id.channel));
    let deadline = Instant::now() + timeout;
    while !dir.is_dir() {
        if Instant::now() >= deadline {
            return Err(SysfsError::NoChannel { id, path: dir });
        }
        thread::sleep(EXPORT_POLL_INTERVAL);
    }
    Ok(())
}
