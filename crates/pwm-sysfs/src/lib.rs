pub mod sysfs;

pub use sysfs::{ChannelOptions, SysfsChannel, SysfsError, DEFAULT_SYSFS_ROOT};
