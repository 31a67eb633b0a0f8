use pwm_core::executor::{DEFAULT_DURATION_MS, DEFAULT_FREQUENCY_HZ};
use pwm_core::InterruptPolicy;
use pwm_sysfs::DEFAULT_SYSFS_ROOT;
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_CHIP: u32 = 0;
pub const DEFAULT_CHANNEL: u32 = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown option '{0}'")]
    UnknownOption(String),

    #[error("Option '{0}' requires a value")]
    MissingValue(String),

    #[error("Invalid value '{value}' for option '{option}'")]
    InvalidNumber { option: String, value: String },
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub show_version: bool,
    pub chip: u32,
    pub channel: u32,
    pub frequency_hz: u32,
    pub duration_ms: u32,
    pub keep_enabled: bool,
    pub script: Option<String>,
    pub json_logs: bool,
    pub audit_path: Option<PathBuf>,
    pub simulate: bool,
    pub sysfs_root: PathBuf,
    pub export: bool,
    pub resume_on_signal: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            show_version: false,
            chip: DEFAULT_CHIP,
            channel: DEFAULT_CHANNEL,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            duration_ms: DEFAULT_DURATION_MS,
            keep_enabled: false,
            script: None,
            json_logs: false,
            audit_path: None,
            simulate: false,
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            export: false,
            resume_on_signal: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        let mut args = args.to_vec();
        let mut i = 1;
        while i < args.len() {
            // `-kf2000`, `-ks <script>`: peel off leading flags without values.
            if let Some((leading, rest)) = split_bundle(&args[i]) {
                if leading == 'h' {
                    cfg.show_help = true;
                    break;
                }
                cfg.keep_enabled = true;
                args[i] = rest;
                continue;
            }

            let (flag, inline) = split_arg(&args[i]);
            match flag {
                "-h" | "--help" => {
                    cfg.show_help = true;
                    break;
                }
                "--version" => {
                    cfg.show_version = true;
                    break;
                }
                "-p" | "--chip" => {
                    cfg.chip = parse_number(flag, take_value(&args, &mut i, flag, inline)?)?;
                }
                "-c" | "--channel" => {
                    cfg.channel = parse_number(flag, take_value(&args, &mut i, flag, inline)?)?;
                }
                "-f" | "--frequency" => {
                    cfg.frequency_hz =
                        parse_number(flag, take_value(&args, &mut i, flag, inline)?)?;
                }
                "-d" | "--duration" => {
                    cfg.duration_ms = parse_number(flag, take_value(&args, &mut i, flag, inline)?)?;
                }
                "-s" | "--script" => {
                    cfg.script = Some(take_value(&args, &mut i, flag, inline)?.to_string());
                }
                "-k" | "--keep-enabled" => {
                    cfg.keep_enabled = true;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--audit-log" => {
                    cfg.audit_path = Some(PathBuf::from(take_value(&args, &mut i, flag, inline)?));
                }
                "--simulate" => {
                    cfg.simulate = true;
                }
                "--sysfs-root" => {
                    cfg.sysfs_root = PathBuf::from(take_value(&args, &mut i, flag, inline)?);
                }
                "--export" => {
                    cfg.export = true;
                }
                "--resume-on-signal" => {
                    cfg.resume_on_signal = true;
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
            i += 1;
        }
        Ok(cfg)
    }

    /// The script to run: `--script` if given, otherwise a single tone at the
    /// configured frequency and duration.
    pub fn effective_script(&self) -> String {
        match &self.script {
            Some(script) => script.clone(),
            None if self.keep_enabled => "fdk".to_string(),
            None => "fd".to_string(),
        }
    }

    pub fn interrupt_policy(&self) -> InterruptPolicy {
        if self.resume_on_signal {
            InterruptPolicy::Resume
        } else {
            InterruptPolicy::Abort
        }
    }

    pub fn print_help() {
        println!(
            r#"PWM tool {version}

Drive a Linux PWM channel with a timed command script.

Usage: pwm [options]

Options:
  -h, --help
        Display this help text.

  -p, --chip <chip>
        Select PWM chip number.
        Default: {chip}

  -c, --channel <channel>
        Select PWM chip channel number.
        Default: {channel}

  -f, --frequency <frequency_in_hz>
        Set PWM frequency in Hz.
        Default: {frequency}

  -d, --duration <duration_in_ms>
        Set PWM duration in milliseconds.
        Default: {duration}

  -k, --keep-enabled
        If specified, PWM will remain enabled on exit.
        Default: disable PWM on exit

  -s, --script <script>
        Run PWM commands script.

  --json-logs
        Output logs in JSON format.

  --audit-log <path>
        Append run events to the specified JSONL file.

  --simulate
        Run against an in-memory channel instead of sysfs.

  --sysfs-root <path>
        PWM sysfs class directory.
        Default: {root}

  --export
        Export the channel through sysfs if it is not exported yet.

  --resume-on-signal
        Finish the current command when a signal arrives instead of
        aborting mid-command.

  --version
        Display PWM tool version.

Script:
  Commands are separated by whitespace. Each command is a run of
  operations written back to back:

    f[hz]  frequency for this command (default frequency if omitted)
    F[hz]  same, and the value becomes the default frequency
    d[ms]  duration for this command (default duration if omitted)
    D[ms]  same, and the value becomes the default duration
    k      keep the PWM enabled when the command completes

  A command without f/F is a silent delay. Three 100 ms beeps at
  1000 Hz with 50 ms pauses:

    pwm -s "F1000D100 d50 f d50 f"

Environment:
  RUST_LOG    Set log filter (e.g. RUST_LOG=debug)
"#,
            version = env!("CARGO_PKG_VERSION"),
            chip = DEFAULT_CHIP,
            channel = DEFAULT_CHANNEL,
            frequency = DEFAULT_FREQUENCY_HZ,
            duration = DEFAULT_DURATION_MS,
            root = DEFAULT_SYSFS_ROOT,
        );
    }
}

/// Splits a bundle such as `-kd10` into its leading `-k`/`-h` and the
/// remaining `-d10`.
fn split_bundle(arg: &str) -> Option<(char, String)> {
    if arg.starts_with("--") {
        return None;
    }
    let mut chars = arg.strip_prefix('-')?.chars();
    let leading = chars.next()?;
    let rest = chars.as_str();
    if matches!(leading, 'k' | 'h') && !rest.is_empty() {
        Some((leading, format!("-{}", rest)))
    } else {
        None
    }
}

/// Splits `--name=value` and `-xVALUE` forms into flag and inline value.
fn split_arg(arg: &str) -> (&str, Option<&str>) {
    if let Some(long) = arg.strip_prefix("--") {
        if let Some((name, value)) = long.split_once('=') {
            return (&arg[..name.len() + 2], Some(value));
        }
        return (arg, None);
    }
    if arg.len() > 2 && arg.starts_with('-') && arg.is_char_boundary(2) {
        let (flag, value) = arg.split_at(2);
        if matches!(flag, "-p" | "-c" | "-f" | "-d" | "-s") {
            return (flag, Some(value));
        }
    }
    (arg, None)
}

fn take_value<'a>(
    args: &'a [String],
    i: &mut usize,
    flag: &str,
    inline: Option<&'a str>,
) -> Result<&'a str, ConfigError> {
    if let Some(value) = inline {
        return Ok(value);
    }
    if *i + 1 < args.len() {
        *i += 1;
        Ok(&args[*i])
    } else {
        Err(ConfigError::MissingValue(flag.to_string()))
    }
}

/// Unsigned integer in decimal, `0x` hexadecimal or leading-zero octal.
fn parse_number(option: &str, value: &str) -> Result<u32, ConfigError> {
    let trimmed = value.trim();
    let parsed = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else if trimmed.len() > 1 && trimmed.starts_with('0') {
        u32::from_str_radix(&trimmed[1..], 8)
    } else {
        trimmed.parse::<u32>()
    };

    parsed.map_err(|_| ConfigError::InvalidNumber {
        option: option.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("pwm")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_arguments() {
        let cfg = RuntimeConfig::from_args(&args(&[])).unwrap();
        assert_eq!(cfg.chip, 0);
        assert_eq!(cfg.channel, 0);
        assert_eq!(cfg.frequency_hz, 1000);
        assert_eq!(cfg.duration_ms, 250);
        assert_eq!(cfg.sysfs_root, PathBuf::from("/sys/class/pwm"));
        assert_eq!(cfg.effective_script(), "fd");
        assert_eq!(cfg.interrupt_policy(), InterruptPolicy::Abort);
    }

    #[test]
    fn short_and_long_options() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "-p", "2", "--channel", "1", "-f2000", "--duration=75", "-k",
        ]))
        .unwrap();
        assert_eq!(cfg.chip, 2);
        assert_eq!(cfg.channel, 1);
        assert_eq!(cfg.frequency_hz, 2000);
        assert_eq!(cfg.duration_ms, 75);
        assert!(cfg.keep_enabled);
        assert_eq!(cfg.effective_script(), "fdk");
    }

    #[test]
    fn explicit_script_wins_over_keep() {
        let cfg = RuntimeConfig::from_args(&args(&["-k", "-s", "F440 d10 f"])).unwrap();
        assert_eq!(cfg.effective_script(), "F440 d10 f");
    }

    #[test]
    fn numbers_accept_c_prefixes() {
        assert_eq!(parse_number("-f", "0x3e8"), Ok(1000));
        assert_eq!(parse_number("-f", "010"), Ok(8));
        assert_eq!(parse_number("-f", "0"), Ok(0));
        assert_eq!(parse_number("-f", "440"), Ok(440));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        for bad in ["", "abc", "12ms", "-5", "099", "4294967296"] {
            assert!(parse_number("-d", bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn unknown_option_is_an_error() {
        let err = RuntimeConfig::from_args(&args(&["--bogus"])).unwrap_err();
        assert_eq!(err, ConfigError::UnknownOption("--bogus".into()));
    }

    #[test]
    fn missing_value_is_an_error() {
        let err = RuntimeConfig::from_args(&args(&["--script"])).unwrap_err();
        assert_eq!(err, ConfigError::MissingValue("--script".into()));
    }

    #[test]
    fn help_stops_parsing() {
        let cfg = RuntimeConfig::from_args(&args(&["-h", "--bogus"])).unwrap();
        assert!(cfg.show_help);
    }

    #[test]
    fn bundled_short_options() {
        let cfg = RuntimeConfig::from_args(&args(&["-kf2000", "-d5"])).unwrap();
        assert!(cfg.keep_enabled);
        assert_eq!(cfg.frequency_hz, 2000);
        assert_eq!(cfg.duration_ms, 5);

        let cfg = RuntimeConfig::from_args(&args(&["-ks", "F440 d10 f"])).unwrap();
        assert!(cfg.keep_enabled);
        assert_eq!(cfg.script.as_deref(), Some("F440 d10 f"));

        let cfg = RuntimeConfig::from_args(&args(&["-kh"])).unwrap();
        assert!(cfg.show_help);

        let err = RuntimeConfig::from_args(&args(&["-kx"])).unwrap_err();
        assert_eq!(err, ConfigError::UnknownOption("-x".into()));
    }

    #[test]
    fn script_value_is_not_read_as_a_bundle() {
        let cfg = RuntimeConfig::from_args(&args(&["-s", "-kf"])).unwrap();
        assert!(!cfg.keep_enabled);
        assert_eq!(cfg.script.as_deref(), Some("-kf"));
    }

    #[test]
    fn tool_options() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--simulate",
            "--export",
            "--resume-on-signal",
            "--json-logs",
            "--sysfs-root",
            "/tmp/pwm",
            "--audit-log=/tmp/audit.jsonl",
        ]))
        .unwrap();
        assert!(cfg.simulate && cfg.export && cfg.json_logs);
        assert_eq!(cfg.interrupt_policy(), InterruptPolicy::Resume);
        assert_eq!(cfg.sysfs_root, PathBuf::from("/tmp/pwm"));
        assert_eq!(cfg.audit_path, Some(PathBuf::from("/tmp/audit.jsonl")));
    }
}
