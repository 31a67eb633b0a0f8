use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,pwm=info,pwm_core=info,pwm_sysfs=info";

/// Initialize the tracing subscriber with optional JSON output.
///
/// Logs go to stderr so stdout stays free for `--help` and `--version`.
/// Records emitted through the `log` facade by pwm-core are forwarded
/// into the same subscriber.
pub fn init_tracing(json_output: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}
