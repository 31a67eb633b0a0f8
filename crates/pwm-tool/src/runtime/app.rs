use crate::infra::audit::{
    AuditEventType, AuditLogger, ChannelOpenFailedDetails, RunFinishedDetails, RunStartedDetails,
};
use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use pwm_core::{
    ChannelId, Completion, ExecutionConfig, ExecutionError, ExecutionStats, HalError,
    MonotonicClock, PwmOutput, PwmStatus, ScriptExecutor, SimulatedChannel,
};
use pwm_sysfs::{ChannelOptions, SysfsChannel, SysfsError};
use serde::Serialize;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{atomic::AtomicBool, Arc};
use tracing::{debug, error, info, warn};

/// Exit code for command-line errors (EINVAL).
const EXIT_USAGE: u8 = 22;

enum ToolChannel {
    Sysfs(SysfsChannel),
    Simulated(SimulatedChannel),
}

impl PwmOutput for ToolChannel {
    fn id(&self) -> ChannelId {
        match self {
            Self::Sysfs(ch) => ch.id(),
            Self::Simulated(ch) => ch.id(),
        }
    }

    fn write_duty_cycle(&mut self, duty_ns: u32) -> Result<(), HalError> {
        match self {
            Self::Sysfs(ch) => ch.write_duty_cycle(duty_ns),
            Self::Simulated(ch) => ch.write_duty_cycle(duty_ns),
        }
    }

    fn write_period(&mut self, period_ns: u32) -> Result<(), HalError> {
        match self {
            Self::Sysfs(ch) => ch.write_period(period_ns),
            Self::Simulated(ch) => ch.write_period(period_ns),
        }
    }

    fn write_enable(&mut self, enabled: bool) -> Result<(), HalError> {
        match self {
            Self::Sysfs(ch) => ch.write_enable(enabled),
            Self::Simulated(ch) => ch.write_enable(enabled),
        }
    }
}

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pwm: {}", e);
            RuntimeConfig::print_help();
            return ExitCode::from(EXIT_USAGE);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    if config.show_version {
        println!("pwm {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }
    ExitCode::from(run(config).code())
}

pub fn run(config: RuntimeConfig) -> PwmStatus {
    init_tracing(config.json_logs);

    let audit_logger = match init_audit_logger(config.audit_path.as_ref()) {
        Ok(logger) => logger,
        Err(status) => return status,
    };

    let stop = Arc::new(AtomicBool::new(false));
    if let Err(e) = register_stop_signals(&stop) {
        warn!(error = %e, "Failed to register signal handlers; signals will terminate the run");
    }

    let id = ChannelId::new(config.chip, config.channel);
    let mut channel = match open_channel(&config, id) {
        Ok(channel) => channel,
        Err(e) => {
            let status = e.status();
            error!(%id, status = %status, error = %e, "Failed to open PWM channel");
            audit(
                audit_logger.as_ref(),
                AuditEventType::ChannelOpenFailed,
                &ChannelOpenFailedDetails {
                    chip: id.chip,
                    channel: id.channel,
                    status: status.code(),
                    error: e.to_string(),
                },
            );
            return status;
        }
    };

    let script = config.effective_script();
    let exec_config = ExecutionConfig::new(script.clone())
        .with_defaults(config.frequency_hz, config.duration_ms)
        .with_cancel_flag(Arc::clone(&stop))
        .with_interrupt_policy(config.interrupt_policy());

    info!(
        %id,
        script = %script,
        default_frequency_hz = config.frequency_hz,
        default_duration_ms = config.duration_ms,
        simulate = config.simulate,
        "Running PWM script"
    );
    audit(
        audit_logger.as_ref(),
        AuditEventType::RunStarted,
        &RunStartedDetails {
            version: env!("CARGO_PKG_VERSION"),
            chip: id.chip,
            channel: id.channel,
            script,
            default_frequency_hz: config.frequency_hz,
            default_duration_ms: config.duration_ms,
            simulate: config.simulate,
        },
    );

    let mut executor = ScriptExecutor::new(&mut channel, MonotonicClock::new());
    let result = executor.run(&exec_config);
    let stats = executor.stats().clone();

    let status = report(&result, &stats);
    if matches!(result, Ok(Completion::Cancelled)) {
        audit(
            audit_logger.as_ref(),
            AuditEventType::RunCancelled,
            &serde_json::json!({ "commands_executed": stats.commands_executed }),
        );
    }
    audit(
        audit_logger.as_ref(),
        AuditEventType::RunFinished,
        &RunFinishedDetails {
            status: status.code(),
            status_text: status.description(),
            error: result.as_ref().err().map(ToString::to_string),
            commands_executed: stats.commands_executed,
            tones_played: stats.tones_played,
            silent_holds: stats.silent_holds,
            sleeps_resumed: stats.sleeps_resumed,
            max_overrun_us: stats.max_overrun_us,
        },
    );

    status
}

fn report(result: &Result<Completion, ExecutionError>, stats: &ExecutionStats) -> PwmStatus {
    match result {
        Ok(completion) => {
            info!(
                commands_executed = stats.commands_executed,
                tones_played = stats.tones_played,
                silent_holds = stats.silent_holds,
                sleeps_resumed = stats.sleeps_resumed,
                max_overrun_us = stats.max_overrun_us,
                cancelled = *completion == Completion::Cancelled,
                "Run complete"
            );
            completion.status()
        }
        Err(e) => {
            let status = e.status();
            error!(
                status = %status,
                error = %e,
                commands_executed = stats.commands_executed,
                "Run failed"
            );
            status
        }
    }
}

fn open_channel(config: &RuntimeConfig, id: ChannelId) -> Result<ToolChannel, SysfsError> {
    if config.simulate {
        info!(%id, "Using simulated PWM channel");
        return Ok(ToolChannel::Simulated(SimulatedChannel::new(id)));
    }

    let options = ChannelOptions {
        export: config.export,
        ..ChannelOptions::default()
    };
    let channel = SysfsChannel::open(&config.sysfs_root, id, &options)?;
    debug!(
        path = %channel.path().display(),
        exported = channel.was_exported(),
        "Using sysfs PWM channel"
    );
    Ok(ToolChannel::Sysfs(channel))
}

/// SIGINT and SIGTERM raise the stop flag instead of killing the process,
/// so the executor gets to disable the channel on the way out.
fn register_stop_signals(stop: &Arc<AtomicBool>) -> io::Result<()> {
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(stop))?;
    }
    Ok(())
}

fn init_audit_logger(audit_path: Option<&PathBuf>) -> Result<Option<AuditLogger>, PwmStatus> {
    let Some(path) = audit_path else {
        return Ok(None);
    };
    match AuditLogger::new(path) {
        Ok(logger) => {
            info!(path = %path.display(), "Audit logging enabled");
            Ok(Some(logger))
        }
        Err(e) => {
            error!(error = %e, path = %path.display(), "Failed to initialize audit logger");
            Err(PwmStatus::Io)
        }
    }
}

fn audit<D: Serialize>(logger: Option<&AuditLogger>, event_type: AuditEventType, details: &D) {
    if let Some(logger) = logger {
        if let Err(e) = logger.log_event(event_type, details) {
            warn!(error = %e, ?event_type, "Failed to write audit entry");
        }
    }
}
