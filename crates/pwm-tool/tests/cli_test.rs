use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn pwm(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pwm"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run pwm binary")
}

fn make_channel(root: &Path, chip: u32, channel: u32) -> PathBuf {
    let dir = root.join(format!("pwmchip{}/pwm{}", chip, channel));
    fs::create_dir_all(&dir).unwrap();
    for name in ["enable", "period", "duty_cycle"] {
        fs::write(dir.join(name), "0").unwrap();
    }
    dir
}

#[test]
fn simulated_script_succeeds() {
    let out = pwm(&["--simulate", "-s", "F2000D20 d10 f"]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn syntax_error_exits_with_failed() {
    let out = pwm(&["--simulate", "-s", "fx"]);
    assert_eq!(out.status.code(), Some(9));
}

#[test]
fn invalid_frequency_exits_with_its_status() {
    let out = pwm(&["--simulate", "-f", "600000000", "-d", "5"]);
    assert_eq!(out.status.code(), Some(5));
}

#[test]
fn unknown_option_prints_usage() {
    let out = pwm(&["--bogus"]);
    assert_eq!(out.status.code(), Some(22));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Usage: pwm"));
    assert!(String::from_utf8_lossy(&out.stderr).contains("--bogus"));
}

#[test]
fn bad_number_is_a_usage_error() {
    let out = pwm(&["--simulate", "-d", "10ms"]);
    assert_eq!(out.status.code(), Some(22));
}

#[test]
fn version_and_help() {
    let out = pwm(&["--version"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains(env!("CARGO_PKG_VERSION")));

    let out = pwm(&["--help"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("--keep-enabled"));
}

#[test]
fn drives_sysfs_tree() {
    let root = tempdir().unwrap();
    let dir = make_channel(root.path(), 1, 2);
    let root_arg = root.path().to_str().unwrap();

    let out = pwm(&["--sysfs-root", root_arg, "-p", "1", "-c", "2", "-f", "0x3e8", "-d", "10"]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(fs::read_to_string(dir.join("period")).unwrap(), "1000000");
    assert_eq!(fs::read_to_string(dir.join("duty_cycle")).unwrap(), "500000");
    assert_eq!(fs::read_to_string(dir.join("enable")).unwrap(), "0");
}

#[test]
fn keep_enabled_leaves_channel_on() {
    let root = tempdir().unwrap();
    let dir = make_channel(root.path(), 0, 0);

    let out = pwm(&["--sysfs-root", root.path().to_str().unwrap(), "-k", "-d", "5"]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(fs::read_to_string(dir.join("enable")).unwrap(), "1");
}

#[test]
fn missing_chip_and_channel_exit_codes() {
    let root = tempdir().unwrap();
    make_channel(root.path(), 0, 0);
    let root_arg = root.path().to_str().unwrap();

    assert_eq!(pwm(&["--sysfs-root", root_arg, "-p", "4"]).status.code(), Some(3));
    assert_eq!(pwm(&["--sysfs-root", root_arg, "-c", "1"]).status.code(), Some(4));
    assert_eq!(
        pwm(&["--sysfs-root", &format!("{}/none", root_arg)]).status.code(),
        Some(2)
    );
}

#[test]
fn audit_log_records_run() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("audit/run.jsonl");

    let out = pwm(&["--simulate", "-s", "f d5", "--audit-log", log.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));

    let content = fs::read_to_string(&log).unwrap();
    let events: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "run_started");
    assert_eq!(events[0]["details"]["script"], "f d5");
    assert_eq!(events[1]["event_type"], "run_finished");
    assert_eq!(events[1]["details"]["status"], 0);
    assert_eq!(events[1]["details"]["commands_executed"], 2);
}

#[test]
fn audit_log_records_open_failure() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("run.jsonl");
    let missing = dir.path().join("no-sysfs");

    let out = pwm(&[
        "--sysfs-root",
        missing.to_str().unwrap(),
        "--audit-log",
        log.to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(2));

    let content = fs::read_to_string(&log).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("\"channel_open_failed\""));
}

#[test]
fn sigint_during_sleep_aborts_with_interrupted() {
    let child = Command::new(env!("CARGO_BIN_EXE_pwm"))
        .args(["--simulate", "-s", "fd3000 fd3000"])
        .env("RUST_LOG", "warn")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start pwm binary");

    // Leave time for the signal handlers to be installed.
    thread::sleep(Duration::from_millis(500));
    let started = Instant::now();
    let killed = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let out = child.wait_with_output().unwrap();
    assert_eq!(out.status.code(), Some(8));
    assert!(started.elapsed() < Duration::from_millis(2000));
}

#[test]
fn sigint_with_resume_finishes_current_command() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("run.jsonl");
    let child = Command::new(env!("CARGO_BIN_EXE_pwm"))
        .args(["--simulate", "--resume-on-signal", "-s", "fd1500 fd1500 fd1500"])
        .args(["--audit-log", log.to_str().unwrap()])
        .env("RUST_LOG", "warn")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start pwm binary");

    thread::sleep(Duration::from_millis(500));
    let started = Instant::now();
    Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();

    let out = child.wait_with_output().unwrap();
    // The first command still runs to its deadline; the rest are skipped.
    assert_eq!(out.status.code(), Some(0));
    assert!(started.elapsed() >= Duration::from_millis(800));
    assert!(started.elapsed() < Duration::from_millis(2500));

    let events: Vec<serde_json::Value> = fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["run_started", "run_cancelled", "run_finished"]);
    assert_eq!(events[1]["details"]["commands_executed"], 1);
    assert_eq!(events[2]["details"]["status"], 0);
    assert_eq!(events[2]["details"]["sleeps_resumed"], 1);
}

#[test]
fn bundled_keep_flag() {
    let root = tempdir().unwrap();
    let dir = make_channel(root.path(), 0, 0);

    let out = pwm(&["--sysfs-root", root.path().to_str().unwrap(), "-kf2000", "-d5"]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(fs::read_to_string(dir.join("period")).unwrap(), "500000");
    assert_eq!(fs::read_to_string(dir.join("enable")).unwrap(), "1");
}

#[test]
fn json_logs_are_one_object_per_line() {
    let out = Command::new(env!("CARGO_BIN_EXE_pwm"))
        .args(["--simulate", "--json-logs", "-s", "f d5"])
        .env("RUST_LOG", "info")
        .output()
        .expect("Failed to run pwm binary");
    assert_eq!(out.status.code(), Some(0));

    let stderr = String::from_utf8_lossy(&out.stderr);
    let records: Vec<serde_json::Value> = stderr
        .lines()
        .map(|line| serde_json::from_str(line).expect("log line is not JSON"))
        .collect();
    assert!(records
        .iter()
        .any(|r| r["fields"]["message"] == "Run complete"
            && r["fields"]["commands_executed"] == 2));
}

#[test]
fn export_requests_missing_channel() {
    let root = tempdir().unwrap();
    let chip = root.path().join("pwmchip0");
    fs::create_dir_all(&chip).unwrap();
    fs::write(chip.join("export"), "").unwrap();

    // Stand in for the kernel: create the channel once its index is exported.
    let creator = {
        let root = root.path().to_path_buf();
        thread::spawn(move || {
            let export = root.join("pwmchip0/export");
            let waited = Instant::now();
            while fs::read_to_string(&export).unwrap_or_default().is_empty() {
                if waited.elapsed() > Duration::from_secs(10) {
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
            let staged = make_channel(&root.join("staging"), 0, 0);
            fs::rename(staged, root.join("pwmchip0/pwm0")).unwrap();
        })
    };

    let out = pwm(&["--sysfs-root", root.path().to_str().unwrap(), "--export", "-d", "5"]);
    creator.join().unwrap();

    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(fs::read_to_string(chip.join("export")).unwrap(), "0");
    assert_eq!(fs::read_to_string(chip.join("pwm0/period")).unwrap(), "1000000");
    assert_eq!(fs::read_to_string(chip.join("pwm0/enable")).unwrap(), "0");
}
