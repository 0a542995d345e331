//! Runs a user script when the five-hour window is hot while the seven-day
//! window still has headroom.

use chrono::{DateTime, Duration, Utc};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::settings::AutomationConfig;

/// Marker variable set in the script's environment.
pub const TRIGGER_ENV_VAR: &str = "CLAUDE_USAGE_MONITOR_TRIGGER";
/// Minimum spacing between two launches.
pub const MIN_INTERVAL_SECONDS: i64 = 60;

pub struct AutomationTrigger {
    last_execution: Mutex<Option<DateTime<Utc>>>,
    min_interval: Duration,
}

impl Default for AutomationTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomationTrigger {
    pub fn new() -> Self {
        Self {
            last_execution: Mutex::new(None),
            min_interval: Duration::seconds(MIN_INTERVAL_SECONDS),
        }
    }

    /// Returns true iff the script was launched.
    pub fn evaluate(&self, five_hour: f64, seven_day: f64, config: &AutomationConfig) -> bool {
        self.evaluate_at(five_hour, seven_day, config, Utc::now())
    }

    pub fn evaluate_at(
        &self,
        five_hour: f64,
        seven_day: f64,
        config: &AutomationConfig,
        now: DateTime<Utc>,
    ) -> bool {
        if !config.enabled {
            return false;
        }
        let Some(script_path) = config.script_path.as_deref().filter(|p| !p.trim().is_empty())
        else {
            return false;
        };
        if !(five_hour > config.five_hour_threshold && seven_day < config.seven_day_threshold) {
            return false;
        }

        {
            let mut last = self
                .last_execution
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(prev) = *last {
                if now - prev < self.min_interval {
                    debug!(
                        since_last_secs = (now - prev).num_seconds(),
                        "automation throttled"
                    );
                    return false;
                }
            }
            // Stamped before launch so a hanging script still holds the throttle.
            *last = Some(now);
        }

        info!(script = script_path, five_hour, seven_day, "automation condition met");
        run_script(script_path)
    }

    pub fn reset_throttle(&self) {
        *self
            .last_execution
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Build the command for a script, choosing an interpreter by extension.
pub fn script_command(script_path: &str) -> Command {
    let ext = Path::new(script_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let mut cmd = match ext.as_str() {
        "sh" | "bash" => {
            let mut c = Command::new("/bin/bash");
            c.arg(script_path);
            c
        }
        "zsh" => {
            let mut c = Command::new("/bin/zsh");
            c.arg(script_path);
            c
        }
        "py" => {
            let mut c = Command::new("/usr/bin/env");
            c.args(["python3", script_path]);
            c
        }
        _ => Command::new(script_path),
    };
    cmd.env(TRIGGER_ENV_VAR, "1");
    cmd
}

/// Launch and wait. Returns whether the process could be started; its exit
/// status is only logged.
fn run_script(script_path: &str) -> bool {
    let (status, output) = match run_with_merged_output(script_command(script_path)) {
        Ok(r) => r,
        Err(e) => {
            warn!(script = script_path, error = %e, "failed to launch automation script");
            return false;
        }
    };

    if status.success() {
        info!(script = script_path, "automation script finished");
    } else {
        warn!(
            script = script_path,
            code = ?status.code(),
            output = output.trim(),
            "automation script exited with failure"
        );
    }
    true
}

/// Run `cmd` with stdout and stderr sharing one pipe, so the captured text
/// keeps the order the script wrote it in.
fn run_with_merged_output(mut cmd: Command) -> io::Result<(ExitStatus, String)> {
    let (mut reader, writer) = io::pipe()?;
    cmd.stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    let mut child = cmd.spawn()?;
    // The command still owns copies of the write end; EOF needs them closed.
    drop(cmd);

    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    let status = child.wait()?;
    Ok((status, String::from_utf8_lossy(&raw).into_owned()))
}
