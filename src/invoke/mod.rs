//! Running external tools and judging their output.
//!
//! Every tool run leaves a log file under the output directory. The verdict
//! comes from the exit code and from a scan of that log: the trailing summary
//! line of an IDE build (`N failed`) and any `cannot be opened` diagnostic.

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

static FAILED_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) failed").expect("valid regex"));

const CANNOT_OPEN: &str = "cannot be opened";

/// Number of trailing log lines searched for the summary.
const SUMMARY_LINES: usize = 2;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Who writes the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCapture {
    /// stdout and stderr are redirected into the log.
    Redirect,
    /// The tool writes the log itself (`devenv /out <log>`); console output
    /// is passed through.
    ToolWrites,
}

/// How much the log scan is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPolicy {
    /// The tool always ends with a `N failed` summary; a missing summary
    /// means the run cannot be judged.
    ExpectSummary,
    /// Exit code and `cannot be opened` only.
    ExitCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationVerdict {
    Success,
    Failed,
    /// No summary line where one was expected.
    Inconclusive,
}

impl fmt::Display for InvocationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationVerdict::Success => write!(f, "success"),
            InvocationVerdict::Failed => write!(f, "failed"),
            InvocationVerdict::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// Result of scanning a tool log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogScan {
    pub failed_count: Option<u32>,
    pub cannot_open: bool,
    pub summary: Vec<String>,
}

/// Scan a tool log: the last non-blank lines for the failure count, the
/// whole text for unopenable files.
pub fn scan_log(text: &str) -> LogScan {
    let mut summary: Vec<String> = text
        .lines()
        .rev()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .take(SUMMARY_LINES)
        .map(str::to_string)
        .collect();
    summary.reverse();

    let failed_count = summary
        .iter()
        .rev()
        .find_map(|line| FAILED_COUNT.captures(line))
        .and_then(|c| c[1].parse().ok());

    LogScan {
        failed_count,
        cannot_open: text.contains(CANNOT_OPEN),
        summary,
    }
}

/// One finished tool run.
#[derive(Debug, Clone)]
pub struct BuildInvocation {
    pub command: String,
    pub log_path: PathBuf,
    pub exit_code: Option<i32>,
    pub policy: ScanPolicy,
    pub scan: LogScan,
}

impl BuildInvocation {
    pub fn verdict(&self) -> InvocationVerdict {
        if self.exit_code != Some(0) {
            return InvocationVerdict::Failed;
        }
        if self.scan.failed_count.is_some_and(|n| n > 0) || self.scan.cannot_open {
            return InvocationVerdict::Failed;
        }
        if self.policy == ScanPolicy::ExpectSummary && self.scan.failed_count.is_none() {
            return InvocationVerdict::Inconclusive;
        }
        InvocationVerdict::Success
    }

    /// Fail with a descriptive error unless the verdict is `Success`.
    pub fn ensure_success(&self, what: &str) -> Result<()> {
        let verdict = self.verdict();
        for line in &self.scan.summary {
            log::info!("{}", line);
        }
        if verdict == InvocationVerdict::Success {
            return Ok(());
        }
        log::error!("{} {} ({})", what, verdict, self.command);
        let mut reasons = Vec::new();
        match self.exit_code {
            Some(0) => {}
            Some(code) => reasons.push(format!("exit code {code}")),
            None => reasons.push("terminated by signal".to_string()),
        }
        if let Some(n) = self.scan.failed_count.filter(|n| *n > 0) {
            reasons.push(format!("{n} failed"));
        }
        if self.scan.cannot_open {
            reasons.push(format!("'{CANNOT_OPEN}' in output"));
        }
        if verdict == InvocationVerdict::Inconclusive {
            reasons.push("no build summary found".to_string());
        }
        bail!(
            "{} {}: {} (see {})",
            what,
            verdict,
            reasons.join(", "),
            self.log_path.display()
        )
    }
}

/// Shell-like rendering of a command for logs.
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        if arg.contains(' ') {
            parts.push(format!("\"{arg}\""));
        } else {
            parts.push(arg.into_owned());
        }
    }
    parts.join(" ")
}

/// Run `cmd` to completion with its output going to `log`, then scan the log.
pub fn run_logged(
    mut cmd: Command,
    log: &Path,
    capture: OutputCapture,
    policy: ScanPolicy,
) -> Result<BuildInvocation> {
    if let Some(parent) = log.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory '{}'", parent.display()))?;
    }
    let command = describe(&cmd);
    log::info!("Running: {}", command);

    match capture {
        OutputCapture::Redirect => {
            let out = File::create(log)
                .with_context(|| format!("creating log '{}'", log.display()))?;
            let err = out
                .try_clone()
                .with_context(|| format!("duplicating log handle '{}'", log.display()))?;
            cmd.stdout(Stdio::from(out)).stderr(Stdio::from(err));
        }
        OutputCapture::ToolWrites => {
            if log.exists() {
                fs::remove_file(log)
                    .with_context(|| format!("removing stale log '{}'", log.display()))?;
            }
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
    }

    let status = cmd
        .status()
        .with_context(|| format!("Failed to run {}", command))?;

    let text = match fs::read(log) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("reading log '{}'", log.display()));
        }
    };

    Ok(BuildInvocation {
        command,
        log_path: log.to_path_buf(),
        exit_code: status.code(),
        policy,
        scan: scan_log(&text),
    })
}

/// Run `cmd`, killing it if it is still running after `timeout`.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<ExitStatus> {
    let command = describe(&cmd);
    log::info!("Running (timeout {}s): {}", timeout.as_secs(), command);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn {}", command))?;
    let start = Instant::now();

    loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("waiting for {}", command))?
        {
            return Ok(status);
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            bail!("TIMEOUT: {} did not finish in {}s", command, timeout.as_secs());
        }
        thread::sleep(POLL_INTERVAL);
    }
}
