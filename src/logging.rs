//! Console + log file logger.
//!
//! Every record is echoed to the console (warnings and errors on stderr) and
//! appended to `<output>/<project>_redist_maker.log` as
//! `YYYY-MM-DD HH:MM:SS LEVEL message`.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::OffsetDateTime;

static LOGGER: OnceCell<RedistLogger> = OnceCell::new();

struct RedistLogger {
    file: Mutex<Option<File>>,
}

impl log::Log for RedistLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        match record.level() {
            log::Level::Error | log::Level::Warn => {
                eprintln!("[{}] {}", record.level(), record.args())
            }
            _ => println!("{}", record.args()),
        }

        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let line = format_line(
                    OffsetDateTime::now_utc(),
                    record.level(),
                    &record.args().to_string(),
                );
                let _ = file.write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Path of the persistent log for `project` under `output_dir`.
pub fn log_path(output_dir: &Path, project: &str) -> PathBuf {
    output_dir.join(format!("{}_redist_maker.log", project))
}

/// Install the logger, appending to `path`. Calling it again redirects the
/// file output.
pub fn init(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory '{}'", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file '{}'", path.display()))?;

    let logger = LOGGER.get_or_init(|| RedistLogger {
        file: Mutex::new(None),
    });
    if let Ok(mut guard) = logger.file.lock() {
        *guard = Some(file);
    }

    // Fails only if another logger was installed first.
    let _ = log::set_logger(logger);
    log::set_max_level(log::LevelFilter::Info);
    Ok(())
}

/// Install the logger without a log file, for commands that produce no
/// output directory.
pub fn init_console() {
    let logger = LOGGER.get_or_init(|| RedistLogger {
        file: Mutex::new(None),
    });
    let _ = log::set_logger(logger);
    log::set_max_level(log::LevelFilter::Info);
}

/// Current UTC time as `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

fn format_timestamp(now: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn format_line(now: OffsetDateTime, level: log::Level, message: &str) -> String {
    format!("{} {} {}\n", format_timestamp(now), level, message)
}
