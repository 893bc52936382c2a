/*
================================================================================
                              ARHud Logging System
================================================================================

Standard application logging on top of the `log` facade:

- `BufferLogger`: keeps the last `MAX_LOG_LINES` records from this crate in a
  ring buffer so they can be exported or attached to a panic report
- `CompositeLogger`: console output (env_logger) plus the buffer
- `setup_logger()`: installs the composite logger with per-build defaults
- `setup_panic_hook()`: writes panics with a backtrace and the buffered log
  lines to `<data_dir>/arhud/logs/panic.log`
- `export_debug_logs()`: writes the buffer to `<data_dir>/arhud/logs/debug.log`

Log levels:
- Debug builds: DEBUG and above for `arhud`
- Release builds: ERROR only (unless RUST_LOG is set)
- Other crates are silenced

Per-frame and per-cycle chatter goes to TRACE so the debug level stays
readable while the HUD runs at display rate.
================================================================================
*/

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use env_logger::fmt::{Color, Formatter};
use log::{info, Level, LevelFilter, Metadata, Record};

const MAX_LOG_LINES: usize = 1000;
const TARGET_PREFIX: &str = "arhud";

pub type LogBuffer = Arc<Mutex<VecDeque<String>>>;

struct BufferLogger {
    log_buffer: LogBuffer,
}

impl BufferLogger {
    fn new() -> Self {
        Self {
            log_buffer: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES))),
        }
    }

    fn log_to_buffer(&self, message: &str, target: &str, line: Option<u32>) {
        if !target.starts_with(TARGET_PREFIX) {
            return;
        }
        let Ok(mut buffer) = self.log_buffer.lock() else {
            return;
        };
        if buffer.len() == MAX_LOG_LINES {
            buffer.pop_front();
        }

        // The module is already in the target, only the line is added
        let formatted_message = if let Some(line_num) = line {
            format!("{target}:{line_num} {message}")
        } else {
            format!("{target} {message}")
        };
        buffer.push_back(formatted_message);
    }

    fn get_shared_buffer(&self) -> LogBuffer {
        Arc::clone(&self.log_buffer)
    }
}

impl log::Log for BufferLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with(TARGET_PREFIX) && metadata.level() <= LevelFilter::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = format!("{:<5} {}", record.level(), record.args());
            self.log_to_buffer(&message, record.target(), record.line());
        }
    }

    fn flush(&self) {}
}

struct CompositeLogger {
    console_logger: env_logger::Logger,
    buffer_logger: BufferLogger,
}

impl log::Log for CompositeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console_logger.enabled(metadata) || self.buffer_logger.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.console_logger.enabled(record.metadata()) {
            self.console_logger.log(record);
        }
        if self.buffer_logger.enabled(record.metadata()) {
            self.buffer_logger.log(record);
        }
    }

    fn flush(&self) {
        self.console_logger.flush();
        self.buffer_logger.flush();
    }
}

pub fn setup_logger(_app_name: &str) -> LogBuffer {
    let buffer_logger = BufferLogger::new();
    let shared_buffer = buffer_logger.get_shared_buffer();

    let mut builder = env_logger::Builder::new();

    // RUST_LOG wins when set
    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_env("RUST_LOG");
    } else if cfg!(debug_assertions) {
        builder.filter(Some(TARGET_PREFIX), LevelFilter::Debug);
    } else {
        builder.filter(Some(TARGET_PREFIX), LevelFilter::Error);
    }

    // Filter out all other crates' logs
    builder.filter(None, LevelFilter::Off);

    builder.format(|buf: &mut Formatter, record: &Record| {
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

        let module_info = match (record.module_path(), record.line()) {
            (Some(module), Some(line)) => format!("{module}:{line}"),
            (Some(module), None) => module.to_string(),
            (None, Some(line)) => format!("line:{line}"),
            (None, None) => "unknown".to_string(),
        };

        let mut level_style = buf.style();
        let mut meta_style = buf.style();

        match record.level() {
            Level::Error => level_style.set_color(Color::Red).set_bold(true),
            Level::Warn => level_style.set_color(Color::Yellow).set_bold(true),
            Level::Info => level_style.set_color(Color::Green).set_bold(true),
            Level::Debug => level_style.set_color(Color::Blue).set_bold(true),
            Level::Trace => level_style.set_color(Color::White),
        };

        // Color::Rgb does not work on macOS
        #[cfg(target_os = "macos")]
        {
            meta_style.set_color(Color::Blue);
        }
        #[cfg(not(target_os = "macos"))]
        {
            meta_style.set_color(Color::Rgb(120, 120, 120));
        }

        writeln!(
            buf,
            "{} {} {} {}",
            meta_style.value(timestamp),
            level_style.value(record.level()),
            meta_style.value(module_info),
            record.args()
        )
    });

    let console_logger = builder.build();
    let composite_logger = CompositeLogger {
        console_logger,
        buffer_logger,
    };

    log::set_boxed_logger(Box::new(composite_logger)).expect("Failed to set logger");

    // Filtering happens in the loggers themselves
    log::set_max_level(LevelFilter::Trace);

    shared_buffer
}

pub fn get_log_directory(app_name: &str) -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join(app_name).join("logs")
}

fn snapshot(log_buffer: &LogBuffer) -> Vec<String> {
    log_buffer
        .lock()
        .map(|buffer| buffer.iter().cloned().collect())
        .unwrap_or_default()
}

/// Write the buffered log lines to `debug.log` in the log directory.
///
/// Only records from the `log` macros are captured, not raw `println!` output.
pub fn export_debug_logs(app_name: &str, log_buffer: LogBuffer) -> Result<PathBuf, std::io::Error> {
    let log_dir_path = get_log_directory(app_name);
    std::fs::create_dir_all(&log_dir_path)?;
    let debug_log_path = log_dir_path.join("debug.log");

    // Copy first so logging below cannot contend with the export
    let entries = snapshot(&log_buffer);
    write_log_export(&debug_log_path, &entries)?;

    info!("Debug logs exported to: {}", debug_log_path.display());
    Ok(debug_log_path)
}

fn write_log_export(path: &Path, entries: &[String]) -> Result<(), std::io::Error> {
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

    writeln!(file, "{timestamp} [DEBUG EXPORT] =====================================")?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] ARHud Debug Log Export")?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] Maximum captured entries: {MAX_LOG_LINES}")?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] =====================================")?;
    writeln!(file)?;

    if entries.is_empty() {
        writeln!(file, "{timestamp} [DEBUG EXPORT] No log entries found in buffer")?;
    } else {
        writeln!(file, "{timestamp} [DEBUG EXPORT] Found {} log entries:", entries.len())?;
        writeln!(file)?;
        for entry in entries {
            writeln!(file, "{timestamp} {entry}")?;
        }
    }

    writeln!(file)?;
    writeln!(file, "{timestamp} [DEBUG EXPORT] Total entries exported: {}", entries.len())?;
    file.flush()
}

pub fn setup_panic_hook(app_name: &str, log_buffer: LogBuffer) {
    let log_file_path = get_log_directory(app_name).join("panic.log");
    if let Some(parent) = log_file_path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create log directory");
    }

    panic::set_hook(Box::new(move |info| {
        let backtrace = backtrace::Backtrace::new();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

        let location = if let Some(location) = info.location() {
            format!("{}:{}", location.file(), location.line())
        } else {
            "unknown location".to_string()
        };
        let header_msg = format!("[PANIC] at {location} - {info}");
        let backtrace_lines: Vec<String> = format!("{backtrace:?}")
            .lines()
            .map(|line| format!("[BACKTRACE] {}", line.trim()))
            .collect();

        let written = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&log_file_path)
            .and_then(|mut file| {
                writeln!(file, "{timestamp} {header_msg}")?;
                writeln!(file, "{timestamp} [PANIC] Backtrace:")?;
                for line in &backtrace_lines {
                    writeln!(file, "{timestamp} {line}")?;
                }
                writeln!(file)?;
                writeln!(file)?;
                writeln!(file, "{timestamp} [PANIC] Last {MAX_LOG_LINES} log entries:")?;
                for log in snapshot(&log_buffer) {
                    writeln!(file, "{timestamp} {log}")?;
                }
                Ok(())
            });

        eprintln!("\n\n{header_msg}");
        eprintln!("[PANIC] Backtrace:");
        for line in &backtrace_lines {
            eprintln!("{line}");
        }
        match written {
            Ok(()) => eprintln!("\nA complete crash log has been written to: {}", log_file_path.display()),
            Err(e) => eprintln!("\nFailed to write crash log {}: {}", log_file_path.display(), e),
        }
    }));
}
