//! Per-run batch logger with file and callback output.
//!
//! Each pipeline run gets its own logger that:
//! - Writes to a dedicated file under the batch `logs/` directory
//! - Forwards every line to a callback (if provided)
//! - Mirrors warnings and errors into `tracing`
//! - Keeps a tail of external tool output for failure diagnosis

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-run logger with dual output (file + callback).
pub struct BatchLogger {
    run_name: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    callback: Mutex<Option<LogCallback>>,
    config: LogConfig,
    /// Recent tool output lines.
    tail_buffer: Mutex<VecDeque<String>>,
    /// Last progress value logged (compact mode filtering).
    last_progress: Mutex<u32>,
    warning_count: Mutex<usize>,
}

impl BatchLogger {
    /// Create a logger writing `<log_dir>/<run_name>.log`.
    pub fn new(
        run_name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let run_name = run_name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&run_name)));
        let file = File::create(&log_path)?;

        Ok(Self {
            run_name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback: Mutex::new(callback),
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
            last_progress: Mutex::new(0),
            warning_count: Mutex::new(0),
        })
    }

    /// A logger that only forwards to `tracing` and the callback, no file.
    pub fn detached(run_name: impl Into<String>, callback: Option<LogCallback>) -> Self {
        Self {
            run_name: run_name.into(),
            log_path: PathBuf::new(),
            file_writer: Mutex::new(None),
            callback: Mutex::new(callback),
            config: LogConfig::default(),
            tail_buffer: Mutex::new(VecDeque::new()),
            last_progress: Mutex::new(0),
            warning_count: Mutex::new(0),
        }
    }

    /// Path of the log file (empty for detached loggers).
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        *self.warning_count.lock() += 1;
        tracing::warn!(run = %self.run_name, "{}", message);
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        tracing::error!(run = %self.run_name, "{}", message);
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log an external tool invocation.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Debug, &MessagePrefix::Command.format(command));
    }

    /// Log a step header.
    pub fn step(&self, number: u8, name: &str) {
        let msg = MessagePrefix::Step.format(&format!("Step {}: {}", number, name));
        self.log(LogLevel::Info, &msg);
    }

    pub fn section(&self, section_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Section.format(section_name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    pub fn validation(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Validation.format(message));
    }

    /// Log a per-file failure; the step keeps going.
    pub fn item_failure(&self, item: &str, reason: &str) {
        tracing::warn!(run = %self.run_name, item, "{}", reason);
        let msg = MessagePrefix::Item.format(&format!("{}: {}", item, reason));
        self.log(LogLevel::Warn, &msg);
    }

    /// Log progress (filtered in compact mode).
    ///
    /// Returns true if the progress was logged.
    pub fn progress(&self, percent: u32) -> bool {
        if self.config.compact {
            let mut last = self.last_progress.lock();
            let step = self.config.progress_step.max(1);

            let current_step = (percent / step) * step;
            let last_step = (*last / step) * step;

            if current_step <= last_step && percent < 100 {
                return false;
            }
            *last = percent;
        }

        self.log(LogLevel::Info, &format!("Progress: {}%", percent));
        true
    }

    /// Record a line of external tool output.
    ///
    /// Always kept in the tail buffer; written out only in verbose mode.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        let prefix = if is_stderr { "[stderr] " } else { "" };
        let line = format!("{}{}", prefix, line);
        {
            let mut buffer = self.tail_buffer.lock();
            if self.config.error_tail > 0 && buffer.len() >= self.config.error_tail {
                buffer.pop_front();
            }
            buffer.push_back(line.clone());
        }

        if !self.config.compact {
            self.output(&self.format_message(&line));
        }
    }

    /// Write out the tail buffer (after a tool failure).
    pub fn show_tail(&self, header: &str) {
        let buffer = self.tail_buffer.lock();
        if buffer.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in buffer.iter() {
            self.output(&self.format_message(line));
        }
    }

    pub fn clear_tail(&self) {
        self.tail_buffer.lock().clear();
    }

    /// Number of warnings logged so far.
    pub fn warning_count(&self) -> usize {
        *self.warning_count.lock()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Flush and release the file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }

        if let Some(ref callback) = *self.callback.lock() {
            callback(formatted);
        }
    }
}

impl Drop for BatchLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Make a string safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn creates_log_file() {
        let dir = tempdir().unwrap();
        let logger = BatchLogger::new("run_1", dir.path(), LogConfig::default(), None).unwrap();

        assert!(logger.log_path().exists());
        assert!(logger.log_path().ends_with("run_1.log"));
    }

    #[test]
    fn writes_step_and_item_lines() {
        let dir = tempdir().unwrap();
        let logger = BatchLogger::new("run_1", dir.path(), LogConfig::default(), None).unwrap();

        logger.step(4, "Normalize depth");
        logger.item_failure("scan_07.tif", "decode failed");
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("=== Step 4: Normalize depth ==="));
        assert!(content.contains("[ITEM] scan_07.tif: decode failed"));
    }

    #[test]
    fn calls_callback_and_counts_warnings() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: LogCallback = Box::new(move |_msg| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let logger = BatchLogger::detached("run", Some(callback));
        logger.info("one");
        logger.warn("two");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(logger.warning_count(), 1);
    }

    #[test]
    fn debug_is_filtered_at_info() {
        let dir = tempdir().unwrap();
        let mut config = LogConfig::default();
        config.show_timestamps = false;
        let logger = BatchLogger::new("run", dir.path(), config, None).unwrap();

        logger.command("exiftool -ver");
        logger.info("kept");
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert_eq!(content, "kept\n");
    }

    #[test]
    fn compact_mode_filters_progress() {
        let logger = BatchLogger::detached("run", None);

        assert!(!logger.progress(5));
        assert!(!logger.progress(15));
        assert!(logger.progress(20));
        assert!(!logger.progress(25));
        assert!(logger.progress(40));
        assert!(logger.progress(100));
    }

    #[test]
    fn tail_buffer_maintains_limit() {
        let dir = tempdir().unwrap();
        let mut config = LogConfig::default();
        config.error_tail = 5;
        let logger = BatchLogger::new("run", dir.path(), config, None).unwrap();

        for i in 0..10 {
            logger.output_line(&format!("exiftool line {}", i), i == 9);
        }
        logger.show_tail("exiftool");
        logger.close();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        let after_header = content.split("[exiftool/tail]").nth(1).unwrap();
        assert!(!after_header.contains("exiftool line 4"));
        assert!(after_header.contains("exiftool line 5"));
        assert!(after_header.contains("[stderr] exiftool line 9"));
    }

    #[test]
    fn sanitizes_filename() {
        assert_eq!(sanitize_filename("run_2024"), "run_2024");
        assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
    }
}
