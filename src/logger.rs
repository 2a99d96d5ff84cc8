/*============================================================
  Synavera Project: Sparkler
  Module: sparkler_core::logger
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Structured, append-only session log for Sparkler runs,
    sealed with a SHA-256 sidecar when the run ends.

  Security / Safety Notes:
    Registered secrets (catalog password, basic-auth header)
    are masked before an entry reaches stderr or disk, so
    echoed server bodies cannot leak them.

  Dependencies:
    chrono for UTC stamps, sha2 for the session digest.

  Operational Scope:
    One logger per invocation, shared by reference with the
    reconciler and the catalog client.

  Revision History:
    2026-10-16 COD  Session logger with secret masking.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Append-only logging with UTC timestamps
    - Deterministic formatting for auditability
    - Secrets never persisted
============================================================*/

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::{Result, SparklerError};

const MASK: &str = "[redacted]";

/// Severity of a log entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }

    /// Warnings and errors always reach stderr.
    fn always_echoed(self) -> bool {
        matches!(self, LogLevel::Warn | LogLevel::Error)
    }
}

/// Session logger writing `<stamp> [LEVEL] [CODE] message` lines.
pub struct Logger {
    sink: Option<Mutex<BufWriter<File>>>,
    path: Option<PathBuf>,
    verbose: bool,
    secrets: Mutex<Vec<String>>,
}

impl Logger {
    /// Logger echoing to stderr and, when `path` is given, appending to it.
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let sink = match &path {
            Some(path) => Some(Mutex::new(BufWriter::new(open_append(path)?))),
            None => None,
        };
        Ok(Self {
            sink,
            path,
            verbose,
            secrets: Mutex::new(Vec::new()),
        })
    }

    /// Logger that only reports warnings and errors to stderr.
    pub fn quiet() -> Self {
        Self {
            sink: None,
            path: None,
            verbose: false,
            secrets: Mutex::new(Vec::new()),
        }
    }

    /// Mask every later occurrence of `secret`. Empty strings are ignored.
    pub fn redact(&self, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.is_empty() {
            return;
        }
        if let Ok(mut secrets) = self.secrets.lock() {
            if !secrets.contains(&secret) {
                secrets.push(secret);
            }
        }
    }

    fn scrub(&self, message: &str) -> String {
        let mut scrubbed = message.to_string();
        if let Ok(secrets) = self.secrets.lock() {
            for secret in secrets.iter() {
                scrubbed = scrubbed.replace(secret.as_str(), MASK);
            }
        }
        scrubbed
    }

    pub fn log<S: AsRef<str>>(&self, level: LogLevel, code: &str, message: S) {
        let line = format!(
            "{} [{}] [{code}] {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            level.as_str(),
            self.scrub(message.as_ref())
        );

        if self.verbose || level.always_echoed() {
            eprintln!("{line}");
        }
        self.append(&line);
    }

    fn append(&self, line: &str) {
        let Some(sink) = &self.sink else {
            return;
        };
        let Ok(mut writer) = sink.lock() else {
            return;
        };
        if let Err(err) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
            eprintln!("[LOGGER] session log write failed: {err}");
        }
    }

    pub fn info<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Info, code, message);
    }

    pub fn warn<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Warn, code, message);
    }

    pub fn error<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Error, code, message);
    }

    /// Written to the session file always, to stderr only when verbose.
    pub fn debug<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Debug, code, message);
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Seal the session log with `<log>.hash` in `sha256sum` format.
    pub fn finalize(&self) -> Result<()> {
        let Some(path) = self.path() else {
            return Ok(());
        };
        let data = std::fs::read(path).map_err(|err| {
            SparklerError::Filesystem(format!("Failed to read log {}: {err}", path.display()))
        })?;
        let sidecar = sidecar_path(path);
        let entry = format!(
            "{:x}  {}\n",
            Sha256::digest(&data),
            path.file_name().unwrap_or_default().to_string_lossy()
        );
        std::fs::write(&sidecar, entry).map_err(|err| {
            SparklerError::Filesystem(format!(
                "Failed to write hash file {}: {err}",
                sidecar.display()
            ))
        })
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            SparklerError::Filesystem(format!(
                "Failed to create log directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| {
            SparklerError::Filesystem(format!(
                "Failed to open log file {}: {err}",
                path.display()
            ))
        })
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".hash");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logger_appends_entries_and_writes_digest_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("run.log");

        let logger = Logger::new(Some(log_path.clone()), false).unwrap();
        logger.info("INIT", "first");
        logger.debug("SCAN", "second");
        logger.finalize().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[INFO] [INIT] first"));
        assert!(lines[1].ends_with("[DEBUG] [SCAN] second"));

        let digest = std::fs::read_to_string(dir.path().join("logs").join("run.log.hash")).unwrap();
        let expected = format!("{:x}", Sha256::digest(contents.as_bytes()));
        assert_eq!(digest.trim_end(), format!("{expected}  run.log"));
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("run.log");

        Logger::new(Some(log_path.clone()), false).unwrap().info("A", "one");
        Logger::new(Some(log_path.clone()), false).unwrap().info("B", "two");

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn registered_secrets_never_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("run.log");
        let logger = Logger::new(Some(log_path.clone()), false).unwrap();
        logger.redact("s3cret");
        logger.redact("");

        logger.error("WRITEBACK", "server echoed password=s3cret back");

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(!contents.contains("s3cret"));
        assert!(contents.contains("password=[redacted] back"));
    }

    #[test]
    fn quiet_logger_has_no_backing_file() {
        let logger = Logger::quiet();
        logger.warn("TEST", "stderr only");
        assert!(logger.path().is_none());
        logger.finalize().unwrap();
    }
}
