//! `tracing` subscriber setup shared by the binaries.
//!
//! Events go to stderr and, while a job log is open, to that file as well. The global subscriber
//! can only be installed once per process, so batch runs redirect the file layer between jobs
//! through [`JobLog`] instead of reinstalling anything.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context as _;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::encode::ffmpeg::ensure_parent_dir;
use crate::foundation::error::StitchResult;

/// Redirectable log file sink.
#[derive(Clone, Debug, Default)]
pub struct JobLog(Arc<Mutex<Option<File>>>);

impl JobLog {
    /// Sink with no file attached; writes are discarded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start writing to `path` (truncated), replacing any open file.
    pub fn open(&self, path: &Path) -> StitchResult<()> {
        ensure_parent_dir(path)?;
        let file = File::create(path)
            .with_context(|| format!("failed to create log file '{}'", path.display()))?;
        *self.lock() = Some(file);
        Ok(())
    }

    /// Flush and detach the current file.
    pub fn close(&self) {
        if let Some(mut file) = self.lock().take() {
            let _ = file.flush();
        }
    }

    /// `true` while a file is attached.
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writer handed out per event by [`JobLog`].
pub struct JobLogWriter(JobLog);

impl Write for JobLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock().as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.lock().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for JobLog {
    type Writer = JobLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        JobLogWriter(self.clone())
    }
}

/// Install the global subscriber: `RUST_LOG` or `default_filter` (e.g. `"info"`).
///
/// Returns the job log sink the file layer writes to. Calling this again (or after another
/// subscriber was installed) leaves the existing subscriber in place.
pub fn init_logging(default_filter: &str) -> JobLog {
    let job_log = JobLog::new();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(job_log.clone()),
        )
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    job_log
}

/// Attach `path` to `job_log`, logging instead of failing when it cannot be opened.
pub fn open_job_log(job_log: &JobLog, path: &Path) {
    if let Err(e) = job_log.open(path) {
        tracing::warn!(path = %path.display(), error = %e, "log file unavailable, logging to stderr only");
    }
}
