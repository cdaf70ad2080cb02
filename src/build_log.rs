//! Operator-facing build log.
//!
//! The hosting platform shows the hook's stdout as the build log, so every
//! step writes plain timestamped lines here. `BuildLog` is a cheap clonable
//! handle around one sink: opened once in `main`, shared with the command
//! runner, and closed (flushed) when the run ends.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

type Sink = Box<dyn Write + Send>;

/// Handle to the build log sink
#[derive(Clone)]
pub struct BuildLog {
    sink: Arc<Mutex<Sink>>,
}

impl std::fmt::Debug for BuildLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildLog").finish_non_exhaustive()
    }
}

impl BuildLog {
    /// Open a log writing to `sink`
    pub fn open<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// Open a log on the process stdout
    pub fn stdout() -> Self {
        Self::open(io::stdout())
    }

    /// Open a log backed by memory, for tests and for callers that want the
    /// lines afterwards.
    pub fn capture() -> (Self, LogCapture) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let log = Self::open(SharedBuffer(Arc::clone(&buffer)));
        (log, LogCapture { buffer })
    }

    /// Write one timestamped line.
    ///
    /// A broken sink never fails the build; the error is reported through
    /// tracing instead.
    pub fn log(&self, message: impl AsRef<str>) {
        let line = format!(
            "[{}] {}",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            message.as_ref()
        );
        let mut sink = self.lock();
        if let Err(e) = writeln!(sink, "{line}") {
            tracing::warn!("Failed to write build log line: {}", e);
        }
    }

    /// Flush and release this handle.
    pub fn close(self) -> io::Result<()> {
        self.lock().flush()
    }

    fn lock(&self) -> MutexGuard<'_, Sink> {
        // A panic mid-write leaves at worst a partial line; keep logging.
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Read side of [`BuildLog::capture`]
#[derive(Debug, Clone)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Captured lines with the `[timestamp] ` prefix removed
    pub fn messages(&self) -> Vec<String> {
        self.raw_lines()
            .into_iter()
            .map(|line| match line.split_once("] ") {
                Some((_, message)) => message.to_string(),
                None => line,
            })
            .collect()
    }

    /// Captured lines exactly as written
    pub fn raw_lines(&self) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buffer)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// True if any captured message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap_or_else(|p| p.into_inner());
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
