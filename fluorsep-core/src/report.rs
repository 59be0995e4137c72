//! Verbosity-gated progress reporting.
//!
//! The pipeline reports through a [`Reporter`] rather than a logging facade
//! because the message classes are part of the orchestrator's observable
//! contract: callers (and tests) rely on which classes appear at which
//! verbosity level. The sink is injectable so tests can capture output.
//!
//! Message classes and their thresholds:
//!
//! | class                      | level |
//! |----------------------------|-------|
//! | phase finish with duration | 1     |
//! | convergence failure        | 1     |
//! | cache reload notice        | 1     |
//! | cache error notice         | 1     |
//! | advisory warning           | 1     |
//! | phase start                | 2     |
//! | parameter echo             | 2     |
//! | per-unit progress          | 3     |
//! | per-unit detail            | 4     |

use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default verbosity: phase summaries and warnings only.
pub const DEFAULT_VERBOSITY: u8 = 1;

/// Sink that accumulates output into a shared buffer, for tests.
#[derive(Clone, Default)]
pub struct BufferSink(Arc<Mutex<Vec<u8>>>);

impl BufferSink {
    /// Creates an empty buffer sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl Write for BufferSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut inner) = self.0.lock() {
            inner.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Verbosity-gated message emitter shared across pipeline phases.
#[derive(Clone)]
pub struct Reporter {
    verbosity: u8,
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(DEFAULT_VERBOSITY)
    }
}

impl Reporter {
    /// Creates a reporter writing to stdout.
    #[must_use]
    pub fn new(verbosity: u8) -> Self {
        Self::with_sink(verbosity, std::io::stdout())
    }

    /// Creates a reporter writing to an arbitrary sink.
    pub fn with_sink<W: Write + Send + 'static>(verbosity: u8, sink: W) -> Self {
        Self {
            verbosity,
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// The configured verbosity level.
    #[must_use]
    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    fn emit(&self, threshold: u8, message: &str) {
        if self.verbosity < threshold {
            return;
        }
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(sink, "{message}");
            let _ = sink.flush();
        }
    }

    /// Phase completion with wall time. Level 1.
    pub fn phase_finish(&self, what: &str, elapsed: Duration) {
        self.emit(
            1,
            &format!(
                "Finished {what} in {}",
                pretty_duration(elapsed.as_secs_f64())
            ),
        );
    }

    /// Per-cell convergence failure. Level 1.
    pub fn convergence_failure(&self, label: &str, iterations: usize) {
        self.emit(
            1,
            &format!("Separation of {label} did not converge after {iterations} iterations"),
        );
    }

    /// Cache successfully reloaded instead of recomputed. Level 1.
    pub fn cache_reload(&self, path: &Path) {
        self.emit(1, &format!("Reloading data from cache {}", path.display()));
    }

    /// Cache present but unreadable; recomputation will follow. Level 1.
    pub fn cache_error(&self, path: &Path, reason: &str) {
        self.emit(
            1,
            &format!("An error occurred while loading {}: {reason}", path.display()),
        );
    }

    /// Non-fatal advisory. Level 1.
    pub fn warn(&self, message: &str) {
        self.emit(1, message);
    }

    /// Phase start announcement. Level 2.
    pub fn phase_start(&self, message: &str) {
        self.emit(2, message);
    }

    /// Parameter echo line. Level 2.
    pub fn param(&self, name: &str, value: &str) {
        self.emit(2, &format!("  {name}: {value}"));
    }

    /// Per-unit progress with a determinate total. Level 3.
    pub fn progress(&self, what: &str, index: usize, total: usize) {
        self.emit(3, &format!("[{what} {index}/{total}]"));
    }

    /// Per-unit completion detail. Level 4.
    pub fn detail(&self, message: &str) {
        self.emit(4, message);
    }
}

/// Renders a duration in seconds as human-readable text.
///
/// Precision tapers with magnitude; durations of a minute or more switch to
/// a minutes/seconds breakdown, and an hour or more adds the hour count.
#[must_use]
pub fn pretty_duration(seconds: f64) -> String {
    if seconds < 1.0 {
        format!("{seconds:.3} seconds")
    } else if seconds < 10.0 {
        format!("{seconds:.2} seconds")
    } else if seconds < 60.0 {
        format!("{seconds:.1} seconds")
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let rem = seconds - minutes * 60.0;
        format!("{minutes:.0} min, {:.0} sec", rem.floor())
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds - hours * 3600.0) / 60.0).floor();
        let rem = seconds - hours * 3600.0 - minutes * 60.0;
        format!("{hours:.0} hr, {minutes:.0} min, {:.0} sec", rem.floor())
    }
}
