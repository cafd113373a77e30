//! Progress output of a check.
//!
//! Lines go to a caller-supplied sink. Logging through `log` is separate and
//! never carries report content.

use std::io::Write;

use log::warn;
use parking_lot::Mutex;

use crate::check::status::RecordFault;

/// Destination of report lines.
pub type ReportSink = Box<dyn Write + Send>;

struct SinkState {
    sink: Option<ReportSink>,
    flush_each_line: bool,
}

/// Serializes report lines from one or more segment checks into a sink.
pub struct Reporter {
    state: Mutex<SinkState>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Reporter")
            .field("has_sink", &state.sink.is_some())
            .field("flush_each_line", &state.flush_each_line)
            .finish()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Reporter::new(None, false)
    }
}

impl Reporter {
    /// Create a reporter. Without a sink every line is dropped.
    pub fn new(sink: Option<ReportSink>, flush_each_line: bool) -> Self {
        Reporter {
            state: Mutex::new(SinkState {
                sink,
                flush_each_line,
            }),
        }
    }

    /// Replace the sink, flushing the previous one.
    pub fn set_sink(&self, sink: Option<ReportSink>, flush_each_line: bool) {
        let mut state = self.state.lock();
        if let Some(old) = state.sink.as_mut() {
            if let Err(e) = old.flush() {
                warn!("failed to flush report sink: {e}");
            }
        }
        state.sink = sink;
        state.flush_each_line = flush_each_line;
    }

    /// Write one line.
    pub fn line(&self, text: &str) {
        let mut state = self.state.lock();
        let flush = state.flush_each_line;
        let Some(sink) = state.sink.as_mut() else {
            return;
        };
        let mut result = writeln!(sink, "{text}");
        if result.is_ok() && flush {
            result = sink.flush();
        }
        if let Err(e) = result {
            warn!("failed to write report line: {e}");
        }
    }

    /// Flush buffered lines.
    pub fn flush(&self) {
        let mut state = self.state.lock();
        if let Some(sink) = state.sink.as_mut() {
            if let Err(e) = sink.flush() {
                warn!("failed to flush report sink: {e}");
            }
        }
    }

    /// A view for the lines of one segment. With `prefixed`, every line
    /// starts with `[<segment>]` so interleaved output stays attributable.
    pub fn segment<'a>(&'a self, segment: &str, prefixed: bool) -> SegmentReport<'a> {
        SegmentReport {
            reporter: self,
            segment: segment.to_string(),
            prefix: prefixed.then(|| format!("[{segment}] ")),
        }
    }
}

/// Report lines attributed to one segment.
#[derive(Debug)]
pub struct SegmentReport<'a> {
    reporter: &'a Reporter,
    segment: String,
    prefix: Option<String>,
}

impl SegmentReport<'_> {
    /// Name of the segment being reported on.
    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn line(&self, text: &str) {
        match &self.prefix {
            Some(prefix) => self.reporter.line(&format!("{prefix}{text}")),
            None => self.reporter.line(text),
        }
    }

    /// Record a fault on `status` and report it.
    pub fn fault<S: RecordFault>(&self, status: &mut S, message: String) {
        warn!("segment {}: {message}", self.segment);
        self.line(&format!("      ERROR: {message}"));
        status.record_fault(message);
    }
}
