//! Lock-free reader counters and periodic reporting
//!
//! The reader loop bumps these on every line; the HTTP endpoint and the
//! periodic reporter only load them.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::protocol::LineError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

pub struct Metrics {
    /// Lines read from the transport (any content)
    lines_total: AtomicU64,
    /// Lines read since last report (reset on report)
    lines_since_report: AtomicU64,
    /// Snapshots published to the store
    snapshots_published: AtomicU64,
    /// Lines without the data marker
    lines_ignored: AtomicU64,
    /// Lines that were not valid text
    decode_errors: AtomicU64,
    /// Data lines with a non-integer sample
    malformed_lines: AtomicU64,
    /// Data lines with the wrong sample count
    shape_errors: AtomicU64,
    /// Transport read failures (end of stream, I/O errors)
    read_errors: AtomicU64,
    /// Whether the serial device is currently open
    device_available: AtomicBool,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            lines_total: AtomicU64::new(0),
            lines_since_report: AtomicU64::new(0),
            snapshots_published: AtomicU64::new(0),
            lines_ignored: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            malformed_lines: AtomicU64::new(0),
            shape_errors: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            device_available: AtomicBool::new(false),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_line(&self) {
        self.lines_total.fetch_add(1, Ordering::Relaxed);
        self.lines_since_report.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_published(&self) {
        self.snapshots_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ignored(&self) {
        self.lines_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a discarded line under its error kind
    #[inline]
    pub fn record_line_error(&self, err: &LineError) {
        let counter = match err {
            LineError::Decode(_) => &self.decode_errors,
            LineError::Malformed { .. } => &self.malformed_lines,
            LineError::Shape(_) => &self.shape_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_device_available(&self, available: bool) {
        self.device_available.store(available, Ordering::Relaxed);
    }

    pub fn device_available(&self) -> bool {
        self.device_available.load(Ordering::Relaxed)
    }

    pub fn lines_total(&self) -> u64 {
        self.lines_total.load(Ordering::Relaxed)
    }

    pub fn snapshots_published(&self) -> u64 {
        self.snapshots_published.load(Ordering::Relaxed)
    }

    pub fn lines_ignored(&self) -> u64 {
        self.lines_ignored.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines.load(Ordering::Relaxed)
    }

    pub fn shape_errors(&self) -> u64 {
        self.shape_errors.load(Ordering::Relaxed)
    }

    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }

    /// Current counter values without touching the report interval
    ///
    /// `lines_per_sec` is only computed by [`Metrics::report`] and is zero here.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            lines_total: self.lines_total(),
            lines_per_sec: 0.0,
            snapshots_published: self.snapshots_published(),
            lines_ignored: self.lines_ignored(),
            decode_errors: self.decode_errors(),
            malformed_lines: self.malformed_lines(),
            shape_errors: self.shape_errors(),
            read_errors: self.read_errors(),
            device_available: self.device_available(),
        }
    }

    /// Generate a summary and reset the per-interval line rate
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let lines_since = self.lines_since_report.swap(0, Ordering::Relaxed);
        let lines_per_sec = if elapsed_secs > 0.0 { lines_since as f64 / elapsed_secs } else { 0.0 };

        MetricsSummary { lines_per_sec, ..self.summary() }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the reader counters
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub lines_total: u64,
    pub lines_per_sec: f64,
    pub snapshots_published: u64,
    pub lines_ignored: u64,
    pub decode_errors: u64,
    pub malformed_lines: u64,
    pub shape_errors: u64,
    pub read_errors: u64,
    pub device_available: bool,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            lines_total = %self.lines_total,
            lines_per_sec = format!("{:.1}", self.lines_per_sec),
            published = %self.snapshots_published,
            ignored = %self.lines_ignored,
            decode_errors = %self.decode_errors,
            malformed = %self.malformed_lines,
            shape_errors = %self.shape_errors,
            read_errors = %self.read_errors,
            device_available = %self.device_available,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::{parse_frame, ShapeError};

    #[test]
    fn test_line_errors_counted_by_kind() {
        let metrics = Metrics::new();

        let lines: [&[u8]; 4] = [b"D:1,x,3,4,5,6", b"D:1,2", b"\xFF\xFE", b"D:1,2,3,4"];
        for raw in lines {
            if let Err(e) = parse_frame(raw, 3) {
                metrics.record_line_error(&e);
            }
        }

        assert_eq!(metrics.malformed_lines(), 1);
        assert_eq!(metrics.shape_errors(), 2);
        assert_eq!(metrics.decode_errors(), 1);

        metrics.record_line_error(&LineError::Shape(ShapeError { expected: 6, actual: 0 }));
        assert_eq!(metrics.shape_errors(), 3);
    }

    #[test]
    fn test_report_resets_rate_not_totals() {
        let metrics = Metrics::new();
        metrics.record_line();
        metrics.record_line();
        metrics.record_published();
        metrics.set_device_available(true);

        let summary = metrics.report();
        assert_eq!(summary.lines_total, 2);
        assert_eq!(summary.snapshots_published, 1);
        assert!(summary.device_available);

        let summary = metrics.report();
        assert_eq!(summary.lines_total, 2);
        assert_eq!(summary.lines_per_sec, 0.0);
    }
}
