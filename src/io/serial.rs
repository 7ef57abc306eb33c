//! Serial rangefinder reader
//!
//! Protocol:
//! - Baud: 9600 (configurable), 8N1
//! - Line oriented, `\n` terminated: `D:<int>,<int>,...` (two samples per slot)
//! - Non-`D:` lines are ignored
//!
//! Reader states:
//! - device unavailable: port failed to open or was lost; idle until shutdown
//! - awaiting line: bounded reads from the port
//! - publishing: a valid line was classified and swapped into the store
//!
//! The port is opened exactly once. There is no reconnect.

use crate::domain::protocol::{self, LineError};
use crate::domain::types::Snapshot;
use crate::domain::Classifier;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::SnapshotStore;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, error, info, trace, warn};

/// Lines longer than this without a terminator are dropped
const MAX_LINE_LEN: usize = 4096;

/// Result of feeding one raw line through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Snapshot published with this store generation
    Published(u64),
    /// Not a data line
    Ignored,
    /// Line discarded, store untouched
    Rejected(LineError),
}

/// Why a stream stopped being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Shutdown signal received
    Shutdown,
    /// End of stream or unrecoverable read error
    Closed,
}

pub struct SerialReader {
    device: String,
    baud: u32,
    read_timeout: Duration,
    idle_interval: Duration,
    classifier: Classifier,
    store: Arc<SnapshotStore>,
    metrics: Arc<Metrics>,
}

impl SerialReader {
    pub fn new(config: &Config, store: Arc<SnapshotStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            device: config.serial_device().to_string(),
            baud: config.serial_baud(),
            read_timeout: Duration::from_millis(config.read_timeout_ms()),
            idle_interval: Duration::from_millis(config.idle_interval_ms()),
            classifier: config.classifier(),
            store,
            metrics,
        }
    }

    /// Decode, parse, classify and publish a single raw line
    pub fn handle_line(&self, raw: &[u8]) -> LineOutcome {
        self.metrics.record_line();

        let samples = match protocol::parse_frame(raw, self.classifier.slot_count()) {
            Ok(Some(samples)) => samples,
            Ok(None) => {
                self.metrics.record_ignored();
                trace!(line = %String::from_utf8_lossy(raw).trim(), "serial_line_ignored");
                return LineOutcome::Ignored;
            }
            Err(e) => return self.reject(raw, e),
        };

        let snapshot = match self.classifier.classify(&samples) {
            Ok(snapshot) => snapshot,
            Err(e) => return self.reject(raw, e.into()),
        };

        self.log_changes(&snapshot);
        let generation = self.store.publish(snapshot);
        self.metrics.record_published();
        trace!(generation = %generation, "snapshot_published");

        LineOutcome::Published(generation)
    }

    fn reject(&self, raw: &[u8], err: LineError) -> LineOutcome {
        self.metrics.record_line_error(&err);
        warn!(
            kind = %err.kind(),
            error = %err,
            line = %String::from_utf8_lossy(raw).trim(),
            "serial_line_rejected"
        );
        LineOutcome::Rejected(err)
    }

    /// Log slots whose state differs from the currently published snapshot
    fn log_changes(&self, next: &Snapshot) {
        let current = self.store.snapshot();
        if *current == *next {
            return;
        }
        for (slot, state) in next.iter() {
            if let Some(previous) = current.get(slot) {
                if previous != state {
                    info!(slot = %slot, from = %previous, to = %state, "slot_state_changed");
                }
            }
        }
    }

    /// Read lines from `stream` until shutdown, end of stream or a read error
    ///
    /// Each read is bounded by the read timeout. Partial lines survive a
    /// timeout and are completed by the next read.
    pub async fn run_stream<R>(&self, stream: R, shutdown: &mut watch::Receiver<bool>) -> StreamEnd
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(128);

        loop {
            if *shutdown.borrow() {
                return StreamEnd::Shutdown;
            }

            let read = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return StreamEnd::Shutdown;
                    }
                    continue;
                }
                read = tokio::time::timeout(self.read_timeout, reader.read_until(b'\n', &mut buf)) => read,
            };

            match read {
                Ok(Ok(0)) => {
                    if !buf.is_empty() {
                        self.handle_line(&buf);
                        buf.clear();
                    }
                    warn!(device = %self.device, "serial_stream_closed");
                    self.metrics.record_read_error();
                    return StreamEnd::Closed;
                }
                Ok(Ok(_)) => {
                    self.handle_line(&buf);
                    buf.clear();
                }
                Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => {
                    // Serial timeout with no data, keep waiting
                }
                Ok(Err(e)) => {
                    error!(device = %self.device, error = %e, "serial_read_error");
                    self.metrics.record_read_error();
                    return StreamEnd::Closed;
                }
                Err(_) => {
                    trace!(buffered = buf.len(), "serial_read_timeout");
                }
            }

            if buf.len() > MAX_LINE_LEN {
                warn!(buffered = buf.len(), max = MAX_LINE_LEN, "serial_line_too_long");
                buf.clear();
            }
        }
    }

    /// Idle in the device-unavailable state until shutdown
    async fn idle_until_shutdown(&self, shutdown: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = tokio::time::sleep(self.idle_interval) => {
                    trace!(device = %self.device, "serial_device_unavailable");
                }
            }
        }
    }

    /// Start the reader loop
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            device = %self.device,
            baud = %self.baud,
            slots = %self.classifier.slot_count(),
            read_timeout_ms = %self.read_timeout.as_millis(),
            "serial_reader_started"
        );

        // Single open attempt
        let port_result = tokio_serial::new(&self.device, self.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open_native_async();

        match port_result {
            Ok(port) => {
                info!(device = %self.device, "serial_port_opened");
                self.metrics.set_device_available(true);

                if self.run_stream(port, &mut shutdown).await == StreamEnd::Shutdown {
                    info!("serial_reader_shutdown");
                    return;
                }

                self.metrics.set_device_available(false);
                warn!(device = %self.device, "serial_device_lost");
            }
            Err(e) => {
                error!(device = %self.device, error = %e, "serial_port_open_failed");
            }
        }

        debug!(device = %self.device, "serial_reader_idle");
        self.idle_until_shutdown(&mut shutdown).await;
        info!("serial_reader_shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::ShapeError;
    use crate::domain::types::{OccupancyState, SlotId};

    fn reader() -> SerialReader {
        let config = Config::default();
        SerialReader::new(&config, Arc::new(SnapshotStore::new(3)), Arc::new(Metrics::new()))
    }

    #[test]
    fn test_reader_creation() {
        let reader = reader();
        assert_eq!(reader.device, "/dev/ttyACM0");
        assert_eq!(reader.baud, 9600);
        assert_eq!(reader.read_timeout, Duration::from_millis(1000));
        assert_eq!(reader.classifier.slot_count(), 3);
    }

    #[test]
    fn test_valid_line_publishes() {
        let reader = reader();
        assert_eq!(reader.handle_line(b"D:10,10,3,3,10,2\r\n"), LineOutcome::Published(1));

        let snapshot = reader.store.snapshot();
        assert_eq!(snapshot.get(SlotId(0)), Some(OccupancyState::Vacant));
        assert_eq!(snapshot.get(SlotId(1)), Some(OccupancyState::Occupied));
        assert_eq!(snapshot.get(SlotId(2)), Some(OccupancyState::Misaligned));
        assert_eq!(reader.metrics.snapshots_published(), 1);
    }

    #[test]
    fn test_bad_lines_leave_snapshot_unchanged() {
        let reader = reader();
        reader.handle_line(b"D:1,3,9,9,2,2\n");
        let before = reader.store.snapshot();

        assert!(matches!(
            reader.handle_line(b"D:10,abc,3,3,10,2\n"),
            LineOutcome::Rejected(LineError::Malformed { .. })
        ));
        assert_eq!(
            reader.handle_line(b"D:10,10,3,3\n"),
            LineOutcome::Rejected(LineError::Shape(ShapeError { expected: 6, actual: 4 }))
        );
        assert!(matches!(
            reader.handle_line(b"D:\xC3\x28\n"),
            LineOutcome::Rejected(LineError::Decode(_))
        ));
        assert_eq!(reader.handle_line(b"ready\n"), LineOutcome::Ignored);

        assert_eq!(*reader.store.snapshot(), *before);
        assert_eq!(reader.store.generation(), 1);
        assert_eq!(reader.metrics.lines_total(), 5);
        assert_eq!(reader.metrics.lines_ignored(), 1);
    }

    #[tokio::test]
    async fn test_run_stream_reads_until_eof() {
        let reader = reader();
        let (_tx, mut rx) = watch::channel(false);
        let input: &[u8] = b"boot\nD:3,6,1,5,4,4\nD:1,3,9,9,2,2";

        assert_eq!(reader.run_stream(input, &mut rx).await, StreamEnd::Closed);

        // Unterminated trailing line is still processed at EOF
        assert_eq!(reader.store.generation(), 2);
        assert_eq!(reader.store.snapshot().get(SlotId(0)), Some(OccupancyState::Error));
    }

    #[tokio::test]
    async fn test_run_stream_stops_on_shutdown() {
        let reader = reader();
        let (tx, mut rx) = watch::channel(false);
        let (_client, server) = tokio::io::duplex(64);

        tx.send(true).unwrap();
        assert_eq!(reader.run_stream(server, &mut rx).await, StreamEnd::Shutdown);
    }
}
