//! # Telemetry Reader
//!
//! Reads one telemetry line per cycle and parses it.
//!
//! The source is a capability port ([`TelemetrySource`]) so the loop can be
//! driven by a replay file, the serial port's read half, or an in-memory
//! buffer without changes.
//!
//! Sources hand back raw line bytes. Text decoding happens here, so a line
//! with invalid UTF-8 (serial noise, a board resetting mid-line) is a
//! malformed line rather than a source failure.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use super::sample::TelemetrySample;
use crate::error::{DriveError, Result};

/// Trait for line-oriented telemetry input
#[async_trait]
pub trait TelemetrySource: Send {
    /// Read the next line without its terminator, blocking until one is
    /// available.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// [`TelemetrySource`] over any buffered async reader
pub struct LineSource<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
        }
    }
}

#[async_trait]
impl<R> TelemetrySource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.buffer.clear();
        let n = self.reader.read_until(b'\n', &mut self.buffer).await?;
        if n == 0 {
            return Ok(None);
        }
        while matches!(self.buffer.last(), Some(b'\n' | b'\r')) {
            self.buffer.pop();
        }
        Ok(Some(self.buffer.clone()))
    }
}

/// Reads and parses one sample per call.
///
/// No retry: a malformed line is reported to the caller and the cursor has
/// already moved past it.
pub struct TelemetryReader {
    source: Box<dyn TelemetrySource>,
    gravity: f32,
    lines_read: u64,
}

impl TelemetryReader {
    pub fn new(source: Box<dyn TelemetrySource>, gravity: f32) -> Self {
        Self {
            source,
            gravity,
            lines_read: 0,
        }
    }

    /// Read the next sample.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(sample))` - Parsed, gravity-compensated sample
    /// * `Ok(None)` - Source exhausted
    ///
    /// # Errors
    ///
    /// - `TelemetryIo`: the source failed
    /// - `TelemetryParse`: the line was malformed
    pub async fn next_sample(&mut self) -> Result<Option<TelemetrySample>> {
        let bytes = match self.source.read_line().await.map_err(DriveError::TelemetryIo)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        self.lines_read += 1;

        let line = String::from_utf8(bytes).map_err(|e| DriveError::TelemetryParse {
            line: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            reason: format!("line is not valid UTF-8: {}", e.utf8_error()),
        })?;
        debug!("Telemetry line {}: {}", self.lines_read, line);

        TelemetrySample::parse(&line, self.gravity).map(Some)
    }

    /// Number of lines consumed so far, including malformed ones
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}
