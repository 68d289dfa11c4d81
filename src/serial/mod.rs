//! # Serial Communication Module
//!
//! Handles the serial link to the car's microcontroller.
//!
//! This module handles:
//! - Opening the serial device (configured path first, then common defaults)
//! - Splitting the stream into a telemetry reader and an actuator writer
//!
//! The same link carries both directions: accelerometer lines come in,
//! steering commands go out.

pub mod port_trait;

use crate::error::{DriveError, Result};
use crate::telemetry::LineSource;
use tokio::io::{BufReader, ReadHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

pub use port_trait::{SerialPortIO, TokioSerialPort};

/// Default baud rate of the car's microcontroller
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Fallback device paths to try after the configured one
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices (Arduino-style boards)
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Telemetry half of the split serial link
pub type SerialLineSource = LineSource<BufReader<ReadHalf<SerialStream>>>;

/// Car Serial Port Handler
pub struct CarSerial {
    /// Serial port handle
    port: SerialStream,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
}

impl std::fmt::Debug for CarSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl CarSerial {
    /// Open the configured device, falling back to common paths.
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if no candidate could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use otto_drive::serial::CarSerial;
    ///
    /// #[tokio::main(flavor = "current_thread")]
    /// async fn main() -> anyhow::Result<()> {
    ///     let serial = CarSerial::open("/dev/ttyACM0", 9600)?;
    ///     println!("Connected to: {}", serial.device_path());
    ///     Ok(())
    /// }
    /// ```
    pub fn open(preferred: &str, baud_rate: u32) -> Result<Self> {
        let mut paths: Vec<&str> = Vec::with_capacity(1 + DEFAULT_DEVICE_PATHS.len());
        if !preferred.is_empty() {
            paths.push(preferred);
        }
        for &path in DEFAULT_DEVICE_PATHS {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        Self::open_with_paths(&paths, baud_rate)
    }

    /// Open the first device in `paths` that succeeds
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyACM0"])
    /// * `baud_rate` - Line speed
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Successfully opened car serial device at {}", path);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(DriveError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port, 8N1 without flow control
    fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| DriveError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Split into the telemetry line source and the actuator port.
    pub fn split(self) -> (SerialLineSource, TokioSerialPort) {
        let (read_half, write_half) = tokio::io::split(self.port);
        (
            LineSource::new(BufReader::new(read_half)),
            TokioSerialPort::new(write_half),
        )
    }
}
