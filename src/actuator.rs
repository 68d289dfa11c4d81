//! # Actuator Channel
//!
//! Fire-and-forget delivery of encoded commands to the car.
//!
//! In live mode the command bytes go to the serial port; nothing is read
//! back. In dry-run mode dispatch does nothing, so recorded telemetry can
//! be replayed offline.

use tracing::{debug, info};

use crate::error::{DriveError, Result};
use crate::serial::SerialPortIO;

/// Where commands go
pub enum ActuatorChannel {
    /// Real device
    Live(Box<dyn SerialPortIO>),
    /// Writes suppressed
    DryRun,
}

impl std::fmt::Debug for ActuatorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuatorChannel::Live(_) => f.write_str("ActuatorChannel::Live"),
            ActuatorChannel::DryRun => f.write_str("ActuatorChannel::DryRun"),
        }
    }
}

impl ActuatorChannel {
    pub fn live(port: Box<dyn SerialPortIO>) -> Self {
        ActuatorChannel::Live(port)
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, ActuatorChannel::DryRun)
    }

    /// Send one command string.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Bytes handed to the device
    /// * `Ok(false)` - Dry run, nothing written
    ///
    /// # Errors
    ///
    /// Returns `DriveError::ActuatorIo` if the write or flush fails. The
    /// command is not resent.
    pub async fn dispatch(&mut self, command: &str) -> Result<bool> {
        match self {
            ActuatorChannel::Live(port) => {
                port.write_all(command.as_bytes())
                    .await
                    .map_err(DriveError::ActuatorIo)?;
                port.flush().await.map_err(DriveError::ActuatorIo)?;
                debug!("Sent command {} ({} bytes)", command, command.len());
                Ok(true)
            }
            ActuatorChannel::DryRun => {
                debug!("Dry run, suppressed command {}", command);
                Ok(false)
            }
        }
    }

    /// Flush pending output before the channel is released.
    pub async fn close(&mut self) -> Result<()> {
        if let ActuatorChannel::Live(port) = self {
            port.flush().await.map_err(DriveError::ActuatorIo)?;
            info!("Actuator channel flushed");
        }
        Ok(())
    }
}
