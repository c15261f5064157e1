//! External tool layer abstraction.
//!
//! Defines the `DeviceTools` trait wrapping every external command the
//! recovery flow depends on, allowing different implementations
//! (host commands, mock).

use std::path::Path;

use thiserror::Error;

use crate::profile::DeviceId;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed with status {status}: {detail}")]
    Failed {
        tool: &'static str,
        status: i32,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Host platform flavor, as far as command selection and raw-device path
/// addressing are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Abstract interface over the external tools the recovery flow invokes.
///
/// This trait enables:
/// - Production implementation spawning real commands
/// - Mock implementation for unit testing
///
/// The flow only ever interprets textual output and exit statuses; none of
/// the underlying protocols are spoken in-process.
pub trait DeviceTools {
    /// Combined stdout+stderr of the device enumeration command.
    fn enumerate(&self) -> Result<String, ToolError>;

    /// Install the preferred driver for a device. Callers treat failure as
    /// non-fatal; the flashing tool may succeed regardless.
    fn switch_driver(&self, label: &str, device: DeviceId) -> Result<(), ToolError>;

    /// Run the flashing tool against a device and return its combined
    /// output for classification.
    fn flash(&self, device: DeviceId, firmware: &Path) -> Result<String, ToolError>;

    /// Textual listing of block devices / drives for target selection.
    fn list_disks(&self) -> Result<String, ToolError>;

    /// Write the raw firmware image to a confirmed disk target. Returns
    /// the tool's exit code; the result of the write itself is not
    /// otherwise observable.
    fn write_firmware(
        &self,
        target: &str,
        model_tag: &str,
        image: &Path,
    ) -> Result<i32, ToolError>;

    /// Whether the process has admin/root privileges.
    fn is_elevated(&self) -> bool;

    fn platform(&self) -> Platform;
}
