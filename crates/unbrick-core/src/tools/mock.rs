//! Mock tool layer for testing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{DeviceTools, Platform, ToolError};
use crate::profile::DeviceId;

/// Mock implementation for unit testing the probe, gate, and session
/// logic without spawning external commands.
pub struct MockTools {
    /// Queued enumeration outputs, one per probe tick. An empty queue
    /// yields empty output (no device present).
    enumerations: Mutex<VecDeque<String>>,
    /// Queued flash-tool outputs. An empty queue yields empty output,
    /// which classifies as a failed flash.
    flash_outputs: Mutex<VecDeque<String>>,
    /// Queued driver-switch results; `false` simulates a failure. An
    /// empty queue yields success.
    driver_results: Mutex<VecDeque<bool>>,
    /// Queued raw-write exit codes. An empty queue yields 0.
    write_statuses: Mutex<VecDeque<i32>>,
    disk_listing: Mutex<String>,
    // Captured calls.
    enumerate_count: Mutex<usize>,
    flash_calls: Mutex<Vec<(DeviceId, PathBuf)>>,
    driver_calls: Mutex<Vec<(String, DeviceId)>>,
    write_calls: Mutex<Vec<(String, String, PathBuf)>>,
    platform: Platform,
    elevated: bool,
}

impl MockTools {
    pub fn new() -> Self {
        Self {
            enumerations: Mutex::new(VecDeque::new()),
            flash_outputs: Mutex::new(VecDeque::new()),
            driver_results: Mutex::new(VecDeque::new()),
            write_statuses: Mutex::new(VecDeque::new()),
            disk_listing: Mutex::new(String::new()),
            enumerate_count: Mutex::new(0),
            flash_calls: Mutex::new(Vec::new()),
            driver_calls: Mutex::new(Vec::new()),
            write_calls: Mutex::new(Vec::new()),
            platform: Platform::Unix,
            elevated: true,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Queue the enumeration output for the next probe tick.
    pub fn queue_enumeration(&self, output: &str) {
        self.enumerations
            .lock()
            .unwrap()
            .push_back(output.to_string());
    }

    /// Queue `n` empty enumeration ticks (device absent).
    pub fn queue_silence(&self, n: usize) {
        for _ in 0..n {
            self.queue_enumeration("");
        }
    }

    /// Queue the output of the next flash invocation.
    pub fn queue_flash_output(&self, output: &str) {
        self.flash_outputs
            .lock()
            .unwrap()
            .push_back(output.to_string());
    }

    /// Make the next driver switch fail.
    pub fn fail_next_driver_switch(&self) {
        self.driver_results.lock().unwrap().push_back(false);
    }

    pub fn set_disk_listing(&self, listing: &str) {
        *self.disk_listing.lock().unwrap() = listing.to_string();
    }

    pub fn queue_write_status(&self, status: i32) {
        self.write_statuses.lock().unwrap().push_back(status);
    }

    pub fn enumerate_count(&self) -> usize {
        *self.enumerate_count.lock().unwrap()
    }

    pub fn flash_calls(&self) -> Vec<(DeviceId, PathBuf)> {
        self.flash_calls.lock().unwrap().clone()
    }

    pub fn driver_calls(&self) -> Vec<(String, DeviceId)> {
        self.driver_calls.lock().unwrap().clone()
    }

    pub fn write_calls(&self) -> Vec<(String, String, PathBuf)> {
        self.write_calls.lock().unwrap().clone()
    }
}

impl Default for MockTools {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTools for MockTools {
    fn enumerate(&self) -> Result<String, ToolError> {
        *self.enumerate_count.lock().unwrap() += 1;
        Ok(self
            .enumerations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    fn switch_driver(&self, label: &str, device: DeviceId) -> Result<(), ToolError> {
        self.driver_calls
            .lock()
            .unwrap()
            .push((label.to_string(), device));
        if self.driver_results.lock().unwrap().pop_front().unwrap_or(true) {
            Ok(())
        } else {
            Err(ToolError::Failed {
                tool: "wdi-simple",
                status: 1,
                detail: "simulated driver failure".to_string(),
            })
        }
    }

    fn flash(&self, device: DeviceId, firmware: &Path) -> Result<String, ToolError> {
        self.flash_calls
            .lock()
            .unwrap()
            .push((device, firmware.to_path_buf()));
        Ok(self
            .flash_outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    fn list_disks(&self) -> Result<String, ToolError> {
        Ok(self.disk_listing.lock().unwrap().clone())
    }

    fn write_firmware(
        &self,
        target: &str,
        model_tag: &str,
        image: &Path,
    ) -> Result<i32, ToolError> {
        self.write_calls.lock().unwrap().push((
            target.to_string(),
            model_tag.to_string(),
            image.to_path_buf(),
        ));
        Ok(self.write_statuses.lock().unwrap().pop_front().unwrap_or(0))
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }

    fn platform(&self) -> Platform {
        self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::DFU_DEVICE_6G;

    #[test]
    fn test_enumeration_queue() {
        let mock = MockTools::new();
        mock.queue_enumeration("Bus 001 Device 004: ID 05ac:1232 Apple");
        assert!(mock.enumerate().unwrap().contains("05ac:1232"));
        // Queue drained: device absent.
        assert!(mock.enumerate().unwrap().is_empty());
        assert_eq!(mock.enumerate_count(), 2);
    }

    #[test]
    fn test_flash_capture() {
        let mock = MockTools::new();
        mock.queue_flash_output("Download done.");
        let out = mock.flash(DFU_DEVICE_6G, Path::new("wtf.dfu")).unwrap();
        assert_eq!(out, "Download done.");
        assert_eq!(mock.flash_calls().len(), 1);
        assert_eq!(mock.flash_calls()[0].0, DFU_DEVICE_6G);
    }

    #[test]
    fn test_driver_switch_failure() {
        let mock = MockTools::new();
        mock.fail_next_driver_switch();
        assert!(mock.switch_driver("USB DFU Device", DFU_DEVICE_6G).is_err());
        // Default is success.
        assert!(mock.switch_driver("USB DFU Device", DFU_DEVICE_6G).is_ok());
        assert_eq!(mock.driver_calls().len(), 2);
    }
}
