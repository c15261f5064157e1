//! Host implementation spawning the real external tools.
//!
//! Command selection per platform:
//! - enumeration: `dfu-util -l` (Windows, bundled) / `lsusb`
//! - driver switch: `wdi-simple` (Windows only; elsewhere a no-op)
//! - flashing: `dfu-util -d <vid:pid> -D <file>`
//! - drive listing: `wmic` (Windows) / `lsblk -d -o NAME,SIZE,MODEL`
//! - raw write: `ipodscsi <target> <tag> writefirmware -r -p <image>`

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, instrument};

use super::traits::{DeviceTools, Platform, ToolError};
use crate::profile::DeviceId;

pub struct HostTools {
    /// Directory holding the bundled Windows tools (`dfu-util.exe`,
    /// `wdi-simple.exe`, `ipodscsi.exe`). On Unix the same tools are
    /// resolved from `PATH`.
    tool_dir: PathBuf,
}

impl HostTools {
    pub fn new(tool_dir: impl Into<PathBuf>) -> Self {
        Self {
            tool_dir: tool_dir.into(),
        }
    }

    fn tool(&self, name: &str) -> PathBuf {
        match self.platform() {
            Platform::Windows => self.tool_dir.join(format!("{name}.exe")),
            Platform::Unix => PathBuf::from(name),
        }
    }

    fn run(&self, tool: &'static str, cmd: &mut Command) -> Result<Output, ToolError> {
        debug!(tool, "running external tool");
        cmd.output()
            .map_err(|source| ToolError::Spawn { tool, source })
    }
}

/// Stdout and stderr concatenated; device/driver diagnostics land on
/// either stream depending on the tool.
fn combined(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

impl DeviceTools for HostTools {
    fn enumerate(&self) -> Result<String, ToolError> {
        let output = match self.platform() {
            Platform::Windows => {
                self.run("dfu-util", Command::new(self.tool("dfu-util")).arg("-l"))?
            }
            Platform::Unix => self.run("lsusb", &mut Command::new("lsusb"))?,
        };
        Ok(combined(&output))
    }

    #[instrument(skip(self), fields(device = %device))]
    fn switch_driver(&self, label: &str, device: DeviceId) -> Result<(), ToolError> {
        if self.platform() != Platform::Windows {
            debug!("driver switch not required on this platform");
            return Ok(());
        }
        let vid = format!("0x{:04x}", device.vid);
        let pid = format!("0x{:04x}", device.pid);
        let output = self.run(
            "wdi-simple",
            Command::new(self.tool("wdi-simple")).args([
                "-n",
                label,
                "-v",
                vid.as_str(),
                "-p",
                pid.as_str(),
                "-t",
                "1",
            ]),
        )?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ToolError::Failed {
                tool: "wdi-simple",
                status: output.status.code().unwrap_or(-1),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    #[instrument(skip(self, firmware), fields(device = %device, firmware = %firmware.display()))]
    fn flash(&self, device: DeviceId, firmware: &Path) -> Result<String, ToolError> {
        // Exit status is deliberately ignored here: the tool reports an
        // error when the device disconnects mid-transfer, which is the
        // expected path. Classification works on the output text.
        let id = device.to_string();
        let output = self.run(
            "dfu-util",
            Command::new(self.tool("dfu-util"))
                .args(["-d", id.as_str(), "-D"])
                .arg(firmware),
        )?;
        Ok(combined(&output))
    }

    fn list_disks(&self) -> Result<String, ToolError> {
        match self.platform() {
            Platform::Windows => {
                let disks = self.run(
                    "wmic",
                    Command::new("wmic").args(["diskdrive", "get", "Caption,DeviceID,Index,Size"]),
                )?;
                let volumes = self.run(
                    "wmic",
                    Command::new("wmic").args(["logicaldisk", "get", "Caption,VolumeName"]),
                )?;
                let mut text = combined(&disks);
                text.push_str(&combined(&volumes));
                Ok(text)
            }
            Platform::Unix => {
                let output = self.run(
                    "lsblk",
                    Command::new("lsblk").args(["-d", "-o", "NAME,SIZE,MODEL"]),
                )?;
                Ok(combined(&output))
            }
        }
    }

    #[instrument(skip(self, image), fields(image = %image.display()))]
    fn write_firmware(
        &self,
        target: &str,
        model_tag: &str,
        image: &Path,
    ) -> Result<i32, ToolError> {
        let output = self.run(
            "ipodscsi",
            Command::new(self.tool("ipodscsi"))
                .args([target, model_tag, "writefirmware", "-r", "-p"])
                .arg(image),
        )?;
        Ok(output.status.code().unwrap_or(-1))
    }

    fn is_elevated(&self) -> bool {
        match self.platform() {
            // `net session` succeeds only from an elevated prompt.
            Platform::Windows => Command::new("net")
                .arg("session")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false),
            Platform::Unix => Command::new("id")
                .arg("-u")
                .output()
                .map(|o| String::from_utf8_lossy(&o.stdout).trim() == "0")
                .unwrap_or(false),
        }
    }

    fn platform(&self) -> Platform {
        Platform::current()
    }
}
