//! Flash-tool invocation and output classification.
//!
//! The flashing tool has no structured exit contract, so success is read
//! off its text output. The rule lives in one pure function
//! ([`classify_flash_output`]) so it can be unit-tested and swapped if
//! the tool's output format changes.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::profile::DeviceId;
use crate::tools::{DeviceTools, ToolError};

const DOWNLOAD_DONE_MARKER: &str = "Download done.";
const DISCONNECT_MARKER: &str = "LIBUSB_ERROR_NO_DEVICE";

/// Classification of one flash invocation's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashVerdict {
    /// The tool reported a completed transfer.
    Completed,
    /// The tool reported the device gone without a completed transfer.
    /// The target legitimately disconnects itself while entering the next
    /// mode, so this counts as success.
    ToleratedDisconnect,
    /// Neither pattern present; the transfer cannot be assumed to have
    /// happened.
    Failed,
}

impl FlashVerdict {
    pub fn is_success(self) -> bool {
        !matches!(self, FlashVerdict::Failed)
    }
}

/// Classify flash-tool output. Pure and total: every input falls in
/// exactly one of the three partitions.
pub fn classify_flash_output(output: &str) -> FlashVerdict {
    if output.contains(DOWNLOAD_DONE_MARKER) {
        FlashVerdict::Completed
    } else if output.contains(DISCONNECT_MARKER) {
        FlashVerdict::ToleratedDisconnect
    } else {
        FlashVerdict::Failed
    }
}

/// Run the flashing tool and classify its output.
#[instrument(skip(tools, firmware), fields(device = %device, firmware = %firmware.display()))]
pub fn run_flash<T: DeviceTools>(
    tools: &T,
    device: DeviceId,
    firmware: &Path,
) -> Result<FlashVerdict, ToolError> {
    let output = tools.flash(device, firmware)?;
    let verdict = classify_flash_output(&output);
    match verdict {
        FlashVerdict::Completed => info!("flash completed"),
        FlashVerdict::ToleratedDisconnect => {
            warn!("device disconnected after transfer; expected while entering the next mode")
        }
        FlashVerdict::Failed => warn!(output = %output.trim(), "flash output matched no known pattern"),
    }
    Ok(verdict)
}
