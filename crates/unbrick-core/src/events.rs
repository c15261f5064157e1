//! Event system for UI decoupling.
//!
//! Front ends subscribe to session events without tight coupling to the
//! recovery logic. Operator prompts go through the `Operator` trait; this
//! layer carries progress only.

use std::fmt;
use std::path::PathBuf;

use crate::flash::FlashVerdict;
use crate::profile::DeviceId;

/// Recovery state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    /// No session running.
    Idle,
    /// Waiting for the device to enumerate in its initial (DFU) mode.
    AwaitingInitialMode,
    /// Flashing the current stage's firmware.
    FlashingStage,
    /// Waiting for the post-flash mode (and sub-model resolution).
    AwaitingPostFlashMode,
    /// Flashing the disk-mode firmware.
    FlashingDiskFirmware,
    /// Waiting for the device to come up as a raw disk; target selection
    /// and raw write happen here.
    AwaitingDiskEnumeration,
    /// Recovery finished.
    Complete,
    /// Operator declined a confirmation or input ended.
    Aborted,
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryPhase::Idle => write!(f, "Idle"),
            RecoveryPhase::AwaitingInitialMode => write!(f, "Awaiting Initial Mode"),
            RecoveryPhase::FlashingStage => write!(f, "Flashing Stage"),
            RecoveryPhase::AwaitingPostFlashMode => write!(f, "Awaiting Post-Flash Mode"),
            RecoveryPhase::FlashingDiskFirmware => write!(f, "Flashing Disk Firmware"),
            RecoveryPhase::AwaitingDiskEnumeration => write!(f, "Awaiting Disk Enumeration"),
            RecoveryPhase::Complete => write!(f, "Complete"),
            RecoveryPhase::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Events emitted by a recovery session.
#[derive(Debug, Clone)]
pub enum RecoveryEvent {
    /// Phase changed.
    PhaseChanged {
        from: RecoveryPhase,
        to: RecoveryPhase,
    },
    /// Expected device observed in enumeration output.
    DeviceDetected { device: DeviceId, accessible: bool },
    /// Probe window elapsed without the expected identifier.
    DeviceMissing { expected: String },
    /// Driver switch attempted.
    DriverSwitch { label: String, ok: bool },
    /// Flash invocation started.
    FlashStarted { firmware: PathBuf },
    /// Flash invocation classified.
    FlashFinished { verdict: FlashVerdict },
    /// Sub-model fork resolved.
    VariantResolved { name: String },
    /// Raw disk target passed the confirmation gate.
    DiskTargetConfirmed { path: String },
    /// Raw-write tool returned.
    RawWriteFinished { status: i32 },
    /// Static next-step text for the operator.
    Hint { text: String },
    /// Session finished successfully.
    Completed,
    /// Session ended on operator decline or EOF.
    Aborted,
}

/// Observer trait for receiving recovery events.
///
/// Implement this in the front-end layer to receive updates.
pub trait RecoveryObserver: Send + Sync {
    fn on_event(&self, event: &RecoveryEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl RecoveryObserver for NullObserver {
    fn on_event(&self, _event: &RecoveryEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl RecoveryObserver for TracingObserver {
    fn on_event(&self, event: &RecoveryEvent) {
        match event {
            RecoveryEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            RecoveryEvent::DeviceDetected { device, accessible } => {
                if *accessible {
                    tracing::info!(device = %device, "Device detected");
                } else {
                    tracing::warn!(device = %device, "Device detected but not accessible (driver/service may be blocking)");
                }
            }
            RecoveryEvent::DeviceMissing { expected } => {
                tracing::error!(expected = %expected, "Device not found");
            }
            RecoveryEvent::DriverSwitch { label, ok } => {
                if *ok {
                    tracing::info!(label = %label, "Driver switched");
                } else {
                    tracing::warn!(label = %label, "Driver switch failed, continuing");
                }
            }
            RecoveryEvent::FlashStarted { firmware } => {
                tracing::info!(firmware = %firmware.display(), "Flashing");
            }
            RecoveryEvent::FlashFinished { verdict } => {
                tracing::info!(verdict = ?verdict, "Flash finished");
            }
            RecoveryEvent::VariantResolved { name } => {
                tracing::info!(variant = %name, "Detected hardware revision");
            }
            RecoveryEvent::DiskTargetConfirmed { path } => {
                tracing::info!(target = %path, "Disk target confirmed");
            }
            RecoveryEvent::RawWriteFinished { status } => {
                tracing::info!(status, "Raw firmware write finished");
            }
            RecoveryEvent::Hint { text } => {
                tracing::info!("{}", text);
            }
            RecoveryEvent::Completed => {
                tracing::info!("Recovery complete");
            }
            RecoveryEvent::Aborted => {
                tracing::warn!("Recovery aborted by operator");
            }
        }
    }
}
