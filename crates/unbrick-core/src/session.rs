//! Recovery session - high-level orchestrator for the unbrick flow.
//!
//! Owns the state machine described in the module docs of this crate:
//! `AwaitingInitialMode → FlashingStage → AwaitingPostFlashMode →
//! FlashingDiskFirmware → AwaitingDiskEnumeration → Complete`, with
//! `Aborted` reachable from every operator prompt. All external effects
//! go through the injected `DeviceTools` and `Operator` implementations,
//! so the whole flow is testable against mocks.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::events::{RecoveryEvent, RecoveryObserver, RecoveryPhase, TracingObserver};
use crate::flash::{self, FlashVerdict};
use crate::gate::{self, DiskTarget, GateOutcome};
use crate::operator::Operator;
use crate::probe::{self, ProbeConfig};
use crate::profile::{HardwareProfile, Stage, Variant};
use crate::tools::{DeviceTools, ToolError};

/// Configuration for a recovery session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the per-model firmware files.
    pub firmware_dir: PathBuf,
    /// Probe window per stage, in seconds.
    pub probe_timeout_secs: u64,
    /// Enumeration poll cadence, in milliseconds.
    pub poll_interval_ms: u64,
    /// Pause after each flash before probing for the next mode, in
    /// seconds. The device needs the time to re-enumerate.
    pub settle_delay_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            firmware_dir: PathBuf::from("firmwares"),
            probe_timeout_secs: 30,
            poll_interval_ms: 1000,
            settle_delay_secs: 5,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_secs(self.probe_timeout_secs),
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

/// Why a session failed. Failures are resolved at the stage boundary;
/// nothing propagates past the session.
#[derive(Error, Debug)]
pub enum FailureReason {
    #[error("device {expected} not found within the probe window")]
    DeviceNotFound { expected: String },

    #[error("flash output matched no known success pattern for {firmware}")]
    FlashFailed { firmware: PathBuf },

    #[error("missing firmware file: {path}")]
    MissingFirmware { path: PathBuf },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Terminal result of a recovery session. Operator abort is a normal
/// outcome, not an error.
#[derive(Debug)]
pub enum SessionOutcome {
    Completed,
    Aborted,
    Failed(FailureReason),
}

/// Recovery session - drives a hardware profile through the stages.
pub struct RecoverySession<T: DeviceTools, Op: Operator, O: RecoveryObserver> {
    config: SessionConfig,
    tools: T,
    operator: Op,
    observer: Arc<O>,
    state: RecoveryPhase,
    variant: Option<&'static Variant>,
    disk_target: Option<DiskTarget>,
}

impl<T: DeviceTools, Op: Operator> RecoverySession<T, Op, TracingObserver> {
    /// Create a new session with the default tracing observer.
    pub fn new(config: SessionConfig, tools: T, operator: Op) -> Self {
        Self::with_observer(config, tools, operator, Arc::new(TracingObserver))
    }
}

impl<T: DeviceTools, Op: Operator, O: RecoveryObserver + 'static> RecoverySession<T, Op, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, tools: T, operator: Op, observer: Arc<O>) -> Self {
        Self {
            config,
            tools,
            operator,
            observer,
            state: RecoveryPhase::Idle,
            variant: None,
            disk_target: None,
        }
    }

    pub fn state(&self) -> RecoveryPhase {
        self.state
    }

    /// Sub-model bound by the post-flash race, once resolved.
    pub fn resolved_variant(&self) -> Option<&'static Variant> {
        self.variant
    }

    pub fn disk_target(&self) -> Option<&DiskTarget> {
        self.disk_target.as_ref()
    }

    /// Run the complete recovery flow for a profile.
    #[instrument(skip(self, profile), fields(model = %profile.display_name))]
    pub fn run(&mut self, profile: &'static HardwareProfile) -> SessionOutcome {
        match self.drive(profile) {
            Ok(outcome) => outcome,
            Err(reason) => {
                warn!(reason = %reason, "recovery failed");
                SessionOutcome::Failed(reason)
            }
        }
    }

    fn drive(
        &mut self,
        profile: &'static HardwareProfile,
    ) -> Result<SessionOutcome, FailureReason> {
        let probe_config = self.config.probe_config();

        // Stage 1: operator puts the device into DFU mode; we can only
        // infer the physical action from probe success.
        self.goto(RecoveryPhase::AwaitingInitialMode);
        if self.operator.acknowledge(profile.entry_hint).is_err() {
            return Ok(self.abort());
        }
        let initial = probe::probe(&self.tools, profile.dfu.device, &probe_config)?;
        if !initial.identifier_matched {
            let expected = profile.dfu.device.to_string();
            self.emit(RecoveryEvent::DeviceMissing {
                expected: expected.clone(),
            });
            return Err(FailureReason::DeviceNotFound { expected });
        }
        self.emit(RecoveryEvent::DeviceDetected {
            device: profile.dfu.device,
            accessible: !initial.transport_error,
        });
        if initial.transport_error {
            self.try_switch_driver(&profile.dfu);
        }

        // Stage 2: flash the WTF image into the DFU device.
        self.goto(RecoveryPhase::FlashingStage);
        self.flash_stage(&profile.dfu)?;
        thread::sleep(self.config.settle_delay());

        // Stage 3: the device reboots into WTF mode; which identifier
        // appears resolves the sub-model for ambiguous profiles.
        self.goto(RecoveryPhase::AwaitingPostFlashMode);
        let candidates = profile.recovery_candidates();
        let Some((index, result)) = probe::probe_any(&self.tools, &candidates, &probe_config)?
        else {
            let expected = candidates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" / ");
            self.emit(RecoveryEvent::DeviceMissing {
                expected: expected.clone(),
            });
            return Err(FailureReason::DeviceNotFound { expected });
        };
        let variant = &profile.variants[index];
        self.variant = Some(variant);
        self.emit(RecoveryEvent::VariantResolved {
            name: variant.name.to_string(),
        });
        self.emit(RecoveryEvent::DeviceDetected {
            device: variant.recovery.device,
            accessible: !result.transport_error,
        });
        if result.transport_error {
            self.try_switch_driver(&variant.recovery);
        }

        // Stage 4: disk-mode firmware, behind the operator gate.
        if variant.recovery.needs_confirmation {
            let prompt = format!("Flash Disk Mode firmware for {}? (y/n): ", variant.name);
            match self.operator.confirm(&prompt) {
                Ok(true) => {}
                Ok(false) | Err(_) => return Ok(self.abort()),
            }
        }
        self.goto(RecoveryPhase::FlashingDiskFirmware);
        self.flash_stage(&variant.recovery)?;
        thread::sleep(self.config.settle_delay());

        // Stage 5: the device comes up as a raw disk; select and confirm
        // the target, then hand off to the raw-write tool.
        self.goto(RecoveryPhase::AwaitingDiskEnumeration);
        let image = self.config.firmware_dir.join(variant.disk_image);
        if !image.exists() {
            return Err(FailureReason::MissingFirmware { path: image });
        }
        let target = match gate::confirm_target(&self.tools, &self.operator)? {
            GateOutcome::Confirmed(target) => target,
            GateOutcome::Aborted => return Ok(self.abort()),
        };
        self.emit(RecoveryEvent::DiskTargetConfirmed {
            path: target.path().to_string(),
        });
        let status = self
            .tools
            .write_firmware(target.path(), variant.model_tag, &image)?;
        if status != 0 {
            // The write itself is not verifiable without the vendor
            // protocol; surface the status and keep going.
            warn!(status, "raw-write tool reported a non-zero exit");
        }
        self.emit(RecoveryEvent::RawWriteFinished { status });
        self.disk_target = Some(target);

        self.emit(RecoveryEvent::Hint {
            text: variant.exit_hint.to_string(),
        });
        self.goto(RecoveryPhase::Complete);
        self.emit(RecoveryEvent::Completed);
        Ok(SessionOutcome::Completed)
    }

    /// Existence check + flash + classification for one stage.
    fn flash_stage(&self, stage: &Stage) -> Result<(), FailureReason> {
        let path = self.config.firmware_dir.join(stage.firmware);
        if !path.exists() {
            return Err(FailureReason::MissingFirmware { path });
        }
        self.emit(RecoveryEvent::FlashStarted {
            firmware: path.clone(),
        });
        let verdict = flash::run_flash(&self.tools, stage.device, &path)?;
        self.emit(RecoveryEvent::FlashFinished { verdict });
        if verdict == FlashVerdict::Failed {
            return Err(FailureReason::FlashFailed { firmware: path });
        }
        Ok(())
    }

    /// Best-effort driver switch: invoked once per transport fault, never
    /// fatal. The flashing tool may succeed without it.
    fn try_switch_driver(&self, stage: &Stage) {
        let ok = match self.tools.switch_driver(stage.driver_label, stage.device) {
            Ok(()) => true,
            Err(err) => {
                warn!(label = stage.driver_label, error = %err, "driver switch failed, continuing");
                false
            }
        };
        self.emit(RecoveryEvent::DriverSwitch {
            label: stage.driver_label.to_string(),
            ok,
        });
    }

    fn abort(&mut self) -> SessionOutcome {
        self.goto(RecoveryPhase::Aborted);
        self.emit(RecoveryEvent::Aborted);
        SessionOutcome::Aborted
    }

    fn goto(&mut self, to: RecoveryPhase) {
        info!(from = %self.state, to = %to, "State transition");
        self.emit(RecoveryEvent::PhaseChanged {
            from: self.state,
            to,
        });
        self.state = to;
    }

    fn emit(&self, event: RecoveryEvent) {
        self.observer.on_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::ScriptedOperator;
    use crate::profile::{
        DFU_DEVICE_7G, Model, RECOVERY_DEVICE_2012, RECOVERY_DEVICE_6G, profile_for,
    };
    use crate::tools::MockTools;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DONE: &str = "Download done.";

    /// Unique temp directory populated with stub firmware files.
    fn firmware_tree(files: &[&str]) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "unbrick-session-test-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        for file in files {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"stub").unwrap();
        }
        dir
    }

    /// Fast config: one probe attempt per stage.
    fn one_shot_config(firmware_dir: &Path) -> SessionConfig {
        SessionConfig {
            firmware_dir: firmware_dir.to_path_buf(),
            probe_timeout_secs: 0,
            poll_interval_ms: 1,
            settle_delay_secs: 0,
        }
    }

    const FILES_6G: &[&str] = &[
        "6G_DFU/WTF.x1232.RELEASE.dfu",
        "6G_DFU/FIRMWARE.x1248.RELEASE.dfu",
        "6G/Firmware.MSE",
    ];

    const FILES_7G: &[&str] = &[
        "2012_DFU/WTF.x1234.RELEASE.dfu",
        "2012_DFU/FIRMWARE.x1249.RELEASE.dfu",
        "2012/Firmware.MSE",
        "2015_DFU/WTF.x1234.RELEASE.dfu",
        "2015_DFU/FIRMWARE.x124a.RELEASE.dfu",
        "2015/Firmware.MSE",
    ];

    #[test]
    fn test_6g_device_never_appears_fails_without_flashing() {
        let dir = firmware_tree(FILES_6G);
        let tools = MockTools::new();
        let operator = ScriptedOperator::new(&[]);
        let mut session = RecoverySession::new(one_shot_config(&dir), tools, operator);

        let outcome = session.run(profile_for(Model::Nano6g));
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(FailureReason::DeviceNotFound { .. })
        ));
        // Zero flash invocations on probe timeout.
        assert!(session.tools.flash_calls().is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_6g_happy_path_completes() {
        let dir = firmware_tree(FILES_6G);
        let tools = MockTools::new();
        tools.queue_enumeration("ID 05ac:1232 Apple, Inc.");
        tools.queue_flash_output(DONE);
        tools.queue_enumeration("ID 05ac:1248 Apple, Inc. iPod Recovery");
        tools.queue_flash_output(DONE);
        tools.set_disk_listing("NAME SIZE MODEL\nsda 500G Samsung_SSD\nsdb 14.4G iPod\n");
        // y/n gate, then literal token for the auto-selected target.
        let operator = ScriptedOperator::new(&["y", "YES"]);
        let mut session = RecoverySession::new(one_shot_config(&dir), tools, operator);

        let outcome = session.run(profile_for(Model::Nano6g));
        assert!(matches!(outcome, SessionOutcome::Completed));
        assert_eq!(session.state(), RecoveryPhase::Complete);
        assert_eq!(session.resolved_variant().unwrap().name, "6G");
        assert_eq!(session.disk_target().unwrap().path(), "/dev/sdb");
        let write_calls = session.tools.write_calls();
        assert_eq!(write_calls.len(), 1);
        assert_eq!(write_calls[0].0, "/dev/sdb");
        assert_eq!(write_calls[0].1, "ipod6g");
        assert_eq!(write_calls[0].2, dir.join("6G/Firmware.MSE"));
        let flash_calls = session.tools.flash_calls();
        assert_eq!(flash_calls.len(), 2);
        assert_eq!(flash_calls[1].0, RECOVERY_DEVICE_6G);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_7g_transport_fault_switches_driver_once_and_continues() {
        let dir = firmware_tree(FILES_7G);
        let tools = MockTools::new();
        tools.queue_enumeration("Found DFU: [05ac:1234]\nCannot open DFU device 05ac:1234");
        // Driver switch failure must not stop the flow.
        tools.fail_next_driver_switch();
        tools.queue_flash_output(DONE);
        tools.queue_enumeration("ID 05ac:1249 Apple, Inc.");
        tools.queue_flash_output(DONE);
        tools.set_disk_listing("sdb 14.4G iPod\n");
        let operator = ScriptedOperator::new(&["y", "YES"]);
        let mut session = RecoverySession::new(one_shot_config(&dir), tools, operator);

        let outcome = session.run(profile_for(Model::Nano7g));
        assert!(matches!(outcome, SessionOutcome::Completed));
        let driver_calls = session.tools.driver_calls();
        assert_eq!(driver_calls.len(), 1);
        assert_eq!(driver_calls[0].0, "USB DFU Device");
        assert_eq!(driver_calls[0].1, DFU_DEVICE_7G);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_7g_sub_model_race_binds_first_observed() {
        let dir = firmware_tree(FILES_7G);
        let tools = MockTools::new();
        tools.queue_enumeration("ID 05ac:1234 Apple, Inc.");
        tools.queue_flash_output(DONE);
        // 2012 identifier appears at tick 3; 2015 never.
        tools.queue_silence(2);
        tools.queue_enumeration("ID 05ac:1249 Apple, Inc.");
        tools.queue_flash_output(DONE);
        tools.set_disk_listing("sdb 14.4G iPod\n");
        let operator = ScriptedOperator::new(&["y", "YES"]);
        // 20 probe ticks of 50ms per stage; the race resolves at tick 3.
        let config = SessionConfig {
            firmware_dir: dir.to_path_buf(),
            probe_timeout_secs: 1,
            poll_interval_ms: 50,
            settle_delay_secs: 0,
        };
        let mut session = RecoverySession::new(config, tools, operator);

        let outcome = session.run(profile_for(Model::Nano7g));
        assert!(matches!(outcome, SessionOutcome::Completed));
        let variant = session.resolved_variant().unwrap();
        assert_eq!(variant.name, "2012");
        // The 2015 stages were never touched.
        let flash_calls = session.tools.flash_calls();
        assert_eq!(flash_calls.len(), 2);
        assert_eq!(flash_calls[1].0, RECOVERY_DEVICE_2012);
        assert!(flash_calls[1].1.ends_with("2012_DFU/FIRMWARE.x1249.RELEASE.dfu"));
        let write_calls = session.tools.write_calls();
        assert_eq!(write_calls[0].2, dir.join("2012/Firmware.MSE"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_declined_disk_confirmation_aborts_without_side_effects() {
        let dir = firmware_tree(FILES_6G);
        let tools = MockTools::new();
        tools.queue_enumeration("ID 05ac:1232 Apple, Inc.");
        tools.queue_flash_output(DONE);
        tools.queue_enumeration("ID 05ac:1248 Apple, Inc.");
        let operator = ScriptedOperator::new(&["n"]);
        let mut session = RecoverySession::new(one_shot_config(&dir), tools, operator);

        let outcome = session.run(profile_for(Model::Nano6g));
        assert!(matches!(outcome, SessionOutcome::Aborted));
        assert_eq!(session.state(), RecoveryPhase::Aborted);
        // Only the WTF stage flashed; nothing was written.
        assert_eq!(session.tools.flash_calls().len(), 1);
        assert!(session.tools.write_calls().is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_wrong_gate_token_never_reaches_the_write_tool() {
        let dir = firmware_tree(FILES_6G);
        let tools = MockTools::new();
        tools.queue_enumeration("ID 05ac:1232 Apple, Inc.");
        tools.queue_flash_output(DONE);
        tools.queue_enumeration("ID 05ac:1248 Apple, Inc.");
        tools.queue_flash_output(DONE);
        tools.set_disk_listing("sdb 14.4G iPod\n");
        // Lowercase token declines the auto candidate; the script then
        // runs out, which reads as EOF and aborts the session.
        let operator = ScriptedOperator::new(&["y", "yes"]);
        let mut session = RecoverySession::new(one_shot_config(&dir), tools, operator);

        let outcome = session.run(profile_for(Model::Nano6g));
        assert!(matches!(outcome, SessionOutcome::Aborted));
        assert!(session.tools.write_calls().is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_stage_firmware_fails_before_flashing() {
        let dir = firmware_tree(&[]);
        let tools = MockTools::new();
        tools.queue_enumeration("ID 05ac:1232 Apple, Inc.");
        let operator = ScriptedOperator::new(&[]);
        let mut session = RecoverySession::new(one_shot_config(&dir), tools, operator);

        let outcome = session.run(profile_for(Model::Nano6g));
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(FailureReason::MissingFirmware { .. })
        ));
        assert!(session.tools.flash_calls().is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_ambiguous_flash_output_halts() {
        let dir = firmware_tree(FILES_6G);
        let tools = MockTools::new();
        tools.queue_enumeration("ID 05ac:1232 Apple, Inc.");
        tools.queue_flash_output("dfu-util: No DFU capable USB device available");
        let operator = ScriptedOperator::new(&[]);
        let mut session = RecoverySession::new(one_shot_config(&dir), tools, operator);

        let outcome = session.run(profile_for(Model::Nano6g));
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(FailureReason::FlashFailed { .. })
        ));
        assert_eq!(session.tools.flash_calls().len(), 1);
        assert!(session.tools.write_calls().is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = firmware_tree(&[]);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("unbrick.toml");
        let config = SessionConfig {
            firmware_dir: PathBuf::from("fw"),
            probe_timeout_secs: 12,
            poll_interval_ms: 250,
            settle_delay_secs: 2,
        };
        config.save_to_file(&path).unwrap();
        let loaded = SessionConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.firmware_dir, PathBuf::from("fw"));
        assert_eq!(loaded.probe_timeout_secs, 12);
        assert_eq!(loaded.poll_interval_ms, 250);
        assert_eq!(loaded.settle_delay_secs, 2);
        let _ = fs::remove_dir_all(&dir);
    }
}
