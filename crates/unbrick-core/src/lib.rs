//! unbrick-core: recovery engine for bricked iPod Nano 6G/7G players.
//!
//! Sequences the USB-mode transitions, driver switches, firmware
//! transfers, and the final raw-disk write that bring a bricked player
//! back. The underlying protocols are never spoken in-process; external
//! tools (`dfu-util`, `lsusb`, `wdi-simple`, `ipodscsi`) do the work and
//! this crate interprets their text output.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Profile**: static per-model registry (identifiers, firmware layout)
//! - **Tools**: external command abstraction (host, mock)
//! - **Probe**: enumeration poll loop and output classification
//! - **Flash**: flash-tool invocation and output classification
//! - **Gate**: destructive-action confirmation for the raw disk write
//! - **Events**: observer pattern for UI decoupling
//! - **Session**: high-level orchestrator / state machine
//! - **Artifacts**: firmware bundle layout, checks, download
//!
//! # Example
//!
//! ```no_run
//! use unbrick_core::operator::ScriptedOperator;
//! use unbrick_core::profile::{Model, profile_for};
//! use unbrick_core::session::{RecoverySession, SessionConfig};
//! use unbrick_core::tools::HostTools;
//!
//! let config = SessionConfig::default();
//! let tools = HostTools::new("misc");
//! let operator = ScriptedOperator::new(&["y", "YES"]);
//!
//! let mut session = RecoverySession::new(config, tools, operator);
//! let outcome = session.run(profile_for(Model::Nano6g));
//! println!("{outcome:?}");
//! ```

pub mod artifacts;
pub mod events;
pub mod flash;
pub mod gate;
pub mod operator;
pub mod probe;
pub mod profile;
pub mod session;
pub mod tools;

// Re-exports for convenience
pub use events::{
    NullObserver, RecoveryEvent, RecoveryObserver, RecoveryPhase, TracingObserver,
};
pub use flash::{FlashVerdict, classify_flash_output};
pub use gate::{CONFIRM_TOKEN, DiskTarget, GateOutcome};
pub use operator::{Operator, ScriptedOperator};
pub use probe::{ProbeConfig, ProbeResult, classify_enumeration};
pub use profile::{DeviceId, HardwareProfile, Model, Stage, Variant, profile_for, profiles};
pub use session::{FailureReason, RecoverySession, SessionConfig, SessionOutcome};
pub use tools::{DeviceTools, HostTools, MockTools, Platform, ToolError};
