//! Device probe: polls the external enumeration command for an expected
//! identifier.
//!
//! The poll loop is the only retry mechanism; fixed cadence, hard timeout.
//! One second matches USB re-enumeration latency after a mode switch, so
//! there is nothing to gain from backoff.

use std::thread;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::profile::DeviceId;
use crate::tools::{DeviceTools, ToolError};

/// Markers indicating the device enumerated but a driver layer is
/// blocking access to it.
const TRANSPORT_FAULT_MARKERS: &[&str] = &[
    "cannot open dfu device",
    "libusb_error",
    "device not accessible",
    "transport error",
];

/// Timing of the enumeration poll loop.
#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(1),
        }
    }
}

impl ProbeConfig {
    /// Number of enumeration attempts: `ceil(timeout / interval)`, at
    /// least one.
    pub fn attempts(&self) -> u32 {
        let t = self.timeout.as_millis();
        let i = self.interval.as_millis().max(1);
        (t.div_ceil(i)).max(1) as u32
    }
}

/// Outcome of one probe call.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub identifier_matched: bool,
    /// The device enumerates but a driver layer reported an access fault.
    /// Partial success: the caller should continue via a driver switch,
    /// not abort.
    pub transport_error: bool,
    pub raw_output: String,
}

/// Classify one tick of enumeration output. Pure; the only place tool
/// text is interpreted for device presence.
pub fn classify_enumeration(output: &str, expected: DeviceId) -> ProbeResult {
    let haystack = output.to_lowercase();
    let identifier_matched = haystack.contains(&expected.to_string());
    let transport_error = identifier_matched
        && TRANSPORT_FAULT_MARKERS
            .iter()
            .any(|marker| haystack.contains(marker));
    ProbeResult {
        identifier_matched,
        transport_error,
        raw_output: output.to_string(),
    }
}

/// Poll until `expected` appears in enumeration output or the timeout
/// elapses. A non-match result after the final attempt carries
/// `identifier_matched=false`.
#[instrument(skip(tools), fields(expected = %expected))]
pub fn probe<T: DeviceTools>(
    tools: &T,
    expected: DeviceId,
    config: &ProbeConfig,
) -> Result<ProbeResult, ToolError> {
    let attempts = config.attempts();
    let mut last_output = String::new();
    for attempt in 0..attempts {
        let output = tools.enumerate()?;
        let result = classify_enumeration(&output, expected);
        if result.identifier_matched {
            debug!(attempt, transport_error = result.transport_error, "device detected");
            return Ok(result);
        }
        last_output = result.raw_output;
        if attempt + 1 < attempts {
            thread::sleep(config.interval);
        }
    }
    debug!(attempts, "device not found within probe window");
    Ok(ProbeResult {
        identifier_matched: false,
        transport_error: false,
        raw_output: last_output,
    })
}

/// Poll for any of several mutually exclusive identifiers; the first one
/// observed wins. Candidates are checked in order within each tick, so an
/// earlier candidate shadows a later one appearing in the same output.
/// Returns the winning candidate's index, or `None` on timeout.
#[instrument(skip(tools, candidates), fields(candidates = candidates.len()))]
pub fn probe_any<T: DeviceTools>(
    tools: &T,
    candidates: &[DeviceId],
    config: &ProbeConfig,
) -> Result<Option<(usize, ProbeResult)>, ToolError> {
    let attempts = config.attempts();
    for attempt in 0..attempts {
        let output = tools.enumerate()?;
        for (index, candidate) in candidates.iter().enumerate() {
            let result = classify_enumeration(&output, *candidate);
            if result.identifier_matched {
                debug!(attempt, candidate = %candidate, "candidate detected");
                return Ok(Some((index, result)));
            }
        }
        if attempt + 1 < attempts {
            thread::sleep(config.interval);
        }
    }
    debug!(attempts, "no candidate found within probe window");
    Ok(None)
}
