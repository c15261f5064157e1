//! Destructive-action confirmation gate for the raw disk write.
//!
//! A wrong target destroys unrelated data, so the gate is deliberately
//! high-friction: the normalized path is shown back and the operator must
//! re-type the literal `YES`. Consent is never inferred from the
//! selection step alone.

use tracing::{info, warn};

use crate::operator::Operator;
use crate::tools::{DeviceTools, Platform, ToolError};

/// The literal token required before a raw write. Case-sensitive.
pub const CONFIRM_TOKEN: &str = "YES";

/// Volume label / model column value identifying the target device.
const AUTO_DETECT_LABEL: &str = "ipod";

/// A raw disk target. Constructed only by [`confirm_target`]; once
/// confirmed it is immutable for the rest of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskTarget {
    path: String,
    confirmed: bool,
}

impl DiskTarget {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }
}

#[derive(Debug)]
pub enum GateOutcome {
    Confirmed(DiskTarget),
    /// The operator's input ended; no target was confirmed and no write
    /// may happen.
    Aborted,
}

/// Normalize operator input into the platform's raw-device form.
pub fn normalize_target(raw: &str, platform: Platform) -> String {
    let raw = raw.trim();
    match platform {
        Platform::Unix => {
            if raw.starts_with("/dev/") {
                raw.to_string()
            } else {
                format!("/dev/{raw}")
            }
        }
        Platform::Windows => {
            if raw.to_ascii_uppercase().starts_with(r"\\.\") {
                raw.to_string()
            } else if raw.len() == 2 && raw.ends_with(':') {
                format!(r"\\.\{}", raw.to_ascii_uppercase())
            } else {
                format!(r"\\.\{raw}")
            }
        }
    }
}

/// Scan a drive listing for a line whose label/model column matches the
/// expected product name. Returns the line's device column only when the
/// match is unambiguous.
pub fn auto_detect_target(listing: &str) -> Option<String> {
    let mut matches = listing.lines().filter_map(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let labeled = tokens
            .get(1..)
            .is_some_and(|rest| rest.iter().any(|t| t.eq_ignore_ascii_case(AUTO_DETECT_LABEL)));
        if labeled { tokens.first().map(|t| t.to_string()) } else { None }
    });
    let first = matches.next()?;
    if matches.next().is_some() {
        warn!("multiple drives carry the expected label; refusing to auto-select");
        return None;
    }
    Some(first)
}

/// Select and confirm the raw disk target.
///
/// Shows the drive listing, pre-selects an unambiguous auto-detected
/// candidate, and loops until the operator types the literal `YES` for a
/// candidate. Any other token returns to re-selection; empty input
/// reprompts; EOF aborts.
pub fn confirm_target<T: DeviceTools, Op: Operator>(
    tools: &T,
    operator: &Op,
) -> Result<GateOutcome, ToolError> {
    let platform = tools.platform();
    let listing = tools.list_disks()?;
    operator.show(&listing);

    let mut candidate = auto_detect_target(&listing).map(|raw| {
        let normalized = normalize_target(&raw, platform);
        info!(target = %normalized, "auto-selected drive by volume label");
        normalized
    });
    if candidate.is_none() {
        operator.show(
            "Look for the drive labeled 'iPod' in the listing above. \
             Flashing the wrong disk may destroy unrelated data.",
        );
    }

    let entry_prompt = match platform {
        Platform::Unix => "Target device (e.g. sda or /dev/sda): ",
        Platform::Windows => r"Target drive (e.g. E: or \\.\PHYSICALDRIVE1): ",
    };

    loop {
        // The auto-detected candidate is offered once; after a declined
        // confirmation selection is always manual.
        let selected = match candidate.take() {
            Some(path) => path,
            None => {
                let line = match operator.read_line(entry_prompt) {
                    Ok(line) => line,
                    Err(_) => return Ok(GateOutcome::Aborted),
                };
                if line.trim().is_empty() {
                    warn!("no target entered");
                    continue;
                }
                normalize_target(&line, platform)
            }
        };

        let token = match operator.read_line(&format!(
            "You selected {selected}. Type {CONFIRM_TOKEN} to confirm: "
        )) {
            Ok(token) => token,
            Err(_) => return Ok(GateOutcome::Aborted),
        };
        if token == CONFIRM_TOKEN {
            return Ok(GateOutcome::Confirmed(DiskTarget {
                path: selected,
                confirmed: true,
            }));
        }
        warn!("confirmation declined; returning to target selection");
    }
}
