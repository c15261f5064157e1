//! Hardware profile registry for the supported player models.
//!
//! Identifiers and firmware layout match the recovery images published for
//! the iPod Nano 6G and 7G (2012/2015). The registry is read-only `'static`
//! data; a session resolves the 7G sub-model at runtime by observing which
//! recovery identifier enumerates first.

use std::fmt;
use std::str::FromStr;

/// USB vendor/product identifier pair as it appears in enumeration output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub vid: u16,
    pub pid: u16,
}

impl DeviceId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

// ============================================================================
// Device Identification
// ============================================================================

/// Nano 6G in DFU mode
pub const DFU_DEVICE_6G: DeviceId = DeviceId::new(0x05ac, 0x1232);
/// Nano 7G (both revisions) in DFU mode
pub const DFU_DEVICE_7G: DeviceId = DeviceId::new(0x05ac, 0x1234);
/// Nano 6G in WTF (recovery bootloader) mode
pub const RECOVERY_DEVICE_6G: DeviceId = DeviceId::new(0x05ac, 0x1248);
/// Nano 7G 2012 revision in WTF mode
pub const RECOVERY_DEVICE_2012: DeviceId = DeviceId::new(0x05ac, 0x1249);
/// Nano 7G 2015 revision in WTF mode
pub const RECOVERY_DEVICE_2015: DeviceId = DeviceId::new(0x05ac, 0x124a);

/// Selectable model families. The 7G fork between the 2012 and 2015
/// revisions is resolved mid-session, not at selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Nano6g,
    Nano7g,
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Nano6g => write!(f, "6g"),
            Model::Nano7g => write!(f, "7g"),
        }
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "6g" | "nano6g" => Ok(Model::Nano6g),
            "7g" | "nano7g" => Ok(Model::Nano7g),
            other => Err(format!("unknown model '{other}' (expected 6g or 7g)")),
        }
    }
}

/// One step of the recovery sequence: the identifier the device must
/// enumerate with, and the firmware image flashed once it does.
#[derive(Debug, Clone, Copy)]
pub struct Stage {
    pub name: &'static str,
    /// Identifier expected in enumeration output when the device is in
    /// this stage's mode.
    pub device: DeviceId,
    /// Display name handed to the driver-switch tool.
    pub driver_label: &'static str,
    /// Firmware image for this stage, relative to the firmware directory.
    pub firmware: &'static str,
    /// Whether the operator must approve before this stage flashes.
    pub needs_confirmation: bool,
}

/// A resolved sub-model: the stages that remain after the shared DFU
/// stage, plus the final raw-disk image.
#[derive(Debug, Clone, Copy)]
pub struct Variant {
    pub name: &'static str,
    /// WTF-mode stage flashing the disk-mode firmware.
    pub recovery: Stage,
    /// Raw firmware image written to the block device, relative to the
    /// firmware directory.
    pub disk_image: &'static str,
    /// Model tag passed to the raw-write tool.
    pub model_tag: &'static str,
    /// Shown after the raw write for devices still stuck on the failure
    /// screen.
    pub exit_hint: &'static str,
}

/// Per-model recovery plan. `variants` are mutually exclusive outcomes of
/// the shared DFU stage; the first identifier observed wins.
#[derive(Debug, Clone, Copy)]
pub struct HardwareProfile {
    pub model: Model,
    pub display_name: &'static str,
    /// How the operator puts the device into DFU mode.
    pub entry_hint: &'static str,
    /// Shared initial stage: device in DFU mode, WTF image flashed.
    pub dfu: Stage,
    pub variants: &'static [Variant],
}

impl HardwareProfile {
    /// Recovery-mode identifiers of all variants, in registry order.
    pub fn recovery_candidates(&self) -> Vec<DeviceId> {
        self.variants.iter().map(|v| v.recovery.device).collect()
    }
}

static NANO_6G: HardwareProfile = HardwareProfile {
    model: Model::Nano6g,
    display_name: "iPod Nano 6G",
    entry_hint: "Put the iPod Nano 6G into DFU mode: hold VOLUME DOWN + POWER \
                 until black screen + connection sound, then press ENTER.",
    dfu: Stage {
        name: "dfu",
        device: DFU_DEVICE_6G,
        driver_label: "USB DFU Device",
        firmware: "6G_DFU/WTF.x1232.RELEASE.dfu",
        needs_confirmation: false,
    },
    variants: &[Variant {
        name: "6G",
        recovery: Stage {
            name: "wtf",
            device: RECOVERY_DEVICE_6G,
            driver_label: "iPod Recovery",
            firmware: "6G_DFU/FIRMWARE.x1248.RELEASE.dfu",
            needs_confirmation: true,
        },
        disk_image: "6G/Firmware.MSE",
        model_tag: "ipod6g",
        exit_hint: "Still stuck on a white screen? Hold Sleep/Wake + Volume \
                    Down for Disk Mode, then restore via iTunes.",
    }],
};

static NANO_7G: HardwareProfile = HardwareProfile {
    model: Model::Nano7g,
    display_name: "iPod Nano 7G",
    entry_hint: "Put the iPod Nano 7G into DFU mode: USB-A to Lightning, hold \
                 SLEEP + HOME until black screen + connection sound, then \
                 press ENTER.",
    dfu: Stage {
        name: "dfu",
        device: DFU_DEVICE_7G,
        driver_label: "USB DFU Device",
        // Both 7G revisions accept the 2012 WTF image; the revision is
        // only observable after it runs.
        firmware: "2012_DFU/WTF.x1234.RELEASE.dfu",
        needs_confirmation: false,
    },
    variants: &[
        Variant {
            name: "2012",
            recovery: Stage {
                name: "wtf-2012",
                device: RECOVERY_DEVICE_2012,
                driver_label: "iPod Recovery",
                firmware: "2012_DFU/FIRMWARE.x1249.RELEASE.dfu",
                needs_confirmation: true,
            },
            disk_image: "2012/Firmware.MSE",
            model_tag: "ipod6g",
            exit_hint: "Still stuck on a white screen? Hold SLEEP + HOME for \
                        Recovery Mode, then restore via iTunes.",
        },
        Variant {
            name: "2015",
            recovery: Stage {
                name: "wtf-2015",
                device: RECOVERY_DEVICE_2015,
                driver_label: "iPod Recovery",
                firmware: "2015_DFU/FIRMWARE.x124a.RELEASE.dfu",
                needs_confirmation: true,
            },
            disk_image: "2015/Firmware.MSE",
            model_tag: "ipod6g",
            exit_hint: "Still stuck on a white screen? Hold SLEEP + HOME for \
                        Recovery Mode, then restore via iTunes.",
        },
    ],
};

static PROFILES: [&HardwareProfile; 2] = [&NANO_6G, &NANO_7G];

/// All registered profiles.
pub fn profiles() -> &'static [&'static HardwareProfile] {
    &PROFILES
}

/// Look up the profile for a model.
pub fn profile_for(model: Model) -> &'static HardwareProfile {
    match model {
        Model::Nano6g => &NANO_6G,
        Model::Nano7g => &NANO_7G,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_display() {
        assert_eq!(DFU_DEVICE_6G.to_string(), "05ac:1232");
        assert_eq!(RECOVERY_DEVICE_2015.to_string(), "05ac:124a");
    }

    #[test]
    fn test_model_from_str() {
        assert_eq!("6g".parse::<Model>().unwrap(), Model::Nano6g);
        assert_eq!("7G".parse::<Model>().unwrap(), Model::Nano7g);
        assert!("8g".parse::<Model>().is_err());
    }

    #[test]
    fn test_profile_lookup() {
        let p = profile_for(Model::Nano6g);
        assert_eq!(p.dfu.device, DFU_DEVICE_6G);
        assert_eq!(p.variants.len(), 1);

        let p = profile_for(Model::Nano7g);
        assert_eq!(p.dfu.device, DFU_DEVICE_7G);
        assert_eq!(p.variants.len(), 2);
    }

    #[test]
    fn test_7g_variants_are_mutually_exclusive() {
        let p = profile_for(Model::Nano7g);
        let ids = p.recovery_candidates();
        assert_eq!(ids, vec![RECOVERY_DEVICE_2012, RECOVERY_DEVICE_2015]);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_recovery_stages_require_confirmation() {
        for profile in profiles() {
            assert!(!profile.dfu.needs_confirmation);
            for variant in profile.variants {
                assert!(variant.recovery.needs_confirmation);
            }
        }
    }
}
