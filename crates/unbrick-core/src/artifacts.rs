//! Firmware artifact management.
//!
//! Recovery images ship as per-model release archives; a session only
//! needs the expected files to exist before each flashing stage. Content
//! is never validated here; the flashing tools reject images they cannot
//! parse.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::profile::{HardwareProfile, Model};

/// One downloadable firmware bundle and the files it must provide.
#[derive(Debug, Clone, Copy)]
pub struct FirmwareBundle {
    pub name: &'static str,
    pub url: &'static str,
    /// Directory the archive extracts into, relative to the firmware
    /// directory.
    pub extract_dir: &'static str,
    /// Files the bundle is expected to provide, relative to the firmware
    /// directory.
    pub files: &'static [&'static str],
}

const BUNDLE_6G: FirmwareBundle = FirmwareBundle {
    name: "6G",
    url: "https://github.com/lycanld/LeUnBrIck/releases/download/hidden/firmware_6G.zip",
    extract_dir: "6G_DFU",
    files: &[
        "6G_DFU/WTF.x1232.RELEASE.dfu",
        "6G_DFU/FIRMWARE.x1248.RELEASE.dfu",
    ],
};

const BUNDLE_2012: FirmwareBundle = FirmwareBundle {
    name: "2012",
    url: "https://github.com/lycanld/LeUnBrIck/releases/download/hidden/firmware_2012.zip",
    extract_dir: "2012_DFU",
    files: &[
        "2012_DFU/WTF.x1234.RELEASE.dfu",
        "2012_DFU/FIRMWARE.x1249.RELEASE.dfu",
    ],
};

const BUNDLE_2015: FirmwareBundle = FirmwareBundle {
    name: "2015",
    url: "https://github.com/lycanld/LeUnBrIck/releases/download/hidden/firmware_2015.zip",
    extract_dir: "2015_DFU",
    files: &[
        "2015_DFU/WTF.x1234.RELEASE.dfu",
        "2015_DFU/FIRMWARE.x124a.RELEASE.dfu",
    ],
};

/// Bundles needed for a model. The 7G revision is unknown before the
/// session resolves it, so both revisions are fetched up front.
pub fn bundles_for(model: Model) -> &'static [FirmwareBundle] {
    match model {
        Model::Nano6g => &[BUNDLE_6G],
        Model::Nano7g => &[BUNDLE_2012, BUNDLE_2015],
    }
}

/// Every firmware path a profile can touch, relative to the firmware
/// directory: stage images plus each variant's raw disk image.
pub fn required_files(profile: &HardwareProfile) -> Vec<&'static str> {
    let mut files = vec![profile.dfu.firmware];
    for variant in profile.variants {
        files.push(variant.recovery.firmware);
        files.push(variant.disk_image);
    }
    files
}

/// Files a bundle promises that are not present under `dir`.
pub fn missing_files(dir: &Path, bundle: &FirmwareBundle) -> Vec<PathBuf> {
    bundle
        .files
        .iter()
        .map(|file| dir.join(file))
        .filter(|path| !path.exists())
        .collect()
}

/// Check that every file the profile needs exists under `dir`.
pub fn ensure_for_profile(dir: &Path, profile: &HardwareProfile) -> Result<()> {
    let missing: Vec<PathBuf> = required_files(profile)
        .iter()
        .map(|file| dir.join(file))
        .filter(|path| !path.exists())
        .collect();
    if !missing.is_empty() {
        bail!(
            "missing firmware files: {}",
            missing
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

/// Download and extract every bundle for the profile whose files are not
/// already present.
#[instrument(skip_all, fields(model = %profile.display_name, dir = %dir.display()))]
pub fn fetch_for_profile(dir: &Path, profile: &HardwareProfile) -> Result<()> {
    for bundle in bundles_for(profile.model) {
        if missing_files(dir, bundle).is_empty() {
            info!(bundle = bundle.name, "firmware already present, skipping download");
            continue;
        }
        fetch_bundle(dir, bundle)?;
    }
    Ok(())
}

fn fetch_bundle(dir: &Path, bundle: &FirmwareBundle) -> Result<()> {
    info!(bundle = bundle.name, url = bundle.url, "downloading firmware bundle");
    let response = reqwest::blocking::get(bundle.url)
        .with_context(|| format!("downloading firmware bundle {}", bundle.name))?;
    if !response.status().is_success() {
        bail!("download failed with status: {}", response.status());
    }
    let bytes = response
        .bytes()
        .with_context(|| format!("reading firmware bundle {}", bundle.name))?;

    let target = dir.join(bundle.extract_dir);
    fs::create_dir_all(&target)
        .with_context(|| format!("creating {}", target.display()))?;
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.as_ref()))
        .with_context(|| format!("opening firmware bundle {} as zip", bundle.name))?;
    archive
        .extract(&target)
        .with_context(|| format!("extracting into {}", target.display()))?;

    info!(
        bundle = bundle.name,
        size = bytes.len(),
        "firmware bundle extracted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::profile_for;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_dir() -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "unbrick-artifacts-test-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_required_files_cover_all_stages() {
        let files = required_files(profile_for(Model::Nano7g));
        assert!(files.contains(&"2012_DFU/WTF.x1234.RELEASE.dfu"));
        assert!(files.contains(&"2012_DFU/FIRMWARE.x1249.RELEASE.dfu"));
        assert!(files.contains(&"2012/Firmware.MSE"));
        assert!(files.contains(&"2015_DFU/FIRMWARE.x124a.RELEASE.dfu"));
        assert!(files.contains(&"2015/Firmware.MSE"));
    }

    #[test]
    fn test_missing_files_on_empty_dir() {
        let dir = temp_dir();
        assert_eq!(missing_files(&dir, &BUNDLE_6G).len(), 2);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_files_after_extraction() {
        let dir = temp_dir();
        for file in BUNDLE_6G.files {
            let path = dir.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"stub").unwrap();
        }
        assert!(missing_files(&dir, &BUNDLE_6G).is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_ensure_reports_missing_paths() {
        let dir = temp_dir();
        let err = ensure_for_profile(&dir, profile_for(Model::Nano6g)).unwrap_err();
        assert!(err.to_string().contains("WTF.x1232.RELEASE.dfu"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_7g_fetch_covers_both_revisions() {
        let bundles = bundles_for(Model::Nano7g);
        assert_eq!(bundles.len(), 2);
        assert_ne!(bundles[0].url, bundles[1].url);
    }
}
