//! Bundle Scanner: classifies an already-enumerated list of directory
//! entries under a sparse-bundle directory into meta files and band
//! indices, and reads the bundle's `band-size` out of `Info.plist`.

use std::path::{Path, PathBuf};

use crate::error::ArcError;

pub const BANDS_DIR: &str = "bands";

/// One entry produced by walking a bundle directory. The file/directory
/// distinction comes from the walker (e.g. `walkdir::DirEntry::file_type`),
/// not from a `stat` call inside the scanner -- this is what keeps
/// classification decoupled from the filesystem and trivially testable with
/// synthetic paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleEntry {
    File(PathBuf),
    Dir(PathBuf),
}

impl BundleEntry {
    fn path(&self) -> &Path {
        match self {
            BundleEntry::File(p) | BundleEntry::Dir(p) => p,
        }
    }
}

/// Result of scanning a bundle directory: bundle-relative meta file paths
/// and the sorted ascending list of band indices found under `bands/`.
pub struct BundleContents {
    pub meta_files: Vec<PathBuf>,
    pub bands: Vec<u64>,
}

/// Classifies `entries` (every path under `bundle`) into meta files and band
/// indices. Enumeration itself is the caller's job -- keeping it separate
/// from classification is what makes this testable with synthetic paths.
pub fn scan(bundle: &Path, entries: &[BundleEntry]) -> Result<BundleContents, ArcError> {
    let bands_dir = bundle.join(BANDS_DIR);

    let bands_dir_present = entries.iter().any(|entry| match entry {
        BundleEntry::Dir(p) => p == &bands_dir,
        BundleEntry::File(p) => p.starts_with(&bands_dir),
    });
    if !bands_dir_present {
        return Err(ArcError::MissingBandsDir(bands_dir));
    }

    let mut meta_files = Vec::new();
    let mut bands = Vec::new();

    for entry in entries {
        let path = entry.path();

        if matches!(entry, BundleEntry::Dir(_)) {
            // The `bands/` directory entry itself, and any other directory,
            // is never a meta file or a band file.
            continue;
        }

        if path.starts_with(&bands_dir) {
            let band = classify_band_file(path)?;
            bands.push(band);
            continue;
        }

        let relpath = path
            .strip_prefix(bundle)
            .map_err(|_| ArcError::UnexpectedMetaFile(path.to_path_buf()))?
            .to_path_buf();

        if relpath.to_str().map(|s| s.starts_with('.')).unwrap_or(false) {
            return Err(ArcError::UnexpectedMetaFile(relpath));
        }

        meta_files.push(relpath);
    }

    bands.sort_unstable();

    Ok(BundleContents { meta_files, bands })
}

fn classify_band_file(path: &Path) -> Result<u64, ArcError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArcError::InvalidBandFile(path.display().to_string()))?;

    let value = u64::from_str_radix(name, 16).map_err(|_| ArcError::InvalidBandFile(name.to_string()))?;

    if format!("{value:x}") != name {
        return Err(ArcError::InvalidBandFile(name.to_string()));
    }

    Ok(value)
}

/// Canonical hex form of a band/package boundary index: lower-case, no
/// leading zeros (`format(n, "x")` in the original).
pub fn hex(n: u64) -> String {
    format!("{n:x}")
}

/// Reads the `band-size` key out of `<bundle>/Info.plist`. Used only for the
/// informational "band size: N bytes" log line; no other code path depends
/// on the value.
pub fn read_band_size(bundle: &Path) -> Result<u64, ArcError> {
    let plist_path = bundle.join("Info.plist");
    if !plist_path.exists() {
        return Err(ArcError::MissingPlist(plist_path));
    }

    let value: plist::Value =
        plist::Value::from_file(&plist_path).map_err(|_| ArcError::MalformedPlist(plist_path.clone()))?;

    value
        .as_dictionary()
        .and_then(|dict| dict.get("band-size"))
        .and_then(|v| v.as_unsigned_integer())
        .ok_or(ArcError::MalformedPlist(plist_path))
}
