//! Configuration surface aggregating every knob the Uploader Driver needs,
//! built either from parsed CLI flags or directly by a library caller.

use std::path::PathBuf;

use crate::wrapper::Compression;

/// Everything the Uploader Driver needs to package and upload one bundle.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Path to the `.sparsebundle` directory.
    pub bundle: PathBuf,
    /// Number of bands per package.
    pub package_width: u64,
    /// Per-entry compression applied to each package's archive.
    pub compression: Compression,
    /// Whether compression wrappers retain their buffer across both upload
    /// passes, required for non-seekable sources.
    pub cache_chunks: bool,
    /// Local directory the checksum catalogue is written under.
    pub output_dir: PathBuf,
    /// Destination bucket.
    pub bucket: String,
    /// Remote key prefix (`<name>/...`).
    pub name: String,
    /// Storage class used for meta files and package archives.
    pub storage_class: String,
    /// If false, runs the MD5/head comparison pass but uploads nothing.
    pub for_real: bool,
}
