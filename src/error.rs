use std::{io, path::PathBuf};

use thiserror::Error;

/// Error taxonomy for the whole crate: archive format violations, bundle
/// layout violations, and upload-driver failures all surface through this
/// one enum.
#[derive(Error, Debug)]
pub enum ArcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Walkdir error: {0}")]
    WalkdirError(#[from] walkdir::Error),

    #[error("Path strip prefix error: {0}")]
    StripPrefixError(#[from] std::path::StripPrefixError),

    #[error("Info.plist does not exist: {0}")]
    MissingPlist(PathBuf),

    #[error("Info.plist is malformed or missing `band-size`: {0}")]
    MalformedPlist(PathBuf),

    #[error("bands/ directory does not exist under bundle: {0}")]
    MissingBandsDir(PathBuf),

    #[error("invalid band file name: {0}")]
    InvalidBandFile(String),

    #[error("unexpected meta file (dotfile): {0:?}")]
    UnexpectedMetaFile(PathBuf),

    #[error("invalid archive magic bytes")]
    InvalidMagic,

    #[error("invalid archive header padding")]
    InvalidHeader,

    #[error("truncated archive record: expected {expected} bytes, got {got}")]
    TruncatedRecord { expected: usize, got: usize },

    #[error("file name is not valid UTF-8")]
    NameNotUtf8,

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("upload of {key} failed: {source}")]
    UploadFailed { key: String, source: Box<ArcError> },

    #[error("object store client error: {0}")]
    ClientError(String),
}
