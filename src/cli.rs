use std::path::PathBuf;

use clap::Parser;

use crate::wrapper::Compression;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum CompressionArg {
    None,
    Gzip,
    Lz4,
}

impl From<CompressionArg> for Compression {
    fn from(value: CompressionArg) -> Self {
        match value {
            CompressionArg::None => Compression::None,
            CompressionArg::Gzip => Compression::Gzip,
            CompressionArg::Lz4 => Compression::Lz4,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Packages a sparse-bundle's bands and uploads them to an object store
    Upload {
        /// Path to the `.sparsebundle` directory
        #[arg(required = true)]
        bundle: PathBuf,

        /// Destination bucket
        #[arg(long)]
        bucket: String,

        /// Remote key prefix the bundle is uploaded under
        #[arg(long)]
        name: String,

        /// Local directory the checksum catalogue is written under
        #[arg(long, default_value = "./out")]
        output_dir: PathBuf,

        /// Number of bands per package
        #[arg(long, default_value_t = 16)]
        package_width: u64,

        /// Per-entry compression applied to each package's archive
        #[arg(long, value_enum, default_value = "none")]
        compression: CompressionArg,

        /// Retain each package's compressed buffer across both upload passes
        #[arg(long, default_value_t = false)]
        cache_chunks: bool,

        /// Storage class used for meta files and package archives
        #[arg(long, default_value = "STANDARD")]
        storage_class: String,

        /// Actually perform uploads; otherwise only runs the MD5/head comparison pass
        #[arg(long, default_value_t = false)]
        for_real: bool,
    },
}
