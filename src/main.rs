use clap::Parser as _;
use sparsebundle_packager::{
    bundle::{self, BundleEntry},
    cli::{Cli, Commands},
    config::UploadConfig,
    error::ArcError,
    store::FsObjectStore,
    uploader,
};

fn main() -> Result<(), ArcError> {
    _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upload {
            bundle: bundle_path,
            bucket,
            name,
            output_dir,
            package_width,
            compression,
            cache_chunks,
            storage_class,
            for_real,
        } => {
            let entries = walk_bundle(&bundle_path)?;
            let contents = bundle::scan(&bundle_path, &entries)?;

            if let Ok(band_size) = bundle::read_band_size(&bundle_path) {
                log::info!("Band size: {band_size} bytes");
            }
            log::info!("Band count: {}", contents.bands.len());

            let cfg = UploadConfig {
                bundle: bundle_path,
                package_width,
                compression: compression.into(),
                cache_chunks,
                output_dir: output_dir.clone(),
                bucket,
                name,
                storage_class,
                for_real,
            };

            let store = FsObjectStore::new(output_dir.join("store"));
            uploader::upload(&store, &cfg, &contents, None)?;
        }
    }

    Ok(())
}

fn walk_bundle(bundle: &std::path::Path) -> Result<Vec<BundleEntry>, ArcError> {
    let mut entries = Vec::new();
    for entry in walkdir::WalkDir::new(bundle).min_depth(1) {
        let entry = entry?;
        let path = entry.path().to_path_buf();
        if entry.file_type().is_dir() {
            entries.push(BundleEntry::Dir(path));
        } else {
            entries.push(BundleEntry::File(path));
        }
    }
    Ok(entries)
}
